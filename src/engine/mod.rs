pub mod mock;
pub mod uci;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::error;

use crate::config::FailurePolicy;
use crate::handoff::{HandoffError, ResultHandoff};
use crate::moves::BestMove;

/// Identifies one submitted search. Issued by [`ResultHandoff::arm`] and
/// echoed back by the engine when the search completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(pub u64);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Limits for a single search. `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoParams {
    pub movetime: Duration,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
}

/// How a search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    BestMove(BestMove),
    /// The position has no legal moves.
    NoLegalMove,
    /// The engine went away before answering.
    EngineExited,
    /// The engine answered with something that is not a move.
    Unreadable(String),
}

/// What an engine reports when a search finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The search this answers, or `None` when the engine produced a result
    /// nobody asked for.
    pub search: Option<SearchId>,
    pub outcome: SearchOutcome,
}

/// The one place completions go. Every engine instance gets a clone.
#[derive(Clone)]
pub struct CompletionSink {
    handoff: Arc<ResultHandoff>,
    policy: FailurePolicy,
}

impl CompletionSink {
    pub fn new(handoff: Arc<ResultHandoff>, policy: FailurePolicy) -> Self {
        Self { handoff, policy }
    }

    /// Hand a completion to whichever request is waiting for it.
    ///
    /// Runs on the engine's own task, without the request gate. A completion
    /// that does not match the armed request is an invariant violation: it is
    /// logged and, under [`FailurePolicy::Abort`], terminates the process.
    pub fn deliver(&self, completion: Completion) -> Result<(), HandoffError> {
        let search = completion.search;
        match self.handoff.fulfill(search, completion.outcome) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    search = ?search,
                    error = %e,
                    "completion did not match the pending request"
                );
                self.policy.escalate(&e);
                Err(e)
            }
        }
    }
}

/// A running engine instance. Calls return once the command has been
/// submitted; search results arrive later through the [`CompletionSink`].
#[async_trait]
pub trait Engine: Send + Sync {
    async fn set_option(&mut self, name: &str, value: &str) -> Result<()>;
    async fn new_game(&mut self) -> Result<()>;
    async fn set_position(&mut self, fen: &str) -> Result<()>;
    async fn go(&mut self, search: SearchId, params: &GoParams) -> Result<()>;
}

/// Creates engine instances wired to the completion sink.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, model_id: &str, sink: CompletionSink) -> Result<Box<dyn Engine>>;
}
