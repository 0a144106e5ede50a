//! Single-slot bridge from an engine's completion callback to the request
//! waiting on it.
//!
//! The slot is either Empty or Armed with the identity of exactly one
//! outstanding search. The request side arms it right before submitting the
//! search; the engine side fulfills it when the search completes, which
//! returns it to Empty. The waiting request sleeps on a oneshot channel
//! rather than polling.
//!
//! Only one search may be armed at a time. The request gate is what makes
//! that hold; this type detects, but does not prevent, a breach.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::engine::{SearchId, SearchOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("search {armed} is still pending; cannot arm another")]
    AlreadyArmed { armed: SearchId },
    #[error("completion for {got:?} arrived with no request pending")]
    NotArmed { got: Option<SearchId> },
    #[error("completion for {got:?} arrived while {expected} was pending")]
    Mismatch {
        expected: SearchId,
        got: Option<SearchId>,
    },
    #[error("search {0} was abandoned before completing")]
    Abandoned(SearchId),
}

impl HandoffError {
    /// True for errors that can only happen if the one-search-at-a-time
    /// discipline was broken.
    pub fn is_violation(&self) -> bool {
        !matches!(self, HandoffError::Abandoned(_))
    }
}

type Reply = Result<SearchOutcome, HandoffError>;

enum Slot {
    Empty,
    Armed {
        search: SearchId,
        reply: oneshot::Sender<Reply>,
    },
}

/// The slot an engine completion passes through on its way to the request.
pub struct ResultHandoff {
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl Default for ResultHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultHandoff {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            next_id: AtomicU64::new(1),
        }
    }

    /// Empty → Armed. Issues a fresh search identity to pass to the engine.
    pub fn arm(&self) -> Result<Pending, HandoffError> {
        let mut slot = self.slot.lock().unwrap();
        if let Slot::Armed { search, .. } = &*slot {
            return Err(HandoffError::AlreadyArmed { armed: *search });
        }
        let search = SearchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        *slot = Slot::Armed { search, reply: tx };
        Ok(Pending { search, rx })
    }

    /// Armed → Empty, delivering `outcome` to the waiter.
    ///
    /// The slot must hold `search`. If it holds a different search, that
    /// waiter is failed with [`HandoffError::Mismatch`] so it cannot receive
    /// someone else's move, and the slot is cleared.
    pub fn fulfill(
        &self,
        search: Option<SearchId>,
        outcome: SearchOutcome,
    ) -> Result<(), HandoffError> {
        let mut slot = self.slot.lock().unwrap();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Empty => Err(HandoffError::NotArmed { got: search }),
            Slot::Armed { search: armed, reply } if Some(armed) == search => {
                // A dropped receiver means the request went away; nothing to do.
                let _ = reply.send(Ok(outcome));
                Ok(())
            }
            Slot::Armed { search: armed, reply } => {
                let err = HandoffError::Mismatch {
                    expected: armed,
                    got: search,
                };
                let _ = reply.send(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Armed → Empty without a result, for when submitting the search failed.
    /// Leaves the slot alone if it holds a different search.
    pub fn disarm(&self, search: SearchId) {
        let mut slot = self.slot.lock().unwrap();
        if matches!(&*slot, Slot::Armed { search: armed, .. } if *armed == search) {
            *slot = Slot::Empty;
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(&*self.slot.lock().unwrap(), Slot::Armed { .. })
    }

    pub fn armed_search(&self) -> Option<SearchId> {
        match &*self.slot.lock().unwrap() {
            Slot::Armed { search, .. } => Some(*search),
            Slot::Empty => None,
        }
    }
}

/// The request side of an armed slot.
#[derive(Debug)]
pub struct Pending {
    search: SearchId,
    rx: oneshot::Receiver<Reply>,
}

impl Pending {
    pub fn search(&self) -> SearchId {
        self.search
    }

    /// Sleep until the slot is fulfilled.
    pub async fn wait(self) -> Result<SearchOutcome, HandoffError> {
        match self.rx.await {
            Ok(reply) => reply,
            Err(_) => Err(HandoffError::Abandoned(self.search)),
        }
    }
}
