//! The move service: difficulty in, best move out.
//!
//! Every request holds the gate for its whole run:
//! resolve profile → get or create engine → new game → set position →
//! arm the handoff → start the search → wait for the completion.
//! That keeps exactly one search armed at a time, which is what the shared
//! handoff slot and the unlocked registry rely on.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{error, info};

use crate::config::{FailurePolicy, ServiceConfig};
use crate::difficulty::{BucketTable, DifficultyProfile};
use crate::engine::{CompletionSink, EngineFactory, SearchOutcome};
use crate::error::ServiceError;
use crate::gate::RequestGate;
use crate::handoff::ResultHandoff;
use crate::moves::BestMove;
use crate::registry::EngineRegistry;

/// Difficulty in, best move out. Owns the gate, the engine registry behind
/// it and the handoff the engines report to.
pub struct MoveService {
    gate: RequestGate<EngineRegistry>,
    handoff: Arc<ResultHandoff>,
    table: BucketTable,
    policy: FailurePolicy,
}

impl MoveService {
    pub fn new(factory: Arc<dyn EngineFactory>, config: &ServiceConfig) -> Self {
        let handoff = Arc::new(ResultHandoff::new());
        let sink = CompletionSink::new(Arc::clone(&handoff), config.failure_policy);
        let registry = EngineRegistry::new(factory, sink, &config.engine);
        Self {
            gate: RequestGate::new(registry),
            handoff,
            table: config.buckets.clone(),
            policy: config.failure_policy,
        }
    }

    /// Create an engine for every model in the table and start a game on
    /// it, so the first request at any difficulty does not pay for loading.
    pub async fn preload(&self) -> anyhow::Result<()> {
        let mut registry = self.gate.enter().await;
        for profile in self.table.distinct_models() {
            let entry = registry.get_or_create(profile).await?;
            entry
                .engine()
                .new_game()
                .await
                .with_context(|| format!("failed to start a game for {}", profile.model_id))?;
        }
        info!(models = registry.len(), "engines ready");
        Ok(())
    }

    pub fn resolve(&self, difficulty: f64) -> &DifficultyProfile {
        self.table.resolve(difficulty)
    }

    /// Compute a move for `fen` at `difficulty`. Waits for any request
    /// already in progress.
    ///
    /// The computation runs on its own task. Dropping the returned future
    /// (a client hanging up) does not cut it short, so the gate stays held
    /// until the engine has answered and the handoff is empty again.
    pub async fn best_move(
        self: &Arc<Self>,
        fen: &str,
        difficulty: f64,
    ) -> Result<BestMove, ServiceError> {
        let service = Arc::clone(self);
        let fen = fen.to_string();
        tokio::spawn(async move { service.compute(&fen, difficulty).await })
            .await
            .map_err(|e| anyhow::anyhow!("move computation failed: {e}"))?
    }

    async fn compute(&self, fen: &str, difficulty: f64) -> Result<BestMove, ServiceError> {
        let mut registry = self.gate.enter().await;
        let profile = self.table.resolve(difficulty);
        info!(fen, difficulty, model = %profile.model_id, "move requested");

        let started = Instant::now();
        let engine = registry.get_or_create(profile).await?.engine();
        engine.new_game().await?;
        engine.set_position(fen).await?;

        let pending = self.handoff.arm().inspect_err(|e| self.policy.escalate(e))?;
        let search = pending.search();
        if let Err(e) = engine.go(search, &profile.go_params()).await {
            self.handoff.disarm(search);
            return Err(e.into());
        }

        let outcome = match pending.wait().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%search, error = %e, "search did not complete");
                self.policy.escalate(&e);
                return Err(e.into());
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            SearchOutcome::BestMove(mv) => {
                info!(%search, elapsed_ms, best_move = %mv, "move found");
                Ok(mv)
            }
            SearchOutcome::NoLegalMove => {
                info!(%search, elapsed_ms, "no legal move");
                Err(ServiceError::NoLegalMove)
            }
            SearchOutcome::EngineExited => Err(anyhow::anyhow!(
                "engine for {} exited during search",
                profile.model_id
            )
            .into()),
            SearchOutcome::Unreadable(reason) => Err(anyhow::anyhow!(
                "engine for {} reported an unreadable move: {reason}",
                profile.model_id
            )
            .into()),
        }
    }

    /// Model ids with a live engine, sorted.
    pub async fn loaded_models(&self) -> Vec<String> {
        self.gate.with_exclusive_access(|registry| registry.model_ids()).await
    }

    pub fn gate(&self) -> &RequestGate<EngineRegistry> {
        &self.gate
    }

    pub fn handoff(&self) -> &ResultHandoff {
        &self.handoff
    }
}
