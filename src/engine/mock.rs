use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Completion, CompletionSink, Engine, EngineFactory, GoParams, SearchId, SearchOutcome};
use crate::moves::BestMove;

/// Everything a mock engine was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Created { model: String },
    SetOption { model: String, name: String, value: String },
    NewGame { model: String },
    Position { model: String, fen: String },
    Go { model: String, search: SearchId, params: GoParams },
    Completed { model: String, search: SearchId },
}

/// A scripted engine factory for tests. Every search answers with the same
/// UCI move after a fixed delay, from a spawned task, like a real engine's
/// output reader would.
pub struct MockEngineFactory {
    reply: String,
    delay: Duration,
    fail_create: bool,
    created: AtomicUsize,
    log: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockEngineFactory {
    /// `reply` is a UCI move, or `(none)` for a position without legal moves.
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            fail_create: false,
            created: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every `create` fail.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn create(&self, model_id: &str, sink: CompletionSink) -> Result<Box<dyn Engine>> {
        if self.fail_create {
            bail!("mock engine refused to start");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(MockEvent::Created {
            model: model_id.to_string(),
        });
        Ok(Box::new(MockEngine {
            model: model_id.to_string(),
            reply: self.reply.clone(),
            delay: self.delay,
            sink,
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct MockEngine {
    model: String,
    reply: String,
    delay: Duration,
    sink: CompletionSink,
    log: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockEngine {
    fn record(&self, event: MockEvent) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.record(MockEvent::SetOption {
            model: self.model.clone(),
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn new_game(&mut self) -> Result<()> {
        self.record(MockEvent::NewGame {
            model: self.model.clone(),
        });
        Ok(())
    }

    async fn set_position(&mut self, fen: &str) -> Result<()> {
        self.record(MockEvent::Position {
            model: self.model.clone(),
            fen: fen.to_string(),
        });
        Ok(())
    }

    async fn go(&mut self, search: SearchId, params: &GoParams) -> Result<()> {
        self.record(MockEvent::Go {
            model: self.model.clone(),
            search,
            params: params.clone(),
        });

        let outcome = match BestMove::from_uci(&self.reply) {
            Ok(mv) => SearchOutcome::BestMove(mv),
            Err(_) => SearchOutcome::NoLegalMove,
        };
        let model = self.model.clone();
        let delay = self.delay;
        let sink = self.sink.clone();
        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            log.lock().unwrap().push(MockEvent::Completed { model, search });
            let _ = sink.deliver(Completion {
                search: Some(search),
                outcome,
            });
        });
        Ok(())
    }
}
