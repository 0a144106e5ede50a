//! Engine instances backed by a UCI subprocess (lc0 or anything that speaks
//! the protocol).
//!
//! Commands go to the child's stdin as they are issued. A reader task owns
//! the child's stdout: `info` lines are logged, `uciok` and `readyok` are
//! passed back to the instance so `create` and `new_game` return only once
//! the engine has caught up, and each `bestmove` line is turned into a
//! [`Completion`] for the search outstanding on that instance.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Completion, CompletionSink, Engine, EngineFactory, GoParams, SearchId, SearchOutcome};
use crate::config::EngineSettings;
use crate::moves::BestMove;

/// Launches one engine process per model.
pub struct UciEngineFactory {
    program: PathBuf,
    args: Vec<String>,
}

impl UciEngineFactory {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
        }
    }
}

#[async_trait]
impl EngineFactory for UciEngineFactory {
    async fn create(&self, model_id: &str, sink: CompletionSink) -> Result<Box<dyn Engine>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program.display()))?;

        let stdin = child.stdin.take().context("engine stdin unavailable")?;
        let stdout = child.stdout.take().context("engine stdout unavailable")?;

        let current = Arc::new(Mutex::new(None));
        let (ack_tx, acks) = mpsc::unbounded_channel();
        tokio::spawn(read_output(
            model_id.to_string(),
            BufReader::new(stdout),
            Arc::clone(&current),
            ack_tx,
            sink,
        ));

        let mut engine = UciEngine {
            model: model_id.to_string(),
            _child: child,
            stdin,
            current,
            acks,
        };
        engine.send("uci").await?;
        engine.wait_for(Ack::UciOk).await?;
        Ok(Box::new(engine))
    }
}

/// Handshake replies the reader passes back to the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    UciOk,
    ReadyOk,
}

pub struct UciEngine {
    model: String,
    _child: Child,
    stdin: ChildStdin,
    /// The search the next `bestmove` answers.
    current: Arc<Mutex<Option<SearchId>>>,
    acks: mpsc::UnboundedReceiver<Ack>,
}

impl UciEngine {
    async fn send(&mut self, line: &str) -> Result<()> {
        trace!(model = %self.model, line, "engine <");
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .with_context(|| format!("failed to write to engine for {}", self.model))?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Block until the engine sends `ack`. There is no timeout; an engine
    /// that exits first turns this into an error.
    async fn wait_for(&mut self, ack: Ack) -> Result<()> {
        while let Some(got) = self.acks.recv().await {
            if got == ack {
                return Ok(());
            }
        }
        bail!("engine for {} exited before answering {ack:?}", self.model)
    }
}

#[async_trait]
impl Engine for UciEngine {
    async fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.send(&format!("setoption name {name} value {value}")).await
    }

    /// Also where lc0 loads its network, so this can take a while the
    /// first time.
    async fn new_game(&mut self) -> Result<()> {
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for(Ack::ReadyOk).await
    }

    async fn set_position(&mut self, fen: &str) -> Result<()> {
        if fen.contains(['\n', '\r']) {
            bail!("position contains a line break");
        }
        self.send(&format!("position fen {fen}")).await
    }

    async fn go(&mut self, search: SearchId, params: &GoParams) -> Result<()> {
        // Record the search before the engine can possibly answer it.
        *self.current.lock().unwrap() = Some(search);
        let result = self.send(&go_command(params)).await;
        if result.is_err() {
            self.current.lock().unwrap().take();
        }
        result
    }
}

fn go_command(params: &GoParams) -> String {
    let mut cmd = format!("go movetime {}", params.movetime.as_millis());
    if let Some(depth) = params.depth {
        cmd.push_str(&format!(" depth {depth}"));
    }
    if let Some(nodes) = params.nodes {
        cmd.push_str(&format!(" nodes {nodes}"));
    }
    cmd
}

/// Outcome of a `bestmove` line, or `None` for any other line.
fn parse_bestmove(line: &str) -> Option<SearchOutcome> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("bestmove") {
        return None;
    }
    let outcome = match tokens.next() {
        None | Some("(none)") | Some("0000") => SearchOutcome::NoLegalMove,
        Some(mv) => match BestMove::from_uci(mv) {
            Ok(mv) => SearchOutcome::BestMove(mv),
            Err(e) => SearchOutcome::Unreadable(e.to_string()),
        },
    };
    Some(outcome)
}

fn parse_ack(line: &str) -> Option<Ack> {
    match line.trim() {
        "uciok" => Some(Ack::UciOk),
        "readyok" => Some(Ack::ReadyOk),
        _ => None,
    }
}

async fn read_output<R: AsyncBufRead + Unpin>(
    model: String,
    reader: R,
    current: Arc<Mutex<Option<SearchId>>>,
    acks: mpsc::UnboundedSender<Ack>,
    sink: CompletionSink,
) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(outcome) = parse_bestmove(&line) {
                    let search = current.lock().unwrap().take();
                    debug!(model = %model, line = %line, "engine finished search");
                    // Violations are logged (and escalated) by the sink.
                    let _ = sink.deliver(Completion { search, outcome });
                } else if let Some(ack) = parse_ack(&line) {
                    trace!(model = %model, ?ack, "engine acknowledged");
                    // The instance only waits while it is alive.
                    let _ = acks.send(ack);
                } else if let Some(info) = line.strip_prefix("info ") {
                    debug!(model = %model, info, "engine thinking");
                } else {
                    trace!(model = %model, line = %line, "engine >");
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(model = %model, error = %e, "failed to read engine output");
                break;
            }
        }
    }

    warn!(model = %model, "engine output closed");
    let pending = current.lock().unwrap().take();
    if let Some(search) = pending {
        let _ = sink.deliver(Completion {
            search: Some(search),
            outcome: SearchOutcome::EngineExited,
        });
    }
}
