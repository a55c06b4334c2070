//! Line-oriented raw-input source
//!
//! Replays raw events from a file or stdin into the engine, one event per
//! line:
//!
//! ```text
//! move <dx> <dy>
//! down|up <primary|secondary|tertiary|side1|side2>
//! wheel <delta>
//! key <name|0xNN|decimal> <down|up>
//! sleep <ms>
//! toggle
//! ```
//!
//! `#` starts a comment. A malformed line is logged and skipped.

use crate::controller::engine::ControllerStateEngine;
use crate::controller::pulse::Scheduler;
use crate::controller::sink::ControllerSink;
use crate::input::{Disposition, KeyCode, MouseButton, RawInputEvent};
use chrono::Local;
use statum::{machine, state};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to initialize input source: {0}")]
    Initialization(String),

    #[error("Failed to read from input source: {0}")]
    Read(String),

    #[error("Malformed input line: {0}")]
    Parse(String),
}

// One parsed replay line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCommand {
    Event(RawInputEvent),
    Sleep(Duration),
    Toggle,
}

// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub consumed: u64,
    pub skipped: u64,
}

type LineReader = Box<dyn AsyncBufRead + Unpin + Send>;

#[state]
#[derive(Debug, Clone)]
pub enum SourceState {
    Initializing,
    Delivering,
}

#[machine]
pub struct ReplaySource<S: SourceState> {
    // Human readable origin for logs
    origin: String,

    // Line stream
    lines: Lines<LineReader>,

    // Lines read so far
    line_number: u64,
}

impl<S: SourceState> ReplaySource<S> {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl ReplaySource<Initializing> {
    /// Opens `path`, or stdin when no path is given.
    pub async fn create(path: Option<&str>) -> Result<Self, SourceError> {
        match path {
            Some(path) => {
                info!("Opening replay file {}", path);
                let file = match tokio::fs::File::open(path).await {
                    Ok(file) => file,
                    Err(e) => {
                        error!("Failed to open replay file {}: {}", path, e);
                        return Err(SourceError::Initialization(format!("{}: {}", path, e)));
                    }
                };
                Ok(Self::from_reader(path, BufReader::new(file)))
            }
            None => {
                info!("Reading raw input from stdin");
                Ok(Self::from_reader("stdin", BufReader::new(tokio::io::stdin())))
            }
        }
    }

    pub fn from_reader<R>(origin: impl Into<String>, reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let reader: LineReader = Box::new(reader);
        Self::new(origin.into(), reader.lines(), 0)
    }

    pub fn initialize(self) -> ReplaySource<Delivering> {
        info!(
            "Replay source {} ready at {}, transitioning to Delivering state",
            self.origin,
            Local::now().format("%H:%M:%S.%3f")
        );
        self.transition()
    }
}

impl ReplaySource<Delivering> {
    /// Feeds every line into `engine` until the input ends or `shutdown`
    /// fires.
    pub async fn run_delivery_loop<K, S>(
        &mut self,
        engine: &ControllerStateEngine<K, S>,
        shutdown: &CancellationToken,
    ) -> Result<DeliveryStats, SourceError>
    where
        K: ControllerSink,
        S: Scheduler,
    {
        info!("Starting delivery loop for {}", self.origin);
        let mut stats = DeliveryStats::default();

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Delivery from {} stopped by shutdown", self.origin);
                    break;
                }
                line = self.lines.next_line() => {
                    line.map_err(|e| SourceError::Read(e.to_string()))?
                }
            };

            let Some(line) = line else {
                info!("Replay source {} exhausted", self.origin);
                break;
            };
            self.line_number += 1;

            match parse_line(&line) {
                Ok(None) => {}
                Ok(Some(ReplayCommand::Event(event))) => {
                    if engine.handle(event) == Disposition::Consume {
                        stats.consumed += 1;
                    }
                    stats.delivered += 1;
                }
                Ok(Some(ReplayCommand::Sleep(duration))) => {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
                Ok(Some(ReplayCommand::Toggle)) => {
                    let mode = engine.toggle_mode();
                    debug!("External toggle on line {}: now {}", self.line_number, mode);
                }
                Err(e) => {
                    warn!("Skipping line {} of {}: {}", self.line_number, self.origin, e);
                    stats.skipped += 1;
                }
            }
        }

        info!(
            "Delivery stats for {}: {} events ({} consumed), {} lines skipped",
            self.origin, stats.delivered, stats.consumed, stats.skipped
        );
        Ok(stats)
    }
}

fn parse_number<T: std::str::FromStr>(token: Option<&str>, what: &str) -> Result<T, SourceError> {
    let token = token.ok_or_else(|| SourceError::Parse(format!("missing {}", what)))?;
    token
        .parse()
        .map_err(|_| SourceError::Parse(format!("invalid {} '{}'", what, token)))
}

fn parse_button(token: Option<&str>) -> Result<MouseButton, SourceError> {
    let token = token.ok_or_else(|| SourceError::Parse("missing button".to_string()))?;
    MouseButton::from_name(token)
        .ok_or_else(|| SourceError::Parse(format!("unknown button '{}'", token)))
}

/// `Ok(None)` for blank and comment-only lines.
pub fn parse_line(line: &str) -> Result<Option<ReplayCommand>, SourceError> {
    let content = line.split('#').next().unwrap_or_default();
    let mut tokens = content.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "move" => ReplayCommand::Event(RawInputEvent::Motion {
            dx: parse_number(tokens.next(), "dx")?,
            dy: parse_number(tokens.next(), "dy")?,
        }),
        "down" => ReplayCommand::Event(RawInputEvent::ButtonDown(parse_button(tokens.next())?)),
        "up" => ReplayCommand::Event(RawInputEvent::ButtonUp(parse_button(tokens.next())?)),
        "wheel" => ReplayCommand::Event(RawInputEvent::Wheel(parse_number(
            tokens.next(),
            "wheel delta",
        )?)),
        "key" => {
            let name = tokens
                .next()
                .ok_or_else(|| SourceError::Parse("missing key".to_string()))?;
            let key = KeyCode::parse(name)
                .ok_or_else(|| SourceError::Parse(format!("unknown key '{}'", name)))?;
            let down = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
                Some("down") => true,
                Some("up") => false,
                Some(other) => {
                    return Err(SourceError::Parse(format!("invalid key edge '{}'", other)))
                }
                None => return Err(SourceError::Parse("missing key edge".to_string())),
            };
            ReplayCommand::Event(RawInputEvent::Key { key, down })
        }
        "sleep" => ReplayCommand::Sleep(Duration::from_millis(parse_number(
            tokens.next(),
            "sleep duration",
        )?)),
        "toggle" => ReplayCommand::Toggle,
        other => return Err(SourceError::Parse(format!("unknown command '{}'", other))),
    };

    if let Some(extra) = tokens.next() {
        return Err(SourceError::Parse(format!("unexpected token '{}'", extra)));
    }
    Ok(Some(command))
}
