//! Remap Handle - Unified API for the remapping session
//!
//! Wires the virtual pad, the pulse scheduler, the state engine and the raw
//! input source together and owns their lifecycle.

use crate::config::RemapSettings;
use crate::controller::engine::ControllerStateEngine;
use crate::controller::pulse::TokioScheduler;
use crate::controller::sink::{ControllerSink, PadReport, SinkError, VirtualPad};
use crate::controller::state::Mode;
use crate::input::source::{DeliveryStats, ReplaySource, SourceError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, info, warn};

/// Engine as assembled by [`RemapHandle`]
pub type PadEngine = ControllerStateEngine<VirtualPad, TokioScheduler>;

/// Errors that can occur while starting or stopping a session
///
/// Aggregates errors from the output and input sides.
#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    /// Virtual pad refused the initial report
    #[error("Sink error: {0}")]
    SinkError(#[from] SinkError),

    /// Raw input source failed to open or read
    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    /// A session task panicked or was aborted
    #[error("Task error: {0}")]
    TaskError(String),

    /// Called outside a tokio runtime
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Handle for a running remapping session
///
/// Spawns two tokio tasks:
/// 1. **Source task**: reads raw events and drives the engine
/// 2. **Monitor task**: logs published reports and mode changes
///
/// ```text
/// ReplaySource ─[RawInputEvent]→ ControllerStateEngine ─[PadReport]→ watch
///                                        │
///                                        └─[Mode]→ watch
/// ```
pub struct RemapHandle {
    engine: Arc<PadEngine>,
    reports: watch::Receiver<PadReport>,
    shutdown: CancellationToken,
    source_finished: CancellationToken,
    source_task: JoinHandle<Result<DeliveryStats, SourceError>>,
    monitor_task: JoinHandle<()>,
}

impl RemapHandle {
    /// Starts a session. Must be called from within a tokio runtime.
    ///
    /// A source that fails to open does not fail the spawn: the engine is
    /// degraded to passthrough and the error is returned from
    /// [`shutdown`](Self::shutdown).
    pub fn spawn(settings: RemapSettings) -> Result<Self, RemapError> {
        info!("Initializing remapper with settings: {:?}", settings);

        let RemapSettings {
            curve,
            engine: engine_settings,
            replay_path,
        } = settings;
        debug!(
            "Split settings: curve={:?}, engine={:?}, replay={:?}",
            curve, engine_settings, replay_path
        );

        let scheduler = TokioScheduler::current()
            .map_err(|e| RemapError::InitializationError(e.to_string()))?;

        let mut pad = VirtualPad::new();
        let reports = pad.subscribe();
        pad.connect();
        // consumers start from a neutral report
        pad.submit()?;

        let engine = ControllerStateEngine::new(curve, engine_settings, pad, scheduler);
        let shutdown = engine.termination().child_token();
        let source_finished = CancellationToken::new();

        info!("Spawning source task");
        let source_task = tokio::spawn(run_source(
            Arc::clone(&engine),
            replay_path,
            shutdown.clone(),
            source_finished.clone(),
        ));

        info!("Spawning monitor task");
        let monitor_task = tokio::spawn(run_monitor(
            reports.clone(),
            engine.subscribe_mode(),
            shutdown.clone(),
        ));

        info!("Remapper initialized successfully in {} mode", engine.mode());
        Ok(Self {
            engine,
            reports,
            shutdown,
            source_finished,
            source_task,
            monitor_task,
        })
    }

    pub fn engine(&self) -> &Arc<PadEngine> {
        &self.engine
    }

    pub fn subscribe_reports(&self) -> watch::Receiver<PadReport> {
        self.reports.clone()
    }

    /// Fires once the safety chord was detected.
    pub fn termination(&self) -> CancellationToken {
        self.engine.termination()
    }

    /// Resolves once the source stopped delivering for any reason.
    pub fn source_finished(&self) -> WaitForCancellationFuture<'_> {
        self.source_finished.cancelled()
    }

    /// Stops both tasks, neutralizes and disconnects the pad.
    pub async fn shutdown(self) -> Result<DeliveryStats, RemapError> {
        info!("Shutting down remapper");
        self.shutdown.cancel();

        let delivery = self
            .source_task
            .await
            .map_err(|e| RemapError::TaskError(e.to_string()));
        if let Err(e) = self.monitor_task.await {
            warn!("Monitor task ended abnormally: {}", e);
        }

        self.engine.shutdown();
        self.engine.with_sink(|pad| pad.disconnect());

        let stats = delivery??;
        info!("Remapper stopped after {} events", stats.delivered);
        Ok(stats)
    }
}

async fn run_source(
    engine: Arc<PadEngine>,
    replay_path: Option<String>,
    shutdown: CancellationToken,
    finished: CancellationToken,
) -> Result<DeliveryStats, SourceError> {
    let _finished = finished.drop_guard();

    let source = match ReplaySource::create(replay_path.as_deref()).await {
        Ok(source) => source,
        Err(e) => {
            engine.degrade_to_passthrough(&e.to_string());
            return Err(e);
        }
    };

    let mut delivering = source.initialize();
    match delivering.run_delivery_loop(&engine, &shutdown).await {
        Ok(stats) => {
            info!("Source task for {} finished", delivering.origin());
            Ok(stats)
        }
        Err(e) => {
            error!("Source task terminated with error: {}", e);
            engine.degrade_to_passthrough(&e.to_string());
            Err(e)
        }
    }
}

async fn run_monitor(
    mut reports: watch::Receiver<PadReport>,
    mut modes: watch::Receiver<Mode>,
    shutdown: CancellationToken,
) {
    let mut report_count: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                report_count += 1;
                let report = *reports.borrow_and_update();
                debug!(
                    "Report at {}: L:({},{}) R:({},{}) LT:{} RT:{} Buttons:{:#06x}",
                    report.timestamp.format("%H:%M:%S.%3f"),
                    report.left_x,
                    report.left_y,
                    report.right_x,
                    report.right_y,
                    report.left_trigger,
                    report.right_trigger,
                    report.buttons.bits()
                );
            }
            changed = modes.changed() => {
                if changed.is_err() {
                    break;
                }
                let mode = *modes.borrow_and_update();
                info!("Mode indicator: {}", mode);
            }
        }
    }
    debug!("Monitor task stopped after {} reports", report_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::state::Buttons;
    use std::path::PathBuf;

    fn replay_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "mnkpad-{}-{}.txt",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn replay_drives_virtual_pad() {
        let path = replay_file("drive", "key space down\ndown left\nmove 0 0\n");
        let settings = RemapSettings {
            replay_path: Some(path.to_string_lossy().into_owned()),
            ..RemapSettings::default()
        };

        let handle = RemapHandle::spawn(settings).unwrap();
        let reports = handle.subscribe_reports();
        handle.source_finished().await;

        let report = *reports.borrow();
        assert_eq!(report.right_trigger, 255);
        assert!(report.buttons.contains(Buttons::A));
        assert_eq!(handle.engine().mode(), Mode::Controller);

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.delivered, 3);
        assert!(reports.borrow().is_neutral());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_source_degrades_to_passthrough() {
        let settings = RemapSettings {
            replay_path: Some("/nonexistent/mnkpad/replay.txt".to_string()),
            ..RemapSettings::default()
        };

        let handle = RemapHandle::spawn(settings).unwrap();
        handle.source_finished().await;
        assert_eq!(handle.engine().mode(), Mode::Passthrough);
        assert_eq!(handle.engine().toggle_mode(), Mode::Passthrough);

        let result = handle.shutdown().await;
        assert!(matches!(
            result,
            Err(RemapError::SourceError(SourceError::Initialization(_)))
        ));
    }

    #[tokio::test]
    async fn safety_chord_fires_termination() {
        let path = replay_file("chord", "key 1 down\nkey 0 down\nkey space down\n");
        let settings = RemapSettings {
            replay_path: Some(path.to_string_lossy().into_owned()),
            ..RemapSettings::default()
        };

        let handle = RemapHandle::spawn(settings).unwrap();
        handle.termination().cancelled().await;
        handle.source_finished().await;
        assert!(!handle.engine().snapshot().button(crate::controller::state::Button::A));

        let _ = handle.shutdown().await;
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let result = RemapHandle::spawn(RemapSettings::default());
        assert!(matches!(result, Err(RemapError::InitializationError(_))));
    }
}
