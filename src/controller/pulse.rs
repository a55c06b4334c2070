//! Deferred pulse release
//!
//! A pulse forces a button down and releases it after a fixed delay. Only one
//! release may be outstanding: arming again cancels the pending one and
//! restarts the window.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// One-shot timer facility provided by the execution environment
pub trait Scheduler: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn schedule(&self, delay: Duration, action: Box<dyn FnOnce() + Send + 'static>)
        -> Self::Handle;

    fn cancel(&self, handle: Self::Handle);
}

/// Runs deferred actions as tokio tasks on a captured runtime
///
/// The runtime handle is captured up front so scheduling works from callback
/// threads that are not part of the runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    pub fn current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    type Handle = JoinHandle<()>;

    fn schedule(
        &self,
        delay: Duration,
        action: Box<dyn FnOnce() + Send + 'static>,
    ) -> Self::Handle {
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        })
    }

    fn cancel(&self, handle: Self::Handle) {
        handle.abort();
    }
}

/// Tracks the single outstanding release
///
/// Each arm bumps a generation. A release that fires after being superseded
/// carries a stale generation and is ignored by [`expire`](Self::expire).
#[derive(Debug)]
pub struct PulseTimer<H> {
    generation: u64,
    pending: Option<(u64, H)>,
}

impl<H> Default for PulseTimer<H> {
    fn default() -> Self {
        Self {
            generation: 0,
            pending: None,
        }
    }
}

impl<H: Send + 'static> PulseTimer<H> {
    /// Schedules `on_expire` after `delay`, replacing any pending release.
    pub fn arm<S, F>(&mut self, scheduler: &S, delay: Duration, on_expire: F) -> u64
    where
        S: Scheduler<Handle = H>,
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel(scheduler);
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        let handle = scheduler.schedule(delay, Box::new(move || on_expire(generation)));
        self.pending = Some((generation, handle));
        trace!("Pulse release armed: generation {} in {:?}", generation, delay);
        generation
    }

    /// Consumes the pending release if `generation` is still current.
    pub fn expire(&mut self, generation: u64) -> bool {
        match self.pending {
            Some((current, _)) if current == generation => {
                self.pending = None;
                true
            }
            _ => {
                trace!("Ignoring stale pulse release: generation {}", generation);
                false
            }
        }
    }

    pub fn cancel<S>(&mut self, scheduler: &S)
    where
        S: Scheduler<Handle = H>,
    {
        if let Some((generation, handle)) = self.pending.take() {
            trace!("Cancelling pulse release: generation {}", generation);
            scheduler.cancel(handle);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
