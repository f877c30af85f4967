//! Two-stage shutdown shared by the record source and the pipeline.
//!
//! The first request drains: components stop taking new work, finish what they hold and start
//! releasing their resources. The second request forces: anything still waiting on a resource
//! release stops waiting and returns. Nothing is ever killed; a forced component just walks away
//! from the pending operation.
use std::future::Future;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStage {
    Running,
    Draining,
    Forced,
}

#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    drain: CancellationToken,
    force: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Escalate one stage and return the stage entered.
    pub fn request(&self) -> ShutdownStage {
        if !self.drain.is_cancelled() {
            self.drain.cancel();
            ShutdownStage::Draining
        } else {
            self.force.cancel();
            ShutdownStage::Forced
        }
    }

    pub fn stage(&self) -> ShutdownStage {
        if self.force.is_cancelled() {
            ShutdownStage::Forced
        } else if self.drain.is_cancelled() {
            ShutdownStage::Draining
        } else {
            ShutdownStage::Running
        }
    }

    pub fn drain_requested(&self) -> WaitForCancellationFuture<'_> {
        self.drain.cancelled()
    }

    pub fn force_requested(&self) -> WaitForCancellationFuture<'_> {
        self.force.cancelled()
    }

    /// Race `work` against a force request. Returns `None` if forced first, in which case `work`
    /// is dropped. Work that runs on its own task keeps running after that.
    pub async fn unless_forced<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.force_requested() => None,
            output = work => Some(output),
        }
    }
}

/// Escalate `shutdown` on every SIGINT or SIGTERM until it has been forced.
pub async fn listen_for_signals(shutdown: Shutdown) -> Result<(), std::io::Error> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => {},
            _ = term.recv() => {},
        };

        match shutdown.request() {
            ShutdownStage::Draining => {
                info!("received interrupt signal; draining, send again to quit without waiting")
            }
            _ => {
                warn!("received second interrupt signal; quitting without waiting for graceful close");
                return Ok(());
            }
        }
    }
}
