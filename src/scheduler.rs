//! Settling-delay timers.
//!
//! The engine never sleeps. Components ask a [`Scheduler`] to deliver a
//! [`Timer`] back after a delay, and the engine routes it on arrival. Each
//! timer carries the epoch it was armed in; the owner compares it against its
//! current epoch so a timer that outlived a state change fires as a no-op.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Restart recognition after an unsolicited end or transient error.
    RestartRecognition,
    /// Resume recognition once speech output has fully ended.
    ResumeAfterSpeech,
    /// Give up waiting for the voice catalog and speak with the default voice.
    VoiceCatalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub epoch: u64,
}

pub trait Scheduler {
    fn schedule(&self, delay: Duration, timer: Timer);
}

/// Delivers timers as [`EngineEvent::Timer`] through the engine's event channel.
#[derive(Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, timer: Timer) {
        let tx = self.tx.clone();
        debug!("Timer {:?} armed for {}ms", timer.kind, delay.as_millis());
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the engine shut down.
            let _ = tx.send(EngineEvent::Timer(timer));
        });
    }
}
