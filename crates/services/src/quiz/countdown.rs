use std::collections::HashMap;
use std::time::Duration;

use quest_core::quiz::{CountdownTicket, QuizEffect, QuizEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Turns countdown effects into tokio timers.
///
/// An expired timer sends `QuizEvent::CountdownExpired` into the channel; the
/// caller feeds it back through the quiz loop like any other event. Stale
/// expiries that lose the race against an answer are rejected by the session.
#[derive(Debug)]
pub struct CountdownDriver {
    tx: mpsc::Sender<QuizEvent>,
    timers: HashMap<CountdownTicket, JoinHandle<()>>,
}

impl CountdownDriver {
    #[must_use]
    pub fn new(tx: mpsc::Sender<QuizEvent>) -> Self {
        Self {
            tx,
            timers: HashMap::new(),
        }
    }

    /// Driver plus the receiving end of its expiry channel.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<QuizEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }

    /// Start or cancel timers as requested; other effects are ignored.
    pub fn apply(&mut self, effects: &[QuizEffect]) {
        self.timers.retain(|_, handle| !handle.is_finished());
        for effect in effects {
            match *effect {
                QuizEffect::StartCountdown { ticket, secs } => self.start(ticket, secs),
                QuizEffect::CancelCountdown { ticket } => self.cancel(ticket),
                _ => {}
            }
        }
    }

    /// Number of timers still running.
    #[must_use]
    pub fn armed(&self) -> usize {
        self.timers.values().filter(|handle| !handle.is_finished()).count()
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    fn start(&mut self, ticket: CountdownTicket, secs: u32) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(secs))).await;
            debug!(%ticket, "countdown expired");
            // The receiver is gone once the quiz was abandoned.
            let _ = tx.send(QuizEvent::CountdownExpired { ticket }).await;
        });
        if let Some(previous) = self.timers.insert(ticket, handle) {
            previous.abort();
        }
    }

    fn cancel(&mut self, ticket: CountdownTicket) {
        if let Some(handle) = self.timers.remove(&ticket) {
            handle.abort();
        }
    }
}

impl Drop for CountdownDriver {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
