//! Per-session round timer posting ticks and deferred closes into the owning actor's mailbox.
//!
//! A timer runs at most one task at a time: every `start_*` call cancels the previous
//! task first, so a session can never have two concurrent countdowns. Commands are
//! built by caller-supplied closures, which capture the session epoch so the actor can
//! drop callbacks that outlived their round.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until},
};
use tracing::trace;

/// Interval between two remaining-time ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Cancelable timer bound to one session mailbox.
pub struct RoundTimer<C: Send + 'static> {
    mailbox: mpsc::UnboundedSender<C>,
    task: Option<JoinHandle<()>>,
}

impl<C: Send + 'static> RoundTimer<C> {
    /// Create an idle timer posting into `mailbox`.
    pub fn new(mailbox: mpsc::UnboundedSender<C>) -> Self {
        Self {
            mailbox,
            task: None,
        }
    }

    /// Start a round: one tick per second carrying the remaining whole seconds, then a
    /// single close at `duration + grace`.
    ///
    /// Remaining time keeps decreasing during the grace period and may turn negative;
    /// only the close command ends the round.
    pub fn start_round<T, F>(&mut self, duration: Duration, grace: Duration, tick: T, close: F)
    where
        T: Fn(i64) -> C + Send + 'static,
        F: FnOnce() -> C + Send + 'static,
    {
        self.cancel();
        let mailbox = self.mailbox.clone();
        let total_secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);

        self.task = Some(tokio::spawn(async move {
            let start = Instant::now();
            let deadline = start + duration + grace;

            let ticks_mailbox = mailbox.clone();
            let ticking = async move {
                let mut ticks = interval_at(start + TICK_INTERVAL, TICK_INTERVAL);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut remaining = total_secs;
                loop {
                    ticks.tick().await;
                    remaining -= 1;
                    if ticks_mailbox.send(tick(remaining)).is_err() {
                        return;
                    }
                }
            };

            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    trace!("round timer elapsed");
                    let _ = mailbox.send(close());
                }
                _ = ticking => {}
            }
        }));
    }

    /// Post `command` once after `delay`, replacing any running task.
    pub fn schedule(&mut self, delay: Duration, command: C) {
        self.cancel();
        let mailbox = self.mailbox.clone();
        self.task = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = mailbox.send(command);
        }));
    }

    /// Stop ticks and the pending close. Safe to call when nothing is running.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<C: Send + 'static> Drop for RoundTimer<C> {
    fn drop(&mut self) {
        self.cancel();
    }
}
