//! Timer collaborator.
//!
//! [`TimerService`] supplies timestamps and wake-ups for deadline quotes.
//! [`ManualTimer`] is advanced explicitly (tests, replay); [`SystemTimer`]
//! follows the wall clock in whole seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::models::Timestamp;

/// Source of time for the registry.
pub trait TimerService: Send + Sync {
    /// Current time. Never decreases between calls.
    fn current_timestamp(&self) -> Timestamp;

    /// Completes once the timer reaches `deadline`.
    fn wake_at(&self, deadline: Timestamp) -> BoxFuture<'static, ()>;
}

/// A timer that only moves when told to.
pub struct ManualTimer {
    now: watch::Sender<u64>,
}

impl ManualTimer {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        let (now, _) = watch::channel(start.abs_value);
        Self { now }
    }

    /// Moves the clock to `to`. Moving backwards is ignored.
    pub fn advance_to(&self, to: Timestamp) {
        self.now.send_if_modified(|now| {
            if to.abs_value > *now {
                *now = to.abs_value;
                true
            } else {
                false
            }
        });
    }

    /// Moves the clock forward by `seconds`.
    pub fn tick(&self, seconds: u64) {
        let to = self.now.borrow().saturating_add(seconds);
        self.advance_to(Timestamp::new(to));
    }
}

impl TimerService for ManualTimer {
    fn current_timestamp(&self) -> Timestamp {
        Timestamp::new(*self.now.borrow())
    }

    fn wake_at(&self, deadline: Timestamp) -> BoxFuture<'static, ()> {
        let mut rx = self.now.subscribe();
        async move {
            let reached = rx.wait_for(|now| *now >= deadline.abs_value).await.is_ok();
            if !reached {
                // Timer dropped: the deadline can never be reached.
                futures_util::future::pending::<()>().await;
            }
        }
        .boxed()
    }
}

/// Wall-clock timer with one-second resolution.
#[derive(Default)]
pub struct SystemTimer {
    last: AtomicU64,
}

impl SystemTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimerService for SystemTimer {
    fn current_timestamp(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        // Clamp so a clock stepping backwards cannot reorder history.
        let prev = self.last.fetch_max(wall, Ordering::Relaxed);
        Timestamp::new(prev.max(wall))
    }

    fn wake_at(&self, deadline: Timestamp) -> BoxFuture<'static, ()> {
        let remaining = deadline
            .abs_value
            .saturating_sub(self.current_timestamp().abs_value);
        tokio::time::sleep(Duration::from_secs(remaining)).boxed()
    }
}
