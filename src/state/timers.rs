//! Cancellable single-shot timers, at most one armed per purpose.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::{AbortHandle, BoxFuture, abortable};
use tokio::time::sleep;

/// What a timer is for. Re-arming a purpose replaces the previous timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Pre-game countdown before the first question.
    Countdown,
    /// Auto-advance from the reading phase to the question.
    ReadingAdvance,
    /// Window during which a disconnected host may come back.
    HostGrace,
}

impl TimerPurpose {
    /// Name used in logs and observability events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Countdown => "countdown",
            Self::ReadingAdvance => "reading_advance",
            Self::HostGrace => "host_grace",
        }
    }
}

impl fmt::Display for TimerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    purpose: TimerPurpose,
    seq: u64,
}

impl TimerToken {
    pub(crate) fn new(purpose: TimerPurpose, seq: u64) -> Self {
        Self { purpose, seq }
    }

    /// Purpose the timer was armed for.
    pub fn purpose(&self) -> TimerPurpose {
        self.purpose
    }
}

struct Armed {
    token: TimerToken,
    abort: AbortHandle,
}

/// Schedules deferred callbacks on the Tokio runtime.
///
/// A cancelled timer never invokes its callback. Callbacks still receive their token so the
/// receiver can reject one that fired after its owner moved on.
pub struct TimerSupervisor {
    armed: Arc<DashMap<TimerPurpose, Armed>>,
    next_seq: AtomicU64,
}

impl TimerSupervisor {
    /// Create a supervisor with nothing armed.
    pub fn new() -> Self {
        Self {
            armed: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Run `callback` once `after` has elapsed, replacing any timer armed for `purpose`.
    pub fn arm<F>(&self, purpose: TimerPurpose, after: Duration, callback: F) -> TimerToken
    where
        F: FnOnce(TimerToken) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let token = TimerToken::new(purpose, self.next_seq.fetch_add(1, Ordering::Relaxed));
        let armed = Arc::clone(&self.armed);
        let (task, abort) = abortable(async move {
            sleep(after).await;
            armed.remove_if(&purpose, |_, entry| entry.token == token);
            callback(token).await;
        });

        if let Some(previous) = self.armed.insert(purpose, Armed { token, abort }) {
            previous.abort.abort();
        }
        tokio::spawn(task);
        token
    }

    /// Cancel the timer identified by `token`. Returns `false` when it already fired,
    /// was cancelled, or was replaced.
    pub fn cancel(&self, token: TimerToken) -> bool {
        self.armed
            .remove_if(&token.purpose, |_, entry| entry.token == token)
            .map(|(_, entry)| entry.abort.abort())
            .is_some()
    }

    /// Cancel every armed timer.
    pub fn cancel_all(&self) {
        self.armed.retain(|_, entry| {
            entry.abort.abort();
            false
        });
    }

    /// Whether `token` is still waiting to fire.
    #[cfg(test)]
    fn is_armed(&self, token: TimerToken) -> bool {
        self.armed
            .get(&token.purpose)
            .is_some_and(|entry| entry.token == token)
    }
}

impl Default for TimerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerSupervisor {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
