//! Rate-limited scheduler serializing remote calls per resource key.
//!
//! Admission rules, checked on every submission, completion and timer tick:
//! - at most one unit in flight per [`RateToken`]; same-key units start in
//!   submission order,
//! - at most `max_in_flight` units in flight overall,
//! - optionally at most `max_starts` unit starts within the trailing window.
//!
//! The pending queue is scanned front to back and the first admissible entry is
//! started, so ties break by submission order. A unit's output (including its
//! error) goes back to its own submitter only.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Completions older than this are dropped from the throughput history.
const THROUGHPUT_HORIZON: Duration = Duration::from_secs(300);

/// Opaque resource key; in practice a destination document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateToken(String);

impl RateToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RateToken {
    fn from(key: &str) -> Self {
        RateToken(key.to_string())
    }
}

impl From<String> for RateToken {
    fn from(key: String) -> Self {
        RateToken(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub max_starts: usize,
    pub window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_window")]
    pub window: Option<WindowLimit>,
}

fn default_max_in_flight() -> usize {
    3
}

fn default_window() -> Option<WindowLimit> {
    Some(WindowLimit {
        max_starts: 30,
        window_ms: 10_000,
    })
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            window: default_window(),
        }
    }
}

struct Ticket {
    id: u64,
    key: RateToken,
    admit: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    active: HashSet<RateToken>,
    pending: VecDeque<Ticket>,
    starts: VecDeque<Instant>,
    completions: VecDeque<Instant>,
    timer_armed: bool,
    next_id: u64,
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
}

/// Cloneable handle; all clones share one queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            max_in_flight: config.max_in_flight.max(1),
            window: config.window.filter(|w| w.max_starts > 0),
        };
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Runs `work` once admitted for `key` and returns its output.
    pub async fn submit<K, F, T>(&self, key: K, work: F) -> T
    where
        K: Into<RateToken>,
        F: Future<Output = T>,
    {
        let key = key.into();
        let (admit, receiver) = oneshot::channel();
        let id = {
            let mut state = self.inner.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back(Ticket {
                id,
                key: key.clone(),
                admit,
            });
            trace!(key = key.as_str(), pending = state.pending.len(), "Unit queued");
            id
        };
        let mut admission = Admission {
            inner: Arc::clone(&self.inner),
            key,
            id,
            admitted: false,
            receiver,
        };
        Inner::dispatch(&self.inner);

        // The queue only ever drops a sender by sending on it.
        let _ = (&mut admission.receiver).await;
        admission.admitted = true;
        work.await
    }

    /// Completed units per second over the trailing `period`.
    pub fn throughput(&self, period: Duration) -> f64 {
        if period.is_zero() {
            return 0.0;
        }
        let now = Instant::now();
        let state = self.inner.lock();
        let recent = state
            .completions
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= period)
            .count();
        recent as f64 / period.as_secs_f64()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the queue consistent; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(this: &Arc<Inner>) {
        let mut state = this.lock();
        let now = Instant::now();

        if let Some(window) = &this.config.window {
            let span = Duration::from_millis(window.window_ms);
            while let Some(oldest) = state.starts.front() {
                if now.saturating_duration_since(*oldest) >= span {
                    state.starts.pop_front();
                } else {
                    break;
                }
            }
        }

        loop {
            if state.active.len() >= this.config.max_in_flight {
                return;
            }

            if let Some(window) = &this.config.window {
                if state.starts.len() >= window.max_starts {
                    let span = Duration::from_millis(window.window_ms);
                    let wake_at = state.starts.front().map(|oldest| *oldest + span);
                    if let Some(wake_at) = wake_at {
                        Inner::arm_timer(this, &mut state, wake_at);
                    }
                    return;
                }
            }

            let Some(index) = state
                .pending
                .iter()
                .position(|ticket| !state.active.contains(&ticket.key))
            else {
                return;
            };
            let Some(ticket) = state.pending.remove(index) else {
                return;
            };

            state.active.insert(ticket.key.clone());
            state.starts.push_back(now);
            if ticket.admit.send(()).is_err() {
                // Submitter went away before admission.
                state.active.remove(&ticket.key);
                state.starts.pop_back();
                continue;
            }
            debug!(
                key = ticket.key.as_str(),
                in_flight = state.active.len(),
                pending = state.pending.len(),
                "Unit admitted"
            );
        }
    }

    fn arm_timer(this: &Arc<Inner>, state: &mut State, wake_at: Instant) {
        if state.timer_armed || state.pending.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        state.timer_armed = true;
        let inner = Arc::clone(this);
        handle.spawn(async move {
            tokio::time::sleep_until(wake_at).await;
            inner.lock().timer_armed = false;
            Inner::dispatch(&inner);
        });
    }

    fn complete(this: &Arc<Inner>, key: &RateToken) {
        {
            let mut state = this.lock();
            state.active.remove(key);
            let now = Instant::now();
            state.completions.push_back(now);
            while let Some(oldest) = state.completions.front() {
                if now.saturating_duration_since(*oldest) > THROUGHPUT_HORIZON {
                    state.completions.pop_front();
                } else {
                    break;
                }
            }
        }
        Inner::dispatch(this);
    }
}

/// Frees the unit's key when the unit finishes, or withdraws the ticket when
/// the submitter is dropped while still queued.
struct Admission {
    inner: Arc<Inner>,
    key: RateToken,
    id: u64,
    admitted: bool,
    receiver: oneshot::Receiver<()>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.admitted {
            let mut state = self.inner.lock();
            if let Some(index) = state.pending.iter().position(|t| t.id == self.id) {
                state.pending.remove(index);
                return;
            }
            // Admitted between the last poll and the drop.
        }
        Inner::complete(&self.inner, &self.key);
    }
}
