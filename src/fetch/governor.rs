//! Adaptive concurrency governor.
//!
//! Admission to the network is gated by a semaphore whose ceiling moves at
//! runtime. Every completed fetch reports an [`Outcome`]; the governor keeps
//! a rolling window of the most recent outcomes and applies an
//! additive-increase / multiplicative-decrease rule:
//!
//! - transient-error rate above [`HIGH_WATER`] halves the ceiling (never
//!   below the configured minimum)
//! - transient-error rate below [`LOW_WATER`] over a full window raises the
//!   ceiling by two (never above the configured maximum)
//!
//! The window is cleared after each adjustment so the next decision is made
//! on fresh evidence. Waiters are admitted in FIFO order (tokio semaphore
//! fairness), so no acquirer starves while the ceiling is positive.
//!
//! Tokio semaphores cannot revoke outstanding permits, so shrinking works by
//! forgetting idle permits immediately and absorbing the remainder as a
//! deficit that swallows future releases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tracing::debug;

/// Number of completed fetches considered when adjusting the ceiling.
pub const OUTCOME_WINDOW: usize = 20;

/// Transient-error rate above which the ceiling is halved.
pub const HIGH_WATER: f64 = 0.20;

/// Transient-error rate below which the ceiling grows.
pub const LOW_WATER: f64 = 0.05;

/// Additive step applied when the window looks healthy.
const INCREASE_STEP: usize = 2;

/// How a governed fetch finished, from the governor's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The fetch succeeded.
    Success,
    /// Timeout, network failure, 5xx, or rate limiting: the kind of failure
    /// that backing off can help.
    TransientError,
    /// A definitive server answer (404 and friends). The server is healthy;
    /// this does not count against the window.
    FatalError,
}

/// Ceiling bounds for a governor.
#[derive(Debug, Clone, Copy)]
pub struct GovernorLimits {
    pub initial: usize,
    pub min: usize,
    pub max: usize,
}

struct AdaptState {
    ceiling: usize,
    /// Permits owed to the semaphore after a shrink; releases are swallowed
    /// until this reaches zero.
    deficit: usize,
    /// Ring buffer of recent outcomes; `true` marks a transient error.
    window: [bool; OUTCOME_WINDOW],
    next: usize,
    filled: usize,
}

type CeilingListener = Box<dyn Fn(usize) + Send + Sync>;

struct Inner {
    semaphore: Arc<Semaphore>,
    state: Mutex<AdaptState>,
    limits: GovernorLimits,
    ceiling_hint: AtomicUsize,
    listener: Mutex<Option<CeilingListener>>,
}

/// Semaphore-gated admission control with an adaptive ceiling.
///
/// Cheap to clone; clones share the same ceiling and window.
#[derive(Clone)]
pub struct ConcurrencyGovernor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConcurrencyGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGovernor")
            .field("ceiling", &self.current_ceiling())
            .field("limits", &self.inner.limits)
            .finish_non_exhaustive()
    }
}

impl ConcurrencyGovernor {
    /// Creates a governor with its ceiling at `limits.initial`, clamped into
    /// `[limits.min, limits.max]`.
    #[must_use]
    pub fn new(limits: GovernorLimits) -> Self {
        let ceiling = limits.initial.clamp(limits.min, limits.max);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(ceiling)),
                state: Mutex::new(AdaptState {
                    ceiling,
                    deficit: 0,
                    window: [false; OUTCOME_WINDOW],
                    next: 0,
                    filled: 0,
                }),
                limits,
                ceiling_hint: AtomicUsize::new(ceiling),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Registers a callback invoked with the new ceiling after every
    /// adjustment, outside the governor's internal lock. Replaces any
    /// previously registered listener.
    pub fn set_ceiling_listener<F>(&self, listener: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        #[allow(clippy::expect_used)] // listener mutex cannot be poisoned
        let mut slot = self.inner.listener.lock().expect("governor listener lock");
        *slot = Some(Box::new(listener));
    }

    /// Waits for an admission slot.
    ///
    /// Returns `None` once the governor has been [`close`](Self::close)d;
    /// pending waiters are woken promptly at that point. Admission is FIFO.
    pub async fn acquire(&self) -> Option<GovernorPermit> {
        match Arc::clone(&self.inner.semaphore).acquire_owned().await {
            Ok(permit) => {
                // Ownership of the slot moves to the GovernorPermit; the
                // deficit accounting in `complete` decides whether the slot
                // ever goes back.
                permit.forget();
                Some(GovernorPermit {
                    inner: Arc::clone(&self.inner),
                    completed: false,
                })
            }
            Err(_) => None,
        }
    }

    /// Closes the governor: pending and future acquires return `None`.
    ///
    /// Outstanding permits stay valid; releasing them after close is a no-op
    /// beyond bookkeeping.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// Current admission ceiling.
    #[must_use]
    pub fn current_ceiling(&self) -> usize {
        self.inner.ceiling_hint.load(Ordering::SeqCst)
    }

    /// Slots currently available for admission.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.inner.semaphore.available_permits()
    }
}

impl Inner {
    fn complete(&self, outcome: Option<Outcome>) {
        let adjusted = {
            #[allow(clippy::expect_used)] // state mutex cannot be poisoned: no panics while held
            let mut st = self.state.lock().expect("governor state lock");

            let mut adjusted = None;
            if let Some(outcome) = outcome {
                let next = st.next;
                st.window[next] = matches!(outcome, Outcome::TransientError);
                st.next = (st.next + 1) % OUTCOME_WINDOW;
                st.filled = (st.filled + 1).min(OUTCOME_WINDOW);

                if st.filled == OUTCOME_WINDOW {
                    adjusted = self.evaluate_window(&mut st);
                }
            }

            // Return the slot, or let it pay down a shrink deficit.
            if st.deficit > 0 {
                st.deficit -= 1;
            } else {
                self.semaphore.add_permits(1);
            }
            adjusted
        };

        if let Some(ceiling) = adjusted {
            #[allow(clippy::expect_used)] // listener mutex cannot be poisoned
            let listener = self.listener.lock().expect("governor listener lock");
            if let Some(notify) = listener.as_deref() {
                notify(ceiling);
            }
        }
    }

    /// Returns the new ceiling when this evaluation changed it.
    #[allow(clippy::cast_precision_loss)] // window length is tiny
    fn evaluate_window(&self, st: &mut AdaptState) -> Option<usize> {
        let transient = st.window.iter().filter(|&&t| t).count();
        let rate = transient as f64 / OUTCOME_WINDOW as f64;

        let target = if rate > HIGH_WATER {
            (st.ceiling / 2).max(self.limits.min)
        } else if rate < LOW_WATER {
            (st.ceiling + INCREASE_STEP).min(self.limits.max)
        } else {
            return None;
        };

        let adjusted = if target == st.ceiling {
            None
        } else {
            debug!(
                from = st.ceiling,
                to = target,
                transient_rate = rate,
                "adjusting concurrency ceiling"
            );
            self.apply_ceiling(st, target);
            Some(target)
        };

        // Fresh evidence for the next decision.
        st.window = [false; OUTCOME_WINDOW];
        st.next = 0;
        st.filled = 0;
        adjusted
    }

    fn apply_ceiling(&self, st: &mut AdaptState, target: usize) {
        if target > st.ceiling {
            self.semaphore.add_permits(target - st.ceiling);
        } else {
            // Forget idle slots right away; slots that are out on loan are
            // absorbed as releases come back.
            let mut to_remove = st.ceiling - target;
            while to_remove > 0 {
                match self.semaphore.try_acquire() {
                    Ok(permit) => {
                        permit.forget();
                        to_remove -= 1;
                    }
                    Err(_) => break,
                }
            }
            st.deficit += to_remove;
        }
        st.ceiling = target;
        self.ceiling_hint.store(target, Ordering::SeqCst);
    }
}

/// An admission slot held by one in-flight fetch.
///
/// Call [`release`](Self::release) with the fetch outcome so the window
/// learns from it. Dropping the permit without releasing (task cancelled)
/// returns the slot without recording an outcome.
#[must_use = "holding a permit blocks an admission slot"]
pub struct GovernorPermit {
    inner: Arc<Inner>,
    completed: bool,
}

impl GovernorPermit {
    /// Returns the slot and records the fetch outcome in the window.
    pub fn release(mut self, outcome: Outcome) {
        self.completed = true;
        self.inner.complete(Some(outcome));
    }
}

impl Drop for GovernorPermit {
    fn drop(&mut self) {
        if !self.completed {
            self.inner.complete(None);
        }
    }
}

impl std::fmt::Debug for GovernorPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorPermit").finish_non_exhaustive()
    }
}
