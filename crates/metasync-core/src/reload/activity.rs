//! In-flight request accounting and the maintenance flag.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::config::QuiescencePolicy;

/// Returned to requests arriving while a structural change runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the application is being restructured; try again later")]
pub struct Unavailable;

#[derive(Debug, Default)]
struct ActivityState {
    active: usize,
    maintenance: bool,
}

/// Counts in-flight requests and blocks new ones during maintenance.
///
/// Draining is cooperative: requests already running finish normally and
/// signal the waiting maintainer when they leave.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    state: Mutex<ActivityState>,
    left: Condvar,
}

/// How the wait for in-flight requests ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiescenceOutcome {
    /// The active count dropped to the idle threshold.
    Idle { waited: Duration },
    /// The wait budget ran out.
    TimedOut { active: usize, waited: Duration },
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight request.
    pub fn enter(&self) -> Result<RequestGuard<'_>, Unavailable> {
        let mut state = self.state.lock();
        if state.maintenance {
            return Err(Unavailable);
        }
        state.active += 1;
        Ok(RequestGuard { tracker: self })
    }

    /// Number of in-flight requests.
    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    pub fn under_maintenance(&self) -> bool {
        self.state.lock().maintenance
    }

    /// Raise the maintenance flag. Returns `None` if it is already raised.
    pub fn begin_maintenance(&self) -> Option<MaintenanceGuard<'_>> {
        let mut state = self.state.lock();
        if state.maintenance {
            return None;
        }
        state.maintenance = true;
        Some(MaintenanceGuard { tracker: self })
    }

    /// Raise the maintenance flag and wait for in-flight requests to drain.
    pub fn quiesce(&self, policy: &QuiescencePolicy) -> Option<(MaintenanceGuard<'_>, QuiescenceOutcome)> {
        let guard = self.begin_maintenance()?;
        let outcome = guard.wait_idle(policy);
        Some((guard, outcome))
    }

    fn leave(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.left.notify_all();
    }

    fn wait_idle(&self, policy: &QuiescencePolicy) -> QuiescenceOutcome {
        let started = Instant::now();
        let deadline = started + policy.max_wait;
        let mut state = self.state.lock();
        while state.active > policy.idle_threshold {
            if self.left.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let waited = started.elapsed();
        if state.active > policy.idle_threshold {
            QuiescenceOutcome::TimedOut {
                active: state.active,
                waited,
            }
        } else {
            QuiescenceOutcome::Idle { waited }
        }
    }
}

/// Marks one in-flight request; leaving scope ends it.
#[must_use]
#[derive(Debug)]
pub struct RequestGuard<'a> {
    tracker: &'a ActivityTracker,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.tracker.leave();
    }
}

/// Holds the maintenance flag; dropping it lets requests in again.
#[must_use]
#[derive(Debug)]
pub struct MaintenanceGuard<'a> {
    tracker: &'a ActivityTracker,
}

impl MaintenanceGuard<'_> {
    /// Wait until in-flight requests drain to the policy's idle threshold
    /// or the wait budget runs out.
    pub fn wait_idle(&self, policy: &QuiescencePolicy) -> QuiescenceOutcome {
        self.tracker.wait_idle(policy)
    }
}

impl Drop for MaintenanceGuard<'_> {
    fn drop(&mut self) {
        self.tracker.state.lock().maintenance = false;
    }
}
