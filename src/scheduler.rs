//! C8: the periodic timer driving HELLO emission, route-table aging, and
//! upstream-link probing (spec §4.10).

/// Which periodic actions are due on this call to [`TickScheduler::due`].
///
/// Reassociation retries are not reported here: whether one is due depends
/// on the upstream-link sample this same tick takes (see
/// [`TickScheduler::observe_upstream`]), which happens after `due()`
/// returns — so that decision is exposed separately via
/// [`TickScheduler::reassociate_due`], called once the sample is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickActions {
    pub hello: bool,
    pub route_cleanup: bool,
    /// Sample `is_up()` and react to an edge transition.
    pub upstream_probe_sample: bool,
}

const ROUTE_CLEANUP_INTERVAL_MS: u32 = 1_000;
const UPSTREAM_PROBE_INTERVAL_MS: u32 = 3_000;
const UPSTREAM_REASSOCIATE_INTERVAL_MS: u32 = 10_000;

/// Cooperative, poll-driven timer. [`Self::due`] is called once per event
/// loop iteration with the current monotonic time and reports which
/// periodic actions have become due, advancing their respective
/// last-fired timestamps.
pub struct TickScheduler {
    hello_interval_ms: u32,
    last_hello_ms: u32,
    last_route_cleanup_ms: u32,
    last_upstream_probe_ms: u32,
    last_upstream_reassociate_ms: u32,
    /// Tracks whether the upstream link was up as of the last probe, so
    /// up/down edges can be detected (spec §4.10).
    upstream_was_up: bool,
}

impl TickScheduler {
    pub fn new(hello_interval_ms: u32) -> Self {
        Self {
            hello_interval_ms,
            last_hello_ms: 0,
            last_route_cleanup_ms: 0,
            last_upstream_probe_ms: 0,
            last_upstream_reassociate_ms: 0,
            upstream_was_up: false,
        }
    }

    pub fn due(&mut self, now_ms: u32) -> TickActions {
        let mut actions = TickActions::default();

        if now_ms.wrapping_sub(self.last_hello_ms) >= self.hello_interval_ms {
            actions.hello = true;
            self.last_hello_ms = now_ms;
        }

        if now_ms.wrapping_sub(self.last_route_cleanup_ms) >= ROUTE_CLEANUP_INTERVAL_MS {
            actions.route_cleanup = true;
            self.last_route_cleanup_ms = now_ms;
        }

        if now_ms.wrapping_sub(self.last_upstream_probe_ms) >= UPSTREAM_PROBE_INTERVAL_MS {
            actions.upstream_probe_sample = true;
            self.last_upstream_probe_ms = now_ms;
        }

        actions
    }

    /// Called by the driving loop with the freshly sampled upstream
    /// status whenever `due().upstream_probe_sample` was set. Returns the
    /// edge transition, if any, so the caller can open/close the UDP
    /// endpoint and attempt a time sync on up-edges.
    pub fn observe_upstream(&mut self, now_ms: u32, is_up: bool) -> Option<UpstreamEdge> {
        let edge = match (self.upstream_was_up, is_up) {
            (false, true) => Some(UpstreamEdge::Up),
            (true, false) => Some(UpstreamEdge::Down),
            _ => None,
        };
        self.upstream_was_up = is_up;
        if !is_up {
            // Only while the link stays down do we want reassociation
            // retries on their own cadence; reset the timer on every
            // down-sample so the first retry is a full interval away
            // from the down-edge, not from scheduler construction.
            if edge == Some(UpstreamEdge::Down) {
                self.last_upstream_reassociate_ms = now_ms;
            }
        }
        edge
    }

    /// `true` if a reassociation attempt is due. Only meaningful while
    /// upstream is down; the driving loop should not call this otherwise.
    pub fn reassociate_due(&mut self, now_ms: u32) -> bool {
        if self.upstream_was_up {
            return false;
        }
        if now_ms.wrapping_sub(self.last_upstream_reassociate_ms) >= UPSTREAM_REASSOCIATE_INTERVAL_MS
        {
            self.last_upstream_reassociate_ms = now_ms;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEdge {
    Up,
    Down,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_fires_on_interval() {
        let mut sched = TickScheduler::new(2_000);
        assert!(sched.due(0).hello);
        assert!(!sched.due(1_999).hello);
        assert!(sched.due(2_000).hello);
    }

    #[test]
    fn route_cleanup_fires_every_second() {
        let mut sched = TickScheduler::new(2_000);
        sched.due(0);
        assert!(sched.due(1_000).route_cleanup);
        assert!(!sched.due(1_500).route_cleanup);
    }

    #[test]
    fn detects_up_and_down_edges() {
        let mut sched = TickScheduler::new(2_000);
        assert_eq!(sched.observe_upstream(0, true), Some(UpstreamEdge::Up));
        assert_eq!(sched.observe_upstream(100, true), None);
        assert_eq!(sched.observe_upstream(200, false), Some(UpstreamEdge::Down));
    }

    #[test]
    fn reassociate_retries_every_10s_while_down() {
        let mut sched = TickScheduler::new(2_000);
        sched.observe_upstream(0, false);
        assert!(!sched.reassociate_due(5_000));
        assert!(sched.reassociate_due(10_000));
        assert!(!sched.reassociate_due(15_000));
        assert!(sched.reassociate_due(20_000));
    }

    #[test]
    fn reassociate_never_due_while_up() {
        let mut sched = TickScheduler::new(2_000);
        sched.observe_upstream(0, true);
        assert!(!sched.reassociate_due(999_999));
    }
}
