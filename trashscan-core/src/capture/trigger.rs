use std::time::{Duration, Instant};

/// Fires a new session at a fixed interval while no session is active.
///
/// The first poll fires immediately. Later polls fire once `interval` has
/// elapsed since the previous trigger *and* the sequencer is idle, so two
/// triggers are never closer than `interval`.
#[derive(Clone, Debug)]
pub struct AutoTrigger {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl AutoTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Returns true (and records `now`) when a new session should start.
    pub fn poll(&mut self, now: Instant, session_active: bool) -> bool {
        if session_active {
            return false;
        }

        let due = match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if due {
            self.last_fired = Some(now);
        }
        due
    }

    /// Record an externally triggered session so the interval restarts.
    pub fn note_manual_trigger(&mut self, now: Instant) {
        self.last_fired = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_immediately_then_on_interval() {
        let start = Instant::now();
        let mut trigger = AutoTrigger::new(Duration::from_secs(45));

        assert!(trigger.poll(start, false));
        assert!(!trigger.poll(start + Duration::from_secs(30), false));
        assert!(!trigger.poll(start + Duration::from_millis(44_999), false));
        assert!(trigger.poll(start + Duration::from_secs(45), false));
    }

    #[test]
    fn never_fires_while_session_active() {
        let start = Instant::now();
        let mut trigger = AutoTrigger::new(Duration::from_secs(10));
        assert!(trigger.poll(start, false));
        assert!(!trigger.poll(start + Duration::from_secs(60), true));
        // Fires as soon as the session ends, interval long passed.
        assert!(trigger.poll(start + Duration::from_secs(61), false));
        assert_eq!(trigger.last_fired(), Some(start + Duration::from_secs(61)));
    }

    #[test]
    fn manual_trigger_restarts_interval() {
        let start = Instant::now();
        let mut trigger = AutoTrigger::new(Duration::from_secs(45));
        trigger.note_manual_trigger(start);
        assert!(!trigger.poll(start + Duration::from_secs(44), false));
        assert!(trigger.poll(start + Duration::from_secs(45), false));
    }
}
