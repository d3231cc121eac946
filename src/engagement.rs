//! Optimistic like/follow state. A toggle flips locally the moment the
//! user acts, then either confirms when the backend write lands or rolls
//! back to the last settled value when it fails.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Settled,
    Pending { previous: bool, previous_count: i64 },
}

#[derive(Debug, Clone, Copy)]
pub struct Toggle {
    active: bool,
    count: i64,
    phase: Phase,
    deferred: Option<(bool, i64)>,
}

impl Toggle {
    pub fn new(active: bool, count: i64) -> Self {
        Self {
            active,
            count,
            phase: Phase::Settled,
            deferred: None,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.phase, Phase::Pending { .. })
    }

    /// Flip optimistically and return the state the backend should be
    /// moved to. Returns None while an earlier flip is still unresolved;
    /// only one transition may be in flight per toggle.
    pub fn request(&mut self) -> Option<bool> {
        if self.is_pending() {
            return None;
        }
        self.phase = Phase::Pending {
            previous: self.active,
            previous_count: self.count,
        };
        self.active = !self.active;
        self.count += if self.active { 1 } else { -1 };
        Some(self.active)
    }

    /// The backend accepted the write; the optimistic state becomes the
    /// settled one. A sync that arrived mid-flight carries a count from
    /// before the write landed, so the confirmed flip is folded into it.
    pub fn confirm(&mut self) {
        self.phase = Phase::Settled;
        if let Some((fetched_active, fetched_count)) = self.deferred.take() {
            self.count = if fetched_active != self.active {
                (fetched_count + if self.active { 1 } else { -1 }).max(0)
            } else {
                fetched_count
            };
        }
    }

    /// The backend rejected the write; restore the last settled state, or
    /// the fetched truth if one arrived mid-flight.
    pub fn rollback(&mut self) {
        if let Phase::Pending {
            previous,
            previous_count,
        } = self.phase
        {
            self.active = previous;
            self.count = previous_count;
            self.phase = Phase::Settled;
            if let Some((active, count)) = self.deferred.take() {
                self.active = active;
                self.count = count;
            }
        }
    }

    /// Replace with freshly fetched values. While a flip is in flight the
    /// values are held back and applied when the flip settles.
    pub fn sync(&mut self, active: bool, count: i64) {
        if self.is_pending() {
            self.deferred = Some((active, count));
            return;
        }
        self.active = active;
        self.count = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_flips_state_and_count() {
        let mut toggle = Toggle::new(false, 4);
        assert_eq!(toggle.request(), Some(true));
        assert!(toggle.active());
        assert_eq!(toggle.count(), 5);
        toggle.confirm();
        assert!(!toggle.is_pending());

        assert_eq!(toggle.request(), Some(false));
        assert_eq!(toggle.count(), 4);
    }

    #[test]
    fn rollback_restores_settled_state() {
        let mut toggle = Toggle::new(true, 7);
        assert_eq!(toggle.request(), Some(false));
        assert_eq!(toggle.count(), 6);
        toggle.rollback();
        assert!(toggle.active());
        assert_eq!(toggle.count(), 7);
        assert!(!toggle.is_pending());
    }

    #[test]
    fn only_one_flip_in_flight() {
        let mut toggle = Toggle::new(false, 0);
        assert_eq!(toggle.request(), Some(true));
        assert_eq!(toggle.request(), None);
        toggle.confirm();
        assert_eq!(toggle.request(), Some(false));
    }

    #[test]
    fn sync_applies_directly_when_settled() {
        let mut toggle = Toggle::new(false, 2);
        toggle.sync(true, 99);
        assert_eq!(toggle.count(), 99);
        assert!(toggle.active());
    }

    #[test]
    fn sync_during_a_flip_lands_when_it_settles() {
        // Like before the fetched state arrives: the toggle starts at the
        // zero placeholder.
        let mut toggle = Toggle::new(false, 0);
        assert_eq!(toggle.request(), Some(true));
        toggle.sync(false, 42);
        assert_eq!(toggle.count(), 1, "optimistic value holds while pending");

        toggle.confirm();
        assert!(toggle.active());
        assert_eq!(toggle.count(), 43, "fetched count plus the confirmed like");
    }

    #[test]
    fn sync_during_a_failed_flip_applies_as_fetched() {
        let mut toggle = Toggle::new(false, 0);
        toggle.request();
        toggle.sync(false, 42);
        toggle.rollback();
        assert!(!toggle.active());
        assert_eq!(toggle.count(), 42);
    }

    #[test]
    fn sync_matching_the_flip_is_taken_verbatim() {
        // The fetch raced the write and already saw it land.
        let mut toggle = Toggle::new(false, 0);
        toggle.request();
        toggle.sync(true, 43);
        toggle.confirm();
        assert!(toggle.active());
        assert_eq!(toggle.count(), 43);
    }
}
