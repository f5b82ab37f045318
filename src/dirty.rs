/// Remembers the serialized form of the last successful write and compares
/// whole values against it. Mutators never flip a flag here, so nothing
/// outside the save path can get it out of sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyTracker {
    snapshot: String,
}

impl DirtyTracker {
    pub fn new(snapshot: impl Into<String>) -> Self {
        Self {
            snapshot: snapshot.into(),
        }
    }

    pub fn is_dirty(&self, serialized: &str) -> bool {
        self.snapshot != serialized
    }

    pub fn mark_persisted(&mut self, serialized: String) {
        self.snapshot = serialized;
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_follows_snapshot() {
        let mut tracker = DirtyTracker::new("S0");
        assert!(!tracker.is_dirty("S0"));
        assert!(tracker.is_dirty("S1"));

        tracker.mark_persisted("S1".to_string());
        assert!(!tracker.is_dirty("S1"));
        // reverting to the old value is a change again
        assert!(tracker.is_dirty("S0"));
        assert_eq!(tracker.snapshot(), "S1");
    }
}
