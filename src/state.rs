use std::collections::HashSet;

/// Size above which the seen set is wiped.
pub const DEFAULT_SEEN_CAP: usize = 1000;

/// Identifiers of sale events that already produced an alert.
///
/// Growth is bounded by clearing the whole set once it holds more than `cap`
/// entries. There is no incremental eviction, so an event still visible in the
/// feed right after a clear will be alerted again.
#[derive(Debug)]
pub struct SeenSet {
    ids: HashSet<String>,
    cap: usize,
}

impl SeenSet {
    pub fn new(cap: usize) -> Self {
        Self {
            ids: HashSet::new(),
            cap,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    /// Clear the set if it grew past the cap. Returns `true` when it was cleared.
    pub fn enforce_cap(&mut self) -> bool {
        if self.ids.len() > self.cap {
            self.ids.clear();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAP)
    }
}
