use indexmap::IndexSet;

/// Size past which [`SeenSet::prune`] kicks in.
pub const SEEN_CAPACITY: usize = 10_000;

/// Entries kept after a prune.
pub const SEEN_RETAIN: usize = 5_000;

/// Ids already emitted by the fetcher, oldest first.
#[derive(Debug)]
pub struct SeenSet {
    ids: IndexSet<String>,
    capacity: usize,
    retain: usize,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::with_limits(SEEN_CAPACITY, SEEN_RETAIN)
    }

    pub fn with_limits(capacity: usize, retain: usize) -> Self {
        Self {
            ids: IndexSet::new(),
            capacity,
            retain: retain.min(capacity),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Once over capacity, forget all but the most recent `retain` ids.
    /// Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        if self.ids.len() <= self.capacity {
            return 0;
        }
        let excess = self.ids.len() - self.retain;
        self.ids.drain(..excess);
        excess
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}
