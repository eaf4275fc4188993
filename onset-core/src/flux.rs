//! Fixed-capacity history of spectral flux values.
//!
//! The ring is allocated once at construction. Appending overwrites the
//! oldest entry when full, so appends are O(1) and memory never grows
//! while the audio stream is running.

/// Insertion-ordered ring of flux values, oldest evicted first.
#[derive(Debug, Clone)]
pub struct FluxHistory {
    values: Box<[f32]>,
    /// Index of the oldest entry.
    head: usize,
    len: usize,
}

impl FluxHistory {
    /// Creates an empty history holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Creates a history that is already full of zeros.
    pub fn filled(capacity: usize) -> Self {
        Self {
            len: capacity,
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a value, evicting the oldest one if the ring is full.
    pub fn push(&mut self, value: f32) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        if self.len < capacity {
            self.values[(self.head + self.len) % capacity] = value;
            self.len += 1;
        } else {
            self.values[self.head] = value;
            self.head = (self.head + 1) % capacity;
        }
    }

    /// Value at `index`, where 0 is the oldest entry.
    pub fn get(&self, index: usize) -> Option<f32> {
        if index < self.len {
            Some(self.values[(self.head + index) % self.capacity()])
        } else {
            None
        }
    }

    /// Iterates from the oldest to the newest entry.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.len).map(move |i| self.values[(self.head + i) % self.values.len()])
    }

    /// Iterates over the newest `count` entries, oldest of them first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = f32> + '_ {
        self.iter().skip(self.len.saturating_sub(count))
    }

    /// Mean of the newest `count` entries, or 0 when the history is empty.
    pub fn recent_mean(&self, count: usize) -> f32 {
        let taken = count.min(self.len);
        if taken == 0 {
            return 0.0;
        }
        self.recent(count).sum::<f32>() / taken as f32
    }
}
