/// Bounded circular queue that drops the oldest entries on overflow.
///
/// Not synchronized; the sink wraps it in a `parking_lot::Mutex` and keeps
/// each critical section to a push or a bulk drain.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Push one entry. Returns the entry evicted to make room, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.available == self.capacity {
            let oldest = self.slots[self.read_index].take();
            self.read_index = (self.read_index + 1) % self.capacity;
            self.available -= 1;
            oldest
        } else {
            None
        };

        self.slots[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity;
        self.available += 1;
        evicted
    }

    /// Remove and return the oldest entry.
    pub fn pop(&mut self) -> Option<T> {
        if self.available == 0 {
            return None;
        }
        let item = self.slots[self.read_index].take();
        self.read_index = (self.read_index + 1) % self.capacity;
        self.available -= 1;
        item
    }

    /// Remove up to `count` entries, oldest first.
    pub fn drain(&mut self, count: usize) -> Vec<T> {
        let to_read = count.min(self.available);
        let mut result = Vec::with_capacity(to_read);
        for _ in 0..to_read {
            if let Some(item) = self.pop() {
                result.push(item);
            }
        }
        result
    }

    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
