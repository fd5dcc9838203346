// per-key fifo queue.
//
// storage is a sparse map rather than a ring: `first` only ever grows, popped
// slots are removed outright so transferred values are released promptly, and
// a slot that was never written reads back as nil. queue lifetimes are bounded
// by channel lifetimes and positions are never exposed, so the index growing
// without wrapping is fine.

use crate::value::Value;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Result batch of a pop or peek
pub type Batch = SmallVec<[Value; 4]>;

/// Ordered backlog of values under one key of one channel
pub(crate) struct Fifo {
    // position of the oldest live element
    first: u64,
    // live elements occupy positions first .. first + count
    count: usize,
    // maximum accepted count. None = unbounded.
    limit: Option<usize>,
    slots: HashMap<u64, Value>,
}

impl Fifo {
    pub(crate) fn new() -> Self {
        Fifo { first: 0, count: 0, limit: None, slots: HashMap::new() }
    }

    /// Number of live elements
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Whether accepting `n` more elements would exceed the limit
    pub(crate) fn would_overflow(&self, n: usize) -> bool {
        self.limit.is_some_and(|limit| self.count + n > limit)
    }

    /// Set the limit. Existing elements are never evicted, even when the new
    /// limit is below the current count; only future pushes are constrained.
    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Append values contiguously at the back
    ///
    /// The call site checks `would_overflow` first; a batch is accepted or
    /// rejected as a whole, never partially stored.
    pub(crate) fn push(&mut self, values: impl IntoIterator<Item = Value>) {
        for value in values {
            self.slots.insert(self.first + self.count as u64, value);
            self.count += 1;
        }
    }

    /// Clone the first `k` elements without mutating
    ///
    /// Callers must check `count` first; peeking past the live range is a
    /// contract violation.
    pub(crate) fn peek(&self, k: usize) -> Batch {
        debug_assert!(k <= self.count, "peek past live range (caller contract)");
        (0..k)
            .map(|i| self.slots.get(&(self.first + i as u64)).cloned().unwrap_or(Value::Nil))
            .collect()
    }

    /// Remove and return the first `k` elements in order, clearing their slots
    ///
    /// Callers must check `count` first; popping past the live range is a
    /// contract violation.
    pub(crate) fn pop(&mut self, k: usize) -> Batch {
        debug_assert!(k <= self.count, "pop past live range (caller contract)");
        let out = (0..k)
            .map(|i| self.slots.remove(&(self.first + i as u64)).unwrap_or(Value::Nil))
            .collect();
        self.first += k as u64;
        self.count -= k;
        out
    }

    /// Remove and return the oldest element
    pub(crate) fn pop_one(&mut self) -> Value {
        debug_assert!(self.count > 0, "pop from empty fifo (caller contract)");
        let value = self.slots.remove(&self.first).unwrap_or(Value::Nil);
        self.first += 1;
        self.count -= 1;
        value
    }
}

impl Default for Fifo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg32;
    use std::collections::VecDeque;

    fn new_rng() -> impl Rng {
        Pcg32::from_seed(0xcafef00dcafef00dcafef00dcafef00du128.to_le_bytes())
    }

    #[test]
    fn delivers_in_fifo_order() {
        let mut fifo = Fifo::new();
        fifo.push(["a".into(), "b".into()]);
        fifo.push([Value::from("c")]);
        assert_eq!(fifo.pop_one(), "a".into());
        assert_eq!(fifo.pop_one(), "b".into());
        assert_eq!(fifo.pop_one(), "c".into());
        assert_eq!(fifo.count(), 0);
    }

    #[test]
    fn peek_does_not_mutate() {
        let mut fifo = Fifo::new();
        fifo.push([Value::Int(1), Value::Int(2)]);
        assert_eq!(fifo.peek(2).to_vec(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(fifo.peek(1).to_vec(), vec![Value::Int(1)]);
        assert_eq!(fifo.count(), 2);
    }

    #[test]
    fn overflow_check_tracks_limit() {
        let mut fifo = Fifo::new();
        assert!(!fifo.would_overflow(1000));
        fifo.set_limit(Some(2));
        assert!(!fifo.would_overflow(2));
        assert!(fifo.would_overflow(3));
        fifo.push([Value::Int(1), Value::Int(2)]);
        assert!(fifo.would_overflow(1));
        fifo.set_limit(None);
        assert!(!fifo.would_overflow(1));
    }

    #[test]
    fn shrinking_limit_never_evicts() {
        let mut fifo = Fifo::new();
        fifo.push([Value::Int(1), Value::Int(2), Value::Int(3)]);
        fifo.set_limit(Some(1));
        assert_eq!(fifo.count(), 3);
        // existing elements still pop in order
        assert_eq!(fifo.pop(3).to_vec(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        // future pushes are constrained
        fifo.push([Value::Int(4)]);
        assert!(fifo.would_overflow(1));
    }

    #[test]
    fn popped_slots_are_released() {
        let mut fifo = Fifo::new();
        fifo.push([Value::Int(1), Value::Int(2)]);
        fifo.pop(2);
        assert!(fifo.slots.is_empty());
        // positions keep growing past the popped range
        fifo.push([Value::Int(3)]);
        assert_eq!(fifo.pop_one(), Value::Int(3));
    }

    #[test]
    fn equivalent_to_model_queue() {
        let mut rng = new_rng();

        for _ in 0..100 {
            let mut model = VecDeque::new();
            let mut fifo = Fifo::new();
            for i in 0i64..2_000 {
                match rng.gen_range(0..10) {
                    // push a small batch
                    0..=4 => {
                        let n = rng.gen_range(1..=3);
                        let batch: Vec<Value> = (0..n).map(|j| Value::Int(i * 10 + j)).collect();
                        model.extend(batch.clone());
                        fifo.push(batch);
                    }
                    // pop up to everything available
                    5..=7 => {
                        let k = rng.gen_range(0..=fifo.count());
                        let popped = fifo.pop(k).to_vec();
                        let expected: Vec<Value> = model.drain(..k).collect();
                        assert_eq!(popped, expected);
                    }
                    // peek a prefix
                    _ => {
                        let k = rng.gen_range(0..=fifo.count());
                        let peeked = fifo.peek(k).to_vec();
                        let expected: Vec<Value> = model.iter().take(k).cloned().collect();
                        assert_eq!(peeked, expected);
                    }
                }
                assert_eq!(fifo.count(), model.len());
                assert_eq!(fifo.slots.len(), model.len());
            }
        }
    }
}
