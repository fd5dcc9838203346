// isolated value domains, and the shard-side operations that run inside them.
//
// a store is one independently-managed memory domain. shards own one each (the
// channel storage lives inside it), and every caller runs operations from its
// own. values only ever move between stores through the deep-copy transfer in
// the transfer module; the operations below assume their arguments already
// live in this store's domain and that the owning shard lock is held.

use crate::{
    error::TransferError,
    fifo::{Batch, Fifo},
    pool::ChannelId,
    transfer::{self, TransferRegistry},
    value::{Key, Value},
};
use std::collections::{HashMap, HashSet};

/// Per-channel mapping from key to its fifo
#[derive(Default)]
pub(crate) struct KeyTable {
    fifos: HashMap<Key, Fifo>,
}

impl KeyTable {
    fn get(&self, key: &Key) -> Option<&Fifo> {
        self.fifos.get(key)
    }

    fn get_mut(&mut self, key: &Key) -> Option<&mut Fifo> {
        self.fifos.get_mut(key)
    }

    // the key's fifo, created empty and unbounded if absent
    fn fifo_mut(&mut self, key: Key) -> &mut Fifo {
        self.fifos.entry(key).or_default()
    }

    fn insert(&mut self, key: Key, fifo: Fifo) {
        self.fifos.insert(key, fifo);
    }

    fn remove(&mut self, key: &Key) {
        self.fifos.remove(key);
    }

    fn iter(&self) -> impl Iterator<Item = (&Key, &Fifo)> {
        self.fifos.iter()
    }
}

/// One isolated value domain
///
/// Holds the channel storage (when owned by a shard), the transfer rules
/// deciding which handle categories may enter the domain, and the set of
/// modules already installed.
#[derive(Default)]
pub struct Store {
    // key tables per channel, created lazily on first access
    channels: HashMap<ChannelId, KeyTable>,
    registry: TransferRegistry,
    installed: HashSet<String>,
}

impl Store {
    /// Construct an empty domain with no transfer rules
    pub fn new() -> Self {
        Self::default()
    }

    /// The domain's transfer rules
    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Mutable access to the domain's transfer rules, for init hooks and
    /// module installers
    pub fn registry_mut(&mut self) -> &mut TransferRegistry {
        &mut self.registry
    }

    /// Deep-copy a value into this domain
    pub fn import(&self, value: &Value) -> Result<Value, TransferError> {
        transfer::copy_value(value, &self.registry)
    }

    pub(crate) fn has_module(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    pub(crate) fn record_module(&mut self, name: &str) {
        self.installed.insert(name.to_owned());
    }

    // the channel's key table, created lazily. every operation goes through
    // here, so read-only verbs also materialize the (empty) table.
    fn table(&mut self, channel: ChannelId) -> &mut KeyTable {
        self.channels.entry(channel).or_default()
    }

    // ==== the shard-side operations ====
    //
    // all run under the owning shard's lock and are atomic with respect to
    // every other operation on the same shard.

    /// Drop the channel's entire key table: all keys, all queues
    pub(crate) fn clear(&mut self, channel: ChannelId) {
        self.channels.remove(&channel);
    }

    /// Append `values` to the key's queue
    ///
    /// Returns `false` without storing anything if the push would exceed the
    /// queue's limit; the batch is all-or-nothing.
    pub(crate) fn send(&mut self, channel: ChannelId, key: Key, values: Vec<Value>) -> bool {
        let fifo = self.table(channel).fifo_mut(key);
        if fifo.would_overflow(values.len()) {
            return false;
        }
        fifo.push(values);
        true
    }

    /// Pop one value from the first of `keys` whose queue is non-empty
    ///
    /// Keys are scanned in strict left-to-right priority; the first match
    /// wins. A popped nil read out of a never-written slot is consumed but
    /// skipped; a popped nil sentinel is an ordinary present value.
    pub(crate) fn receive(&mut self, channel: ChannelId, keys: &[Key]) -> Option<(Value, Key)> {
        let table = self.table(channel);
        for key in keys {
            if let Some(fifo) = table.get_mut(key) {
                if fifo.count() > 0 {
                    let value = fifo.pop_one();
                    if !value.is_nil() {
                        return Some((value, key.clone()));
                    }
                }
            }
        }
        None
    }

    /// Pop a batch of at least `min_count` and at most `max_count` values
    ///
    /// Returns an empty batch if `min_count ≤ 0` or fewer than `min_count`
    /// values are available: there is no partial delivery below the minimum.
    pub(crate) fn receive_batched(
        &mut self,
        channel: ChannelId,
        key: &Key,
        min_count: i64,
        max_count: i64,
    ) -> Batch {
        if min_count <= 0 {
            return Batch::new();
        }
        let Some(fifo) = self.table(channel).get_mut(key) else {
            return Batch::new();
        };
        if (fifo.count() as i64) < min_count {
            return Batch::new();
        }
        let take = max_count.clamp(0, fifo.count() as i64) as usize;
        fifo.pop(take)
    }

    /// Set the limit of the key's queue, creating the queue if absent
    pub(crate) fn limit(&mut self, channel: ChannelId, key: Key, limit: Option<usize>) {
        self.table(channel).fifo_mut(key).set_limit(limit);
    }

    /// Replace or remove the key's queue outside fifo semantics
    ///
    /// A non-nil value installs a fresh unbounded queue holding just that
    /// value; prior contents and limit go with the old queue. A nil or absent
    /// value removes the key entirely.
    pub(crate) fn set(&mut self, channel: ChannelId, key: Key, value: Option<Value>) {
        let table = self.table(channel);
        match value {
            Some(value) if !value.is_nil() => {
                let mut fifo = Fifo::new();
                fifo.push([value]);
                table.insert(key, fifo);
            }
            _ => table.remove(&key),
        }
    }

    /// Clone the oldest value of the key's queue without removing it
    pub(crate) fn get(&mut self, channel: ChannelId, key: &Key) -> Option<Value> {
        let fifo = self.table(channel).get(key)?;
        if fifo.count() > 0 {
            fifo.peek(1).into_iter().next()
        } else {
            None
        }
    }

    /// Count queued values
    ///
    /// No keys: a map from every key that has a queue to its count. One key:
    /// that key's count, 0 if it has no queue. Several keys: a map from each
    /// queried key that has a queue to its count, absent keys omitted.
    pub(crate) fn count(&mut self, channel: ChannelId, keys: &[Key]) -> Value {
        let table = self.table(channel);
        match keys {
            [] => Value::Map(
                table.iter().map(|(key, fifo)| (key.clone(), Value::Int(fifo.count() as i64))).collect(),
            ),
            [key] => Value::Int(table.get(key).map_or(0, Fifo::count) as i64),
            keys => Value::Map(
                keys.iter()
                    .filter_map(|key| {
                        table.get(key).map(|fifo| (key.clone(), Value::Int(fifo.count() as i64)))
                    })
                    .collect(),
            ),
        }
    }
}
