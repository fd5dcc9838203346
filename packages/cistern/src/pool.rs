// the shard pool: partitioned locking around per-shard stores.
//
// a channel's identity hashes to one shard, and that shard holds the
// channel's storage for the channel's entire lifetime. the bigger the pool,
// the fewer unnecessary waits between unrelated channels that happen to hash
// together. the pool is an explicit object with a documented lifecycle:
// created once, never resized, torn down in two passes.

use crate::{error::PoolError, module::ModuleRegistry, store::Store};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

/// Identity of a channel
///
/// An address-derived integer, stable for the channel object's lifetime.
/// Shard selection is a pure function of this identity, which is what lets a
/// channel's storage always be found in the same shard.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ChannelId(usize);

impl ChannelId {
    /// Identity of a channel object owned by an `Arc` allocation
    pub fn of<T>(channel: &Arc<T>) -> Self {
        ChannelId(Arc::as_ptr(channel) as usize)
    }

    /// Identity from a raw address-like integer
    pub const fn from_raw(raw: usize) -> Self {
        ChannelId(raw)
    }

    // allocations are typically 8-aligned, so the low bits carry no entropy:
    // discard them to spread consecutive allocations across shards
    pub(crate) fn shard_index(self, shard_count: usize) -> usize {
        (self.0 >> 3) % shard_count
    }
}

// one lock domain. the store sits behind Option so teardown can drop it in
// the first pass while the lock itself survives into the second.
struct Shard {
    store: Mutex<Option<Store>>,
}

/// Fixed pool of shards, created once and never resized
///
/// Lifecycle: [`ShardPool::new`] exactly once, then any number of
/// [`acquire`](ShardPool::acquire)/[`populate`](ShardPool::populate) calls
/// from any threads, then [`close`](ShardPool::close) (also run on drop).
pub struct ShardPool {
    shards: Box<[Shard]>,
    closed: AtomicBool,
}

impl ShardPool {
    /// Allocate and initialize `shard_count` shards
    ///
    /// `init` runs on every fresh store identically, before the pool is
    /// visible to anyone — this is where the embedder registers handle rules
    /// shared by all shards. A hook failure aborts construction.
    pub fn new(
        shard_count: usize,
        init: impl Fn(&mut Store) -> anyhow::Result<()>,
    ) -> Result<Self, PoolError> {
        assert!(shard_count >= 1, "shard pool needs at least one shard");
        let mut shards = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            let mut store = Store::new();
            init(&mut store).map_err(|source| PoolError::Init { index, source })?;
            shards.push(Shard { store: Mutex::new(Some(store)) });
        }
        debug!(shards = shard_count, "initialized shard pool");
        Ok(ShardPool { shards: shards.into_boxed_slice(), closed: AtomicBool::new(false) })
    }

    /// Number of shards, fixed at construction
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Lock the shard owning `channel`'s storage
    ///
    /// Blocks until the shard is free; this is the only blocking point in the
    /// broker, and there is deliberately no try/timeout variant at this layer.
    /// Returns `None` once the pool has been closed. The shard is released
    /// when the guard drops.
    pub fn acquire(&self, channel: ChannelId) -> Option<ShardGuard<'_>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let shard = &self.shards[channel.shard_index(self.shards.len())];
        let guard = shard.store.lock().unwrap();
        // the store may have been torn down while we waited on the lock
        if guard.is_none() {
            return None;
        }
        Some(ShardGuard { guard })
    }

    /// Install the named module from `registry` into every shard's store
    ///
    /// Locks each shard in turn and runs the installer under that shard's
    /// lock; shards that already have the module are skipped, so repeated
    /// population is cheap and idempotent.
    pub fn populate(&self, registry: &ModuleRegistry, name: &str) -> Result<(), PoolError> {
        let module = registry
            .get(name)
            .ok_or_else(|| PoolError::UnknownModule { name: name.to_owned() })?;
        for (index, shard) in self.shards.iter().enumerate() {
            let mut guard = shard.store.lock().unwrap();
            let Some(store) = guard.as_mut() else {
                return Err(PoolError::Closed);
            };
            if store.has_module(name) {
                continue;
            }
            trace!(module = name, shard = index, "installing module");
            module.install(store).map_err(|source| PoolError::Install {
                name: name.to_owned(),
                index,
                source,
            })?;
            store.record_module(name);
        }
        Ok(())
    }

    /// Tear the pool down
    ///
    /// Two passes: first every shard's store is dropped (a handle payload's
    /// destructor may reach channels living in *other* shards, which must
    /// still be lockable at that point), then the locks go away with the pool
    /// itself. Waits out in-flight operations shard by shard. Idempotent;
    /// also runs on drop. Afterwards `acquire` returns `None`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("tearing down shard stores");
        for shard in self.shards.iter() {
            let store = shard.store.lock().unwrap().take();
            drop(store);
        }
    }
}

impl Drop for ShardPool {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exclusive hold on one shard
///
/// At most one of these exists per shard at any time; dropping it releases
/// the shard.
pub struct ShardGuard<'a> {
    guard: MutexGuard<'a, Option<Store>>,
}

impl ShardGuard<'_> {
    /// The shard's store
    pub fn store(&mut self) -> &mut Store {
        // acquire only hands out guards over a live store
        self.guard.as_mut().expect("acquired shard lost its store (internal bug)")
    }
}
