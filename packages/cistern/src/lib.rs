//! Sharded, lock-protected FIFO broker for moving values between
//! memory-isolated domains through named channels.
//!
//! Each channel exposes named keys, each key holds an ordered queue of
//! transferable values, and a fixed pool of mutex-guarded shards owns the
//! storage. Callers never share memory with a shard: every value crossing in
//! or out is deep-copied. "Wait until data arrives" semantics do not live
//! here — a higher-level channel object polls and coordinates on top of this
//! broker.

// the organization of these modules is as such:
//
//      These are used like
//      library utilities:
//    /--------------------\
//
//      value<----------------store: the isolated value domain. owns the
//                  |         ^      per-channel key tables and implements the
//      fifo<-------/         |      shard-side operations over typed
//                            |      arguments, assuming the shard lock is
//      transfer<---------\   |      held.
//                         \  |
//      module<------------pool: partitioned locking. fixed shard array,
//                            ^  identity-hash selection, module population,
//                            |  two-pass teardown.
//                            |
//                         dispatch: the defensive wrapper re-exported as the
//                                   public call path. stages arguments and
//                                   results across the transfer boundary and
//                                   parses them for the verbs.
//
// there is also the error module, which contains the relevant error types,
// which is also re-exported publically.

#[macro_use]
extern crate tracing;

pub extern crate bytes;

mod dispatch;
mod error;
mod fifo;
mod module;
mod pool;
mod store;
mod transfer;
mod value;

pub use crate::{
    dispatch::{invoke, Op, Results},
    error::{CallError, PoolError, TransferError},
    module::{Module, ModuleRegistry},
    pool::{ChannelId, ShardGuard, ShardPool},
    store::Store,
    transfer::{
        copy_value, is_nil_sentinel, nil_sentinel, toggle_nil_sentinels, HandleRule,
        SentinelDirection, TransferRegistry,
    },
    value::{FloatBits, Handle, Key, Value},
};
