// error types.

use crate::dispatch::Op;
use thiserror::Error;

/// Error initializing or operating the shard pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// The embedder's store init hook failed while building a shard
    ///
    /// In practice this is unrecoverable: the process cannot run without its
    /// broker, and a hook that fails for one shard would fail for all of them.
    #[error("failed to initialize store of shard {index}")]
    Init {
        /// Index of the shard whose store could not be initialized
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A module name was not present in the supplied module registry
    #[error("module `{name}` is not in the module registry")]
    UnknownModule {
        /// The name that failed to resolve
        name: String,
    },

    /// A module installer failed inside a shard's store
    #[error("failed to install module `{name}` in shard {index}")]
    Install {
        /// Name of the module being installed
        name: String,
        /// Index of the shard it failed in
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The pool has already been torn down
    #[error("shard pool is closed")]
    Closed,
}

/// Error deep-copying a value into a destination domain
#[derive(Debug, Error)]
pub enum TransferError {
    /// The value contains a handle whose tag has no transfer rule registered
    /// in the destination domain
    #[error("no transfer rule for handle `{tag}` in the destination domain")]
    UnregisteredHandle {
        /// Tag of the offending handle
        tag: String,
    },

    /// A registered transfer rule failed to produce the destination payload
    #[error("transfer rule for handle `{tag}` failed")]
    HandleTransfer {
        /// Tag of the offending handle
        tag: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Error reported by the call dispatcher
///
/// Empty/absent data and capacity rejections are *not* errors — they come back
/// as ordinary result values. This type covers the failure paths only.
#[derive(Debug, Error)]
pub enum CallError {
    /// The arguments could not be copied into the shard's domain
    ///
    /// The operation did not run and no storage was mutated.
    #[error("failed to transfer arguments into the shard")]
    ArgumentTransfer(#[source] TransferError),

    /// The results could not be copied back into the caller's domain
    ///
    /// The operation already ran inside the shard, so its storage-side effect
    /// stands: the caller must treat this as "effect happened, outcome
    /// unknown".
    #[error("failed to transfer results back to the caller")]
    ResultTransfer(#[source] TransferError),

    /// The arguments were malformed for the operation
    ///
    /// The higher layer constructs operation arguments, so this indicates a
    /// programming error there. Nothing was mutated.
    #[error("`{op}` expects {expected}")]
    Argument {
        /// The operation that rejected its arguments
        op: Op,
        /// Description of the expected argument shape
        expected: &'static str,
    },
}
