// extension modules: named installers that make custom transferable
// categories resolve identically in every value domain.

use crate::store::Store;
use dashmap::DashMap;
use std::sync::Arc;

/// An extension module installable into a store
///
/// Modules register handle rules (and whatever supporting state those need)
/// so a category sent from one domain can be reconstructed in another. The
/// same module must be installed in every domain that exchanges its values —
/// [`ShardPool::populate`] handles the shard side.
///
/// [`ShardPool::populate`]: crate::ShardPool::populate
pub trait Module: Send + Sync {
    /// Stable name the module is resolved by
    fn name(&self) -> &str;

    /// Install into one store. Called at most once per store.
    fn install(&self, store: &mut Store) -> anyhow::Result<()>;
}

/// The caller's module search configuration
///
/// A shared name → module table. The pool resolves population requests
/// against the caller's registry, so a name means the same module in the
/// caller's domain and in every shard.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: DashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Construct an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under its name, replacing any previous registration
    pub fn register(&self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_owned(), module);
    }

    /// Resolve a module by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).map(|module| Arc::clone(&module))
    }
}
