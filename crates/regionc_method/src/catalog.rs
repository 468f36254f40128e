use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::identity::{MethodId, MethodIdentity};

static GLOBAL_METHOD_CATALOG: Lazy<MethodCatalog> = Lazy::new(MethodCatalog::new);

/// Interns method signatures so profile strings resolve to identities.
#[derive(Debug, Default)]
pub struct MethodCatalog {
    by_signature: RwLock<AHashMap<Arc<str>, MethodId>>,
    by_id: RwLock<AHashMap<MethodId, MethodIdentity>>,
}

impl MethodCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static MethodCatalog {
        &GLOBAL_METHOD_CATALOG
    }

    /// Registers a method, replacing any previous signature for the same id.
    pub fn register(&self, id: MethodId, signature: &str) -> MethodIdentity {
        let identity = MethodIdentity::new(id, signature);
        let previous = self.by_id.write().insert(id, identity.clone());
        let mut by_signature = self.by_signature.write();
        if let Some(previous) = previous {
            by_signature.remove(previous.signature());
        }
        by_signature.insert(Arc::clone(&identity.signature), id);
        identity
    }

    pub fn register_many<'a, I>(&self, methods: I)
    where
        I: IntoIterator<Item = (MethodId, &'a str)>,
    {
        for (id, signature) in methods {
            self.register(id, signature);
        }
    }

    pub fn resolve(&self, signature: &str) -> Option<MethodIdentity> {
        let id = *self.by_signature.read().get(signature)?;
        self.get(id)
    }

    pub fn get(&self, id: MethodId) -> Option<MethodIdentity> {
        self.by_id.read().get(&id).cloned()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.by_signature.read().contains_key(signature)
    }

    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.read().is_empty()
    }

    pub fn all(&self) -> Vec<MethodIdentity> {
        let mut methods: Vec<_> = self.by_id.read().values().cloned().collect();
        methods.sort();
        methods
    }
}
