use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::{
    common::{container::Container, source::Source},
    compiler::{self, CompileError},
};

/// Where a script comes from when the cache misses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Script text, compiled on load.
    Source(String),
    /// An encoded container.
    Container(Vec<u8>),
}

/// Resolves script ids for `import`.
/// Implemented by hosts, e.g. to read scripts from disk.
pub trait ScriptProvider {
    fn provide(&self, id: &str) -> Option<Resource>;
}

impl<F> ScriptProvider for F
where
    F: Fn(&str) -> Option<Resource>,
{
    fn provide(&self, id: &str) -> Option<Resource> {
        self(id)
    }
}

/// A shared, explicitly passed table of decoded containers.
/// Clones are handles to the same table,
/// so runtimes built from the same cache see each other's loads.
/// Containers are immutable once inserted, replacing one swaps the `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ScriptCache(Arc<DashMap<String, Arc<Container>>>);

impl ScriptCache {
    pub fn new() -> ScriptCache {
        ScriptCache::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Container>> {
        self.0.get(id).map(|entry| entry.value().clone())
    }

    /// Returns the container previously cached under this id, if any.
    pub fn insert(&self, id: &str, container: Arc<Container>) -> Option<Arc<Container>> {
        self.0.insert(id.to_string(), container)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    /// Drops a single script, the next load fetches it again.
    pub fn invalidate(&self, id: &str) -> Option<Arc<Container>> {
        self.0.remove(id).map(|(_, container)| container)
    }

    pub fn clear(&self) {
        self.0.clear()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compiles a source and caches the result,
    /// unless the cached container was built from identical text.
    pub fn compile_if_changed(&self, source: &Source) -> Result<Arc<Container>, CompileError> {
        let hash = source.hash();
        if let Some(cached) = self.get(&source.identifier) {
            if cached.hash == hash {
                debug!(script = %source.identifier, "source unchanged, reusing container");
                return Ok(cached);
            }
        }

        let container = Arc::new(compiler::compile(source)?);
        self.insert(&source.identifier, container.clone());
        Ok(container)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handles_share_a_table() {
        let cache = ScriptCache::new();
        let handle = cache.clone();
        cache.insert("intro", Arc::new(Container::default()));

        assert!(handle.contains("intro"));
        assert!(handle.invalidate("intro").is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn hash_gates_recompilation() {
        let cache = ScriptCache::new();
        let first = cache.compile_if_changed(&Source::new("1 + 2", "sum")).unwrap();
        let again = cache.compile_if_changed(&Source::new("1 + 2", "sum")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let changed = cache.compile_if_changed(&Source::new("1 + 3", "sum")).unwrap();
        assert!(!Arc::ptr_eq(&first, &changed));
        assert_ne!(first.hash, changed.hash);
        assert!(Arc::ptr_eq(&cache.get("sum").unwrap(), &changed));
    }

    #[test]
    fn errors_leave_the_cache_alone() {
        let cache = ScriptCache::new();
        assert!(cache.compile_if_changed(&Source::new("'open", "broken")).is_err());
        assert!(!cache.contains("broken"));
    }

    #[test]
    fn closures_provide() {
        let provider = |id: &str| match id {
            "greeting" => Some(Resource::Source("'hi'".to_string())),
            _ => None,
        };
        assert_eq!(provider.provide("greeting"), Some(Resource::Source("'hi'".to_string())));
        assert_eq!(provider.provide("missing"), None);
    }
}
