use crate::vm::{
    cache::{ScriptCache, ScriptProvider},
    plugin::{Plugin, PluginRegistry},
    translation::Translator,
};

/// Everything a runtime needs from its host.
/// Built up front and moved into a `Runtime`.
///
/// ```ignore
/// let environment = Environment::new()
///     .with_cache(cache.clone())
///     .with_plugin("Print", print)
///     .with_language("fr");
/// ```
#[derive(Default)]
pub struct Environment {
    pub(crate) cache: ScriptCache,
    pub(crate) plugins: PluginRegistry,
    pub(crate) translator: Option<Box<dyn Translator>>,
    pub(crate) provider: Option<Box<dyn ScriptProvider>>,
    pub(crate) language: Option<String>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    /// Shares a cache with other runtimes.
    /// Without one, each environment gets a private cache.
    pub fn with_cache(mut self, cache: ScriptCache) -> Environment {
        self.cache = cache;
        self
    }

    /// Registers a plugin, keeping any already registered under the same name.
    pub fn with_plugin(mut self, name: &str, plugin: impl Plugin + 'static) -> Environment {
        self.plugins.add(name, plugin);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Environment {
        self.plugins = plugins;
        self
    }

    pub fn with_translator(mut self, translator: impl Translator + 'static) -> Environment {
        self.translator = Some(Box::new(translator));
        self
    }

    /// Resolves scripts that `import` can't find in the cache.
    pub fn with_provider(mut self, provider: impl ScriptProvider + 'static) -> Environment {
        self.provider = Some(Box::new(provider));
        self
    }

    /// The language active when the runtime starts.
    pub fn with_language(mut self, language: &str) -> Environment {
        self.language = Some(language.to_string());
        self
    }

    pub fn cache(&self) -> &ScriptCache {
        &self.cache
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        value::Value,
        vm::plugin::{Native, PluginContext},
    };

    #[test]
    fn builder() {
        let cache = ScriptCache::new();
        let environment = Environment::new()
            .with_cache(cache.clone())
            .with_plugin("Nothing", |_: &PluginContext| Ok(Native::Ready(Value::Null)))
            .with_language("fr");

        assert!(environment.plugins().contains("Nothing"));
        assert_eq!(environment.language.as_deref(), Some("fr"));

        environment.cache().insert("shared", Default::default());
        assert!(cache.contains("shared"));
    }
}
