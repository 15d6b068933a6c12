use std::{collections::HashMap, fmt, rc::Rc, task::Poll};

use crate::value::Value;

/// What a plugin hands back to the runtime.
pub enum Native {
    /// The result is available now.
    Ready(Value),
    /// The result arrives later. The runtime suspends until it is ready,
    /// or until the host resumes it with a value.
    Pending(Box<dyn Pending>),
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Native::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Native::Pending(_) => f.debug_tuple("Pending").finish(),
        }
    }
}

impl From<Value> for Native {
    fn from(value: Value) -> Native {
        Native::Ready(value)
    }
}

/// A plugin result that is not ready yet.
/// Polled each time the runtime is run while suspended.
pub trait Pending {
    fn poll(&mut self) -> Poll<Result<Value, String>>;
}

/// The view a plugin gets of a call.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    /// Named parameters, in call order.
    pub parameters: &'a [(String, Value)],
    /// The active language tag, if one was set.
    pub language: Option<&'a str>,
}

impl<'a> PluginContext<'a> {
    /// The first parameter with this name.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.parameters.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }
}

/// A native function scripts can call by name,
/// the only way scripts reach host capabilities.
/// Errors are reported as messages and become runtime faults.
pub trait Plugin {
    fn execute(&self, context: &PluginContext) -> Result<Native, String>;
}

impl<F> Plugin for F
where
    F: Fn(&PluginContext) -> Result<Native, String>,
{
    fn execute(&self, context: &PluginContext) -> Result<Native, String> {
        self(context)
    }
}

/// Maps command names to plugins.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Rc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    /// Registers a plugin.
    /// Returns `false`, keeping the existing one, if the name is taken.
    pub fn add(&mut self, name: &str, plugin: impl Plugin + 'static) -> bool {
        if self.plugins.contains_key(name) {
            return false;
        }
        self.plugins.insert(name.to_string(), Rc::new(plugin));
        true
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
