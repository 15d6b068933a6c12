use std::{
    fs,
    path::{Path, PathBuf},
    task::Poll,
    thread,
    time::{Duration, Instant},
};

use colored::*;
use quill::{
    Environment, Native, Pending, PluginContext, PluginRegistry, Resource, Runtime, ScriptCache,
    Source, Status, Value,
};
use tracing::{debug, info};

use crate::{
    manifest::Manifest,
    status::Status as Report,
    translations::TomlTranslator,
    CONTAINER,
};

/// How long to sleep between polls of a suspended script.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Reads scripts from the project's script directory.
/// Script source wins, a compiled container is only read
/// when its source is missing, as in a shipped build.
pub struct ScriptDirectory {
    root: PathBuf,
    extension: String,
}

impl ScriptDirectory {
    pub fn new(root: &Path, extension: &str) -> ScriptDirectory {
        ScriptDirectory { root: root.to_path_buf(), extension: extension.to_string() }
    }

    pub fn provide(&self, id: &str) -> Option<Resource> {
        let script = self.root.join(id);
        if let Ok(source) = fs::read_to_string(script.with_extension(&self.extension)) {
            debug!(id, "found script source");
            return Some(Resource::Source(source));
        }
        if let Ok(bytes) = fs::read(script.with_extension(CONTAINER)) {
            debug!(id, "found compiled container");
            return Some(Resource::Container(bytes));
        }
        None
    }
}

/// Blocks the script for `seconds`, without blocking the host.
struct Wait {
    until: Instant,
}

impl Pending for Wait {
    fn poll(&mut self) -> Poll<Result<Value, String>> {
        if Instant::now() >= self.until {
            Poll::Ready(Ok(Value::Null))
        } else {
            Poll::Pending
        }
    }
}

/// Plugins the console host provides to every script.
pub fn console() -> PluginRegistry {
    let mut plugins = PluginRegistry::new();

    plugins.add("Dialogue", |context: &PluginContext| {
        let content = context.get("Content").map(Value::to_text).unwrap_or_default();
        match context.get("Character") {
            Some(Value::Null) | None => println!("{}", content.italic()),
            Some(speaker) => println!("{}: {}", speaker.to_text().bold(), content),
        }
        Ok(Native::Ready(Value::Null))
    });

    plugins.add("Print", |context: &PluginContext| {
        let line = context
            .parameters
            .iter()
            .map(|(key, value)| match value {
                Value::Boolean(true) => key.clone(),
                value => format!("{}={}", key, value),
            })
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}", line);
        Ok(Native::Ready(Value::Null))
    });

    plugins.add("Wait", |context: &PluginContext| {
        let seconds = match context.get("seconds") {
            Some(value) => value.to_float().map_err(|e| e.to_string())?,
            None => 1.0,
        };
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(format!("can not wait for {} seconds", seconds));
        }
        let until = Instant::now() + Duration::from_secs_f64(seconds);
        Ok(Native::Pending(Box::new(Wait { until })))
    });

    plugins
}

/// Runs a runtime to completion, polling while it is suspended.
pub fn drive(runtime: &mut Runtime) -> Result<Status, String> {
    loop {
        match runtime.run().map_err(|e| e.to_string())? {
            Status::Suspended => thread::sleep(POLL_INTERVAL),
            status => return Ok(status),
        }
    }
}

pub fn run(path: PathBuf, language: Option<String>) -> Result<(), String> {
    let (manifest, path) = Manifest::package(&path)?;
    let root = manifest.script_root(path);
    let directory = ScriptDirectory::new(&root, &manifest.scripts.extension);

    let entry = &manifest.project.entry;
    let file = root.join(entry).with_extension(&manifest.scripts.extension);
    let contents = fs::read_to_string(&file)
        .map_err(|_| format!("Could not find entry script '{}'", file.display()))?;
    let source = Source::new(&contents, entry);

    let mut environment = Environment::new()
        .with_cache(ScriptCache::new())
        .with_plugins(console())
        .with_provider(move |id: &str| directory.provide(id))
        .with_translator(TomlTranslator::new(&manifest.translation_root(path)));

    if let Some(language) = language.or_else(|| manifest.language.active.clone()) {
        info!(language = %language, "translating");
        environment = environment.with_language(&language);
    }

    let mut runtime = Runtime::compile(&source, environment).map_err(|e| e.to_string())?;

    match drive(&mut runtime)? {
        Status::Finished(finished) => {
            for (name, value) in finished.exports.iter() {
                Report::exported().log(format!("{} = {}", name, value));
            }
            Report::finished().log(format!("'{}' returned {}", manifest.project.name, finished.value));
        },
        _ => Report::warn().log("The script was stopped before it finished"),
    }

    Ok(())
}
