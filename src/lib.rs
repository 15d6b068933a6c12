//! # Quill
//! This repository contains the core of Quill, a small scripting language
//! for branching narrative logic: the compiler, the container format, and the VM.
//! If you're looking for the documentation for Quill's CLI,
//! see the `quill-cli` crate.
//!
//! ## Embedding Quill in Rust
//! Compile a script, then run it with the plugins your game provides:
//! ```
//! use quill::{Environment, Native, PluginContext, Runtime, Source, Status, Value};
//!
//! let source = Source::new("#Ada Hello!\n@mood = 'curious'\nexport @mood", "intro");
//! let environment = Environment::new()
//!     .with_plugin("Dialogue", |context: &PluginContext| {
//!         println!("{}: {}", context.get("Character").unwrap(), context.get("Content").unwrap());
//!         Ok(Native::Ready(Value::Null))
//!     });
//!
//! let mut runtime = Runtime::compile(&source, environment).unwrap();
//! match runtime.run().unwrap() {
//!     Status::Finished(finished) => assert_eq!(finished.exports["mood"], Value::from("curious")),
//!     _ => unreachable!(),
//! }
//! ```
//!
//! ## Overview of the compilation process
//! Within the compiler pipeline, source code is represented as a `Source` object.
//! A source is lexed into tokens, parsed into a tree, and lowered into a `Container`:
//! bytecode plus its string pool, label table, translations and debug positions.
//! Containers are encoded to bytes for shipping, and decoded by the VM.
//!
//! ## Running
//! A `Runtime` executes a container. It can suspend while a plugin works,
//! be resumed by the host, and import other scripts through a shared `ScriptCache`.

pub mod common;
pub mod compiler;
pub mod value;
pub mod vm;

use thiserror::Error;

pub use common::{
    container::{Container, FormatError},
    source::Source,
    span::Position,
    translation::TranslationTable,
};
pub use compiler::CompileError;
pub use value::{Kind, Value};
pub use vm::{
    Environment, Finished, Native, Pending, Plugin, PluginContext, PluginRegistry, Resource,
    Runtime, RuntimeError, ScriptCache, ScriptProvider, State, Status, StopHandle, Translator,
};

/// Any error Quill can raise.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Compiles script text into an encoded container,
/// returning it with the default-language translation table.
/// Compiling unchanged text always produces identical bytes,
/// compare `Source::hash` against `Container::hash` to skip the work.
pub fn compile(source: &str, identifier: &str) -> Result<(Vec<u8>, TranslationTable), CompileError> {
    let source = Source::new(source, identifier);
    let container = compiler::compile(&source)?;
    Ok((container.encode(), container.translations))
}

/// Compiles and runs a script with no host plugins,
/// e.g. for quick evaluation and tests.
pub fn run(source: &str, identifier: &str) -> Result<Status, Error> {
    let source = Source::new(source, identifier);
    let mut runtime = Runtime::compile(&source, Environment::new())?;
    Ok(runtime.run()?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compile_is_deterministic() {
        let source = "@x = \"Hello\" + 'world'\nfunction f(a = 1) { return @a }\nf()";
        let (first, table) = compile(source, "det").unwrap();
        let (second, _) = compile(source, "det").unwrap();
        assert_eq!(first, second);
        assert_eq!(table.get(0), Some("Hello"));
        assert_eq!(Container::decode(&first).unwrap().hash, Source::new(source, "det").hash());
    }

    #[test]
    fn errors_convert() {
        assert!(matches!(run("1 +", "broken"), Err(Error::Compile(_))));
        assert!(matches!(run("1 / 0", "broken"), Err(Error::Runtime(_))));
        let format = Container::decode(b"nope").unwrap_err();
        assert!(matches!(Error::from(format), Error::Format(_)));
    }

    #[test]
    fn runs() {
        match run("1 + 2", "sum") {
            Ok(Status::Finished(finished)) => assert_eq!(finished.value, Value::Integer(3)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
