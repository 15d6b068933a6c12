use std::{fs, path::PathBuf};

use quill::{compiler, Container, Source};

use crate::CONTAINER;

/// Prints the disassembly of a compiled container,
/// or of a script after compiling it.
pub fn dump(file: PathBuf) -> Result<(), String> {
    let container = if file.extension().map_or(false, |e| e == CONTAINER) {
        let bytes = fs::read(&file).map_err(|_| format!("Could not read container '{}'", file.display()))?;
        Container::decode(&bytes).map_err(|e| e.to_string())?
    } else {
        let source = Source::path(&file).map_err(|_| format!("Could not read script '{}'", file.display()))?;
        compiler::compile(&source).map_err(|e| e.to_string())?
    };

    print!("{}", container);
    for (id, text) in container.translations.iter() {
        println!("{:>6}\t{:?}", id, text);
    }
    Ok(())
}
