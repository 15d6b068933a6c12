use std::{fs, path::PathBuf};

use quill::{compiler, Source};
use tracing::info;

use crate::{status::Status, translations, CONTAINER};

/// Compiles a script to `<output>` and writes the default-language
/// translation table next to it, as `<output>.toml`.
pub fn compile(file: PathBuf, output: Option<PathBuf>) -> Result<(), String> {
    let source = Source::path(&file).map_err(|_| format!("Could not read script '{}'", file.display()))?;
    let container = compiler::compile(&source).map_err(|e| e.to_string())?;

    let output = output.unwrap_or_else(|| file.with_extension(CONTAINER));
    let bytes = container.encode();
    fs::write(&output, &bytes).map_err(|_| format!("Could not write container '{}'", output.display()))?;
    info!(script = %source.identifier, bytes = bytes.len(), "wrote container");

    let table = output.with_extension("toml");
    fs::write(&table, translations::render(&container.translations)?)
        .map_err(|_| format!("Could not write translation table '{}'", table.display()))?;

    Status::compiled().log(format!(
        "'{}' with {} translatable string(s)",
        source.identifier,
        container.translations.len()
    ));
    Ok(())
}
