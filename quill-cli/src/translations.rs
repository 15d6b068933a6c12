//! Translation tables on disk, one TOML file per script and language:
//! `<translations>/<language>/<script>.toml`, mapping ids to text.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use quill::{TranslationTable, Translator};
use tracing::{debug, warn};

/// Parses a table, skipping keys that aren't translation ids.
pub fn parse(source: &str) -> Result<TranslationTable, toml::de::Error> {
    let entries: BTreeMap<String, String> = toml::from_str(source)?;
    let mut table = TranslationTable::new();

    for (key, text) in entries {
        match key.parse::<u32>() {
            Ok(id) => {
                table.insert(id, &text);
            },
            Err(_) => warn!(key = %key, "ignoring translation with a non-numeric id"),
        }
    }

    Ok(table)
}

pub fn render(table: &TranslationTable) -> Result<String, String> {
    let entries = table
        .iter()
        .map(|(id, text)| (id.to_string(), text.clone()))
        .collect::<BTreeMap<_, _>>();
    toml::to_string(&entries).map_err(|e| format!("Could not write translation table: {}", e))
}

/// Loads tables from a translation directory.
pub struct TomlTranslator {
    root: PathBuf,
}

impl TomlTranslator {
    pub fn new(root: &Path) -> TomlTranslator {
        TomlTranslator { root: root.to_path_buf() }
    }

    pub fn path(&self, script: &str, language: &str) -> PathBuf {
        self.root.join(language).join(script).with_extension("toml")
    }
}

impl Translator for TomlTranslator {
    fn load_translation(&self, script: &str, language: &str) -> Option<TranslationTable> {
        let path = self.path(script, language);
        let source = fs::read_to_string(&path).ok()?;
        debug!(path = %path.display(), "loading translation table");

        match parse(&source) {
            Ok(table) => Some(table),
            Err(error) => {
                warn!(path = %path.display(), %error, "malformed translation table");
                None
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ids() {
        let table = parse("0 = \"Bonjour\"\n12 = \"Au revoir\"\nnotes = \"draft\"\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), Some("Bonjour"));
        assert_eq!(table.get(12), Some("Au revoir"));
    }

    #[test]
    fn renders_parseably() {
        let table = vec![(0, "Hello".to_string()), (10, "say \"hi\"".to_string())]
            .into_iter()
            .collect::<TranslationTable>();
        let rendered = render(&table).unwrap();
        assert_eq!(parse(&rendered).unwrap(), table);
    }

    #[test]
    fn layout() {
        let translator = TomlTranslator::new(Path::new("lang"));
        assert_eq!(translator.path("intro", "fr"), PathBuf::from("lang/fr/intro.toml"));
        assert!(translator.load_translation("missing", "xx").is_none());
    }
}
