use std::collections::HashMap;

use tracing::warn;

use crate::common::translation::TranslationTable;

/// Provides translation tables for languages other than the default.
pub trait Translator {
    /// The table of one script in one language, if there is one.
    fn load_translation(&self, script: &str, language: &str) -> Option<TranslationTable>;
}

impl<F> Translator for F
where
    F: Fn(&str, &str) -> Option<TranslationTable>,
{
    fn load_translation(&self, script: &str, language: &str) -> Option<TranslationTable> {
        self(script, language)
    }
}

/// Resolves translation ids against the active language.
/// Tables are loaded once per script and dropped when the language changes.
#[derive(Default)]
pub struct Localizer {
    translator: Option<Box<dyn Translator>>,
    language: Option<String>,
    tables: HashMap<String, Option<TranslationTable>>,
}

impl Localizer {
    pub fn new(translator: Option<Box<dyn Translator>>, language: Option<String>) -> Localizer {
        Localizer { translator, language, tables: HashMap::new() }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: &str) {
        if self.language.as_deref() != Some(language) {
            self.language = Some(language.to_string());
            self.tables.clear();
        }
    }

    /// Looks an id up in the active language,
    /// falling back to the script's default table.
    pub fn resolve(&mut self, script: &str, id: u32, default: &TranslationTable) -> Option<String> {
        let language = match &self.language {
            Some(language) => language.clone(),
            None => return default.get(id).map(str::to_string),
        };

        let translator = &self.translator;
        let table = self.tables.entry(script.to_string()).or_insert_with(|| {
            translator.as_ref().and_then(|t| t.load_translation(script, &language))
        });

        if let Some(text) = table.as_ref().and_then(|table| table.get(id)) {
            return Some(text.to_string());
        }

        warn!(script, id, %language, "no translation, using the default text");
        default.get(id).map(str::to_string)
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    fn table(entries: &[(u32, &str)]) -> TranslationTable {
        entries.iter().map(|(id, text)| (*id, text.to_string())).collect()
    }

    #[test]
    fn default_without_a_language() {
        let mut localizer = Localizer::new(None, None);
        let default = table(&[(0, "Hello")]);
        assert_eq!(localizer.resolve("intro", 0, &default), Some("Hello".to_string()));
        assert_eq!(localizer.resolve("intro", 1, &default), None);
    }

    #[test]
    fn falls_back_per_id() {
        let translator = |_: &str, language: &str| match language {
            "fr" => Some(table(&[(0, "Bonjour")])),
            _ => None,
        };
        let mut localizer = Localizer::new(Some(Box::new(translator)), Some("fr".to_string()));
        let default = table(&[(0, "Hello"), (1, "Goodbye")]);

        assert_eq!(localizer.resolve("intro", 0, &default), Some("Bonjour".to_string()));
        assert_eq!(localizer.resolve("intro", 1, &default), Some("Goodbye".to_string()));

        localizer.set_language("de");
        assert_eq!(localizer.resolve("intro", 0, &default), Some("Hello".to_string()));
    }

    #[test]
    fn tables_load_once_per_language() {
        let loads = Rc::new(Cell::new(0));
        let counter = loads.clone();
        let translator = move |_: &str, _: &str| {
            counter.set(counter.get() + 1);
            Some(table(&[(0, "Hallo")]))
        };
        let mut localizer = Localizer::new(Some(Box::new(translator)), Some("de".to_string()));
        let default = table(&[(0, "Hello")]);

        localizer.resolve("intro", 0, &default);
        localizer.resolve("intro", 0, &default);
        assert_eq!(loads.get(), 1);

        localizer.set_language("de");
        localizer.resolve("intro", 0, &default);
        assert_eq!(loads.get(), 1);

        localizer.set_language("nl");
        localizer.resolve("intro", 0, &default);
        assert_eq!(loads.get(), 2);
    }
}
