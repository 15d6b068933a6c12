use std::collections::{btree_map, BTreeMap};

/// Maps translation ids to text for one script in one language.
/// Every container carries the default-language table,
/// hosts provide the others through a `vm::translation::Translator`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable(BTreeMap<u32, String>);

impl TranslationTable {
    pub fn new() -> TranslationTable {
        TranslationTable(BTreeMap::new())
    }

    /// Returns the previous text for this id, if any.
    pub fn insert(&mut self, id: u32, text: &str) -> Option<String> {
        self.0.insert(id, text.to_string())
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.0.get(&id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in ascending id order.
    pub fn iter(&self) -> btree_map::Iter<'_, u32, String> {
        self.0.iter()
    }
}

impl FromIterator<(u32, String)> for TranslationTable {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        TranslationTable(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordered_by_id() {
        let table: TranslationTable =
            vec![(7, "seven".to_string()), (1, "one".to_string())].into_iter().collect();
        let ids: Vec<u32> = table.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 7]);
        assert_eq!(table.get(7), Some("seven"));
        assert_eq!(table.get(3), None);
    }
}
