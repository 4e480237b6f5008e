// src/clustering/translation.rs

use std::collections::HashMap;

/// Maps staged entity ids to the canonical entity ids they resolved to.
///
/// Lives for one clustering pass. Ids that were never recorded (ungrounded or
/// failed entities) translate to themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTranslations {
    translations: HashMap<String, String>,
}

impl ClusterTranslations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, staged_id_name: impl Into<String>, canonical_id_name: impl Into<String>) {
        self.translations
            .insert(staged_id_name.into(), canonical_id_name.into());
    }

    pub fn get(&self, staged_id_name: &str) -> Option<&str> {
        self.translations.get(staged_id_name).map(String::as_str)
    }

    /// The canonical id for `id_name`, or `id_name` itself when untranslated.
    pub fn translate<'a>(&'a self, id_name: &'a str) -> &'a str {
        self.get(id_name).unwrap_or(id_name)
    }

    pub fn len(&self) -> usize {
        self.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }
}
