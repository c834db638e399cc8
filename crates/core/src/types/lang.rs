//! Per-language value overlay.
//!
//! Multi-language fields of an entity (`name`, `description`, ...) are stored
//! in a separate `{table}_lang` table, one row per language. In memory they
//! are represented as a [`LangMap`] keyed by [`LangId`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::LangId;

/// Mapping of language id to a translated value.
///
/// Iteration order is ascending by language id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LangMap<T>(BTreeMap<LangId, T>);

impl<T> Default for LangMap<T> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<T> LangMap<T> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map holding a single translation.
    #[must_use]
    pub fn single(lang: LangId, value: T) -> Self {
        let mut map = Self::new();
        map.insert(lang, value);
        map
    }

    /// Value for `lang`, if translated.
    #[must_use]
    pub fn get(&self, lang: LangId) -> Option<&T> {
        self.0.get(&lang)
    }

    /// Value for `lang`, falling back to `default_lang` when `lang` has no
    /// translation.
    #[must_use]
    pub fn get_or_default(&self, lang: LangId, default_lang: LangId) -> Option<&T> {
        self.get(lang).or_else(|| self.get(default_lang))
    }

    /// Set the value for `lang`, returning the previous one.
    pub fn insert(&mut self, lang: LangId, value: T) -> Option<T> {
        self.0.insert(lang, value)
    }

    /// Whether no language has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of translated languages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Languages that have a value.
    pub fn langs(&self) -> impl Iterator<Item = LangId> + '_ {
        self.0.keys().copied()
    }

    /// Iterate over `(language, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (LangId, &T)> {
        self.0.iter().map(|(lang, value)| (*lang, value))
    }
}

impl<T> FromIterator<(LangId, T)> for LangMap<T> {
    fn from_iter<I: IntoIterator<Item = (LangId, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_default_falls_back() {
        let mut names = LangMap::new();
        names.insert(LangId::new(1), "Visitor".to_owned());

        assert_eq!(
            names.get_or_default(LangId::new(2), LangId::new(1)).map(String::as_str),
            Some("Visitor")
        );
        assert_eq!(names.get(LangId::new(2)), None);
    }

    #[test]
    fn test_iteration_is_ordered_by_language() {
        let names: LangMap<&str> = [(LangId::new(3), "c"), (LangId::new(1), "a")]
            .into_iter()
            .collect();
        let langs: Vec<i32> = names.langs().map(|l| l.as_i32()).collect();
        assert_eq!(langs, vec![1, 3]);
    }
}
