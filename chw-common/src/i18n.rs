//! Localization of user-facing messages
//!
//! Transitions only ever see the [`Localizer`] trait; [`TranslationCatalog`] is the
//! in-process implementation built from the `[translations]` config table.

use std::collections::HashMap;

/// Locale used when a key is missing from the requested locale
pub const FALLBACK_LOCALE: &str = "en";

/// Translates message codes into human-readable strings
pub trait Localizer: Send + Sync {
    /// Translate `key` for `locale`
    ///
    /// Implementations must never return an empty string; the key itself is an
    /// acceptable last resort.
    fn translate(&self, key: &str, locale: &str) -> String;

    /// Locale configured for messages generated by the pipeline
    fn current_locale(&self) -> String;
}

/// Locale → key → text lookup table
#[derive(Debug, Clone)]
pub struct TranslationCatalog {
    locale: String,
    entries: HashMap<String, HashMap<String, String>>,
}

impl TranslationCatalog {
    pub fn new(locale: impl Into<String>, entries: HashMap<String, HashMap<String, String>>) -> Self {
        Self {
            locale: locale.into(),
            entries,
        }
    }

    /// Catalog holding only the built-in English messages
    pub fn builtin() -> Self {
        Self::new(FALLBACK_LOCALE, builtin_entries())
    }

    /// Add entries from configuration on top of the built-in messages
    pub fn with_overrides(locale: impl Into<String>, overrides: &HashMap<String, HashMap<String, String>>) -> Self {
        let mut entries = builtin_entries();
        for (locale, values) in overrides {
            entries
                .entry(locale.clone())
                .or_default()
                .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Self::new(locale, entries)
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.entries
            .get(locale)
            .and_then(|values| values.get(key))
            .map(String::as_str)
            .filter(|text| !text.trim().is_empty())
    }
}

impl Localizer for TranslationCatalog {
    fn translate(&self, key: &str, locale: &str) -> String {
        self.lookup(locale, key)
            .or_else(|| self.lookup(FALLBACK_LOCALE, key))
            .unwrap_or(key)
            .to_string()
    }

    fn current_locale(&self) -> String {
        self.locale.clone()
    }
}

fn builtin_entries() -> HashMap<String, HashMap<String, String>> {
    let mut en = HashMap::new();
    en.insert(
        "sys.facility_not_found".to_string(),
        "Facility not found.".to_string(),
    );
    HashMap::from([(FALLBACK_LOCALE.to_string(), en)])
}
