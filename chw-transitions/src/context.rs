//! Registries and localization handed to transitions at startup
//!
//! Built once from [`TomlConfig`] and shared behind an `Arc`; transitions never
//! reach for global configuration.

use chw_common::config::{ContactType, FormDefinition, TomlConfig};
use chw_common::{Localizer, TranslationCatalog};
use std::collections::HashMap;
use std::sync::Arc;

/// Contact type registry, form registry and localizer
#[derive(Clone)]
pub struct TransitionContext {
    contact_types: Vec<ContactType>,
    forms: HashMap<String, FormDefinition>,
    localizer: Arc<dyn Localizer>,
}

impl TransitionContext {
    pub fn new(
        contact_types: Vec<ContactType>,
        forms: HashMap<String, FormDefinition>,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            contact_types,
            forms,
            localizer,
        }
    }

    pub fn from_config(config: &TomlConfig) -> Self {
        let catalog = TranslationCatalog::with_overrides(config.locale.clone(), &config.translations);
        Self::new(
            config.contact_types.clone(),
            config.forms.clone(),
            Arc::new(catalog),
        )
    }

    /// Ids of place types eligible for reference-id matching, in registry order
    pub fn place_type_ids(&self) -> Vec<String> {
        self.contact_types.iter().map(|t| t.id.clone()).collect()
    }

    pub fn form(&self, code: &str) -> Option<&FormDefinition> {
        self.forms.get(code)
    }

    /// True only for forms registered with `public_form = true`
    pub fn is_public_form(&self, code: &str) -> bool {
        self.form(code).is_some_and(|form| form.public_form)
    }

    /// Translate `key` in the configured locale
    pub fn translate(&self, key: &str) -> String {
        let locale = self.localizer.current_locale();
        self.localizer.translate(key, &locale)
    }
}

impl std::fmt::Debug for TransitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionContext")
            .field("contact_types", &self.contact_types)
            .field("forms", &self.forms)
            .field("locale", &self.localizer.current_locale())
            .finish()
    }
}
