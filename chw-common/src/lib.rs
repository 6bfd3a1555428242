//! # CHW Common Library
//!
//! Shared code for the community-health record transitions including:
//! - Document models (data records, facilities, contacts)
//! - Configuration loading
//! - Localization catalog
//! - Error types

pub mod config;
pub mod documents;
pub mod error;
pub mod i18n;

pub use error::{Error, Result, StoreError};
pub use i18n::{Localizer, TranslationCatalog};
