//! Locale selection for the `fake`-backed semantic providers.

pub mod locales;
