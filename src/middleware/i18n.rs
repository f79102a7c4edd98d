//! Accept-Language negotiation and message translation
//!
//! Runs at canonical middleware order 310. Parses the request's
//! `Accept-Language` header, picks the closest locale the gateway has
//! messages loaded for, and attaches a [`Locale`] to the request
//! extensions so handlers can call [`Locale::translate`] without
//! re-parsing the header themselves.
//!
//! There's no `accept-language` crate in the dependency stack for this —
//! the negotiation rule is narrow enough (RFC 7231 `q`-weighted list,
//! exact-or-primary-subtag match against a small configured set) that a
//! small hand-rolled parser is clearer than a dependency.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::I18nConfig;

/// A loaded message catalog: locale tag (e.g. `"en"`, `"fr"`) to message key
/// to translated string.
pub type Catalog = HashMap<String, HashMap<String, String>>;

/// The locale negotiated for a single request, with a handle on the
/// catalog needed to translate message keys.
#[derive(Clone)]
pub struct Locale {
    tag: String,
    catalog: Arc<Catalog>,
    default_locale: String,
}

impl Locale {
    /// The negotiated locale tag, e.g. `"en"`.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Translate a message key into the negotiated locale.
    ///
    /// Falls back to the default locale's translation, then to the key
    /// itself, so a missing translation degrades to something readable
    /// rather than an error.
    #[must_use]
    pub fn translate(&self, key: &str) -> String {
        self.catalog
            .get(&self.tag)
            .and_then(|messages| messages.get(key))
            .or_else(|| self.catalog.get(&self.default_locale).and_then(|messages| messages.get(key)))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// Negotiates a [`Locale`] per request and loads the message catalog once
/// at startup.
#[derive(Clone)]
pub struct I18n {
    supported: Vec<String>,
    default_locale: String,
    catalog: Arc<Catalog>,
}

impl I18n {
    /// Build from configuration, with the built-in default message catalog.
    #[must_use]
    pub fn new(config: &I18nConfig) -> Self {
        Self::with_catalog(config, default_catalog())
    }

    /// Build from configuration with a caller-supplied catalog, e.g. loaded
    /// from embedded translation files.
    #[must_use]
    pub fn with_catalog(config: &I18nConfig, catalog: Catalog) -> Self {
        let mut supported = config.supported_locales.clone();
        if !supported.iter().any(|l| l == &config.default_locale) {
            supported.push(config.default_locale.clone());
        }
        Self {
            supported,
            default_locale: config.default_locale.clone(),
            catalog: Arc::new(catalog),
        }
    }

    /// Parse an `Accept-Language` header and pick the best-matching
    /// supported locale.
    ///
    /// Entries are `q`-weighted per RFC 7231 (missing `q` defaults to
    /// `1.0`); unparsable entries are skipped rather than rejected. Falls
    /// back to the configured default when nothing matches.
    #[must_use]
    pub fn negotiate(&self, accept_language: Option<&str>) -> Locale {
        let tag = accept_language
            .map(parse_accept_language)
            .and_then(|ranked| self.best_match(&ranked))
            .unwrap_or_else(|| self.default_locale.clone());

        Locale {
            tag,
            catalog: self.catalog.clone(),
            default_locale: self.default_locale.clone(),
        }
    }

    fn best_match(&self, ranked: &[(String, f32)]) -> Option<String> {
        ranked.iter().find_map(|(tag, _)| {
            let primary = tag.split('-').next().unwrap_or(tag);
            self.supported
                .iter()
                .find(|s| s.eq_ignore_ascii_case(tag) || s.eq_ignore_ascii_case(primary))
                .cloned()
        })
    }

    /// Axum middleware entry point: negotiates a locale and inserts it into
    /// the request extensions.
    pub async fn middleware(State(i18n): State<Self>, mut request: Request<Body>, next: Next) -> Response {
        let accept_language = request
            .headers()
            .get(axum::http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let locale = i18n.negotiate(accept_language.as_deref());
        request.extensions_mut().insert(locale);

        next.run(request).await
    }
}

/// Parse an `Accept-Language` header value into `(tag, q)` pairs sorted by
/// descending quality.
fn parse_accept_language(header: &str) -> Vec<(String, f32)> {
    let mut ranked: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim().to_string();
            if tag == "*" {
                return None;
            }
            let q = parts
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((tag, q))
        })
        .collect();

    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

fn default_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    let mut en = HashMap::new();
    en.insert("error.unauthorized".to_string(), "Authentication required".to_string());
    en.insert("error.rate_limited".to_string(), "Too many requests".to_string());
    en.insert("error.not_found".to_string(), "Not found".to_string());
    catalog.insert("en".to_string(), en);
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(locales: &[&str]) -> I18nConfig {
        I18nConfig {
            enabled: true,
            default_locale: "en".to_string(),
            supported_locales: locales.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn negotiates_exact_match() {
        let i18n = I18n::new(&config(&["en", "fr"]));
        let locale = i18n.negotiate(Some("fr-FR,fr;q=0.9,en;q=0.8"));
        assert_eq!(locale.tag(), "fr");
    }

    #[test]
    fn falls_back_to_primary_subtag() {
        let i18n = I18n::new(&config(&["en", "fr"]));
        let locale = i18n.negotiate(Some("fr-CA"));
        assert_eq!(locale.tag(), "fr");
    }

    #[test]
    fn falls_back_to_default_when_unsupported() {
        let i18n = I18n::new(&config(&["en"]));
        let locale = i18n.negotiate(Some("de-DE,de;q=0.9"));
        assert_eq!(locale.tag(), "en");
    }

    #[test]
    fn missing_header_uses_default() {
        let i18n = I18n::new(&config(&["en"]));
        let locale = i18n.negotiate(None);
        assert_eq!(locale.tag(), "en");
    }

    #[test]
    fn translate_falls_back_to_key_when_missing() {
        let i18n = I18n::new(&config(&["en"]));
        let locale = i18n.negotiate(Some("en"));
        assert_eq!(locale.translate("error.unauthorized"), "Authentication required");
        assert_eq!(locale.translate("no.such.key"), "no.such.key");
    }
}
