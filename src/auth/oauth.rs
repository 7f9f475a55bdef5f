//! Social sign-in redirect links
//!
//! The console starts OAuth at `{api_prefix}/oauth/login/{provider}`. When the
//! sign-in page was opened from a workspace invitation, the invite token and
//! everything else in the page's query string must survive the redirect.

use std::fmt;

/// Query parameter that marks a sign-in as an invitation acceptance
pub const INVITE_TOKEN_PARAM: &str = "invite_token";

/// Provider used by the sign-in page when none is given
pub const DEFAULT_PROVIDER: &str = "galaxy";

/// Ordered query-string parameters, duplicates kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    /// Parse a raw query string, with or without its leading `?`
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for SearchParams {
    /// Form-urlencoded, in insertion order
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        f.write_str(&encoded)
    }
}

/// Strip leading script-capable schemes from an href
///
/// Only a scheme at the start counts; the rest of the href is left untouched.
pub fn purify_href(href: &str) -> String {
    const SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

    let mut rest = href.trim_start();
    while let Some(scheme) = SCHEMES.iter().find(|scheme| {
        rest.get(..scheme.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
    }) {
        rest = rest[scheme.len()..].trim_start();
    }
    if rest.len() == href.trim_start().len() {
        return href.to_string();
    }
    rest.to_string()
}

/// Path of the login route for a provider
pub fn login_path(provider: &str) -> String {
    format!("/oauth/login/{}", provider)
}

/// Build the redirect URL for a social sign-in button.
///
/// The current query string is forwarded only when it carries an invite
/// token; otherwise the link has no query string at all.
pub fn oauth_link(api_prefix: &str, href: &str, current: &SearchParams) -> String {
    let url = purify_href(&format!("{}{}", api_prefix, href));
    if current.has(INVITE_TOKEN_PARAM) {
        return format!("{}?{}", url, current);
    }
    url
}
