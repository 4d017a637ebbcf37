//! Proxy URL rewriting.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;

/// Everything except RFC 3986 unreserved characters gets encoded.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How a proxy expects the target URL to be passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// `{base}{target path}`: a reverse proxy mounted in front of the API host
    Path,
    /// `{base}{percent-encoded target}`: a generic CORS relay
    Query,
}

/// One configured CORS proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    base: String,
    has_path_segment: bool,
    has_query: bool,
}

impl ProxyEndpoint {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let (has_path_segment, has_query) = match Url::parse(&base) {
            Ok(url) => (
                url.path_segments()
                    .map(|mut segs| segs.any(|s| !s.is_empty()))
                    .unwrap_or(false),
                url.query().is_some(),
            ),
            Err(_) => (false, base.contains('?')),
        };
        Self {
            base,
            has_path_segment,
            has_query,
        }
    }

    /// The base URL as configured; also the health-store key.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn path_shaped(&self) -> bool {
        self.has_path_segment && !self.has_query && !self.base.ends_with('=')
    }

    /// Rewriting mode used for a target on the given API origin.
    pub fn mode_for(&self, target: &str, api_origin: &str) -> ProxyMode {
        if self.path_shaped() && api_relative(target, api_origin).is_some() {
            ProxyMode::Path
        } else {
            ProxyMode::Query
        }
    }

    /// Build the URL actually requested when reaching `target` through this proxy.
    pub fn wrap(&self, target: &str, api_origin: &str) -> String {
        match api_relative(target, api_origin).filter(|_| self.path_shaped()) {
            Some(rest) => format!("{}{rest}", self.base.trim_end_matches('/')),
            None => format!("{}{}", self.base, utf8_percent_encode(target, COMPONENT)),
        }
    }
}

/// Path and query of `target` when it lives on `api_origin`.
///
/// Origins are compared after URL normalization, so an explicit default port
/// or upper-case host still matches and lookalike hosts do not.
fn api_relative(target: &str, api_origin: &str) -> Option<String> {
    let target = Url::parse(target).ok()?;
    let origin = Url::parse(api_origin).ok()?.origin();
    if !origin.is_tuple() || target.origin() != origin {
        return None;
    }
    Some(match target.query() {
        Some(query) => format!("{}?{query}", target.path()),
        None => target.path().to_string(),
    })
}

/// Scheme and authority of a URL, e.g. `https://api.replicate.com`.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
