use anyhow::Result;
pub use http::Method;
use regex::Regex;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRouteMatch {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub method: Option<Method>,
}

#[derive(Clone, Debug)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

#[derive(Clone, Debug)]
pub enum HeaderMatch {
    Exact(String, String),
    Regex(String, Regex),
}

// === impl PathMatch ===

impl PartialEq for PathMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(l0), Self::Exact(r0)) => l0 == r0,
            (Self::Prefix(l0), Self::Prefix(r0)) => l0 == r0,
            (Self::Regex(l0), Self::Regex(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}

impl Eq for PathMatch {}

impl PathMatch {
    pub fn regex(s: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(s)?))
    }
}

// === impl HeaderMatch ===

impl PartialEq for HeaderMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(n0, v0), Self::Exact(n1, v1)) => n0 == n1 && v0 == v1,
            (Self::Regex(n0, r0), Self::Regex(n1, r1)) => n0 == n1 && r0.as_str() == r1.as_str(),
            _ => false,
        }
    }
}

impl Eq for HeaderMatch {}

impl HeaderMatch {
    pub fn regex(name: impl ToString, s: &str) -> Result<Self> {
        Ok(Self::Regex(name.to_string(), Regex::new(s)?))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Exact(name, _) | Self::Regex(name, _) => name,
        }
    }
}

// === hostnames ===

/// Returns true if two hostnames, either of which may be a `*.` wildcard, can match a common
/// request authority.
pub fn hostnames_intersect(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }

    match (a.strip_prefix("*."), b.strip_prefix("*.")) {
        (Some(sa), Some(sb)) => wildcard_covers(sa, sb) || wildcard_covers(sb, sa),
        (Some(sa), None) => wildcard_covers(b, sa),
        (None, Some(sb)) => wildcard_covers(a, sb),
        (None, None) => false,
    }
}

/// Of two intersecting hostnames, returns the one that matches fewer authorities.
pub fn narrowest<'h>(a: &'h str, b: &'h str) -> &'h str {
    match (a.starts_with("*."), b.starts_with("*.")) {
        (true, false) => b,
        (false, true) => a,
        (true, true) if b.len() > a.len() => b,
        _ => a,
    }
}

/// Computes the hostnames a route serves through a listener.
///
/// Returns `None` when the route's hostnames are disjoint from the listener's. An empty list means
/// the route is reachable for any authority.
pub fn effective_hostnames(listener: Option<&str>, route: &[String]) -> Option<Vec<String>> {
    let Some(listener) = listener else {
        return Some(route.to_vec());
    };

    if route.is_empty() {
        return Some(vec![listener.to_string()]);
    }

    let mut hostnames = route
        .iter()
        .filter(|h| hostnames_intersect(listener, h))
        .map(|h| narrowest(listener, h).to_string())
        .collect::<Vec<_>>();
    if hostnames.is_empty() {
        return None;
    }
    hostnames.sort();
    hostnames.dedup();
    Some(hostnames)
}

fn wildcard_covers(host: &str, suffix: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let suffix = suffix.to_ascii_lowercase();
    host.len() > suffix.len() + 1 && host.ends_with(&format!(".{suffix}"))
}
