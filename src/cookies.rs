use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cookie {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) attributes: Vec<(String, Option<String>)>,
}

impl Cookie {
    pub(crate) fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attributes: Vec::new(),
        }
    }

    /// Parses one `Set-Cookie` header value.
    ///
    /// Returns `None` when the leading part is not a `name=value` pair.
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self::new(name, value.trim().trim_matches('"'));
        cookie.attributes = parts
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((key, val)) => (key.trim().to_string(), Some(val.trim().to_string())),
                None => (part.to_string(), None),
            })
            .collect();
        Some(cookie)
    }
}

/// Cookies captured during a single collection iteration, bucketed by host.
///
/// A jar is built fresh for every iteration and dropped once that iteration's
/// record is built. There is no expiry, path or domain matching: the bucket for
/// a host is whatever the last response from that host set.
#[derive(Debug, Default)]
pub(crate) struct CookieJar {
    hosts: Mutex<BTreeMap<String, Vec<Cookie>>>,
}

impl CookieJar {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces the cookie set stored for `host`.
    pub(crate) fn set_host_cookies(&self, host: &str, cookies: Vec<Cookie>) {
        self.lock().insert(host.to_string(), cookies);
    }

    pub(crate) fn cookies_for(&self, host: &str) -> Vec<Cookie> {
        self.lock().get(host).cloned().unwrap_or_default()
    }

    /// Snapshot of every bucket, in ascending host order.
    pub(crate) fn hosts(&self) -> BTreeMap<String, Vec<Cookie>> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Cookie>>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let cookies = cookie_headers
            .filter_map(|header| header.to_str().ok())
            .filter_map(Cookie::parse)
            .collect();
        self.set_host_cookies(host, cookies);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let cookies = self.cookies_for(url.host_str()?);
        if cookies.is_empty() {
            return None;
        }

        let header = cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}
