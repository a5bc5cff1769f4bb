//! Cookies sent with requests and parsed from `Set-Cookie` response headers.

use std::fmt;

use http::HeaderMap;
use url::form_urlencoded;

/// A single cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// `Domain` attribute.
    pub domain: Option<String>,
    /// `Path` attribute.
    pub path: Option<String>,
    /// `Expires` attribute, verbatim.
    pub expires: Option<String>,
    /// `Max-Age` attribute in seconds.
    pub max_age: Option<i64>,
    /// `Secure` attribute.
    pub secure: bool,
    /// `HttpOnly` attribute.
    pub http_only: bool,
}

impl Cookie {
    /// Create a cookie with only a name and value.
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Parse one `Set-Cookie` header value.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim().trim_matches('"'));
        for attribute in parts {
            let (key, value) = match attribute.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (attribute.trim(), None),
            };

            match (key.to_ascii_lowercase().as_str(), value) {
                ("domain", Some(value)) => {
                    cookie.domain = Some(value.trim_start_matches('.').to_owned())
                }
                ("path", Some(value)) => cookie.path = Some(value.to_owned()),
                ("expires", Some(value)) => cookie.expires = Some(value.to_owned()),
                ("max-age", Some(value)) => cookie.max_age = value.parse().ok(),
                ("secure", _) => cookie.secure = true,
                ("httponly", _) => cookie.http_only = true,
                _ => {}
            }
        }

        Some(cookie)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// An ordered collection of cookies.
///
/// As a request directive the cookies are sent in a single `Cookie` header. Values
/// are percent-encoded unless encoding is disabled with [`Cookies::raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookies {
    cookies: Vec<Cookie>,
    encode: bool,
}

impl Default for Cookies {
    fn default() -> Self {
        Self {
            cookies: Vec::new(),
            encode: true,
        }
    }
}

impl Cookies {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send values verbatim instead of percent-encoding them.
    pub fn raw(mut self) -> Self {
        self.encode = false;
        self
    }

    /// Add a cookie.
    pub fn push(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    /// Look up a cookie value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value.as_str())
    }

    /// Iterate over the cookies in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cookie> {
        self.cookies.iter()
    }

    /// Number of cookies.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// True when there are no cookies.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Collect all `Set-Cookie` headers of a response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
            .collect()
    }

    /// Render the `Cookie` request header value.
    pub(crate) fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|cookie| {
                if self.encode {
                    let value: String =
                        form_urlencoded::byte_serialize(cookie.value.as_bytes()).collect();
                    format!("{}={}", cookie.name, value)
                } else {
                    cookie.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl FromIterator<Cookie> for Cookies {
    fn from_iter<I: IntoIterator<Item = Cookie>>(iter: I) -> Self {
        Self {
            cookies: iter.into_iter().collect(),
            encode: true,
        }
    }
}

impl<N, V> FromIterator<(N, V)> for Cookies
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(name, value)| Cookie::new(name, value))
            .collect()
    }
}

impl<'c> IntoIterator for &'c Cookies {
    type Item = &'c Cookie;
    type IntoIter = std::slice::Iter<'c, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.cookies.iter()
    }
}
