//! Directives that shape the request message: target, headers and body.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut as _, Bytes, BytesMut};
use url::form_urlencoded;

use crate::error::ConfigurationError;

/// The request target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Url(String);

impl Url {
    /// The URL as configured. It is validated when the transfer starts.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Url {
    fn from(value: &str) -> Self {
        Url(value.to_owned())
    }
}

impl From<String> for Url {
    fn from(value: String) -> Self {
        Url(value)
    }
}

impl From<&String> for Url {
    fn from(value: &String) -> Self {
        Url(value.clone())
    }
}

impl From<url::Url> for Url {
    fn from(value: url::Url) -> Self {
        Url(value.into())
    }
}

macro_rules! pairs {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            pairs: Vec<(String, String)>,
        }

        impl $name {
            /// Create from key/value pairs.
            pub fn new<I, K, V>(pairs: I) -> Self
            where
                I: IntoIterator<Item = (K, V)>,
                K: Into<String>,
                V: Into<String>,
            {
                pairs.into_iter().collect()
            }

            /// Append a pair.
            pub fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
                self.pairs.push((key.into(), value.into()));
            }

            /// True when there are no pairs.
            pub fn is_empty(&self) -> bool {
                self.pairs.is_empty()
            }

            /// Iterate over the pairs in insertion order.
            pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
                self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
            }

            /// Render as `application/x-www-form-urlencoded`.
            pub fn encode(&self) -> String {
                form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(self.iter())
                    .finish()
            }
        }

        impl<K, V> FromIterator<(K, V)> for $name
        where
            K: Into<String>,
            V: Into<String>,
        {
            fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
                Self {
                    pairs: iter
                        .into_iter()
                        .map(|(k, v)| (k.into(), v.into()))
                        .collect(),
                }
            }
        }
    };
}

pairs!(
    /// Query string parameters appended to the URL.
    Parameters
);

pairs!(
    /// A form body sent as `application/x-www-form-urlencoded`.
    Payload
);

impl Parameters {
    /// Append the parameters to `url`.
    ///
    /// Unparseable URLs get a plain `?` suffix so the transport can report them.
    pub(crate) fn apply_to(&self, url: &str) -> String {
        if self.is_empty() {
            return url.to_owned();
        }

        match url::Url::parse(url) {
            Ok(mut parsed) => {
                parsed.query_pairs_mut().extend_pairs(self.iter());
                parsed.into()
            }
            Err(_) => format!("{url}?{}", self.encode()),
        }
    }
}

/// Request headers.
///
/// Names are compared case-insensitively; inserting an existing name replaces its
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(String, String)>,
}

impl Header {
    /// An empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any prior value.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a value by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// True when no headers are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for Header
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (name, value) in iter {
            header.insert(name, value);
        }
        header
    }
}

/// A raw request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    data: Bytes,
    content_type: Option<String>,
}

impl Body {
    /// Create a body from bytes.
    pub fn new<B: Into<Bytes>>(data: B) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// Send a `Content-Type` header with the body.
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The body bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The configured content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Body::new(value)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::new(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::new(value)
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::new(value)
    }
}

/// Content of one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartContent {
    /// A plain form field.
    Text(String),
    /// In-memory file contents.
    Buffer {
        /// Bytes of the file.
        data: Bytes,
        /// File name reported to the server.
        filename: String,
    },
    /// A file read from disk when the request is prepared.
    File(PathBuf),
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    name: String,
    content: PartContent,
    content_type: Option<String>,
}

impl Part {
    /// A text field.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Text(value.into()),
            content_type: None,
        }
    }

    /// An in-memory file.
    pub fn buffer<N, D, F>(name: N, data: D, filename: F) -> Self
    where
        N: Into<String>,
        D: Into<Bytes>,
        F: Into<String>,
    {
        Self {
            name: name.into(),
            content: PartContent::Buffer {
                data: data.into(),
                filename: filename.into(),
            },
            content_type: None,
        }
    }

    /// A file on disk.
    pub fn file<N: Into<String>, P: Into<PathBuf>>(name: N, path: P) -> Self {
        Self {
            name: name.into(),
            content: PartContent::File(path.into()),
            content_type: None,
        }
    }

    /// Override the part's `Content-Type`.
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Part content.
    pub fn content(&self) -> &PartContent {
        &self.content
    }
}

/// A `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    parts: Vec<Part>,
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Multipart {
    /// Create from parts.
    pub fn new<I: IntoIterator<Item = Part>>(parts: I) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    /// Append a part.
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// The parts in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub(crate) fn boundary() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos() as u64)
            .unwrap_or_default();
        let count = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("------------------------courier{:016x}", nanos ^ (count << 32))
    }

    /// Render the body with the given boundary.
    pub(crate) fn encode(&self, boundary: &str) -> Result<Bytes, ConfigurationError> {
        let mut out = BytesMut::new();
        for part in &self.parts {
            out.put_slice(format!("--{boundary}\r\n").as_bytes());

            let (data, filename) = match &part.content {
                PartContent::Text(value) => (Bytes::from(value.clone()), None),
                PartContent::Buffer { data, filename } => (data.clone(), Some(filename.clone())),
                PartContent::File(path) => {
                    let data = std::fs::read(path).map_err(|error| {
                        ConfigurationError::MultipartFile {
                            path: path.display().to_string(),
                            message: error.to_string(),
                        }
                    })?;
                    let filename = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    (Bytes::from(data), Some(filename))
                }
            };

            match filename {
                Some(filename) => out.put_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                ),
                None => out.put_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name)
                        .as_bytes(),
                ),
            }

            if let Some(content_type) = &part.content_type {
                out.put_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }

            out.put_slice(b"\r\n");
            out.put_slice(&data);
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("--{boundary}--\r\n").as_bytes());
        Ok(out.freeze())
    }
}

impl FromIterator<Part> for Multipart {
    fn from_iter<I: IntoIterator<Item = Part>>(iter: I) -> Self {
        Multipart::new(iter)
    }
}

/// HTTP Basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Authentication {
    username: String,
    password: String,
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Authentication {
    /// Basic credentials.
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub(crate) fn header_value(&self) -> String {
        basic_auth(&self.username, &self.password)
    }
}

pub(crate) fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// A bearer token sent in the `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Bearer(String);

impl fmt::Debug for Bearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Bearer").field(&"..").finish()
    }
}

impl Bearer {
    /// Wrap a token.
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    pub(crate) fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

/// The `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent(pub String);

impl From<&str> for UserAgent {
    fn from(value: &str) -> Self {
        UserAgent(value.to_owned())
    }
}

impl From<String> for UserAgent {
    fn from(value: String) -> Self {
        UserAgent(value)
    }
}

/// Content encodings to negotiate.
///
/// By default the transport advertises and transparently decodes gzip, deflate and
/// brotli. An explicit list is sent verbatim; [`AcceptEncoding::disabled`] turns
/// negotiation and decoding off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptEncoding {
    encodings: Vec<String>,
    decompress: bool,
}

impl Default for AcceptEncoding {
    fn default() -> Self {
        Self {
            encodings: Vec::new(),
            decompress: true,
        }
    }
}

impl AcceptEncoding {
    /// Advertise exactly these encodings.
    pub fn new<I, S>(encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encodings: encodings.into_iter().map(Into::into).collect(),
            decompress: true,
        }
    }

    /// Do not negotiate or decode content encodings.
    pub fn disabled() -> Self {
        Self {
            encodings: Vec::new(),
            decompress: false,
        }
    }

    pub(crate) fn decompress(&self) -> bool {
        self.decompress
    }

    pub(crate) fn header_value(&self) -> Option<String> {
        if self.encodings.is_empty() {
            None
        } else {
            Some(self.encodings.join(", "))
        }
    }
}

/// A single byte range. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// First byte, or `None` for a suffix range.
    pub start: Option<u64>,
    /// Last byte inclusive, or `None` for "to the end".
    pub end: Option<u64>,
}

impl Range {
    /// Create a range.
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        Self { start, end }
    }

    fn spec(&self) -> String {
        match (self.start, self.end) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            (Some(start), None) => format!("{start}-"),
            (None, Some(end)) => format!("-{end}"),
            (None, None) => "0-".to_owned(),
        }
    }

    pub(crate) fn header_value(&self) -> String {
        format!("bytes={}", self.spec())
    }
}

/// Several byte ranges in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiRange(pub Vec<Range>);

impl MultiRange {
    pub(crate) fn header_value(&self) -> String {
        let specs: Vec<_> = self.0.iter().map(Range::spec).collect();
        format!("bytes={}", specs.join(", "))
    }
}

/// Initial capacity of the response text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveSize(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_extend_existing_query() {
        let params = Parameters::new([("q", "a b"), ("page", "2")]);
        assert_eq!(
            params.apply_to("http://example.com/search?x=1"),
            "http://example.com/search?x=1&q=a+b&page=2"
        );
        assert_eq!(Parameters::default().apply_to("http://h/"), "http://h/");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let mut header: Header = [("Accept", "text/plain")].into_iter().collect();
        header.insert("accept", "application/json");
        assert_eq!(header.iter().count(), 1);
        assert_eq!(header.get("ACCEPT"), Some("application/json"));
    }

    #[test]
    fn basic_auth_encodes() {
        let auth = Authentication::new("user", "pass");
        assert_eq!(auth.header_value(), "Basic dXNlcjpwYXNz");
        assert!(!format!("{auth:?}").contains("pass\""));
    }

    #[test]
    fn ranges_render() {
        assert_eq!(Range::new(Some(0), Some(99)).header_value(), "bytes=0-99");
        assert_eq!(Range::new(None, Some(500)).header_value(), "bytes=-500");
        let multi = MultiRange(vec![Range::new(Some(0), Some(1)), Range::new(Some(5), None)]);
        assert_eq!(multi.header_value(), "bytes=0-1, 5-");
    }

    #[test]
    fn multipart_layout() {
        let multipart = Multipart::new([
            Part::text("field", "value"),
            Part::buffer("upload", "abc", "a.txt").with_content_type("text/plain"),
        ]);
        let body = multipart.encode("XYZ").unwrap();
        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\nabc\r\n\
            --XYZ--\r\n";
        assert_eq!(body, expected.as_bytes());
    }

    #[test]
    fn missing_multipart_file_is_a_configuration_error() {
        let multipart = Multipart::new([Part::file("f", "/nonexistent/courier/file")]);
        assert!(matches!(
            multipart.encode("b"),
            Err(ConfigurationError::MultipartFile { .. })
        ));
    }

    #[test]
    fn boundaries_differ() {
        assert_ne!(Multipart::boundary(), Multipart::boundary());
    }
}
