//! Request descriptors as seen by the interception layer.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

/// What the page intends to do with the response.
///
/// Only `Document` (a top-level navigation) is eligible for the app-shell fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Style,
    Script,
    Font,
    Image,
    Manifest,
    #[default]
    Empty,
}

/// An outgoing request from the page.
///
/// The fragment is stripped on construction; it never reaches the network and
/// never takes part in cache matching.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub destination: Destination,
}

impl Request {
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method, url, headers: HeaderMap::new(), destination: Destination::Empty }
    }

    /// A plain GET, as issued by `fetch(url)`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    /// Same scheme, host and port as `other`.
    pub fn is_same_origin(&self, other: &Url) -> bool {
        self.url.origin() == other.origin()
    }
}
