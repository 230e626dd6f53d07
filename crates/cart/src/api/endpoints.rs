//! Endpoint candidates for cart mutations.
//!
//! The cart backend only fixes `GET /` and `POST /add`. The routes for
//! updating, removing, and clearing have varied between deployments, so each
//! of those operations carries an ordered list of `(method, path)`
//! candidates. The client tries them in order and stops at the first 2xx.
//! This is a compatibility shim: once a deployment's contract is known,
//! configure a single candidate per operation.
//!
//! Path templates may contain `{cartItemId}` and `{productId}`, which are
//! substituted (percent-encoded) before the request is sent.

use std::fmt;
use std::str::FromStr;

use grocer_core::{CartItemId, ProductId};
use reqwest::Method;
use thiserror::Error;

/// Placeholder for the server-assigned cart row id.
const CART_ITEM_ID_PLACEHOLDER: &str = "{cartItemId}";

/// Placeholder for the catalog product id.
const PRODUCT_ID_PLACEHOLDER: &str = "{productId}";

/// Cart operations, used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Add,
    Update,
    Remove,
    Clear,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "list",
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Clear => "clear",
        })
    }
}

/// Error parsing an endpoint candidate from configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("expected `METHOD /path`, got `{0}`")]
    Malformed(String),
    #[error("unsupported HTTP method `{0}`")]
    Method(String),
    #[error("path must start with `/`, got `{0}`")]
    Path(String),
}

/// One `(method, path)` pair to try for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    /// HTTP method.
    pub method: Method,
    /// Path template relative to the cart API base URL.
    pub path: String,
}

impl EndpointCandidate {
    /// Create a candidate from a method and path template.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// Substitute placeholders in the path template.
    #[must_use]
    pub fn render(&self, cart_item_id: Option<&CartItemId>, product_id: Option<&ProductId>) -> String {
        let mut path = self.path.clone();
        if let Some(id) = cart_item_id {
            path = path.replace(CART_ITEM_ID_PLACEHOLDER, &urlencoding::encode(id.as_str()));
        }
        if let Some(id) = product_id {
            path = path.replace(PRODUCT_ID_PLACEHOLDER, &urlencoding::encode(id.as_str()));
        }
        path
    }

    /// Whether the path addresses the server-side cart row.
    #[must_use]
    pub fn requires_cart_item_id(&self) -> bool {
        self.path.contains(CART_ITEM_ID_PLACEHOLDER)
    }

    /// Whether the request should carry a JSON body.
    ///
    /// DELETE requests go out bare; some servers reject a body on DELETE.
    #[must_use]
    pub fn sends_body(&self) -> bool {
        self.method != Method::DELETE
    }
}

impl fmt::Display for EndpointCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl FromStr for EndpointCandidate {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(method), Some(path), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(EndpointParseError::Malformed(s.trim().to_string()));
        };

        let method = match method.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "PATCH" => Method::PATCH,
            "DELETE" => Method::DELETE,
            _ => return Err(EndpointParseError::Method(method.to_string())),
        };

        if !path.starts_with('/') {
            return Err(EndpointParseError::Path(path.to_string()));
        }

        Ok(Self::new(method, path))
    }
}

/// Parse a comma-separated candidate list such as `PUT /{cartItemId}, POST /update`.
///
/// # Errors
///
/// Returns the first entry that fails to parse. An empty list is rejected.
pub fn parse_candidates(list: &str) -> Result<Vec<EndpointCandidate>, EndpointParseError> {
    let candidates = list
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if candidates.is_empty() {
        return Err(EndpointParseError::Malformed(list.to_string()));
    }
    Ok(candidates)
}

/// Candidate lists for the operations without a fixed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidates {
    pub update: Vec<EndpointCandidate>,
    pub remove: Vec<EndpointCandidate>,
    pub clear: Vec<EndpointCandidate>,
}

impl EndpointCandidates {
    /// Candidates for an operation. `List` and `Add` have fixed routes and
    /// return an empty slice.
    #[must_use]
    pub fn for_operation(&self, operation: Operation) -> &[EndpointCandidate] {
        match operation {
            Operation::Update => &self.update,
            Operation::Remove => &self.remove,
            Operation::Clear => &self.clear,
            Operation::List | Operation::Add => &[],
        }
    }
}

impl Default for EndpointCandidates {
    fn default() -> Self {
        Self {
            update: vec![
                EndpointCandidate::new(Method::PUT, "/{cartItemId}"),
                EndpointCandidate::new(Method::PATCH, "/{cartItemId}"),
                EndpointCandidate::new(Method::PUT, "/update/{cartItemId}"),
                EndpointCandidate::new(Method::POST, "/update"),
            ],
            remove: vec![
                EndpointCandidate::new(Method::DELETE, "/{cartItemId}"),
                EndpointCandidate::new(Method::DELETE, "/remove/{cartItemId}"),
                EndpointCandidate::new(Method::POST, "/remove"),
            ],
            clear: vec![
                EndpointCandidate::new(Method::DELETE, "/"),
                EndpointCandidate::new(Method::DELETE, "/clear"),
                EndpointCandidate::new(Method::POST, "/clear"),
            ],
        }
    }
}
