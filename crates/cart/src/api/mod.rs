//! Remote Cart API client.
//!
//! # Routes
//!
//! - `GET /` - list the cart
//! - `POST /add` - add a product (`{productId, quantity}`)
//! - update, remove, clear - no fixed route; see [`endpoints`]
//!
//! All routes are relative to [`CartApiConfig::base_url`] and carry the
//! caller's bearer token.

mod endpoints;

pub use endpoints::{
    EndpointCandidate, EndpointCandidates, EndpointParseError, Operation, parse_candidates,
};

use std::future::Future;
use std::sync::Arc;

use grocer_core::{CartItemId, ProductId, Quantity};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, error, instrument};

use crate::config::CartApiConfig;
use crate::conversions::extract_raw_items;
use crate::error::CartError;

/// Longest slice of an error body kept in [`CartError::Api`].
const ERROR_BODY_LIMIT: usize = 200;

/// Operations the cart store needs from the backend.
///
/// `list` returns raw lines; the store normalizes them.
pub trait CartApi: Send + Sync + 'static {
    /// Fetch every line in the caller's cart.
    fn list(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<Vec<Value>, CartError>> + Send;

    /// Add `quantity` units of a product.
    fn add(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Set the quantity of an existing line.
    fn update_quantity(
        &self,
        token: &SecretString,
        cart_item_id: Option<&CartItemId>,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Delete one line, addressed by its server-side id.
    fn remove(
        &self,
        token: &SecretString,
        cart_item_id: &CartItemId,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), CartError>> + Send;

    /// Delete every line.
    fn clear(&self, token: &SecretString) -> impl Future<Output = Result<(), CartError>> + Send;
}

// =============================================================================
// HttpCartApi
// =============================================================================

/// `reqwest`-backed [`CartApi`].
#[derive(Clone)]
pub struct HttpCartApi {
    inner: Arc<HttpCartApiInner>,
}

struct HttpCartApiInner {
    client: reqwest::Client,
    config: CartApiConfig,
}

impl HttpCartApi {
    /// Create a new cart API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: CartApiConfig) -> Result<Self, CartError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            inner: Arc::new(HttpCartApiInner { client, config }),
        })
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &CartApiConfig {
        &self.inner.config
    }

    /// Send one request and map non-success statuses to errors.
    async fn send(
        &self,
        token: &SecretString,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, CartError> {
        let url = self.inner.config.url_for(path);
        let mut request = self
            .inner
            .client
            .request(method, &url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        Err(parse_error(response).await)
    }

    /// Try each candidate in order until one succeeds.
    ///
    /// Auth and rate-limit failures stop the probe: they would fail the same
    /// way on every other route.
    async fn probe(
        &self,
        token: &SecretString,
        operation: Operation,
        cart_item_id: Option<&CartItemId>,
        product_id: Option<&ProductId>,
        body: &Value,
    ) -> Result<(), CartError> {
        let mut last_error = None;

        for candidate in self.inner.config.endpoints.for_operation(operation) {
            if candidate.requires_cart_item_id() && cart_item_id.is_none() {
                debug!(%operation, %candidate, "Skipping candidate that needs a cart item id");
                continue;
            }

            let path = candidate.render(cart_item_id, product_id);
            let payload = candidate.sends_body().then_some(body);

            match self
                .send(token, candidate.method.clone(), &path, payload)
                .await
            {
                Ok(_) => {
                    debug!(%operation, %candidate, "Cart endpoint accepted request");
                    return Ok(());
                }
                Err(e @ (CartError::Unauthorized | CartError::RateLimited(_))) => return Err(e),
                Err(e) => {
                    debug!(%operation, %candidate, error = %e, "Cart endpoint candidate failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last_error) => {
                error!(%operation, error = %last_error, "All cart endpoint candidates failed");
                Err(CartError::EndpointsExhausted {
                    operation,
                    last_error: Box::new(last_error),
                })
            }
            None => Err(CartError::NoUsableEndpoint(operation)),
        }
    }
}

impl CartApi for HttpCartApi {
    #[instrument(skip_all)]
    async fn list(&self, token: &SecretString) -> Result<Vec<Value>, CartError> {
        let response = self.send(token, Method::GET, "/", None).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| CartError::Parse(format!("Failed to parse cart: {e}")))?;

        let items = extract_raw_items(body);
        debug!(lines = items.len(), "Fetched cart");
        Ok(items)
    }

    #[instrument(skip(self, token), fields(product_id = %product_id, quantity = %quantity))]
    async fn add(
        &self,
        token: &SecretString,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError> {
        let body = json!({ "productId": product_id, "quantity": quantity });
        self.send(token, Method::POST, "/add", Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id, quantity = %quantity))]
    async fn update_quantity(
        &self,
        token: &SecretString,
        cart_item_id: Option<&CartItemId>,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<(), CartError> {
        let body = json!({
            "quantity": quantity,
            "productId": product_id,
            "cartItemId": cart_item_id,
        });
        self.probe(
            token,
            Operation::Update,
            cart_item_id,
            Some(product_id),
            &body,
        )
        .await
    }

    #[instrument(skip(self, token), fields(cart_item_id = %cart_item_id))]
    async fn remove(
        &self,
        token: &SecretString,
        cart_item_id: &CartItemId,
        product_id: &ProductId,
    ) -> Result<(), CartError> {
        let body = json!({ "cartItemId": cart_item_id, "productId": product_id });
        self.probe(
            token,
            Operation::Remove,
            Some(cart_item_id),
            Some(product_id),
            &body,
        )
        .await
    }

    #[instrument(skip_all)]
    async fn clear(&self, token: &SecretString) -> Result<(), CartError> {
        self.probe(token, Operation::Clear, None, None, &json!({}))
            .await
    }
}

impl std::fmt::Debug for HttpCartApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartApi")
            .field("base_url", &self.inner.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Map a non-success response to a [`CartError`].
async fn parse_error(response: reqwest::Response) -> CartError {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        return CartError::RateLimited(retry_after);
    }

    if status == 401 || status == 403 {
        return CartError::Unauthorized;
    }

    let message = response
        .text()
        .await
        .map(|body| body.chars().take(ERROR_BODY_LIMIT).collect::<String>())
        .unwrap_or_else(|_| "Unknown error".to_string());

    CartError::Api { status, message }
}
