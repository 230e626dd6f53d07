//! Integration tests for the grocer cart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p grocer-integration-tests
//! ```
//!
//! The tests need no external services: [`MockCartServer`] serves a
//! Cart API on an ephemeral localhost port with `axum`.
//!
//! # Mock Routes
//!
//! All under `/api/cart`, all requiring `Authorization: Bearer <token>`.
//! Each token has its own cart, so switching tokens switches users.
//!
//! - `GET /` - list (`{"items": [...]}` with populated `product` objects)
//! - `POST /add` - `{productId, quantity}`
//! - `PATCH /items/{id}` - `{quantity}`
//! - `DELETE /items/{id}`
//! - `POST /clear`
//!
//! Anything else is a 404, which is what the endpoint probe has to get past.
//! The token `expired` is always rejected with 401.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use grocer_cart::api::parse_candidates;
use grocer_cart::{AuthProvider, AuthSession, CartApiConfig, CartStore, HttpCartApi};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

/// Token the mock always rejects.
pub const EXPIRED_TOKEN: &str = "expired";

/// One line in a mock cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLine {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Default)]
struct MockState {
    carts: HashMap<String, Vec<MockLine>>,
    hits: Vec<String>,
    failing: bool,
    extra_raw: Vec<Value>,
    next_id: u32,
}

type Shared = Arc<Mutex<MockState>>;

/// In-process Cart API.
pub struct MockCartServer {
    base_url: Url,
    state: Shared,
}

impl MockCartServer {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind.
    pub async fn start() -> Self {
        let state: Shared = Arc::default();

        let app = Router::new()
            .route("/api/cart", get(list_cart))
            .route("/api/cart/", get(list_cart))
            .route("/api/cart/add", post(add_line))
            .route("/api/cart/items/{id}", patch(update_line).delete(remove_line))
            .route("/api/cart/clear", post(clear_cart))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(middleware::from_fn_with_state(state.clone(), record_hit))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock cart server");
        let addr = listener.local_addr().expect("Listener has an address");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Mock cart server failed");
        });

        let base_url = Url::parse(&format!("http://{addr}/api/cart")).expect("Valid mock URL");
        Self { base_url, state }
    }

    /// Base URL to put in [`CartApiConfig`].
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Configuration pointing at this server, with a short resync delay.
    ///
    /// Update and remove candidates start with a route the mock does not
    /// serve, so every mutation exercises the probe.
    ///
    /// # Panics
    ///
    /// Panics if the built-in candidate lists fail to parse.
    #[must_use]
    pub fn config(&self) -> CartApiConfig {
        let mut config = CartApiConfig::new(self.base_url.clone());
        config.resync_delay = Duration::from_millis(50);
        config.timeout = Duration::from_secs(5);
        config.endpoints.update = parse_candidates("PUT /{cartItemId}, PATCH /items/{cartItemId}")
            .expect("valid update candidates");
        config.endpoints.remove =
            parse_candidates("DELETE /{cartItemId}, DELETE /items/{cartItemId}")
                .expect("valid remove candidates");
        config
    }

    /// Replace a user's cart.
    pub fn set_lines(&self, token: &str, lines: &[(&str, &str, u32)]) {
        let lines = lines
            .iter()
            .map(|(id, product_id, quantity)| MockLine {
                id: (*id).to_string(),
                product_id: (*product_id).to_string(),
                quantity: *quantity,
            })
            .collect();
        self.lock().carts.insert(token.to_string(), lines);
    }

    /// Raw items appended verbatim to every list response.
    pub fn push_raw(&self, raw: Value) {
        self.lock().extra_raw.push(raw);
    }

    /// A user's cart as the server sees it.
    #[must_use]
    pub fn lines(&self, token: &str) -> Vec<MockLine> {
        self.lock().carts.get(token).cloned().unwrap_or_default()
    }

    /// Make every mutation (update, remove, clear) fail with 500.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Every request received, as `METHOD /path`.
    #[must_use]
    pub fn hits(&self) -> Vec<String> {
        self.lock().hits.clone()
    }

    /// Number of list requests received.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.hits()
            .iter()
            .filter(|hit| matches!(hit.as_str(), "GET /api/cart" | "GET /api/cart/"))
            .count()
    }

    /// Forget recorded hits.
    pub fn reset_hits(&self) {
        self.lock().hits.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build a store authenticated with `token` as `user_id`.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn store_for(
    config: CartApiConfig,
    token: &str,
    user_id: &str,
) -> (CartStore<HttpCartApi>, Arc<AuthSession>) {
    let auth = Arc::new(AuthSession::logged_in(
        SecretString::from(token.to_string()),
        json!({ "_id": user_id }),
    ));
    let provider: Arc<dyn AuthProvider> = auth.clone();
    let resync_delay = config.resync_delay;
    let api = HttpCartApi::new(config).expect("HTTP client builds");
    (CartStore::new(api, provider, resync_delay), auth)
}

// =============================================================================
// Handlers
// =============================================================================

async fn record_hit(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let hit = format!("{} {}", request.method(), request.uri().path());
    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .hits
        .push(hit);
    next.run(request).await
}

fn bearer(headers: &HeaderMap) -> Result<String, StatusCode> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if token == EXPIRED_TOKEN {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(token.to_string())
}

fn line_json(line: &MockLine) -> Value {
    json!({
        "_id": line.id,
        "product": {
            "_id": line.product_id,
            "name": format!("Product {}", line.product_id),
            "price": 2.5,
        },
        "quantity": line.quantity,
    })
}

async fn list_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(status) => return status.into_response(),
    };
    let state = state.lock().unwrap_or_else(PoisonError::into_inner);
    let mut items: Vec<Value> = state
        .carts
        .get(&token)
        .map(|lines| lines.iter().map(line_json).collect())
        .unwrap_or_default();
    items.extend(state.extra_raw.iter().cloned());
    Json(json!({ "items": items })).into_response()
}

async fn add_line(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(status) => return status.into_response(),
    };
    let Some(product_id) = body.get("productId").and_then(Value::as_str) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let quantity = body
        .get("quantity")
        .and_then(Value::as_u64)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1);

    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    state.next_id += 1;
    let next_id = format!("line-{}", state.next_id);
    let cart = state.carts.entry(token).or_default();
    if let Some(line) = cart.iter_mut().find(|line| line.product_id == product_id) {
        line.quantity += quantity;
    } else {
        cart.push(MockLine {
            id: next_id,
            product_id: product_id.to_string(),
            quantity,
        });
    }
    StatusCode::CREATED.into_response()
}

async fn update_line(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(status) => return status.into_response(),
    };
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.failing {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let Some(quantity) = body
        .get("quantity")
        .and_then(Value::as_u64)
        .and_then(|q| u32::try_from(q).ok())
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let line = state
        .carts
        .entry(token)
        .or_default()
        .iter_mut()
        .find(|line| line.id == id);
    match line {
        Some(line) => {
            line.quantity = quantity;
            Json(line_json(line)).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn remove_line(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(status) => return status.into_response(),
    };
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.failing {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let cart = state.carts.entry(token).or_default();
    let before = cart.len();
    cart.retain(|line| line.id != id);
    if cart.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(status) => return status.into_response(),
    };
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.failing {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    state.carts.remove(&token);
    StatusCode::NO_CONTENT.into_response()
}
