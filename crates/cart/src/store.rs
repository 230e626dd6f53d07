//! Cart store.
//!
//! Holds the client-side view of the current user's cart and keeps it in
//! step with the remote Cart API:
//!
//! - `load` replaces the cart wholesale from the server.
//! - `add` asks the server, then reloads (no local insert).
//! - `update_quantity` and `remove` apply locally first, then confirm with
//!   the server; on failure they roll back and schedule a delayed reload.
//! - `clear` empties the local cart unconditionally and does its best
//!   remotely.
//!
//! Every operation checks whether the authenticated user changed since the
//! cart was last loaded; a change wipes the cart before anything else runs.
//!
//! State is published through a `watch` channel so observers see every
//! transition, including optimistic ones.

use std::sync::Arc;
use std::time::Duration;

use grocer_core::{ProductId, Quantity};
use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::CartApi;
use crate::auth::AuthProvider;
use crate::conversions::normalize_items;
use crate::error::CartError;
use crate::types::{CartItem, CartState, Product};

/// Client-side cart, synchronized against a [`CartApi`].
///
/// Cheaply cloneable; clones share state.
pub struct CartStore<A> {
    inner: Arc<CartStoreInner<A>>,
}

struct CartStoreInner<A> {
    api: A,
    auth: Arc<dyn AuthProvider>,
    state: watch::Sender<CartState>,
    resync_delay: Duration,
}

impl<A> Clone for CartStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Local cart before an optimistic change, and the revision the change produced.
struct Checkpoint {
    items: Vec<CartItem>,
    revision: u64,
}

impl<A: CartApi> CartStore<A> {
    /// Create an empty store.
    ///
    /// `resync_delay` is how long to wait before reloading after a failed
    /// optimistic mutation.
    #[must_use]
    pub fn new(api: A, auth: Arc<dyn AuthProvider>, resync_delay: Duration) -> Self {
        let (state, _) = watch::channel(CartState::default());
        Self {
            inner: Arc::new(CartStoreInner {
                api,
                auth,
                state,
                resync_delay,
            }),
        }
    }

    /// Watch the cart state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state.subscribe()
    }

    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.inner.state.borrow().clone()
    }

    /// Copy of the current cart lines.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.inner.state.borrow().items.clone()
    }

    /// Message from the last failed operation, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// The remote API this store talks to.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    // =========================================================================
    // User Tracking
    // =========================================================================

    /// Wipe the cart if the authenticated user differs from the one it was
    /// loaded for. Returns whether a change was detected.
    ///
    /// The first user observed is recorded without counting as a change.
    pub fn check_user_change(&self) -> bool {
        let current = self.inner.auth.user_id();

        let mut changed = false;
        self.inner.state.send_if_modified(|state| {
            if state.last_user_id == current {
                return false;
            }

            if state.last_user_id.is_some() {
                info!(
                    previous = ?state.last_user_id,
                    current = ?current,
                    "Authenticated user changed, wiping cart"
                );
                state.set_items(Vec::new());
                state.error = None;
                changed = true;
            }
            state.last_user_id = current;
            true
        });
        changed
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace the cart with the server's copy.
    ///
    /// Without a token the cart is cleared and nothing is requested. On
    /// failure the cart is emptied and the error recorded.
    ///
    /// # Errors
    ///
    /// Returns the remote failure, after recording it.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), CartError> {
        let Some(token) = self.inner.auth.token() else {
            debug!("No token, clearing cart instead of loading");
            self.clear_local();
            return Ok(());
        };

        self.check_user_change();
        let requested_for = self.inner.auth.user_id();
        self.inner.state.send_modify(|state| state.is_loading = true);

        let result = self.inner.api.list(&token).await;

        if self.inner.auth.user_id() != requested_for {
            debug!("User changed while loading, discarding response");
            self.inner.state.send_modify(|state| state.is_loading = false);
            return Ok(());
        }

        match result {
            Ok(raw) => {
                let items = normalize_items(&raw);
                debug!(lines = items.len(), "Cart loaded");
                self.inner.state.send_modify(|state| {
                    state.set_items(items);
                    state.is_loading = false;
                    state.error = None;
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load cart");
                self.inner.state.send_modify(|state| {
                    state.set_items(Vec::new());
                    state.is_loading = false;
                    state.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Add one unit of a product, then reload the whole cart.
    ///
    /// # Errors
    ///
    /// Returns the remote failure, after recording it. The cart is left as
    /// it was.
    #[instrument(skip_all)]
    pub async fn add(&self, product: impl Into<Product>) -> Result<(), CartError> {
        let product = product.into();
        debug!(product_id = %product.id, "Adding product to cart");
        let Some(token) = self.inner.auth.token() else {
            debug!("No token, ignoring add");
            return Ok(());
        };
        if self.check_user_change() {
            return self.load().await;
        }

        match self.inner.api.add(&token, &product.id, Quantity::ONE).await {
            Ok(()) => {
                info!(product_id = %product.id, name = ?product.name, "Added product to cart");
                self.load().await
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Change a line's quantity by `delta`.
    ///
    /// A result below 1 removes the line instead. Otherwise the new quantity
    /// is applied locally before the server confirms it.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] if the product is not in the
    /// cart, [`CartError::InvalidQuantity`] if the result would overflow, or
    /// the remote failure after rolling back.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(&self, product_id: &ProductId, delta: i64) -> Result<(), CartError> {
        let Some(token) = self.inner.auth.token() else {
            debug!("No token, ignoring quantity update");
            return Ok(());
        };
        if self.check_user_change() {
            return self.load().await;
        }

        let Some(current) = self.find(product_id) else {
            let e = CartError::ItemNotFound(product_id.clone());
            self.record_error(&e);
            return Err(e);
        };

        let quantity = match current.quantity.offset(delta) {
            Ok(Some(quantity)) => quantity,
            Ok(None) => {
                debug!(delta, "Quantity would drop below 1, removing line");
                return self.remove_with_token(&token, product_id).await;
            }
            Err(source) => {
                let e = CartError::InvalidQuantity {
                    product_id: product_id.clone(),
                    source,
                };
                self.record_error(&e);
                return Err(e);
            }
        };
        if quantity == current.quantity {
            return Ok(());
        }

        let checkpoint = self.apply_optimistic(|items| {
            if let Some(item) = items.iter_mut().find(|item| &item.product_id == product_id) {
                item.quantity = quantity;
            }
        });

        let result = self
            .inner
            .api
            .update_quantity(&token, current.cart_item_id.as_ref(), product_id, quantity)
            .await;

        self.confirm_or_revert(checkpoint, result)
    }

    /// Remove a line.
    ///
    /// The line must be known locally with a server-side id. It disappears
    /// locally before the server confirms.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ItemNotFound`] / [`CartError::MissingCartItemId`]
    /// without contacting the server, or the remote failure after rolling
    /// back.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(&self, product_id: &ProductId) -> Result<(), CartError> {
        let Some(token) = self.inner.auth.token() else {
            debug!("No token, ignoring remove");
            return Ok(());
        };
        if self.check_user_change() {
            return self.load().await;
        }

        self.remove_with_token(&token, product_id).await
    }

    /// Empty the cart.
    ///
    /// The local cart is empty when this returns, whatever the server said.
    /// If every clear route fails, lines are deleted one by one. A user
    /// switch only wipes the local cart: the new user's server cart is left
    /// alone.
    ///
    /// # Errors
    ///
    /// Never fails; remote failures are logged. The `Result` keeps the
    /// signature in line with the other operations.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CartError> {
        let Some(token) = self.inner.auth.token() else {
            debug!("No token, clearing local cart only");
            self.clear_local();
            return Ok(());
        };
        if self.check_user_change() {
            return Ok(());
        }

        let previous = self.items();
        self.clear_local();

        if let Err(e) = self.inner.api.clear(&token).await {
            warn!(error = %e, "Clear endpoints failed, removing lines individually");
            for item in &previous {
                let Some(cart_item_id) = &item.cart_item_id else {
                    continue;
                };
                if let Err(e) = self
                    .inner
                    .api
                    .remove(&token, cart_item_id, &item.product_id)
                    .await
                {
                    warn!(
                        product_id = %item.product_id,
                        error = %e,
                        "Failed to remove line while clearing cart"
                    );
                }
            }
        }

        info!(lines = previous.len(), "Cart cleared");
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn find(&self, product_id: &ProductId) -> Option<CartItem> {
        self.inner.state.borrow().get(product_id).cloned()
    }

    async fn remove_with_token(
        &self,
        token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), CartError> {
        let Some(item) = self.find(product_id) else {
            let e = CartError::ItemNotFound(product_id.clone());
            self.record_error(&e);
            return Err(e);
        };
        let Some(cart_item_id) = item.cart_item_id else {
            let e = CartError::MissingCartItemId(product_id.clone());
            self.record_error(&e);
            return Err(e);
        };

        let checkpoint =
            self.apply_optimistic(|items| items.retain(|item| &item.product_id != product_id));

        let result = self
            .inner
            .api
            .remove(token, &cart_item_id, product_id)
            .await;

        self.confirm_or_revert(checkpoint, result)
    }

    /// Apply a change to the local lines, remembering what was there before.
    fn apply_optimistic(&self, change: impl FnOnce(&mut Vec<CartItem>)) -> Checkpoint {
        let mut before = Vec::new();
        let mut revision = 0;
        self.inner.state.send_modify(|state| {
            before = state.items.clone();
            let mut items = state.items.clone();
            change(&mut items);
            state.set_items(items);
            revision = state.revision;
        });
        Checkpoint {
            items: before,
            revision,
        }
    }

    /// Settle an optimistic change once the server has answered.
    ///
    /// On failure the checkpoint is restored only if nothing else changed the
    /// cart in the meantime, and a reload is scheduled either way.
    fn confirm_or_revert(
        &self,
        checkpoint: Checkpoint,
        result: Result<(), CartError>,
    ) -> Result<(), CartError> {
        match result {
            Ok(()) => {
                self.inner.state.send_if_modified(|state| state.error.take().is_some());
                Ok(())
            }
            Err(e) => {
                self.inner.state.send_modify(|state| {
                    if state.revision == checkpoint.revision {
                        warn!(error = %e, "Remote update failed, rolling back");
                        state.set_items(checkpoint.items);
                    } else {
                        warn!(
                            error = %e,
                            "Remote update failed after newer local changes, leaving them for resync"
                        );
                    }
                    state.error = Some(e.to_string());
                });
                self.schedule_resync();
                Err(e)
            }
        }
    }

    fn record_error(&self, error: &CartError) {
        self.inner
            .state
            .send_modify(|state| state.error = Some(error.to_string()));
    }

    fn clear_local(&self) {
        self.inner.state.send_if_modified(|state| {
            if state.items.is_empty() && state.error.is_none() {
                return false;
            }
            state.set_items(Vec::new());
            state.error = None;
            true
        });
    }

    /// Reload once after the configured delay.
    fn schedule_resync(&self) {
        let store = self.clone();
        let delay = self.inner.resync_delay;
        debug!(?delay, "Scheduling cart resync");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = store.load().await {
                warn!(error = %e, "Cart resync failed");
            }
        });
    }
}

impl<A> std::fmt::Debug for CartStore<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("CartStore")
            .field("lines", &state.items.len())
            .field("last_user_id", &state.last_user_id)
            .field("resync_delay", &self.inner.resync_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use grocer_core::{CartItemId, UserId};
    use serde_json::{Value, json};
    use tokio::sync::Notify;

    use super::*;
    use crate::api::Operation;
    use crate::auth::AuthSession;

    const RESYNC: Duration = Duration::from_millis(500);

    // =========================================================================
    // In-memory Cart API
    // =========================================================================

    #[derive(Debug, Clone)]
    struct FakeLine {
        id: String,
        product: String,
        quantity: u32,
    }

    #[derive(Default)]
    struct FakeServer {
        lines: Vec<FakeLine>,
        next_id: u32,
        fail_list: bool,
        fail_add: bool,
        fail_update: bool,
        fail_remove: bool,
        fail_clear: bool,
        list_calls: u32,
        update_calls: u32,
        removed: Vec<String>,
    }

    #[derive(Default)]
    struct FakeCartApi {
        server: Mutex<FakeServer>,
        update_gate: Option<Arc<Notify>>,
    }

    fn api_error(operation: Operation) -> CartError {
        CartError::EndpointsExhausted {
            operation,
            last_error: Box::new(CartError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
        }
    }

    impl FakeCartApi {
        fn with_lines(lines: &[(&str, &str, u32)]) -> Self {
            let api = Self::default();
            {
                let mut server = api.server.lock().expect("lock");
                for (id, product, quantity) in lines {
                    server.lines.push(FakeLine {
                        id: (*id).to_string(),
                        product: (*product).to_string(),
                        quantity: *quantity,
                    });
                }
            }
            api
        }

        fn server(&self) -> std::sync::MutexGuard<'_, FakeServer> {
            self.server.lock().expect("lock")
        }
    }

    impl CartApi for FakeCartApi {
        async fn list(&self, _token: &SecretString) -> Result<Vec<Value>, CartError> {
            let mut server = self.server();
            server.list_calls += 1;
            if server.fail_list {
                return Err(CartError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(server
                .lines
                .iter()
                .map(|line| {
                    json!({
                        "_id": line.id,
                        "productId": line.product,
                        "name": format!("Product {}", line.product),
                        "price": "1.50",
                        "quantity": line.quantity,
                    })
                })
                .collect())
        }

        async fn add(
            &self,
            _token: &SecretString,
            product_id: &ProductId,
            quantity: Quantity,
        ) -> Result<(), CartError> {
            let mut server = self.server();
            if server.fail_add {
                return Err(api_error(Operation::Add));
            }
            if let Some(line) = server
                .lines
                .iter_mut()
                .find(|line| line.product == product_id.as_str())
            {
                line.quantity += quantity.get();
            } else {
                server.next_id += 1;
                let id = format!("row-{}", server.next_id);
                server.lines.push(FakeLine {
                    id,
                    product: product_id.to_string(),
                    quantity: quantity.get(),
                });
            }
            Ok(())
        }

        async fn update_quantity(
            &self,
            _token: &SecretString,
            cart_item_id: Option<&CartItemId>,
            _product_id: &ProductId,
            quantity: Quantity,
        ) -> Result<(), CartError> {
            if let Some(gate) = &self.update_gate {
                gate.notified().await;
            }
            let mut server = self.server();
            server.update_calls += 1;
            if server.fail_update {
                return Err(api_error(Operation::Update));
            }
            let id = cart_item_id.map(CartItemId::as_str);
            if let Some(line) = server.lines.iter_mut().find(|line| Some(line.id.as_str()) == id) {
                line.quantity = quantity.get();
            }
            Ok(())
        }

        async fn remove(
            &self,
            _token: &SecretString,
            cart_item_id: &CartItemId,
            _product_id: &ProductId,
        ) -> Result<(), CartError> {
            let mut server = self.server();
            if server.fail_remove {
                return Err(api_error(Operation::Remove));
            }
            server.lines.retain(|line| line.id != cart_item_id.as_str());
            server.removed.push(cart_item_id.to_string());
            Ok(())
        }

        async fn clear(&self, _token: &SecretString) -> Result<(), CartError> {
            let mut server = self.server();
            if server.fail_clear {
                return Err(api_error(Operation::Clear));
            }
            server.lines.clear();
            Ok(())
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn session(user: i64) -> Arc<AuthSession> {
        Arc::new(AuthSession::logged_in(
            SecretString::from("token"),
            json!({ "id": user }),
        ))
    }

    fn store_with(api: FakeCartApi, auth: &Arc<AuthSession>) -> CartStore<FakeCartApi> {
        let provider: Arc<dyn AuthProvider> = auth.clone();
        CartStore::new(api, provider, RESYNC)
    }

    fn quantities(store: &CartStore<FakeCartApi>) -> Vec<(String, u32)> {
        store
            .items()
            .into_iter()
            .map(|item| (item.product_id.to_string(), item.quantity.get()))
            .collect()
    }

    // =========================================================================
    // load
    // =========================================================================

    #[tokio::test]
    async fn test_load_without_token_clears() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");
        assert_eq!(store.items().len(), 1);

        auth.logout();
        store.load().await.expect("no token is not an error");
        assert!(store.items().is_empty());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_load_normalizes_and_sets_state() {
        let auth = session(1);
        let store = store_with(
            FakeCartApi::with_lines(&[("r1", "5", 2), ("r2", "7", 1)]),
            &auth,
        );

        store.load().await.expect("load");

        let state = store.snapshot();
        assert!(!state.is_loading);
        assert!(state.error.is_none());
        assert_eq!(state.last_user_id, Some(UserId::from(1)));
        assert_eq!(
            quantities(&store),
            vec![("5".to_string(), 2), ("7".to_string(), 1)]
        );
        let first = state.items.first().expect("two lines");
        assert_eq!(first.cart_item_id, Some(CartItemId::new("r1")));
        assert_eq!(first.name, "Product 5");
    }

    #[tokio::test]
    async fn test_load_failure_empties_cart() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");

        store.api().server().fail_list = true;
        let err = store.load().await.expect_err("list fails");

        assert!(matches!(err, CartError::Api { status: 503, .. }));
        assert!(store.items().is_empty());
        assert!(store.error().is_some());
        assert!(!store.snapshot().is_loading);
    }

    // =========================================================================
    // add
    // =========================================================================

    #[tokio::test]
    async fn test_add_reloads_from_server() {
        let auth = session(1);
        let store = store_with(FakeCartApi::default(), &auth);
        store.load().await.expect("load");

        store.add(ProductId::from(9)).await.expect("add");
        store.add(ProductId::from(9)).await.expect("add again");

        assert_eq!(quantities(&store), vec![("9".to_string(), 2)]);
        let item = store.items().into_iter().next().expect("one line");
        assert_eq!(item.cart_item_id, Some(CartItemId::new("row-1")));
        assert_eq!(store.api().server().list_calls, 3);
    }

    #[tokio::test]
    async fn test_add_failure_leaves_cart_unchanged() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");
        let before = store.items();

        store.api().server().fail_add = true;
        store.add(ProductId::from(6)).await.expect_err("add fails");

        assert_eq!(store.items(), before);
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn test_add_without_token_is_noop() {
        let auth = Arc::new(AuthSession::new());
        let store = store_with(FakeCartApi::default(), &auth);

        store.add(ProductId::from(1)).await.expect("silent no-op");

        assert!(store.api().server().lines.is_empty());
    }

    // =========================================================================
    // update_quantity
    // =========================================================================

    #[tokio::test]
    async fn test_decrement_to_zero_removes() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");
        let product = ProductId::from(5);

        store.update_quantity(&product, -1).await.expect("decrement");
        assert_eq!(quantities(&store), vec![("5".to_string(), 1)]);
        assert_eq!(
            store.api().server().lines.first().map(|l| l.quantity),
            Some(1)
        );

        store.update_quantity(&product, -1).await.expect("remove");
        assert!(store.items().is_empty());
        assert!(store.api().server().lines.is_empty());
    }

    #[tokio::test]
    async fn test_large_negative_delta_removes() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 3)]), &auth);
        store.load().await.expect("load");

        store
            .update_quantity(&ProductId::from(5), -10)
            .await
            .expect("remove");

        assert!(store.items().is_empty());
        assert_eq!(store.api().server().update_calls, 0);
    }

    #[tokio::test]
    async fn test_overflowing_delta_keeps_line() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");

        let err = store
            .update_quantity(&ProductId::from(5), i64::from(u32::MAX))
            .await
            .expect_err("quantity overflows");

        assert!(matches!(err, CartError::InvalidQuantity { .. }));
        assert_eq!(quantities(&store), vec![("5".to_string(), 2)]);
        assert!(store.error().is_some());
        let server = store.api().server();
        assert_eq!(server.update_calls, 0);
        assert!(server.removed.is_empty());
        assert_eq!(server.lines.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_update_rolls_back_and_resyncs() {
        let auth = session(1);
        let store = store_with(
            FakeCartApi::with_lines(&[("r1", "5", 2), ("r2", "7", 4)]),
            &auth,
        );
        store.load().await.expect("load");
        let before = store.items();

        store.api().server().fail_update = true;
        let err = store
            .update_quantity(&ProductId::from(7), 3)
            .await
            .expect_err("update fails");

        assert!(matches!(err, CartError::EndpointsExhausted { .. }));
        assert_eq!(store.items(), before);
        assert!(store.error().is_some());

        let list_calls = store.api().server().list_calls;
        tokio::time::sleep(RESYNC + Duration::from_millis(10)).await;
        assert_eq!(store.api().server().list_calls, list_calls + 1);
    }

    #[tokio::test]
    async fn test_update_unknown_product() {
        let auth = session(1);
        let store = store_with(FakeCartApi::default(), &auth);
        store.load().await.expect("load");

        let err = store
            .update_quantity(&ProductId::from(42), 1)
            .await
            .expect_err("not in cart");

        assert!(matches!(err, CartError::ItemNotFound(_)));
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn test_update_success_clears_previous_error() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 1)]), &auth);
        store.load().await.expect("load");
        store
            .update_quantity(&ProductId::from(99), 1)
            .await
            .expect_err("not in cart");
        assert!(store.error().is_some());

        store
            .update_quantity(&ProductId::from(5), 1)
            .await
            .expect("increment");

        assert!(store.error().is_none());
        assert_eq!(quantities(&store), vec![("5".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_stale_failure_does_not_undo_newer_change() {
        let auth = session(1);
        let gate = Arc::new(Notify::new());
        let api = FakeCartApi {
            update_gate: Some(Arc::clone(&gate)),
            ..FakeCartApi::with_lines(&[("r1", "5", 1), ("r2", "7", 1)])
        };
        let store = store_with(api, &auth);
        store.load().await.expect("load");
        store.api().server().fail_update = true;

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.update_quantity(&ProductId::from(5), 2).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(quantities(&store), vec![("5".to_string(), 3), ("7".to_string(), 1)]);

        store.remove(&ProductId::from(7)).await.expect("remove");
        gate.notify_one();
        pending
            .await
            .expect("task completes")
            .expect_err("update fails");

        assert!(!store.snapshot().contains(&ProductId::from(7)));
        assert!(store.error().is_some());
    }

    // =========================================================================
    // remove
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_failed_remove_reverts() {
        let auth = session(1);
        let store = store_with(
            FakeCartApi::with_lines(&[("r1", "5", 2), ("r2", "7", 1)]),
            &auth,
        );
        store.load().await.expect("load");
        let before = store.items();

        store.api().server().fail_remove = true;
        store
            .remove(&ProductId::from(5))
            .await
            .expect_err("remove fails");

        assert_eq!(store.items(), before);
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn test_remove_requires_local_item() {
        let auth = session(1);
        let store = store_with(FakeCartApi::default(), &auth);
        store.load().await.expect("load");

        let err = store
            .remove(&ProductId::from(5))
            .await
            .expect_err("not in cart");

        assert!(matches!(err, CartError::ItemNotFound(_)));
        assert!(store.api().server().removed.is_empty());
    }

    #[tokio::test]
    async fn test_remove_requires_cart_item_id() {
        let auth = session(1);
        let store = store_with(FakeCartApi::default(), &auth);
        store.load().await.expect("load");
        store.inner.state.send_modify(|state| {
            state.set_items(vec![CartItem {
                product_id: ProductId::from(5),
                cart_item_id: None,
                name: "Unsaved".to_string(),
                price: grocer_core::Price::ZERO,
                quantity: Quantity::ONE,
                image: None,
                description: None,
            }]);
        });

        let err = store
            .remove(&ProductId::from(5))
            .await
            .expect_err("no server id");

        assert!(matches!(err, CartError::MissingCartItemId(_)));
        assert_eq!(store.items().len(), 1);
        assert!(store.api().server().removed.is_empty());
    }

    // =========================================================================
    // clear
    // =========================================================================

    #[tokio::test]
    async fn test_clear_success() {
        let auth = session(1);
        let store = store_with(
            FakeCartApi::with_lines(&[("r1", "5", 2), ("r2", "7", 1)]),
            &auth,
        );
        store.load().await.expect("load");

        store.clear().await.expect("clear never fails");

        assert!(store.items().is_empty());
        assert!(store.api().server().lines.is_empty());
        assert!(store.api().server().removed.is_empty());
    }

    #[tokio::test]
    async fn test_clear_falls_back_to_individual_removal() {
        let auth = session(1);
        let store = store_with(
            FakeCartApi::with_lines(&[("r1", "5", 2), ("r2", "7", 1)]),
            &auth,
        );
        store.load().await.expect("load");
        store.api().server().fail_clear = true;

        store.clear().await.expect("clear never fails");

        assert!(store.items().is_empty());
        assert_eq!(store.api().server().removed, vec!["r1", "r2"]);
        assert!(store.api().server().lines.is_empty());
    }

    #[tokio::test]
    async fn test_clear_total_failure_still_empties_locally() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");
        {
            let mut server = store.api().server();
            server.fail_clear = true;
            server.fail_remove = true;
        }

        store.clear().await.expect("clear never fails");

        assert!(store.items().is_empty());
        assert!(store.error().is_none());
        assert_eq!(store.api().server().lines.len(), 1);
    }

    // =========================================================================
    // User switching
    // =========================================================================

    #[tokio::test]
    async fn test_user_switch_wipes_cart() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");
        assert!(!store.check_user_change());

        auth.set_user(json!({ "_id": 2 }));

        assert!(store.check_user_change());
        assert!(store.items().is_empty());
        assert_eq!(store.snapshot().last_user_id, Some(UserId::from(2)));
        assert!(!store.check_user_change());
    }

    #[tokio::test]
    async fn test_user_switch_preempts_mutation_with_reload() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");

        auth.set_user(json!({ "id": 2 }));
        store
            .update_quantity(&ProductId::from(5), 1)
            .await
            .expect("reload instead");

        assert_eq!(store.api().server().update_calls, 0);
        assert_eq!(store.api().server().list_calls, 2);
        assert_eq!(store.snapshot().last_user_id, Some(UserId::from(2)));
    }

    #[tokio::test]
    async fn test_user_switch_before_clear_leaves_new_cart_alone() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        store.load().await.expect("load");

        auth.set_user(json!({ "id": 2 }));
        store.clear().await.expect("clear never fails");

        assert!(store.items().is_empty());
        assert_eq!(store.api().server().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let auth = session(1);
        let store = store_with(FakeCartApi::with_lines(&[("r1", "5", 2)]), &auth);
        let mut rx = store.subscribe();

        store.load().await.expect("load");

        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(rx.borrow_and_update().items.len(), 1);
    }
}
