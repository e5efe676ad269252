//! # Cart Routes
//!
//! A cart with mutations in flight is tracked as an [`OptimisticCart`]: a
//! mutation shows up in the cart immediately and is settled once the provider
//! answers. A failed provider call rolls its change back. Idle carts are read
//! straight from the provider, so only carts the provider confirmed are ever
//! tracked.
//!
//! No lock is held while a provider call is in flight.
use std::{collections::HashMap, sync::Arc};

use axum::{Json, extract::State as AxumState};
use axum_extra::extract::cookie::CookieJar;
use commerce::{
    CommerceError, CommerceProvider, Feature,
    cart::{CartAction, OptimisticCart, PendingId, UpdateType},
    types::{Cart, CartLineInput, CartLineUpdate, ProductSummary, Session},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    error::AppError,
    state::State,
    utils::{cart_cookie, session_from},
};

/// Carts with provider calls in flight. An entry exists only while it has
/// pending actions and is dropped once the last one settles.
#[derive(Default)]
pub struct CartSessions {
    carts: RwLock<HashMap<String, OptimisticCart>>,
}

impl CartSessions {
    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.carts.read().await.is_empty()
    }

    pub async fn is_tracked(&self, cart_id: &str) -> bool {
        self.carts.read().await.contains_key(cart_id)
    }

    pub async fn has_pending(&self, cart_id: &str) -> bool {
        self.carts
            .read()
            .await
            .get(cart_id)
            .is_some_and(|cart| cart.pending() > 0)
    }

    /// The optimistic cart, while actions on it are in flight.
    pub async fn pending_view(&self, cart_id: &str) -> Option<Cart> {
        self.carts
            .read()
            .await
            .get(cart_id)
            .filter(|cart| cart.pending() > 0)
            .and_then(OptimisticCart::view)
    }

    /// Queues `action` on a cart that is already in flight.
    pub async fn apply(&self, cart_id: &str, action: &CartAction) -> Option<PendingId> {
        self.carts
            .write()
            .await
            .get_mut(cart_id)
            .map(|cart| cart.apply(action.clone()))
    }

    /// Queues `action`, starting from `confirmed` unless another request
    /// already tracks this cart.
    pub async fn track_and_apply(
        &self,
        cart_id: &str,
        confirmed: Cart,
        action: CartAction,
    ) -> PendingId {
        self.carts
            .write()
            .await
            .entry(cart_id.to_string())
            .or_insert_with(|| OptimisticCart::new(Some(confirmed)))
            .apply(action)
    }

    /// Settles a pending action and returns the resulting view.
    pub async fn settle(&self, cart_id: &str, id: PendingId, cart: Option<Cart>) -> Option<Cart> {
        let mut carts = self.carts.write().await;
        let Some(entry) = carts.get_mut(cart_id) else {
            warn!("Cart {cart_id}: settled action {id:?} on an untracked cart");
            return cart;
        };

        if !entry.settle(id, cart) {
            warn!("Cart {cart_id}: action {id:?} was already settled");
        }

        let view = entry.view();
        if entry.pending() == 0 {
            carts.remove(cart_id);
        }

        view
    }
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: Option<Cart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub merchandise_id: String,
    pub product_handle: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItem {
    pub merchandise_id: String,
    pub update_type: UpdateType,
}

/// Queues `action` on the cart behind `cart_id`. An idle cart is first loaded
/// from the provider, or taken from `loaded` when the caller already has it.
///
/// `None` when the provider knows no such cart.
async fn begin(
    state: &State,
    provider: &dyn CommerceProvider,
    session: &Session,
    cart_id: &str,
    action: CartAction,
    loaded: Option<Cart>,
) -> Result<Option<PendingId>, AppError> {
    if let Some(pending) = state.carts.apply(cart_id, &action).await {
        return Ok(Some(pending));
    }

    let confirmed = match loaded {
        Some(cart) => Some(cart),
        None => provider.get_cart(session).await?,
    };
    let Some(confirmed) = confirmed else {
        return Ok(None);
    };

    Ok(Some(
        state.carts.track_and_apply(cart_id, confirmed, action).await,
    ))
}

pub async fn get_cart_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
) -> Result<Json<CartResponse>, AppError> {
    let provider = state.commerce.require(Feature::Cart)?;
    let session = session_from(&jar);

    let Some(cart_id) = session.cart_id.as_deref() else {
        return Ok(Json(CartResponse { cart: None }));
    };

    // The provider's cart does not show actions still in flight.
    if let Some(cart) = state.carts.pending_view(cart_id).await {
        return Ok(Json(CartResponse { cart: Some(cart) }));
    }

    Ok(Json(CartResponse {
        cart: provider.get_cart(&session).await?,
    }))
}

pub async fn add_item_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(payload): Json<AddItem>,
) -> Result<(CookieJar, Json<CartResponse>), AppError> {
    let provider = state.commerce.require(Feature::Cart)?;
    let session = session_from(&jar);

    let product = provider
        .get_product(&payload.product_handle)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", payload.product_handle)))?;
    let variant = product
        .variant(&payload.merchandise_id)
        .cloned()
        .ok_or_else(|| {
            AppError::NotFound(format!("Variant {} not found", payload.merchandise_id))
        })?;

    let line = CartLineInput {
        merchandise_id: payload.merchandise_id,
        quantity: 1,
    };
    let action = CartAction::AddItem {
        product: ProductSummary::from(&product),
        variant,
    };

    let pending = match session.cart_id.as_deref() {
        Some(cart_id) => begin(&state, provider, &session, cart_id, action, None)
            .await?
            .map(|pending| (cart_id.to_string(), pending)),
        None => None,
    };

    let Some((cart_id, pending)) = pending else {
        // No cart yet, or the cookie names one the provider has forgotten.
        let session = Session {
            cart_id: None,
            ..session
        };
        let cart = provider.add_to_cart(&session, &[line]).await?;
        let Some(cart_id) = cart.id.clone() else {
            return Ok((jar, Json(CartResponse { cart: Some(cart) })));
        };

        debug!("Created cart {cart_id}");
        let jar = jar.add(cart_cookie(cart_id, state.config.secure_cookies()));

        return Ok((jar, Json(CartResponse { cart: Some(cart) })));
    };

    let result = provider.add_to_cart(&session, &[line]).await;
    let view = state
        .carts
        .settle(&cart_id, pending, result.as_ref().ok().cloned())
        .await;
    result?;

    Ok((jar, Json(CartResponse { cart: view })))
}

pub async fn update_item_handler(
    AxumState(state): AxumState<Arc<State>>,
    jar: CookieJar,
    Json(payload): Json<UpdateItem>,
) -> Result<Json<CartResponse>, AppError> {
    let provider = state.commerce.require(Feature::Cart)?;
    let session = session_from(&jar);
    let cart_id = session
        .cart_id
        .clone()
        .ok_or(CommerceError::CartNotFound)?;

    let (current, loaded) = match state.carts.pending_view(&cart_id).await {
        Some(cart) => (cart, None),
        None => {
            let cart = provider
                .get_cart(&session)
                .await?
                .ok_or(CommerceError::CartNotFound)?;
            (cart.clone(), Some(cart))
        }
    };

    let line = current
        .line(&payload.merchandise_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound("Item not found in cart".to_string()))?;
    let line_id = line
        .id
        .clone()
        .ok_or_else(|| AppError::NotFound("Item is not saved yet".to_string()))?;

    let quantity = match payload.update_type {
        UpdateType::Plus => line.quantity + 1,
        UpdateType::Minus => line.quantity.saturating_sub(1),
        UpdateType::Delete => 0,
    };

    let action = CartAction::UpdateItem {
        merchandise_id: payload.merchandise_id.clone(),
        update_type: payload.update_type,
    };
    let pending = begin(&state, provider, &session, &cart_id, action, loaded)
        .await?
        .ok_or(CommerceError::CartNotFound)?;

    let result = if quantity == 0 {
        provider.remove_from_cart(&session, &[line_id]).await
    } else {
        provider
            .update_cart(
                &session,
                &[CartLineUpdate {
                    id: line_id,
                    merchandise_id: payload.merchandise_id,
                    quantity,
                }],
            )
            .await
    };

    let view = state
        .carts
        .settle(&cart_id, pending, result.as_ref().ok().cloned())
        .await;
    result?;

    Ok(Json(CartResponse { cart: view }))
}
