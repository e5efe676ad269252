//! # Cart Reducer
//!
//! Cart mutations are applied locally the moment they are requested and only
//! later confirmed by the provider.
//!
//! ## Model
//! - `reduce` is a pure transition: current cart + one action -> next cart
//! - `OptimisticCart` keeps the last cart the provider confirmed plus every
//!   action still waiting on the provider, in request order
//! - The visible cart is always `confirmed` with all pending actions replayed
//!   on top, so a late confirmation never loses a newer local change
//!
//! ## Settling
//! - Success: the provider's cart becomes the new confirmed state and the
//!   action is dropped, the remaining pending actions are replayed on it
//! - Out of order: a confirmation for an action older than the one that last
//!   confirmed the cart only drops its action, the newer cart is kept
//! - Failure: the action is dropped, which rolls it back
use serde::{Deserialize, Serialize};

use crate::types::{
    Cart, CartCost, CartItem, LineCost, Merchandise, Money, ProductSummary, ProductVariant,
};

const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Plus,
    Minus,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    UpdateItem {
        merchandise_id: String,
        update_type: UpdateType,
    },
    AddItem {
        variant: ProductVariant,
        product: ProductSummary,
    },
}

pub fn empty_cart() -> Cart {
    Cart {
        id: None,
        checkout_url: String::new(),
        cost: CartCost::zero(DEFAULT_CURRENCY),
        lines: Vec::new(),
        total_quantity: 0,
    }
}

pub fn format_amount(value: f64) -> String {
    format!("{value:.2}")
}

fn item_cost(quantity: u32, unit_price: f64) -> String {
    format_amount(unit_price * f64::from(quantity))
}

/// `None` when the line disappears.
fn update_item(item: &CartItem, update_type: UpdateType) -> Option<CartItem> {
    let quantity = match update_type {
        UpdateType::Delete => return None,
        UpdateType::Plus => item.quantity + 1,
        UpdateType::Minus => item.quantity.saturating_sub(1),
    };

    if quantity == 0 {
        return None;
    }

    let unit_price = if item.quantity == 0 {
        0.0
    } else {
        item.cost.total_amount.value() / f64::from(item.quantity)
    };

    let mut updated = item.clone();
    updated.quantity = quantity;
    updated.cost.total_amount.amount = item_cost(quantity, unit_price);

    Some(updated)
}

fn create_or_update_item(
    existing: Option<&CartItem>,
    variant: &ProductVariant,
    product: &ProductSummary,
) -> CartItem {
    let quantity = existing.map_or(1, |item| item.quantity + 1);

    CartItem {
        id: existing.and_then(|item| item.id.clone()),
        quantity,
        cost: LineCost {
            total_amount: Money::new(
                item_cost(quantity, variant.price.value()),
                variant.price.currency_code.clone(),
            ),
        },
        merchandise: Merchandise {
            id: variant.id.clone(),
            title: variant.title.clone(),
            selected_options: variant.selected_options.clone(),
            product: product.clone(),
        },
    }
}

fn with_totals(mut cart: Cart, lines: Vec<CartItem>) -> Cart {
    let total_quantity = lines.iter().map(|line| line.quantity).sum();
    let total_amount: f64 = lines
        .iter()
        .map(|line| line.cost.total_amount.value())
        .sum();
    let currency_code = lines
        .first()
        .map(|line| line.cost.total_amount.currency_code.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    cart.total_quantity = total_quantity;
    cart.cost = CartCost {
        subtotal_amount: Money::new(format_amount(total_amount), currency_code.clone()),
        total_amount: Money::new(format_amount(total_amount), currency_code.clone()),
        total_tax_amount: Money::zero(&currency_code),
    };
    cart.lines = lines;

    cart
}

pub fn reduce(state: Option<&Cart>, action: &CartAction) -> Cart {
    let current = state.cloned().unwrap_or_else(empty_cart);

    match action {
        CartAction::UpdateItem {
            merchandise_id,
            update_type,
        } => {
            let lines: Vec<CartItem> = current
                .lines
                .iter()
                .filter_map(|item| {
                    if &item.merchandise.id == merchandise_id {
                        update_item(item, *update_type)
                    } else {
                        Some(item.clone())
                    }
                })
                .collect();

            if lines.is_empty() {
                let currency_code = current.cost.total_amount.currency_code.clone();

                return Cart {
                    lines,
                    total_quantity: 0,
                    cost: CartCost::zero(&currency_code),
                    ..current
                };
            }

            with_totals(current, lines)
        }
        CartAction::AddItem { variant, product } => {
            let existing = current.line(&variant.id);
            let updated = create_or_update_item(existing, variant, product);

            let lines = if existing.is_some() {
                current
                    .lines
                    .iter()
                    .map(|item| {
                        if item.merchandise.id == variant.id {
                            updated.clone()
                        } else {
                            item.clone()
                        }
                    })
                    .collect()
            } else {
                let mut lines = current.lines.clone();
                lines.push(updated);
                lines
            };

            with_totals(current, lines)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingId(u64);

#[derive(Debug, Clone, Default)]
pub struct OptimisticCart {
    confirmed: Option<Cart>,
    pending: Vec<(PendingId, CartAction)>,
    next_id: u64,
    confirmed_by: Option<PendingId>,
}

impl OptimisticCart {
    pub fn new(confirmed: Option<Cart>) -> Self {
        Self {
            confirmed,
            pending: Vec::new(),
            next_id: 0,
            confirmed_by: None,
        }
    }

    pub fn confirmed(&self) -> Option<&Cart> {
        self.confirmed.as_ref()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn apply(&mut self, action: CartAction) -> PendingId {
        let id = PendingId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, action));

        id
    }

    pub fn view(&self) -> Option<Cart> {
        if self.pending.is_empty() {
            return self.confirmed.clone();
        }

        let mut cart = self.confirmed.clone();
        for (_, action) in &self.pending {
            cart = Some(reduce(cart.as_ref(), action));
        }

        cart
    }

    /// Drops the pending action `id` and adopts the provider's cart, unless a
    /// later action already confirmed a newer one. `None` rolls the action back.
    ///
    /// Returns false when `id` was already settled.
    pub fn settle(&mut self, id: PendingId, authoritative: Option<Cart>) -> bool {
        let Some(position) = self.pending.iter().position(|(pending, _)| *pending == id) else {
            return false;
        };

        self.pending.remove(position);
        if let Some(cart) = authoritative {
            if self.confirmed_by.is_none_or(|newest| newest < id) {
                self.confirmed = Some(cart);
                self.confirmed_by = Some(id);
            }
        }

        true
    }

    /// Replaces the confirmed cart without touching pending actions.
    pub fn refresh(&mut self, cart: Option<Cart>) {
        self.confirmed = cart;
    }
}
