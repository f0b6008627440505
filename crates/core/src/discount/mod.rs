//! Discount engine: eligibility and the discounted charge amount.
//!
//! Both functions are pure over their inputs plus an explicit `now`. The
//! storage layer evaluates the same eligibility rule inside its queries; the
//! in-process predicate here is the reference those queries are tested against.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::{DiscountCode, DiscountKind};
use crate::domain::product::ProductId;
use crate::format::format_discount;

/// Smallest amount ever charged, in cents.
pub const MINIMUM_CHARGE_IN_CENTS: i64 = 1;

/// A code is usable for `product_id` at `now` when it is active, covers the
/// product, has redemptions left, and has not expired.
pub fn is_usable(code: &DiscountCode, product_id: &ProductId, now: DateTime<Utc>) -> bool {
    code.is_active
        && code.scope.covers(product_id)
        && code.limit.map_or(true, |limit| code.uses < limit)
        && code.expires_at.map_or(true, |expires_at| expires_at > now)
}

/// Applies `kind` to `price_in_cents`, rounding up to the next whole cent and
/// never going below [`MINIMUM_CHARGE_IN_CENTS`].
pub fn discounted_amount(kind: &DiscountKind, price_in_cents: i64) -> i64 {
    let price = Decimal::from(price_in_cents);
    let raw = match kind {
        DiscountKind::Percentage(points) => price - price * *points / Decimal::ONE_HUNDRED,
        DiscountKind::Fixed(dollars) => price - *dollars * Decimal::ONE_HUNDRED,
    };

    raw.ceil()
        .max(Decimal::from(MINIMUM_CHARGE_IN_CENTS))
        .to_i64()
        .unwrap_or(price_in_cents.max(MINIMUM_CHARGE_IN_CENTS))
}

/// Charge amount for a product, with or without an already-eligible code.
pub fn checkout_amount(price_in_cents: i64, code: Option<&DiscountCode>) -> i64 {
    match code {
        Some(code) => discounted_amount(&code.kind, price_in_cents),
        None => price_in_cents,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub original_in_cents: i64,
    pub amount_in_cents: i64,
    pub is_discounted: bool,
    pub discount_label: Option<String>,
}

pub fn quote_price(price_in_cents: i64, code: Option<&DiscountCode>) -> PriceQuote {
    let amount_in_cents = checkout_amount(price_in_cents, code);
    PriceQuote {
        original_in_cents: price_in_cents,
        amount_in_cents,
        is_discounted: amount_in_cents != price_in_cents,
        discount_label: code.map(|code| format_discount(&code.kind)),
    }
}
