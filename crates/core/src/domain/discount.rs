use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscountCodeId(pub String);

/// Storage and wire tag for a discount's type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "PERCENTAGE",
            Self::Fixed => "FIXED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PERCENTAGE" => Some(Self::Percentage),
            "FIXED" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// What a code takes off the price.
///
/// `Percentage` holds percentage points (0..=100). `Fixed` holds an amount in
/// major currency units (dollars), converted to cents at computation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "discount_type", content = "discount_amount", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Percentage(Decimal),
    Fixed(Decimal),
}

impl DiscountKind {
    pub fn new(discount_type: DiscountType, amount: Decimal) -> Self {
        match discount_type {
            DiscountType::Percentage => Self::Percentage(amount),
            DiscountType::Fixed => Self::Fixed(amount),
        }
    }

    pub fn discount_type(&self) -> DiscountType {
        match self {
            Self::Percentage(_) => DiscountType::Percentage,
            Self::Fixed(_) => DiscountType::Fixed,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Self::Percentage(amount) | Self::Fixed(amount) => *amount,
        }
    }
}

/// Products a code applies to. A restricted scope always names at least one product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductScope {
    AllProducts,
    Products(Vec<ProductId>),
}

impl ProductScope {
    pub fn is_all_products(&self) -> bool {
        matches!(self, Self::AllProducts)
    }

    pub fn covers(&self, product_id: &ProductId) -> bool {
        match self {
            Self::AllProducts => true,
            Self::Products(ids) => ids.contains(product_id),
        }
    }

    pub fn product_ids(&self) -> &[ProductId] {
        match self {
            Self::AllProducts => &[],
            Self::Products(ids) => ids,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: DiscountCodeId,
    pub code: String,
    pub kind: DiscountKind,
    pub is_active: bool,
    pub scope: ProductScope,
    pub limit: Option<i64>,
    pub uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Field-level validation messages keyed by input field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(pub BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}

/// Admin input for a new discount code, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCodeDraft {
    pub code: String,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    #[serde(default)]
    pub all_products: bool,
    #[serde(default)]
    pub product_ids: Option<Vec<ProductId>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// A validated discount code ready to be persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDiscountCode {
    pub code: String,
    pub kind: DiscountKind,
    pub scope: ProductScope,
    pub limit: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DiscountCodeDraft {
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewDiscountCode, FieldErrors> {
        let mut errors = FieldErrors::default();

        let code = self.code.trim().to_string();
        if code.is_empty() {
            errors.add("code", "Code is required");
        }

        if self.discount_amount.fract() != Decimal::ZERO {
            errors.add("discount_amount", "Discount amount must be a whole number");
        }
        if self.discount_amount < Decimal::ONE {
            errors.add("discount_amount", "Discount amount must be at least 1");
        }
        if self.discount_type == DiscountType::Percentage
            && self.discount_amount > Decimal::ONE_HUNDRED
        {
            errors.add("discount_amount", "Percentage discount must be less than or equal to 100");
        }

        let product_ids = self.product_ids.filter(|ids| !ids.is_empty());
        if self.all_products && product_ids.is_some() {
            errors.add("product_ids", "Cannot select products when all products is selected");
        }
        if !self.all_products && product_ids.is_none() {
            errors.add("product_ids", "Must select products when all products is not selected");
        }

        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                errors.add("expires_at", "Expiration must be in the future");
            }
        }

        if let Some(limit) = self.limit {
            if limit < 1 {
                errors.add("limit", "Limit must be at least 1");
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let scope = match product_ids {
            Some(mut ids) if !self.all_products => {
                ids.sort();
                ids.dedup();
                ProductScope::Products(ids)
            }
            _ => ProductScope::AllProducts,
        };

        Ok(NewDiscountCode {
            code,
            kind: DiscountKind::new(self.discount_type, self.discount_amount),
            scope,
            limit: self.limit,
            expires_at: self.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{DiscountCodeDraft, DiscountKind, DiscountType, ProductScope};
    use crate::domain::product::ProductId;

    fn draft() -> DiscountCodeDraft {
        DiscountCodeDraft {
            code: "SPRING25".to_string(),
            discount_amount: Decimal::from(25),
            discount_type: DiscountType::Percentage,
            all_products: true,
            product_ids: None,
            expires_at: None,
            limit: None,
        }
    }

    #[test]
    fn valid_draft_becomes_new_code() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let code = draft().validate(now).expect("valid draft");

        assert_eq!(code.code, "SPRING25");
        assert_eq!(code.kind, DiscountKind::Percentage(Decimal::from(25)));
        assert_eq!(code.scope, ProductScope::AllProducts);
    }

    #[test]
    fn percentage_above_one_hundred_is_rejected() {
        let now = Utc::now();
        let errors = DiscountCodeDraft { discount_amount: Decimal::from(101), ..draft() }
            .validate(now)
            .expect_err("over 100 percent");

        assert!(errors.contains("discount_amount"));
    }

    #[test]
    fn fixed_amount_above_one_hundred_is_allowed() {
        let now = Utc::now();
        let code = DiscountCodeDraft {
            discount_amount: Decimal::from(150),
            discount_type: DiscountType::Fixed,
            ..draft()
        }
        .validate(now)
        .expect("fixed codes have no upper bound");

        assert_eq!(code.kind, DiscountKind::Fixed(Decimal::from(150)));
    }

    #[test]
    fn product_selection_must_agree_with_all_products_flag() {
        let now = Utc::now();

        let both = DiscountCodeDraft {
            product_ids: Some(vec![ProductId("p-1".to_string())]),
            ..draft()
        }
        .validate(now)
        .expect_err("products with all_products");
        assert!(both.contains("product_ids"));

        let neither = DiscountCodeDraft { all_products: false, ..draft() }
            .validate(now)
            .expect_err("no products without all_products");
        assert!(neither.contains("product_ids"));

        let restricted = DiscountCodeDraft {
            all_products: false,
            product_ids: Some(vec![ProductId("p-2".to_string()), ProductId("p-1".to_string())]),
            ..draft()
        }
        .validate(now)
        .expect("restricted scope");
        assert_eq!(
            restricted.scope,
            ProductScope::Products(vec![ProductId("p-1".to_string()), ProductId("p-2".to_string())])
        );
    }

    #[test]
    fn collects_every_failing_field() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let errors = DiscountCodeDraft {
            code: "   ".to_string(),
            discount_amount: Decimal::new(5, 1),
            expires_at: Some(now - Duration::days(1)),
            limit: Some(0),
            ..draft()
        }
        .validate(now)
        .expect_err("several invalid fields");

        for field in ["code", "discount_amount", "expires_at", "limit"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
    }
}
