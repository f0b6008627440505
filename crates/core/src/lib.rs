pub mod analytics;
pub mod checkout;
pub mod config;
pub mod discount;
pub mod domain;
pub mod errors;
pub mod format;
pub mod notify;

pub use analytics::{Granularity, RangeOption, RangePreset, Series, SeriesPoint, TimeRange};
pub use checkout::{
    PaymentConfirmation, PaymentError, PaymentGateway, PaymentIntent, PaymentIntentRequest,
    PaymentMetadata, PaymentStatus,
};
pub use discount::{checkout_amount, discounted_amount, is_usable, quote_price, PriceQuote};
pub use domain::discount::{
    DiscountCode, DiscountCodeDraft, DiscountCodeId, DiscountKind, DiscountType, FieldErrors,
    NewDiscountCode, ProductScope,
};
pub use domain::order::{Order, OrderId};
pub use domain::product::{Product, ProductId};
pub use domain::user::{User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError, PurchaseRejection};
pub use notify::{EmailError, Mailer, OutboundEmail};
