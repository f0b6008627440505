pub mod discount;
pub mod download;
pub mod order;
pub mod product;
pub mod user;
