//! Core business logic, independent of the HTTP layer.
//!
//! Operations are free async functions over a SeaORM connection. Anything that
//! depends on who is calling takes a [`user::Principal`]; anything that depends
//! on the clock takes `now`.

pub mod checkout;
pub mod discount;
pub mod event;
pub mod loyalty;
pub mod pricing;
pub mod qr;
pub mod redemption;
pub mod report;
pub mod ticket;
pub mod user;
