//! Mercado Core - Domain types and business rules.
//!
//! This crate provides the types and pure rules shared by all Mercado components:
//! - `server` - REST API, storefront pages and admin console
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Every rule that decides money or points lives here
//! so it can be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses
//! - [`loyalty`] - Tier table, point accrual and redemption
//! - [`coupon`] - Coupon validation and discount calculation
//! - [`pricing`] - Order totals at checkout
//! - [`returns`] - Return window and refund proration
//! - [`slug`] - URL slugs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod coupon;
pub mod loyalty;
pub mod pricing;
pub mod returns;
pub mod slug;
pub mod types;

pub use types::*;
