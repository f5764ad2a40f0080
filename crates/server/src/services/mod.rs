//! Business workflows shared by the API and the HTML pages.
//!
//! Multi-table writes (checkout, cancellation, fulfilment, returns, payment
//! notifications) live here so each one runs in a single transaction.
//! Integrations (email, events, CEP lookup, payment gateway) are clients
//! held in [`AppState`](crate::state::AppState).

pub mod auth;
pub mod cart;
pub mod cep;
pub mod email;
pub mod events;
pub mod loyalty;
pub mod orders;
pub mod payments;
pub mod returns;
pub mod upload;
