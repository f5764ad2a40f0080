//! Session-level models shared by extractors and handlers.

pub mod session;

pub use session::{CurrentUser, keys as session_keys};
