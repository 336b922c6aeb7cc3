//! API endpoint handlers.
//!
//! Handlers are thin: they parse the request, run the blocking domain
//! call on tokio's blocking pool, and shape the response.

pub mod chat;
pub mod diagnosis;
pub mod health;
pub mod symptoms;
pub mod uploads;
