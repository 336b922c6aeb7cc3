//! Symptom checklist: the static symptom table and the per-condition scorer.
//!
//! Independent of the image pipeline; both only share the four-condition
//! vocabulary from `models::enums`.

pub mod catalog;
pub mod scorer;

pub use catalog::*;
pub use scorer::*;
