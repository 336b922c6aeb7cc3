pub mod conversation;
pub mod enums;
pub mod prediction;

pub use conversation::*;
pub use enums::{Condition, MessageRole, TumorCategory, UnknownLabel};
pub use prediction::*;
