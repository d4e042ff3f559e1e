//! Network profiles and on-disk state layout.
//!
//! A profile selects per-operation delay, batch size and retry policy for a
//! network identity; the layout selects where that network's address
//! registry and journal live.

pub mod paths;
pub mod schema;
pub mod store;

pub use crate::executor::retry::RetryPolicy;
pub use paths::StateLayout;
pub use schema::{NetworkProfile, ProfileOverride, RigConfig};
pub use store::ProfileSet;
