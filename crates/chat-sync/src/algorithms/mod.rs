//! # Algorithms Module
//!
//! Pure functions: feed merging, derived flags and display rounding.

pub mod derived_state;
pub mod display;
pub mod event_feed;

pub use derived_state::{compute_derived_flags, DerivedFlags, DerivedInputs};
pub use display::{format_token_amount, format_usd_value, to_token_f64};
pub use event_feed::EventFeed;
