//! Client-side core for a class attendance tracker: reference resolution
//! over partially populated API payloads, the per-session roll-call
//! lifecycle, history aggregation and debounced paginated entity search.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod resolve;
pub mod roster;
pub mod search;
