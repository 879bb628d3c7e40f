//! Router module for provider selection.
//!
//! This module handles selecting a provider for a requested model:
//! - Candidate resolution by exposed model name
//! - Zero-cost classification
//! - Cheapest-first selection among paid candidates

mod cost;
mod resolver;
mod selector;

pub use cost::{is_zero_cost, request_cost_usd};
pub use resolver::{resolve, Candidate};
pub use selector::{select, Router, SelectedRoute};
