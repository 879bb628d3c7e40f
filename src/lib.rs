//! modelmux - Cost-aware routing gateway for OpenAI-compatible chat completions
//!
//! This library provides the core of the modelmux gateway: configuration,
//! the provider catalog, cost-aware provider selection, backend clients and
//! the HTTP layer that ties them together.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod proxy;
pub mod router;

pub use catalog::{Catalog, CatalogSnapshot};
pub use config::Config;
pub use error::{Error, Result};
