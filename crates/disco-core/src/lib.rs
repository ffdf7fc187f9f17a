//! Core types and trait definitions for the disco low-level discovery engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It holds
//! the configuration tree (rules, prototypes, discovered entities, template
//! links), the pure prototype expander, and the [`store::DiscoveryStore`]
//! abstraction every backend implements.

pub mod entity;
pub mod error;
pub mod event;
pub mod expand;
pub mod lifetime;
pub mod macros;
pub mod prototype;
pub mod rule;
pub mod store;

pub use error::{Error, Result};
