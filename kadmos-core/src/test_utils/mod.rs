//! Test utilities for kadmos
//!
//! Fixtures for keys, contacts, entities and storables, fakes for the
//! routing table and the network facade, and async polling helpers.

pub mod async_helpers;
pub mod fakes;
pub mod fixtures;

pub use async_helpers::*;
pub use fakes::*;
pub use fixtures::*;
