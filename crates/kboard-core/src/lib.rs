//! # kboard-core
//!
//! Core abstractions for the kboard market-data collection pipeline.
//!
//! This crate provides the foundational types used across all kboard
//! components:
//!
//! - **Store Contract**: The minimal read interface the pipeline needs
//!   against the persistent market-data store
//! - **Error Types**: Shared error definitions and result types
//! - **Clock**: The canonical calendar-day reference (KST)
//! - **Observability**: Structured logging initialization
//!
//! ## Crate Boundary
//!
//! `kboard-core` is the only crate allowed to define shared primitives.
//! The pipeline domain lives in `kboard-flow`; the HTTP surface lives in
//! `kboard-api`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod error;
pub mod observability;
pub mod store;

pub use error::{Error, Result};
pub use store::MarketStore;
