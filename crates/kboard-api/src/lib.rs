//! # kboard-api
//!
//! HTTP composition layer for the kboard collection pipeline.
//!
//! This crate is a **thin composition layer** with no domain policy.
//! All pipeline logic lives in `kboard-flow`; the store contract lives in
//! `kboard-core`.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health                    - Health check
//! GET  /ready                     - Readiness check (store connectivity)
//! POST /api/collect-market-cap    - Run stage 1
//! POST /api/collect-ohlcv         - Run stage 2
//! POST /api/calculate-best-k      - Run stage 3 over a resolved window
//! GET  /api/collection-status     - Derived stage status
//! GET  /api/collect-progress      - Live progress for stages 1/2
//! GET  /api/best-k-progress       - Live progress for stage 3
//! GET  /api/best-k-periods        - Period and market menu
//! GET  /api/market-latest         - Latest persisted snapshot
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
