//! # Travis Test Suite
//!
//! Drives a complete [`tv_06_app::TravisApp`] through whole blocks, the way
//! the consensus engine would.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs     # chain builder, signed txs, cube keys
//!     ├── scenarios.rs   # declare, delegate, withdraw, absence, evidence, governance
//!     └── replay.rs      # identical histories give identical roots
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p tv-tests
//! cargo test -p tv-tests integration::scenarios::
//! ```

pub mod integration;
