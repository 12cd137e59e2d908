//! # Tessera Common
//!
//! Shared vocabulary for the Tessera document store: nodes and marks, the
//! atomic operation wire format, id generation, clocks and the error
//! taxonomy used across crates.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod clock;
pub mod error;
pub mod id_generator;
pub mod node;
pub mod operation;
pub mod result;
pub mod text;

pub use clock::*;
pub use error::*;
pub use id_generator::*;
pub use node::*;
pub use operation::*;
pub use result::*;
