//! # tempo-id
//!
//! Identifier types shared by the tempo scheduler and its CLI.
//!
//! Every identifier is rendered as `{prefix}_{ulid}`:
//!
//! - `poll_01HV4Z2WQXKJNM8GPQY6VBKC3D` for a content unit
//! - `req_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for an operator API request
//!
//! The prefix keeps ids of different kinds from being mixed up at the API
//! boundary, and the ULID keeps them sortable by creation time.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

#[doc(hidden)]
pub mod __private {
    pub use chrono;
    pub use serde;
}
