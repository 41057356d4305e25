//! In-process named-lock arbitration engine.
//!
//! Clients acquire and release mutually exclusive leases over
//! application-defined names, either opaque strings (`"key"` mode) or
//! filesystem-style hierarchical paths (`"path"` mode). [`LockRegistry`]
//! is the crate's sole public entry point; everything else is an
//! implementation detail of how it arbitrates concurrent requests.

mod error;
mod key;
mod mode;
mod path;
mod refcount;
mod registry;
mod timed;

pub use error::{LockError, LockResult};
pub use mode::LockMode;
pub use registry::{LockRegistry, INFINITE_TIMEOUT};
