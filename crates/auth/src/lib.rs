//! `permsync-auth` — token decoding boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. It extracts
//! the role claim from an opaque bearer token; signature verification is the
//! responsibility of whatever transport/security layer is in use.

pub mod token;

pub use token::{role_from_token, strip_bearer};
