//! Client for the RON reservation engine.
//!
//! RON speaks XML-RPC over HTTPS with a session token appended to the call
//! URL after login. The `xmlrpc` module is the wire codec; `client` wraps
//! it in the typed operations the dispatcher consumes.

pub mod client;
pub mod xmlrpc;

pub use client::{Mode, Ron, RonConfig, RonGateway};
pub use xmlrpc::{RonError, Value};
