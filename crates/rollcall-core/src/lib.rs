//! Core types and trait definitions for the Rollcall attendance client.
//!
//! This crate is deliberately free of HTTP and filesystem dependencies. It
//! owns the canonical entity shapes, the boundary adapter that turns raw
//! backend payloads into them, and the two seams (`Gateway`, `SessionStorage`)
//! that the other crates implement.

pub mod attendance;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod report;
pub mod storage;
pub mod subject;
pub mod user;

pub use error::{GatewayError, LoginFailure, StorageError};
