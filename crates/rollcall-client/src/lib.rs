//! HTTP implementation of [`rollcall_core::gateway::Gateway`].
//!
//! Wraps the attendance backend's JSON REST API. Responses are returned in
//! their raw shapes; normalization happens in the caller.

mod http;


pub use http::{GatewayConfig, HttpGateway};
