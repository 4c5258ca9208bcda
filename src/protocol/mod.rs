//! # Streaming Protocol
//!
//! Everything between "a text frame arrived" and "a response is ready":
//!
//! - **messages**: typed inbound frames, acknowledgements, registration
//! - **response**: audio units, responses, observers, aggregation
//! - **dispatcher**: the per-connection state machine that ties them together

pub mod dispatcher;
pub mod messages;
pub mod response;
