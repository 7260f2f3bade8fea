//! # Generic gRPC Transport
//!
//! Low-level building blocks for unary gRPC calls with dynamic message types.
//!
//! Unlike standard `tonic` clients, which are strongly typed (e.g., `HelloRequest`),
//! the components here carry [`GenericMessage`](crate::message::GenericMessage)s and
//! write their protobuf bytes on the fly.
pub mod client;
pub mod codec;
