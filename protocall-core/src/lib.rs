//! # Protocall Core
//!
//! `protocall-core` is the library behind the `protocall` CLI. It invokes unary gRPC
//! methods on any server without generated stubs, using only a protoset (a serialized
//! `FileDescriptorSet`) supplied at runtime.
//!
//! ## Key Components
//!
//! * **[`schema`]:** Links the files of a protoset into a [`SchemaGraph`](schema::SchemaGraph),
//!   in dependency order, and looks services and methods up in it.
//! * **[`message`]:** Runtime-typed messages, the JSON decoder that fills them and the
//!   registry that resolves `Any` payloads and extensions.
//! * **[`grpc`]:** A `tonic` client and codec carrying those messages over the wire.
//! * **[`context`]:** Deadline, cancellation and headers for a single call.
//! * **[`invoker`]:** Ties everything together: locate, decode, call, return.
//!
//! ## Example
//!
//! ```rust,no_run
//! use protocall_core::{context::CallContext, grpc::client::GrpcClient, invoker::Invoker, schema::SchemaGraph};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = SchemaGraph::decode(&std::fs::read("descriptor.bin")?)?;
//! let invoker = Invoker::new(Arc::new(graph));
//! let mut connection = GrpcClient::connect("http://localhost:50051", None).await?;
//!
//! let reply = invoker
//!     .invoke(&CallContext::new(), &mut connection, "helloworld.Greeter", "SayHello", r#"{"name": "Ferris"}"#)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
//!
//! See the README.md for more details about usage.
pub mod context;
pub mod grpc;
pub mod invoker;
pub mod message;
pub mod schema;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
