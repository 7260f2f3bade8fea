//! # Greeter Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a gRPC server implementation
//! and descriptor sets for integration testing `protocall`.
//! It is not intended for production use.
//!
//! Everything is compiled from the sources under `proto/` by the build script.

pub mod descriptors;

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/helloworld.rs"));
}

pub use descriptors::{encoded_file_descriptor_set, file_descriptor_set};
pub use pb::greeter_server::{Greeter, GreeterServer};

/// `helloworld/greeter.proto` and its imports.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("helloworld_descriptors");

/// `shop/order.proto` and `shop/coupon.proto` with their imports.
pub const CATALOG_FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("shop_descriptors");

pub const DEMO_FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("demo_descriptors");
