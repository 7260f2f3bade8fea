//! # Schema Graph
//!
//! This module turns a protoset (a serialized `FileDescriptorSet`) into a linked,
//! queryable graph of schema files.
//!
//! A protoset lists its files in no particular order. Before any type can be used,
//! every file has to be linked against the files it imports, which is the job of
//! the [`SchemaGraphResolver`]. The result is a [`SchemaGraph`]: an immutable map
//! from file name to [`SchemaUnit`] that can be shared freely between callers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use protocall_core::schema::{SchemaGraph, ServiceLocator};
//!
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = SchemaGraph::from_file("helloworld.protoset")?;
//! let locator = ServiceLocator::new(&graph);
//! let service = locator.find_service("helloworld.Greeter")?;
//! let method = locator.find_method(&service, "SayHello")?;
//! assert_eq!(method.input().full_name(), "helloworld.HelloRequest");
//! # Ok(())
//! # }
//! ```
pub mod locator;
pub mod resolver;
mod unit;

pub use locator::{Descriptor, LookupError, ServiceLocator};
pub use resolver::SchemaGraphResolver;
pub use unit::SchemaUnit;

use prost::Message;
use prost_reflect::DescriptorError;
use prost_types::FileDescriptorSet;
use std::{collections::BTreeMap, path::Path, sync::Arc};

/// Errors raised while turning a protoset into a [`SchemaGraph`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("File '{file}' depends on '{dependency}', which is not part of the schema bundle")]
    UnknownDependency { file: String, dependency: String },

    #[error("Cyclic dependency between schema files: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Invalid schema in file '{file}': '{source}'")]
    InvalidSchema {
        file: String,
        #[source]
        source: DescriptorError,
    },

    #[error("File '{0}' appears more than once in the schema bundle with different contents")]
    DuplicateFile(String),

    #[error("Failed to decode file descriptor set: '{0}'")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to read schema bundle '{path}': '{source}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fully linked set of schema files, keyed by file name.
///
/// Every dependency of every unit is itself a unit of the graph. The graph never
/// changes once built; wrap it in an `Arc` to share it between concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    units: BTreeMap<String, Arc<SchemaUnit>>,
}

impl SchemaGraph {
    pub(crate) fn new(units: BTreeMap<String, Arc<SchemaUnit>>) -> Self {
        Self { units }
    }

    /// Links every file of the descriptor set.
    ///
    /// Shorthand for [`SchemaGraphResolver::resolve`].
    pub fn from_file_descriptor_set(bundle: FileDescriptorSet) -> Result<Self, SchemaError> {
        SchemaGraphResolver::resolve(bundle)
    }

    /// Decodes a serialized `FileDescriptorSet` and links it.
    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let bundle = FileDescriptorSet::decode(bytes)?;
        Self::from_file_descriptor_set(bundle)
    }

    /// Reads a protoset from disk and links it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::decode(&bytes)
    }

    /// Returns the unit for the given file name (e.g. `helloworld/greeter.proto`).
    pub fn get(&self, file_name: &str) -> Option<&Arc<SchemaUnit>> {
        self.units.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.units.contains_key(file_name)
    }

    /// Iterates over all units, ordered by file name.
    pub fn units(&self) -> impl Iterator<Item = &Arc<SchemaUnit>> {
        self.units.values()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
