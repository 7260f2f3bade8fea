use prost_reflect::{
    EnumDescriptor, ExtensionDescriptor, FileDescriptor, MessageDescriptor, ServiceDescriptor,
};
use std::sync::Arc;

/// One linked schema file.
///
/// Holds the file's own definitions and a shared handle to the unit of every file
/// it imports, in import order. A unit imported by several files is the same
/// allocation for all of them.
#[derive(Debug)]
pub struct SchemaUnit {
    file: FileDescriptor,
    dependencies: Vec<Arc<SchemaUnit>>,
}

impl SchemaUnit {
    pub(crate) fn new(file: FileDescriptor, dependencies: Vec<Arc<SchemaUnit>>) -> Self {
        Self { file, dependencies }
    }

    /// The file name, as written in the protoset (e.g. `google/protobuf/any.proto`).
    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn package_name(&self) -> &str {
        self.file.package_name()
    }

    pub fn file_descriptor(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn dependencies(&self) -> &[Arc<SchemaUnit>] {
        &self.dependencies
    }

    /// Services declared in this file.
    pub fn services(&self) -> impl ExactSizeIterator<Item = ServiceDescriptor> + '_ {
        self.file.services()
    }

    /// Top-level messages declared in this file.
    pub fn messages(&self) -> impl ExactSizeIterator<Item = MessageDescriptor> + '_ {
        self.file.messages()
    }

    /// Every message declared in this file, nested ones included.
    pub fn all_messages(&self) -> Vec<MessageDescriptor> {
        let mut pending: Vec<_> = self.file.messages().collect();
        let mut all = Vec::with_capacity(pending.len());
        while let Some(message) = pending.pop() {
            pending.extend(message.child_messages());
            all.push(message);
        }
        all
    }

    /// Every enum declared in this file, nested ones included.
    pub fn all_enums(&self) -> Vec<EnumDescriptor> {
        self.file
            .enums()
            .chain(self.all_messages().iter().flat_map(|m| m.child_enums()))
            .collect()
    }

    /// Every extension field declared in this file, at top level or inside a message.
    pub fn all_extensions(&self) -> Vec<ExtensionDescriptor> {
        self.file
            .extensions()
            .chain(
                self.all_messages()
                    .iter()
                    .flat_map(|m| m.child_extensions()),
            )
            .collect()
    }

    /// Looks up a service declared in this file by its fully qualified name.
    pub fn find_service(&self, full_name: &str) -> Option<ServiceDescriptor> {
        self.services().find(|s| s.full_name() == full_name)
    }

    pub fn find_message(&self, full_name: &str) -> Option<MessageDescriptor> {
        self.all_messages()
            .into_iter()
            .find(|m| m.full_name() == full_name)
    }

    pub fn find_enum(&self, full_name: &str) -> Option<EnumDescriptor> {
        self.all_enums()
            .into_iter()
            .find(|e| e.full_name() == full_name)
    }
}
