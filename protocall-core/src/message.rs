//! # Generic Messages
//!
//! Runtime, type-erased protobuf messages.
//!
//! A [`GenericMessage`] is a `prost_reflect::DynamicMessage` bound to its descriptor,
//! plus the [`ExtensionRegistry`] of the factory that created it. Every read and write
//! by field name or number is checked against the descriptor, so a wrong name or a
//! value of the wrong type is reported as a [`PayloadError`].
//!
//! * **[`GenericMessageFactory`]** creates empty instances.
//! * **[`RequestDecoder`]** fills an instance from a JSON document.
//! * **[`GenericMessage::to_json`]** renders an instance back to JSON.
pub mod decoder;
pub mod registry;
mod render;

pub use decoder::RequestDecoder;
pub use registry::ExtensionRegistry;

use prost::{Message, bytes::Buf};
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value,
};
use std::{borrow::Cow, sync::Arc};

/// Errors raised while reading, writing, decoding or rendering a [`GenericMessage`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Malformed JSON payload: '{0}'")]
    MalformedPayload(String),

    #[error("Unknown field '{field}' for message type '{message}'")]
    UnknownField { message: String, field: String },

    #[error("Field '{field}' expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Cannot resolve the message type of Any with type URL '{type_url}'")]
    UnknownAnyType { type_url: String },

    #[error("Any with type URL '{type_url}' holds invalid bytes: '{source}'")]
    InvalidAnyValue {
        type_url: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Failed to map message to JSON: '{0}'")]
    Serialize(#[from] serde_json::Error),
}

/// Creates empty [`GenericMessage`]s.
///
/// A factory built with [`GenericMessageFactory::with_registry`] hands its registry to
/// every instance it creates, which is what lets those instances resolve `Any` payloads
/// and extension fields by name.
#[derive(Debug, Clone, Default)]
pub struct GenericMessageFactory {
    registry: Option<Arc<ExtensionRegistry>>,
}

impl GenericMessageFactory {
    /// A factory whose instances cannot resolve `Any` payloads or extensions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn registry(&self) -> Option<&Arc<ExtensionRegistry>> {
        self.registry.as_ref()
    }

    /// Returns an instance of `descriptor` with no fields set.
    pub fn new_instance(&self, descriptor: MessageDescriptor) -> GenericMessage {
        GenericMessage {
            inner: DynamicMessage::new(descriptor),
            registry: self.registry.clone(),
        }
    }
}

/// A protobuf message whose type is only known at runtime.
#[derive(Debug, Clone)]
pub struct GenericMessage {
    inner: DynamicMessage,
    registry: Option<Arc<ExtensionRegistry>>,
}

/// Messages are equal when they hold the same values for the same descriptor.
/// Descriptors only compare equal within one resolved [`SchemaGraph`](crate::schema::SchemaGraph),
/// so messages built from two separate resolutions of the same protoset never are.
impl PartialEq for GenericMessage {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl GenericMessage {
    pub fn descriptor(&self) -> MessageDescriptor {
        self.inner.descriptor()
    }

    pub fn registry(&self) -> Option<&ExtensionRegistry> {
        self.registry.as_deref()
    }

    /// Reads a field by name. Unset fields yield their default value.
    pub fn get(&self, name: &str) -> Result<Cow<'_, Value>, PayloadError> {
        let field = self.field_by_name(name)?;
        Ok(self.inner.get_field(&field))
    }

    /// Reads a field by number. Unset fields yield their default value.
    pub fn get_by_number(&self, number: u32) -> Result<Cow<'_, Value>, PayloadError> {
        let field = self.field_by_number(number)?;
        Ok(self.inner.get_field(&field))
    }

    /// Whether the field is populated. Unknown names are never populated.
    pub fn has(&self, name: &str) -> bool {
        self.inner
            .descriptor()
            .get_field_by_name(name)
            .is_some_and(|field| self.inner.has_field(&field))
    }

    /// Writes a field by name, checking the value against the field's declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), PayloadError> {
        let field = self.field_by_name(name)?;
        self.set_field(&field, value)
    }

    /// Writes a field by number, checking the value against the field's declared type.
    pub fn set_by_number(&mut self, number: u32, value: Value) -> Result<(), PayloadError> {
        let field = self.field_by_number(number)?;
        self.set_field(&field, value)
    }

    /// Clears a field by name.
    pub fn clear(&mut self, name: &str) -> Result<(), PayloadError> {
        let field = self.field_by_name(name)?;
        self.inner.clear_field(&field);
        Ok(())
    }

    /// Renders the message with the protobuf JSON mapping.
    pub fn to_json(&self) -> Result<serde_json::Value, PayloadError> {
        render::message(&self.inner, self.registry())
    }

    /// Serializes the message to protobuf wire bytes.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.inner.encode_to_vec()
    }

    /// Merges protobuf wire bytes into the message.
    pub fn merge_from<B: Buf>(&mut self, buf: B) -> Result<(), prost::DecodeError> {
        self.inner.merge(buf)
    }

    pub fn as_dynamic(&self) -> &DynamicMessage {
        &self.inner
    }

    /// Mutable access to the message next to the registry it resolves names with.
    pub(crate) fn split_mut(&mut self) -> (&mut DynamicMessage, Option<&ExtensionRegistry>) {
        (&mut self.inner, self.registry.as_deref())
    }

    fn set_field(&mut self, field: &FieldDescriptor, value: Value) -> Result<(), PayloadError> {
        if !value.is_valid_for_field(field) {
            return Err(PayloadError::TypeMismatch {
                field: field.name().to_string(),
                expected: field_type_name(field),
                found: value_type_name(&value).to_string(),
            });
        }
        self.inner.set_field(field, value);
        Ok(())
    }

    fn field_by_name(&self, name: &str) -> Result<FieldDescriptor, PayloadError> {
        let descriptor = self.inner.descriptor();
        descriptor
            .get_field_by_name(name)
            .ok_or_else(|| PayloadError::UnknownField {
                message: descriptor.full_name().to_string(),
                field: name.to_string(),
            })
    }

    fn field_by_number(&self, number: u32) -> Result<FieldDescriptor, PayloadError> {
        let descriptor = self.inner.descriptor();
        descriptor
            .get_field(number)
            .ok_or_else(|| PayloadError::UnknownField {
                message: descriptor.full_name().to_string(),
                field: number.to_string(),
            })
    }
}

pub(crate) const ANY: &str = "google.protobuf.Any";

/// Types under `google.protobuf` have their own JSON representation.
pub(crate) fn is_well_known(message: &MessageDescriptor) -> bool {
    message.package_name() == "google.protobuf"
}

/// The `type_url` and `value` fields of a `google.protobuf.Any` descriptor.
pub(crate) fn any_fields(any: &MessageDescriptor) -> Option<(FieldDescriptor, FieldDescriptor)> {
    Some((any.get_field_by_name("type_url")?, any.get_field_by_name("value")?))
}

/// The `.proto` spelling of a kind (`int32`, `bytes`, `my.pkg.Message`…).
pub fn kind_name(kind: &Kind) -> Cow<'_, str> {
    match kind {
        Kind::Double => "double".into(),
        Kind::Float => "float".into(),
        Kind::Int32 => "int32".into(),
        Kind::Int64 => "int64".into(),
        Kind::Uint32 => "uint32".into(),
        Kind::Uint64 => "uint64".into(),
        Kind::Sint32 => "sint32".into(),
        Kind::Sint64 => "sint64".into(),
        Kind::Fixed32 => "fixed32".into(),
        Kind::Fixed64 => "fixed64".into(),
        Kind::Sfixed32 => "sfixed32".into(),
        Kind::Sfixed64 => "sfixed64".into(),
        Kind::Bool => "bool".into(),
        Kind::String => "string".into(),
        Kind::Bytes => "bytes".into(),
        Kind::Message(m) => m.full_name().into(),
        Kind::Enum(e) => e.full_name().into(),
    }
}

fn field_type_name(field: &FieldDescriptor) -> String {
    let kind = field.kind();
    if field.is_map() {
        format!("a map ({})", kind_name(&kind))
    } else if field.is_list() {
        format!("a list of {}", kind_name(&kind))
    } else {
        kind_name(&kind).into_owned()
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::I32(_) => "int32",
        Value::I64(_) => "int64",
        Value::U32(_) => "uint32",
        Value::U64(_) => "uint64",
        Value::F32(_) => "float",
        Value::F64(_) => "double",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::EnumNumber(_) => "enum",
        Value::Message(_) => "message",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaGraph;

    fn order_descriptor() -> MessageDescriptor {
        let graph = SchemaGraph::from_file_descriptor_set(
            greeter_service::descriptors::catalog_file_descriptor_set(),
        )
        .unwrap();
        graph
            .get("shop/order.proto")
            .and_then(|unit| unit.find_message("shop.Order"))
            .unwrap()
    }

    #[test]
    fn test_new_instance_is_empty_and_bound() {
        let descriptor = order_descriptor();
        let factory = GenericMessageFactory::new();
        let message = factory.new_instance(descriptor.clone());

        assert_eq!(message.descriptor(), descriptor);
        assert!(message.registry().is_none());
        assert!(!message.has("id"));
        assert_eq!(message.encode_to_vec(), Vec::<u8>::new());
        assert_eq!(message.get("count").unwrap().as_i32(), Some(0));
    }

    #[test]
    fn test_access_is_checked_against_descriptor() {
        let mut message = GenericMessageFactory::new().new_instance(order_descriptor());

        message
            .set("id", Value::String("order-1".to_string()))
            .unwrap();
        message.set_by_number(2, Value::I32(7)).unwrap();

        assert_eq!(message.get("id").unwrap().as_str(), Some("order-1"));
        assert_eq!(message.get_by_number(2).unwrap().as_i32(), Some(7));
        assert!(message.has("count"));

        assert!(matches!(
            message.set("bogus", Value::I32(1)),
            Err(PayloadError::UnknownField { field, message }) if field == "bogus" && message == "shop.Order"
        ));
        assert!(matches!(
            message.get_by_number(999),
            Err(PayloadError::UnknownField { field, .. }) if field == "999"
        ));
        assert!(matches!(
            message.set("count", Value::String("three".to_string())),
            Err(PayloadError::TypeMismatch { field, expected, found })
                if field == "count" && expected == "int32" && found == "string"
        ));

        message.clear("id").unwrap();
        assert!(!message.has("id"));
    }

    #[test]
    fn test_wire_round_trip() {
        let descriptor = order_descriptor();
        let factory = GenericMessageFactory::new();

        let mut message = factory.new_instance(descriptor.clone());
        message.set("total", Value::I64(-42)).unwrap();
        message
            .set("tags", Value::List(vec![Value::String("a".to_string())]))
            .unwrap();

        let mut decoded = factory.new_instance(descriptor);
        decoded
            .merge_from(message.encode_to_vec().as_slice())
            .unwrap();

        assert_eq!(decoded, message);
    }
}
