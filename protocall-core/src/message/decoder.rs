//! # Request Decoder
//!
//! Fills a [`GenericMessage`] from a JSON document using the protobuf JSON mapping.
//!
//! * Object keys may be the field name (`placed_at`) or its JSON name (`placedAt`).
//! * Keys in brackets (`"[my.pkg.ext]"`) set extension fields.
//! * 64-bit integers may be written as numbers or as decimal strings.
//! * `bytes` are base64, with or without padding, in the standard or URL-safe alphabet.
//! * Enums may be written as a value name or as a number.
//! * `null` leaves the field unset.
//! * A `google.protobuf.Any` names its packed type in `"@type"`.
//!
//! Extensions and `Any` payloads are resolved through the [`ExtensionRegistry`] the
//! target message was created with. A message without a registry rejects both.
use super::{ANY, ExtensionRegistry, GenericMessage, PayloadError, any_fields, is_well_known, kind_name};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use prost::Message;
use prost_reflect::{
    DynamicMessage, EnumDescriptor, ExtensionDescriptor, FieldDescriptor, Kind, MapKey,
    MessageDescriptor, ReflectMessage, Value,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};

/// Decodes JSON payloads into [`GenericMessage`]s.
pub struct RequestDecoder;

impl RequestDecoder {
    /// Parses `payload` and merges it into `into`.
    ///
    /// A blank payload is treated as `{}`.
    pub fn decode(payload: &str, into: &mut GenericMessage) -> Result<(), PayloadError> {
        let value = if payload.trim().is_empty() {
            JsonValue::Object(Map::new())
        } else {
            serde_json::from_str(payload)
                .map_err(|e| PayloadError::MalformedPayload(e.to_string()))?
        };

        Self::decode_value(value, into)
    }

    /// Merges an already parsed JSON document into `into`.
    ///
    /// The document must be an object.
    pub fn decode_value(payload: JsonValue, into: &mut GenericMessage) -> Result<(), PayloadError> {
        let JsonValue::Object(object) = payload else {
            return Err(PayloadError::MalformedPayload(format!(
                "expected a JSON object, found {}",
                describe(&payload)
            )));
        };

        let (target, registry) = into.split_mut();
        Decoding { registry }.merge_object(target, object)
    }
}

/// How a value is laid out for one field or extension.
struct Slot<'a> {
    key: &'a str,
    kind: Kind,
    is_list: bool,
    is_map: bool,
}

impl<'a> Slot<'a> {
    fn field(key: &'a str, field: &FieldDescriptor) -> Self {
        Self {
            key,
            kind: field.kind(),
            is_list: field.is_list(),
            is_map: field.is_map(),
        }
    }

    fn extension(key: &'a str, extension: &ExtensionDescriptor) -> Self {
        Self {
            key,
            kind: extension.kind(),
            is_list: extension.is_list(),
            is_map: extension.is_map(),
        }
    }
}

struct Decoding<'r> {
    registry: Option<&'r ExtensionRegistry>,
}

impl Decoding<'_> {
    fn merge_object(
        &self,
        target: &mut DynamicMessage,
        object: Map<String, JsonValue>,
    ) -> Result<(), PayloadError> {
        let descriptor = target.descriptor();
        let mut seen = HashSet::new();
        // oneof name -> key that set it
        let mut oneofs: HashMap<String, String> = HashMap::new();

        for (key, json) in object {
            if let Some(name) = key.strip_prefix('[').and_then(|k| k.strip_suffix(']')) {
                let extension = self.extension(&descriptor, &key, name)?;
                if json.is_null() {
                    continue;
                }
                let value = self.slot_value(&Slot::extension(&key, &extension), json)?;
                target.set_extension(&extension, value);
                continue;
            }

            let field = descriptor
                .get_field_by_name(&key)
                .or_else(|| descriptor.get_field_by_json_name(&key))
                .ok_or_else(|| PayloadError::UnknownField {
                    message: descriptor.full_name().to_string(),
                    field: key.clone(),
                })?;

            if !seen.insert(field.number()) {
                return Err(PayloadError::TypeMismatch {
                    field: key,
                    expected: "a single value".to_string(),
                    found: format!("field '{}' given more than once", field.name()),
                });
            }

            if json.is_null() && !accepts_null(&field.kind()) {
                continue;
            }

            if let Some(oneof) = field.containing_oneof().filter(|o| !o.is_synthetic()) {
                if let Some(previous) = oneofs.insert(oneof.name().to_string(), key.clone()) {
                    return Err(PayloadError::TypeMismatch {
                        field: key,
                        expected: format!("at most one member of oneof '{}'", oneof.name()),
                        found: format!("'{previous}' already set"),
                    });
                }
            }

            let value = self.slot_value(&Slot::field(&key, &field), json)?;
            target
                .try_set_field(&field, value)
                .map_err(|e| PayloadError::TypeMismatch {
                    field: key.clone(),
                    expected: kind_name(&field.kind()).into_owned(),
                    found: e.to_string(),
                })?;
        }

        Ok(())
    }

    fn extension(
        &self,
        descriptor: &MessageDescriptor,
        key: &str,
        name: &str,
    ) -> Result<ExtensionDescriptor, PayloadError> {
        self.registry
            .and_then(|registry| registry.extension_for(descriptor, name))
            .ok_or_else(|| PayloadError::UnknownField {
                message: descriptor.full_name().to_string(),
                field: key.to_string(),
            })
    }

    fn slot_value(&self, slot: &Slot<'_>, json: JsonValue) -> Result<Value, PayloadError> {
        if slot.is_map {
            return self.map_value(slot, json);
        }

        if slot.is_list {
            let JsonValue::Array(items) = json else {
                return Err(mismatch(
                    slot.key,
                    format!("a list of {}", kind_name(&slot.kind)),
                    &json,
                ));
            };
            return items
                .into_iter()
                .map(|item| self.single_value(slot.key, &slot.kind, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List);
        }

        self.single_value(slot.key, &slot.kind, json)
    }

    fn map_value(&self, slot: &Slot<'_>, json: JsonValue) -> Result<Value, PayloadError> {
        let (Some(entry), JsonValue::Object(object)) = (slot.kind.as_message(), &json) else {
            return Err(mismatch(slot.key, "an object", &json));
        };
        let key_kind = entry.map_entry_key_field().kind();
        let value_kind = entry.map_entry_value_field().kind();

        let mut map = HashMap::with_capacity(object.len());
        for (key, value) in object {
            let key = map_key(slot.key, &key_kind, key)?;
            let value = self.single_value(slot.key, &value_kind, value.clone())?;
            map.insert(key, value);
        }

        Ok(Value::Map(map))
    }

    fn single_value(&self, field: &str, kind: &Kind, json: JsonValue) -> Result<Value, PayloadError> {
        match kind {
            Kind::Double => float(field, kind, &json).map(Value::F64),
            Kind::Float => float(field, kind, &json)
                .and_then(|v| narrow(field, kind, v, &json))
                .map(Value::F32),
            Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
                integer(field, kind, &json).map(Value::I32)
            }
            Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
                integer(field, kind, &json).map(Value::I64)
            }
            Kind::Uint32 | Kind::Fixed32 => integer(field, kind, &json).map(Value::U32),
            Kind::Uint64 | Kind::Fixed64 => integer(field, kind, &json).map(Value::U64),
            Kind::Bool => match json {
                JsonValue::Bool(b) => Ok(Value::Bool(b)),
                other => Err(mismatch(field, "bool", &other)),
            },
            Kind::String => match json {
                JsonValue::String(s) => Ok(Value::String(s)),
                other => Err(mismatch(field, "string", &other)),
            },
            Kind::Bytes => match &json {
                JsonValue::String(s) => decode_base64(s)
                    .map(|bytes| Value::Bytes(bytes.into()))
                    .ok_or_else(|| mismatch(field, "base64 encoded bytes", &json)),
                _ => Err(mismatch(field, "base64 encoded bytes", &json)),
            },
            Kind::Enum(descriptor) => enum_value(field, kind, descriptor, &json),
            Kind::Message(descriptor) => self.message_value(field, descriptor, json).map(Value::Message),
        }
    }

    fn message_value(
        &self,
        field: &str,
        descriptor: &MessageDescriptor,
        json: JsonValue,
    ) -> Result<DynamicMessage, PayloadError> {
        if descriptor.full_name() == ANY {
            return self.any_value(field, descriptor, json);
        }

        if is_well_known(descriptor) {
            let found = describe(&json);
            return DynamicMessage::deserialize(descriptor.clone(), json).map_err(|e| {
                PayloadError::TypeMismatch {
                    field: field.to_string(),
                    expected: descriptor.full_name().to_string(),
                    found: format!("{found} ({e})"),
                }
            });
        }

        let JsonValue::Object(object) = json else {
            return Err(mismatch(field, descriptor.full_name(), &json));
        };
        let mut message = DynamicMessage::new(descriptor.clone());
        self.merge_object(&mut message, object)?;
        Ok(message)
    }

    fn any_value(
        &self,
        field: &str,
        any: &MessageDescriptor,
        json: JsonValue,
    ) -> Result<DynamicMessage, PayloadError> {
        let JsonValue::Object(mut object) = json else {
            return Err(mismatch(field, ANY, &json));
        };

        let mut message = DynamicMessage::new(any.clone());
        if object.is_empty() {
            return Ok(message);
        }

        let type_url = match object.remove("@type") {
            Some(JsonValue::String(type_url)) => type_url,
            other => {
                return Err(PayloadError::TypeMismatch {
                    field: field.to_string(),
                    expected: "an '@type' string".to_string(),
                    found: other.as_ref().map_or_else(|| "no '@type'".to_string(), describe),
                });
            }
        };

        let packed_type = self
            .registry
            .and_then(|registry| registry.resolve_type_url(&type_url))
            .cloned()
            .ok_or_else(|| PayloadError::UnknownAnyType {
                type_url: type_url.clone(),
            })?;

        // Types with their own JSON form are packed under "value".
        let body = if is_well_known(&packed_type) {
            let value = object.remove("value").unwrap_or(JsonValue::Null);
            if let Some(key) = object.keys().next() {
                return Err(PayloadError::UnknownField {
                    message: packed_type.full_name().to_string(),
                    field: key.clone(),
                });
            }
            value
        } else {
            JsonValue::Object(object)
        };

        let packed = self.message_value(field, &packed_type, body)?;

        let (type_url_field, value_field) = any_fields(any).ok_or_else(|| {
            PayloadError::TypeMismatch {
                field: field.to_string(),
                expected: ANY.to_string(),
                found: format!("a '{}' without type_url and value fields", any.full_name()),
            }
        })?;
        message.set_field(&type_url_field, Value::String(type_url));
        message.set_field(&value_field, Value::Bytes(packed.encode_to_vec().into()));

        Ok(message)
    }
}

fn accepts_null(kind: &Kind) -> bool {
    match kind {
        Kind::Message(m) => m.full_name() == "google.protobuf.Value",
        Kind::Enum(e) => e.full_name() == "google.protobuf.NullValue",
        _ => false,
    }
}

fn enum_value(
    field: &str,
    kind: &Kind,
    descriptor: &EnumDescriptor,
    json: &JsonValue,
) -> Result<Value, PayloadError> {
    match json {
        JsonValue::String(name) => descriptor
            .get_value_by_name(name)
            .map(|value| Value::EnumNumber(value.number()))
            .ok_or_else(|| {
                mismatch(
                    field,
                    format!("a value of enum '{}'", descriptor.full_name()),
                    json,
                )
            }),
        JsonValue::Number(_) => integer(field, kind, json).map(Value::EnumNumber),
        JsonValue::Null if descriptor.full_name() == "google.protobuf.NullValue" => {
            Ok(Value::EnumNumber(0))
        }
        _ => Err(mismatch(field, kind_name(kind), json)),
    }
}

fn map_key(field: &str, kind: &Kind, key: &str) -> Result<MapKey, PayloadError> {
    let json = JsonValue::String(key.to_string());
    Ok(match kind {
        Kind::String => MapKey::String(key.to_string()),
        Kind::Bool => match key {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(mismatch(field, "a bool map key", &json)),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => MapKey::I32(integer(field, kind, &json)?),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => MapKey::I64(integer(field, kind, &json)?),
        Kind::Uint32 | Kind::Fixed32 => MapKey::U32(integer(field, kind, &json)?),
        Kind::Uint64 | Kind::Fixed64 => MapKey::U64(integer(field, kind, &json)?),
        _ => return Err(mismatch(field, "a valid map key type", &json)),
    })
}

/// Parses an integer written as a JSON number, an integral float or a decimal string,
/// then range checks it against `T`.
fn integer<T: TryFrom<i128>>(field: &str, kind: &Kind, json: &JsonValue) -> Result<T, PayloadError> {
    let wide = match json {
        JsonValue::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().and_then(integral)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };

    wide.and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(field, kind_name(kind), json))
}

fn integral(v: f64) -> Option<i128> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < 2f64.powi(64)).then_some(v as i128)
}

fn float(field: &str, kind: &Kind, json: &JsonValue) -> Result<f64, PayloadError> {
    let parsed = match json {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            s => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        },
        _ => None,
    };

    parsed.ok_or_else(|| mismatch(field, kind_name(kind), json))
}

fn narrow(field: &str, kind: &Kind, v: f64, json: &JsonValue) -> Result<f32, PayloadError> {
    if v.is_finite() && v.abs() > f64::from(f32::MAX) {
        return Err(mismatch(field, kind_name(kind), json));
    }
    Ok(v as f32)
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(s).ok())
}

fn mismatch(field: &str, expected: impl Into<String>, found: &JsonValue) -> PayloadError {
    PayloadError::TypeMismatch {
        field: field.to_string(),
        expected: expected.into(),
        found: describe(found),
    }
}

/// A short description of a JSON value for error messages.
fn describe(json: &JsonValue) -> String {
    match json {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => format!("bool {b}"),
        JsonValue::Number(n) => format!("number {n}"),
        JsonValue::String(s) if s.chars().count() > 32 => {
            format!("string \"{}…\"", s.chars().take(32).collect::<String>())
        }
        JsonValue::String(s) => format!("string \"{s}\""),
        JsonValue::Array(_) => "an array".to_string(),
        JsonValue::Object(_) => "an object".to_string(),
    }
}
