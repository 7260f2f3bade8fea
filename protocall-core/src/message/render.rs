//! Renders dynamic messages with the protobuf JSON mapping.
//!
//! Keys are JSON names, 64-bit integers are strings, enums are value names and
//! `bytes` are standard base64. Populated extensions known to the registry are
//! rendered under `"[full.name]"` keys.
use super::{ANY, ExtensionRegistry, PayloadError, any_fields, is_well_known};
use base64::{Engine, engine::general_purpose::STANDARD};
use prost_reflect::{DynamicMessage, Kind, MapKey, ReflectMessage, Value};
use serde_json::{Map, Number, Value as JsonValue};

pub(crate) fn message(
    message: &DynamicMessage,
    registry: Option<&ExtensionRegistry>,
) -> Result<JsonValue, PayloadError> {
    let descriptor = message.descriptor();

    if descriptor.full_name() == ANY {
        return any(message, registry);
    }
    if is_well_known(&descriptor) {
        return Ok(serde_json::to_value(message)?);
    }

    let mut object = Map::new();
    for (field, value) in message.fields() {
        let rendered = if field.is_map() {
            let value_kind = field
                .kind()
                .as_message()
                .map(|entry| entry.map_entry_value_field().kind());
            match (value_kind, value.as_map()) {
                (Some(kind), Some(entries)) => map(entries.iter(), &kind, registry)?,
                _ => single(value, &field.kind(), registry)?,
            }
        } else {
            single(value, &field.kind(), registry)?
        };
        object.insert(field.json_name().to_string(), rendered);
    }

    if let Some(registry) = registry {
        for extension in registry.extensions_for(&descriptor) {
            if message.has_extension(&extension) {
                let value = message.get_extension(&extension);
                object.insert(
                    format!("[{}]", extension.full_name()),
                    single(&value, &extension.kind(), Some(registry))?,
                );
            }
        }
    }

    Ok(JsonValue::Object(object))
}

fn any(
    message: &DynamicMessage,
    registry: Option<&ExtensionRegistry>,
) -> Result<JsonValue, PayloadError> {
    let descriptor = message.descriptor();
    let Some((type_url_field, value_field)) = any_fields(&descriptor) else {
        return Ok(serde_json::to_value(message)?);
    };

    let type_url = message.get_field(&type_url_field);
    let type_url = type_url.as_str().unwrap_or_default();
    let packed = message.get_field(&value_field);
    let packed = packed.as_bytes().cloned().unwrap_or_default();

    if type_url.is_empty() && packed.is_empty() {
        return Ok(JsonValue::Object(Map::new()));
    }

    let packed_type = registry
        .and_then(|registry| registry.resolve_type_url(type_url))
        .cloned()
        .ok_or_else(|| PayloadError::UnknownAnyType {
            type_url: type_url.to_string(),
        })?;
    let packed = DynamicMessage::decode(packed_type.clone(), packed).map_err(|source| {
        PayloadError::InvalidAnyValue {
            type_url: type_url.to_string(),
            source,
        }
    })?;

    let rendered = self::message(&packed, registry)?;
    let mut object = match rendered {
        JsonValue::Object(fields) if !is_well_known(&packed_type) => fields,
        value => Map::from_iter([("value".to_string(), value)]),
    };
    object.insert("@type".to_string(), JsonValue::String(type_url.to_string()));

    Ok(JsonValue::Object(object))
}

fn map<'a>(
    entries: impl Iterator<Item = (&'a MapKey, &'a Value)>,
    kind: &Kind,
    registry: Option<&ExtensionRegistry>,
) -> Result<JsonValue, PayloadError> {
    let mut object = Map::new();
    for (key, value) in entries {
        let key = match key {
            MapKey::Bool(b) => b.to_string(),
            MapKey::I32(v) => v.to_string(),
            MapKey::I64(v) => v.to_string(),
            MapKey::U32(v) => v.to_string(),
            MapKey::U64(v) => v.to_string(),
            MapKey::String(s) => s.clone(),
        };
        object.insert(key, single(value, kind, registry)?);
    }
    Ok(JsonValue::Object(object))
}

fn single(
    value: &Value,
    kind: &Kind,
    registry: Option<&ExtensionRegistry>,
) -> Result<JsonValue, PayloadError> {
    Ok(match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::I32(v) => JsonValue::from(*v),
        Value::U32(v) => JsonValue::from(*v),
        Value::I64(v) => JsonValue::String(v.to_string()),
        Value::U64(v) => JsonValue::String(v.to_string()),
        // Going through the shortest decimal form keeps 0.1f32 as 0.1.
        Value::F32(v) => float(v.to_string().parse().unwrap_or(f64::from(*v))),
        Value::F64(v) => float(*v),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
        Value::EnumNumber(number) => match kind {
            Kind::Enum(e) if e.full_name() == "google.protobuf.NullValue" => JsonValue::Null,
            Kind::Enum(e) => e
                .get_value(*number)
                .map_or_else(|| JsonValue::from(*number), |v| JsonValue::String(v.name().to_string())),
            _ => JsonValue::from(*number),
        },
        Value::Message(m) => message(m, registry)?,
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| single(item, kind, registry))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => map(entries.iter(), kind, registry)?,
    })
}

fn float(v: f64) -> JsonValue {
    Number::from_f64(v).map_or_else(
        || {
            let special = if v.is_nan() {
                "NaN"
            } else if v.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            JsonValue::String(special.to_string())
        },
        JsonValue::Number,
    )
}
