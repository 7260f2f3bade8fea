//! Schema bundles used by the tests.
//!
//! The bundles are compiled from `proto/` by the build script. They are handed out in
//! reverse dependency order, so importers always come before the files they import.
//! The builders below assemble the odd bundle protoc would refuse to emit, such as
//! duplicate or unresolvable definitions.
use crate::{CATALOG_FILE_DESCRIPTOR_SET, DEMO_FILE_DESCRIPTOR_SET, FILE_DESCRIPTOR_SET};
use prost::Message;
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};

/// `helloworld/greeter.proto` and `helloworld/messages.proto`.
pub fn file_descriptor_set() -> FileDescriptorSet {
    reversed(FILE_DESCRIPTOR_SET)
}

/// The `helloworld` bundle serialized the way `protoc --descriptor_set_out` writes it.
pub fn encoded_file_descriptor_set() -> Vec<u8> {
    file_descriptor_set().encode_to_vec()
}

/// A richer bundle exercising every JSON mapping rule: scalars, enums, maps, oneofs,
/// `Any`, `Timestamp` and a proto2 extension (`shop.priority` on `shop.Legacy`).
/// `shop.Coupon` is bundled but imported by nothing.
pub fn catalog_file_descriptor_set() -> FileDescriptorSet {
    reversed(CATALOG_FILE_DESCRIPTOR_SET)
}

/// `demo.Greeting { string name = 1; int32 count = 2; }`
pub fn demo_file_descriptor_set() -> FileDescriptorSet {
    reversed(DEMO_FILE_DESCRIPTOR_SET)
}

fn reversed(bytes: &[u8]) -> FileDescriptorSet {
    let mut set =
        FileDescriptorSet::decode(bytes).expect("build script wrote an invalid descriptor set");
    set.file.reverse();
    set
}

/// An empty proto3 file declaring only its imports.
pub fn file(name: &str, package: &str, dependencies: &[&str]) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        dependency: dependencies.iter().map(|d| d.to_string()).collect(),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub fn scalar(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(json_name(name)),
        ..Default::default()
    }
}

/// A message or enum typed field; `type_name` is fully qualified with a leading dot.
pub fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..scalar(name, number, ty)
    }
}

pub fn service(name: &str, methods: Vec<MethodDescriptorProto>) -> ServiceDescriptorProto {
    ServiceDescriptorProto {
        name: Some(name.to_string()),
        method: methods,
        options: None,
    }
}

pub fn unary(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(input.to_string()),
        output_type: Some(output.to_string()),
        options: None,
        client_streaming: Some(false),
        server_streaming: Some(false),
    }
}

fn json_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
