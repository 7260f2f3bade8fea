use colored::*;
use protocall_core::{
    grpc::client::{ClientConnectError, TransportError},
    invoker::InvocationError,
    message::kind_name,
    prost_reflect::{EnumDescriptor, MessageDescriptor, MethodDescriptor, ServiceDescriptor},
    schema::{Descriptor, LookupError, SchemaError},
};
use std::fmt::Display;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

pub struct ServiceList(pub Vec<String>);

pub struct GenericError<T: Display>(pub &'static str, pub T);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<InvocationError> for FormattedString {
    fn from(err: InvocationError) -> Self {
        match err {
            InvocationError::Transport {
                path,
                source: TransportError::Status(status),
            } => FormattedString(format!(
                "{} {} code={:?} message={:?}",
                "gRPC Failed:".red().bold(),
                path,
                status.code(),
                status.message()
            )),
            InvocationError::Lookup(err) => err.into(),
            err => FormattedString(format!("{}\n\n'{}'", "Call Failed:".red().bold(), err)),
        }
    }
}

impl From<SchemaError> for FormattedString {
    fn from(err: SchemaError) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Failed to load protoset:".red().bold(),
            err
        ))
    }
}

impl From<LookupError> for FormattedString {
    fn from(err: LookupError) -> Self {
        FormattedString(format!(
            "{}\n\n'{}'",
            "Symbol Lookup Failed:".red().bold(),
            err
        ))
    }
}

impl From<ClientConnectError> for FormattedString {
    fn from(err: ClientConnectError) -> Self {
        FormattedString(format!("{}\n\n'{}'", "Connection Error:".red().bold(), err))
    }
}

impl<T: Display> From<GenericError<T>> for FormattedString {
    fn from(GenericError(msg, err): GenericError<T>) -> Self {
        FormattedString(format!("{}:\n\n'{}'", msg.red().bold(), err))
    }
}

impl From<ServiceList> for FormattedString {
    fn from(ServiceList(services): ServiceList) -> Self {
        if services.is_empty() {
            return FormattedString("No services found.".yellow().to_string());
        }

        let mut out = String::new();
        out.push_str("Available Services:\n");
        for svc in services {
            out.push_str(&format!("  - {}\n", svc.green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<Descriptor> for FormattedString {
    fn from(descriptor: Descriptor) -> Self {
        match descriptor {
            Descriptor::MessageDescriptor(m) => m.into(),
            Descriptor::ServiceDescriptor(s) => s.into(),
            Descriptor::EnumDescriptor(e) => e.into(),
        }
    }
}

impl From<ServiceDescriptor> for FormattedString {
    fn from(service: ServiceDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "service".cyan(),
            service.name().green()
        ));

        for method in service.methods() {
            out.push_str("  ");
            // Reuse the From<MethodDescriptor> implementation
            let method_fmt = FormattedString::from(method);
            out.push_str(&method_fmt.0);
            out.push_str("\n\n");
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<MethodDescriptor> for FormattedString {
    fn from(method: MethodDescriptor) -> Self {
        let input_stream = if method.is_client_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };
        let output_stream = if method.is_server_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            input_stream,
            method.input().full_name().yellow(),
            "returns".cyan(),
            output_stream,
            method.output().full_name().yellow()
        ))
    }
}

impl From<MessageDescriptor> for FormattedString {
    fn from(message: MessageDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "message".cyan(),
            message.name().green()
        ));

        for field in message.fields() {
            let kind = field.kind();
            let type_name = kind_name(&kind).as_ref().yellow();

            if field.is_map() {
                out.push_str(&format!(
                    "  // map entry: {} {} = {};\n",
                    type_name,
                    field.name(),
                    field.number()
                ));
                continue;
            }

            let label = if field.is_list() {
                format!("{} ", "repeated".cyan())
            } else {
                "".to_string()
            };
            let oneof = match field.containing_oneof() {
                Some(oneof) if !oneof.is_synthetic() => {
                    format!("  {} {}", "// oneof".dimmed(), oneof.name().dimmed())
                }
                _ => "".to_string(),
            };

            out.push_str(&format!(
                "  {}{} {} = {};{}\n",
                label,
                type_name,
                field.name(),
                field.number(),
                oneof
            ));
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<EnumDescriptor> for FormattedString {
    fn from(enum_desc: EnumDescriptor) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "{} {} {{\n",
            "enum".cyan(),
            enum_desc.name().green()
        ));

        for val in enum_desc.values() {
            out.push_str(&format!(
                "  {} = {};\n",
                val.name(),
                val.number().to_string().purple()
            ));
        }
        out.push('}');

        FormattedString(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocall_core::tonic::Status;

    fn plain(formatted: impl FnOnce() -> FormattedString) -> String {
        colored::control::set_override(false);
        formatted().0
    }

    #[test]
    fn test_service_list() {
        assert_eq!(
            plain(|| ServiceList(vec![]).into()),
            "No services found."
        );
        assert_eq!(
            plain(|| ServiceList(vec!["a.A".to_string(), "b.B".to_string()]).into()),
            "Available Services:\n  - a.A\n  - b.B"
        );
    }

    #[test]
    fn test_status_errors_show_code_and_path() {
        let err = InvocationError::Transport {
            path: "/helloworld.Greeter/SayHello".to_string(),
            source: TransportError::Status(Status::not_found("no such user")),
        };

        let out = plain(|| err.into());
        assert!(out.contains("/helloworld.Greeter/SayHello"));
        assert!(out.contains("NotFound"));
        assert!(out.contains("no such user"));
    }

    #[test]
    fn test_lookup_errors_name_the_symbol() {
        let err = InvocationError::Lookup(LookupError::ServiceNotFound("does.not.Exist".to_string()));

        let out = plain(|| err.into());
        assert!(out.contains("Symbol Lookup Failed"));
        assert!(out.contains("does.not.Exist"));
    }
}
