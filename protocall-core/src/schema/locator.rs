//! # Service Locator
//!
//! Finds services, methods and other symbols in a linked [`SchemaGraph`].
//!
//! Lookups scan every unit of the graph, ordered by file name, and compare fully
//! qualified names exactly. When unrelated files define the same name, the first
//! match wins.
use super::SchemaGraph;
use prost_reflect::{EnumDescriptor, MessageDescriptor, MethodDescriptor, ServiceDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },

    #[error("Invalid method path. Expected format 'package.Service/Method', got '{0}'")]
    InvalidMethodPath(String),
}

/// A generic wrapper for different types of Protobuf descriptors.
///
/// This enum allows the locator to return a single type when resolving symbols,
/// regardless of whether the symbol points to a Service, a Message, or an Enum.
#[derive(Debug, Clone)]
pub enum Descriptor {
    MessageDescriptor(MessageDescriptor),
    ServiceDescriptor(ServiceDescriptor),
    EnumDescriptor(EnumDescriptor),
}

impl Descriptor {
    /// Returns the name (e.g.,`MyMessage`) of the inner descriptor
    pub fn name(&self) -> &str {
        match self {
            Descriptor::MessageDescriptor(v) => v.name(),
            Descriptor::ServiceDescriptor(v) => v.name(),
            Descriptor::EnumDescriptor(v) => v.name(),
        }
    }

    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::MessageDescriptor(v) => v.full_name(),
            Descriptor::ServiceDescriptor(v) => v.full_name(),
            Descriptor::EnumDescriptor(v) => v.full_name(),
        }
    }
}

/// Read-only lookups over a [`SchemaGraph`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceLocator<'g> {
    graph: &'g SchemaGraph,
}

impl<'g> ServiceLocator<'g> {
    pub fn new(graph: &'g SchemaGraph) -> Self {
        Self { graph }
    }

    /// Finds a service by its fully qualified name (e.g. `helloworld.Greeter`).
    pub fn find_service(&self, full_name: &str) -> Result<ServiceDescriptor, LookupError> {
        self.graph
            .units()
            .find_map(|unit| unit.find_service(full_name))
            .ok_or_else(|| LookupError::ServiceNotFound(full_name.to_string()))
    }

    /// Finds a method by its simple name (e.g. `SayHello`) within `service`.
    pub fn find_method(
        &self,
        service: &ServiceDescriptor,
        name: &str,
    ) -> Result<MethodDescriptor, LookupError> {
        service
            .methods()
            .find(|m| m.name() == name)
            .ok_or_else(|| LookupError::MethodNotFound {
                service: service.full_name().to_string(),
                method: name.to_string(),
            })
    }

    /// Resolves a full method path (e.g., "my.package.MyService/MyMethod")
    /// into a MethodDescriptor.
    pub fn find_method_by_path(&self, path: &str) -> Result<MethodDescriptor, LookupError> {
        let (service, method) = path
            .trim_start_matches('/')
            .split_once('/')
            .filter(|(service, method)| !service.is_empty() && !method.is_empty())
            .ok_or_else(|| LookupError::InvalidMethodPath(path.to_string()))?;

        let service = self.find_service(service)?;
        self.find_method(&service, method)
    }

    /// Fully qualified names of every service in the graph, sorted and deduplicated.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self
            .graph
            .units()
            .flat_map(|unit| unit.services())
            .map(|s| s.full_name().to_string())
            .collect();
        services.sort();
        services.dedup();
        services
    }

    /// Looks up a service, message or enum by its fully qualified name.
    pub fn find_symbol(&self, full_name: &str) -> Option<Descriptor> {
        let units = || self.graph.units();

        if let Some(descriptor) = units().find_map(|u| u.find_service(full_name)) {
            return Some(Descriptor::ServiceDescriptor(descriptor));
        }
        if let Some(descriptor) = units().find_map(|u| u.find_message(full_name)) {
            return Some(Descriptor::MessageDescriptor(descriptor));
        }
        if let Some(descriptor) = units().find_map(|u| u.find_enum(full_name)) {
            return Some(Descriptor::EnumDescriptor(descriptor));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> SchemaGraph {
        SchemaGraph::from_file_descriptor_set(greeter_service::file_descriptor_set()).unwrap()
    }

    #[test]
    fn test_find_service_and_method() {
        let graph = graph();
        let locator = ServiceLocator::new(&graph);

        let service = locator.find_service("helloworld.Greeter").unwrap();
        let method = locator.find_method(&service, "SayHello").unwrap();

        assert_eq!(method.parent_service().full_name(), "helloworld.Greeter");
        // Input and output live in a different file than the service.
        assert_eq!(method.input().full_name(), "helloworld.HelloRequest");
        assert_eq!(method.output().full_name(), "helloworld.HelloReply");
        assert_eq!(
            method.input().parent_file().name(),
            "helloworld/messages.proto"
        );
    }

    #[test]
    fn test_lookup_errors_name_the_missing_symbol() {
        let graph = graph();
        let locator = ServiceLocator::new(&graph);

        assert!(matches!(
            locator.find_service("does.not.Exist"),
            Err(LookupError::ServiceNotFound(name)) if name == "does.not.Exist"
        ));

        // Names are matched exactly, never partially.
        assert!(matches!(
            locator.find_service("Greeter"),
            Err(LookupError::ServiceNotFound(_))
        ));

        let service = locator.find_service("helloworld.Greeter").unwrap();
        assert!(matches!(
            locator.find_method(&service, "Nope"),
            Err(LookupError::MethodNotFound { service, method })
                if service == "helloworld.Greeter" && method == "Nope"
        ));
    }

    #[test]
    fn test_find_method_by_path() {
        let graph = graph();
        let locator = ServiceLocator::new(&graph);

        let method = locator
            .find_method_by_path("/helloworld.Greeter/SayHello")
            .unwrap();
        assert_eq!(method.name(), "SayHello");

        for path in ["helloworld.Greeter", "helloworld.Greeter/", "/SayHello"] {
            assert!(matches!(
                locator.find_method_by_path(path),
                Err(LookupError::InvalidMethodPath(p)) if p == path
            ));
        }
    }

    #[test]
    fn test_services_and_symbols() {
        let graph = graph();
        let locator = ServiceLocator::new(&graph);

        assert_eq!(locator.services(), vec!["helloworld.Greeter".to_string()]);

        assert!(matches!(
            locator.find_symbol("helloworld.Greeter"),
            Some(Descriptor::ServiceDescriptor(_))
        ));
        assert!(matches!(
            locator.find_symbol("helloworld.HelloReply"),
            Some(Descriptor::MessageDescriptor(m)) if m.name() == "HelloReply"
        ));
        assert!(locator.find_symbol("helloworld.Ghost").is_none());
    }

    #[test]
    fn test_first_definition_wins() {
        use greeter_service::descriptors::{file, service, unary};
        use prost_types::FileDescriptorSet;

        let mut first = file("a/ping.proto", "dup", &["google/protobuf/empty.proto"]);
        first.service.push(service(
            "Ping",
            vec![unary("Ping", ".google.protobuf.Empty", ".google.protobuf.Empty")],
        ));
        let mut second = first.clone();
        second.name = Some("b/ping.proto".to_string());
        second.service[0].method[0].name = Some("Pong".to_string());

        let mut empty = file("google/protobuf/empty.proto", "google.protobuf", &[]);
        empty
            .message_type
            .push(greeter_service::descriptors::message("Empty", vec![]));

        let graph = SchemaGraph::from_file_descriptor_set(FileDescriptorSet {
            file: vec![second, empty, first],
        })
        .unwrap();
        let locator = ServiceLocator::new(&graph);

        let service = locator.find_service("dup.Ping").unwrap();
        assert_eq!(service.parent_file().name(), "a/ping.proto");
        assert!(locator.find_method(&service, "Ping").is_ok());
        assert_eq!(locator.services(), vec!["dup.Ping".to_string()]);
    }
}
