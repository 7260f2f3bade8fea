//! # Invoker
//!
//! Orchestrates one dynamic unary call:
//!
//! 1. locate the method in the [`SchemaGraph`];
//! 2. reject streaming methods before anything is sent;
//! 3. build empty request and response instances and decode the JSON payload
//!    into the request;
//! 4. perform exactly one unary exchange at `/<service>/<method>`;
//! 5. hand back the populated response.
//!
//! An `Invoker` is read-only once built, so a single instance can serve any number of
//! concurrent calls. Each concurrent call brings its own [`GrpcClient`], typically a
//! clone sharing one multiplexed channel.
//!
//! ## Example
//!
//! ```rust,no_run
//! use protocall_core::{context::CallContext, grpc::client::GrpcClient, invoker::Invoker, schema::SchemaGraph};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Arc::new(SchemaGraph::from_file("greeter.protoset")?);
//! let invoker = Invoker::new(graph);
//!
//! let mut connection = GrpcClient::connect("http://localhost:50051", None).await?;
//! let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
//!
//! let reply = invoker
//!     .invoke(&ctx, &mut connection, "helloworld.Greeter", "SayHello", r#"{"name": "world"}"#)
//!     .await?;
//! println!("{}", reply.to_json()?);
//! # Ok(())
//! # }
//! ```
use crate::{
    BoxError,
    context::CallContext,
    grpc::client::{GrpcClient, TransportError},
    message::{ExtensionRegistry, GenericMessage, GenericMessageFactory, PayloadError, RequestDecoder},
    schema::{LookupError, SchemaGraph, ServiceLocator},
};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::sync::Arc;
use tonic::client::GrpcService;

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Invalid request payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Method '{method}' of service '{service}' is streaming, only unary methods can be invoked")]
    UnsupportedStreamingMethod { service: String, method: String },

    #[error("Call to '{path}' failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: TransportError,
    },
}

/// A located method with its request decoded, ready to be sent.
#[derive(Debug, Clone)]
pub struct UnaryCall {
    pub method: MethodDescriptor,
    pub request: GenericMessage,
    /// Empty instance of the output type; the reply is decoded into a copy of it.
    pub response: GenericMessage,
}

impl UnaryCall {
    /// The HTTP/2 path the call is sent to (e.g. `/helloworld.Greeter/SayHello`).
    pub fn path(&self) -> String {
        format!(
            "/{}/{}",
            self.method.parent_service().full_name(),
            self.method.name()
        )
    }
}

/// Invokes unary methods described by a [`SchemaGraph`].
#[derive(Debug, Clone)]
pub struct Invoker {
    graph: Arc<SchemaGraph>,
    factory: GenericMessageFactory,
}

impl Invoker {
    /// Builds the graph's [`ExtensionRegistry`] once and binds every message the
    /// invoker creates to it.
    pub fn new(graph: Arc<SchemaGraph>) -> Self {
        let registry = Arc::new(ExtensionRegistry::from_graph(&graph));
        Self {
            graph,
            factory: GenericMessageFactory::with_registry(registry),
        }
    }

    /// Uses `factory` to create messages instead of one bound to the whole graph.
    pub fn with_factory(graph: Arc<SchemaGraph>, factory: GenericMessageFactory) -> Self {
        Self { graph, factory }
    }

    pub fn graph(&self) -> &Arc<SchemaGraph> {
        &self.graph
    }

    pub fn factory(&self) -> &GenericMessageFactory {
        &self.factory
    }

    /// Locates `service`/`method` and decodes `payload` into a new request, without
    /// touching the network.
    ///
    /// # Returns
    ///
    /// * `Ok(UnaryCall)` - The method, the decoded request and an empty response.
    /// * `Err(InvocationError)` - The method does not exist or is streaming, or the
    ///   payload does not fit the input type.
    pub fn prepare(
        &self,
        service: &str,
        method: &str,
        payload: &str,
    ) -> Result<UnaryCall, InvocationError> {
        let locator = ServiceLocator::new(&self.graph);
        let service = locator.find_service(service)?;
        let method = locator.find_method(&service, method)?;

        if method.is_client_streaming() || method.is_server_streaming() {
            return Err(InvocationError::UnsupportedStreamingMethod {
                service: service.full_name().to_string(),
                method: method.name().to_string(),
            });
        }

        let mut request = self.factory.new_instance(method.input());
        let response = self.factory.new_instance(method.output());
        RequestDecoder::decode(payload, &mut request)?;

        tracing::debug!(
            method = method.full_name(),
            input = method.input().full_name(),
            output = method.output().full_name(),
            "prepared unary call"
        );

        Ok(UnaryCall {
            method,
            request,
            response,
        })
    }

    /// Invokes `service`/`method` over `connection` with `payload` as the request.
    ///
    /// # Returns
    ///
    /// * `Ok(GenericMessage)` - The server's reply, an instance of the output type.
    /// * `Err(InvocationError)` - Lookup, payload or transport failure. Non-OK statuses,
    ///   deadline expiry and cancellation are all transport failures.
    pub async fn invoke<S>(
        &self,
        ctx: &CallContext,
        connection: &mut GrpcClient<S>,
        service: &str,
        method: &str,
        payload: &str,
    ) -> Result<GenericMessage, InvocationError>
    where
        S: GrpcService<tonic::body::Body>,
        S::Error: Into<BoxError>,
        S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
        <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
    {
        let call = self.prepare(service, method, payload)?;
        let path = call.path();

        tracing::debug!(path = %path, "dispatching unary call");

        connection
            .unary(ctx, &call.method, call.request, call.response)
            .await
            .map_err(|source| {
                tracing::debug!(path = %path, error = %source, "unary call failed");
                InvocationError::Transport { path, source }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeter_service::descriptors::catalog_file_descriptor_set;

    fn invoker() -> Invoker {
        let graph = SchemaGraph::from_file_descriptor_set(catalog_file_descriptor_set()).unwrap();
        Invoker::new(Arc::new(graph))
    }

    #[test]
    fn test_prepare_decodes_the_request() {
        let call = invoker()
            .prepare("shop.Orders", "Place", r#"{"id": "o-1", "count": 2}"#)
            .unwrap();

        assert_eq!(call.path(), "/shop.Orders/Place");
        assert_eq!(call.request.get("id").unwrap().as_str(), Some("o-1"));
        assert_eq!(call.response.descriptor().full_name(), "shop.Order");
        assert_eq!(call.response.encode_to_vec(), Vec::<u8>::new());
    }

    #[test]
    fn test_prepare_binds_messages_to_the_registry() {
        let call = invoker()
            .prepare(
                "shop.Orders",
                "Place",
                r#"{"detail": {"@type": "type.googleapis.com/shop.Coupon", "code": "X"}}"#,
            )
            .unwrap();

        assert!(call.request.registry().is_some());
        assert!(call.response.registry().is_some());
        assert!(invoker().factory().registry().is_some());
    }

    #[test]
    fn test_prepare_reports_lookup_and_payload_errors() {
        let invoker = invoker();

        assert!(matches!(
            invoker.prepare("shop.Ghosts", "Place", "{}"),
            Err(InvocationError::Lookup(LookupError::ServiceNotFound(name))) if name == "shop.Ghosts"
        ));
        assert!(matches!(
            invoker.prepare("shop.Orders", "Cancel", "{}"),
            Err(InvocationError::Lookup(LookupError::MethodNotFound { method, .. })) if method == "Cancel"
        ));
        assert!(matches!(
            invoker.prepare("shop.Orders", "Place", r#"{"bogus": true}"#),
            Err(InvocationError::Payload(PayloadError::UnknownField { .. }))
        ));
    }

    #[test]
    fn test_unbound_factory_cannot_resolve_any() {
        let graph = Arc::new(
            SchemaGraph::from_file_descriptor_set(catalog_file_descriptor_set()).unwrap(),
        );
        let invoker = Invoker::with_factory(Arc::clone(&graph), GenericMessageFactory::new());
        assert!(Arc::ptr_eq(invoker.graph(), &graph));
        assert!(invoker.factory().registry().is_none());

        let result = invoker.prepare(
            "shop.Orders",
            "Place",
            r#"{"detail": {"@type": "type.googleapis.com/shop.Coupon"}}"#,
        );

        assert!(matches!(
            result,
            Err(InvocationError::Payload(PayloadError::UnknownAnyType { .. }))
        ));
    }
}
