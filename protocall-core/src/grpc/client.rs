//! # Generic gRPC Client
//!
//! Wraps a `tonic` client to perform unary calls with [`GenericMessage`]s. It does not
//! know the structure of the messages it carries: the [`GenericCodec`] writes the
//! request's bytes and decodes the reply into the response type it is given.
//!
//! * **Dynamic Pathing**: Builds the HTTP/2 path (`/package.Service/Method`) at runtime.
//! * **Metadata Handling**: Turns the [`CallContext`] headers into a `MetadataMap`.
//! * **Deadlines**: Sends the time left as the `grpc-timeout` header and stops waiting
//!   locally once the deadline passes.
//! * **Cancellation**: Drops the in-flight exchange as soon as the context is cancelled.
use super::codec::GenericCodec;
use crate::{
    BoxError,
    context::{CallContext, Interrupted},
    message::GenericMessage,
};
use http_body::Body as HttpBody;
use prost_reflect::MethodDescriptor;
use std::{str::FromStr, time::Duration};
use tonic::{
    Code, Status,
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::{Channel, Endpoint},
};

/// Errors that can occur when connecting to a gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum ClientConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

/// Errors that can occur while exchanging a message with the server.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Internal error, the client was not ready: '{0}'")]
    NotReady(#[source] BoxError),
    #[error("gRPC call failed: {}: {}", .0.code(), .0.message())]
    Status(Status),
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("Call cancelled")]
    Cancelled,
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
    #[error("Invalid gRPC path '{0}'")]
    InvalidPath(String),
}

impl From<Status> for TransportError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::DeadlineExceeded => TransportError::DeadlineExceeded,
            Code::Cancelled => TransportError::Cancelled,
            _ => TransportError::Status(status),
        }
    }
}

impl TransportError {
    fn interrupted(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::DeadlineExceeded => TransportError::DeadlineExceeded,
            Interrupted::Cancelled => TransportError::Cancelled,
        }
    }
}

/// A gRPC client for methods whose message types are only known at runtime.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl GrpcClient<Channel> {
    /// Connects to a gRPC server.
    ///
    /// # Arguments
    ///
    /// * `addr` - The server URI (e.g., `http://localhost:50051`).
    /// * `connect_timeout` - How long to wait for the connection to be established.
    ///
    /// # Returns
    ///
    /// * `Ok(GrpcClient)` - The connected client.
    /// * `Err(ClientConnectError)` - If the URL is invalid or connection fails.
    pub async fn connect(
        addr: &str,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, ClientConnectError> {
        let mut endpoint = Endpoint::new(addr.to_string())
            .map_err(|e| ClientConnectError::InvalidUrl(addr.to_string(), e))?;

        if let Some(timeout) = connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ClientConnectError::ConnectionFailed(addr.to_string(), e))?;

        tracing::debug!(addr, "connected");
        Ok(Self::new(channel))
    }
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// `response` is an empty instance of the method's output type; the reply is
    /// decoded into a copy of it.
    ///
    /// # Returns
    ///
    /// * `Ok(GenericMessage)` - The server's reply.
    /// * `Err(TransportError)` - The request could not be sent, the server answered with
    ///   a non-OK status, or the context's deadline or cancellation cut the call short.
    pub async fn unary(
        &mut self,
        ctx: &CallContext,
        method: &MethodDescriptor,
        request: GenericMessage,
        response: GenericMessage,
    ) -> Result<GenericMessage, TransportError> {
        let path = http_path(method)?;
        let mut request = build_request(request, ctx.headers())?;
        if let Some(remaining) = ctx.remaining() {
            request.set_timeout(remaining);
        }
        let codec = GenericCodec::new(response);

        let client = &mut self.client;
        let exchange = async move {
            if let Err(e) = client.ready().await {
                return Err(TransportError::NotReady(e.into()));
            }
            client
                .unary(request, path, codec)
                .await
                .map(tonic::Response::into_inner)
                .map_err(TransportError::from)
        };

        ctx.bound(exchange)
            .await
            .unwrap_or_else(|interrupted| Err(TransportError::interrupted(interrupted)))
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, TransportError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|_| TransportError::InvalidPath(path))
}

fn build_request<T>(
    payload: T,
    headers: &[(String, String)],
) -> Result<tonic::Request<T>, TransportError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in headers {
        let key = MetadataKey::from_str(k).map_err(|source| TransportError::InvalidMetadataKey {
            key: k.clone(),
            source,
        })?;
        let val = MetadataValue::from_str(v).map_err(|source| {
            TransportError::InvalidMetadataValue {
                key: k.clone(),
                source,
            }
        })?;
        request.metadata_mut().append(key, val);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_map_to_transport_errors() {
        assert!(matches!(
            TransportError::from(Status::deadline_exceeded("slow")),
            TransportError::DeadlineExceeded
        ));
        assert!(matches!(
            TransportError::from(Status::cancelled("gone")),
            TransportError::Cancelled
        ));
        assert!(matches!(
            TransportError::from(Status::not_found("nope")),
            TransportError::Status(status) if status.code() == Code::NotFound
        ));
    }

    #[test]
    fn test_headers_become_metadata() {
        let headers = vec![
            ("x-tenant".to_string(), "a".to_string()),
            ("x-tenant".to_string(), "b".to_string()),
        ];
        let request = build_request((), &headers).unwrap();

        let values: Vec<_> = request
            .metadata()
            .get_all("x-tenant")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_headers_are_rejected() {
        let bad_key = vec![("bad key".to_string(), "v".to_string())];
        assert!(matches!(
            build_request((), &bad_key),
            Err(TransportError::InvalidMetadataKey { key, .. }) if key == "bad key"
        ));

        let bad_value = vec![("x-ok".to_string(), "line\nbreak".to_string())];
        assert!(matches!(
            build_request((), &bad_value),
            Err(TransportError::InvalidMetadataValue { key, .. }) if key == "x-ok"
        ));
    }
}
