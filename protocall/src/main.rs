//! # Protocall CLI Entry Point
//!
//! The main executable for the Protocall tool. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Sets up logging and parses command-line arguments using [`cli::Cli`].
//! 2. **Schema**: Loads and links the protoset through `protocall_core`.
//! 3. **Execution**: Connects to the server and delegates the call to the `Invoker`,
//!    or answers `list`/`describe` from the schema alone.
//! 4. **Presentation**: Formats and prints the resulting data or error to standard output/error.

mod cli;
mod formatter;

use clap::Parser;
use cli::{Cli, Commands};
use formatter::{FormattedString, GenericError, ServiceList};
use protocall_core::{
    context::CallContext,
    grpc::client::GrpcClient,
    invoker::Invoker,
    schema::{SchemaGraph, ServiceLocator},
};
use std::{path::Path, process, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Cli::parse();
    let graph = load_or_exit(&args.protoset);

    match args.command {
        Commands::Call {
            url,
            endpoint,
            body,
            headers,
            timeout,
            connect_timeout,
        } => {
            let (service, method) = endpoint;
            let call = Call {
                url,
                service,
                method,
                body,
                headers,
                timeout,
                connect_timeout,
            };
            run_call(graph, call).await;
        }
        Commands::List => list_services(&graph),
        Commands::Describe { symbol } => describe(&graph, &symbol),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_or_exit(path: &Path) -> SchemaGraph {
    match SchemaGraph::from_file(path) {
        Ok(graph) => graph,
        Err(err) => exit_with(err),
    }
}

fn exit_with(err: impl Into<FormattedString>) -> ! {
    eprintln!("{}", err.into());
    process::exit(1);
}

fn list_services(graph: &SchemaGraph) {
    let services = ServiceLocator::new(graph).services();
    println!("{}", FormattedString::from(ServiceList(services)));
}

fn describe(graph: &SchemaGraph, symbol: &str) {
    let locator = ServiceLocator::new(graph);

    if symbol.contains('/') {
        match locator.find_method_by_path(symbol) {
            Ok(method) => println!("{}", FormattedString::from(method)),
            Err(err) => exit_with(err),
        }
        return;
    }

    match locator.find_symbol(symbol) {
        Some(descriptor) => println!("{}", FormattedString::from(descriptor)),
        None => exit_with(GenericError("Symbol Lookup Failed", format!("'{symbol}' not found"))),
    }
}

struct Call {
    url: String,
    service: String,
    method: String,
    body: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    connect_timeout: Duration,
}

async fn run_call(graph: SchemaGraph, call: Call) {
    let invoker = Invoker::new(Arc::new(graph));

    // Fail on the request before opening a connection.
    if let Err(err) = invoker.prepare(&call.service, &call.method, &call.body) {
        exit_with(err);
    }

    let mut connection = match GrpcClient::connect(&call.url, Some(call.connect_timeout)).await {
        Ok(connection) => connection,
        Err(err) => exit_with(err),
    };

    let token = CancellationToken::new();
    let ctx = call
        .headers
        .into_iter()
        .fold(CallContext::new(), |ctx, (key, value)| ctx.with_header(key, value))
        .with_timeout(call.timeout)
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling call");
            token.cancel();
        }
    });

    match invoker
        .invoke(&ctx, &mut connection, &call.service, &call.method, &call.body)
        .await
    {
        Ok(reply) => match reply.to_json() {
            Ok(value) => println!("{}", FormattedString::from(value)),
            Err(err) => exit_with(GenericError("Failed to render the reply", err)),
        },
        Err(err) => exit_with(err),
    }
}
