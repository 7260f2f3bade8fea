//! # CLI
//!
//! This module defines the command-line interface of `protocall` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g., ensuring headers are `key:value`).
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

#[derive(Parser, Debug)]
#[command(name = "protocall", version, about = "Call unary gRPC methods from a protoset")]
pub struct Cli {
    /// Path to the protoset (e.g. built with `protoc --include_imports --descriptor_set_out`)
    #[arg(long, env = "PROTOCALL_PROTOSET")]
    pub protoset: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Perform a unary gRPC call
    ///
    /// The request body is decoded against the method's input type, using the
    /// protobuf JSON mapping.
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// protocall --protoset greeter.protoset call http://localhost:50051 helloworld.Greeter/SayHello --body '{"name": "Ferris"}'
    /// ```
    Call {
        /// The server URL to connect to (e.g. http://localhost:50051)
        url: String,

        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),

        /// JSON request body
        #[arg(long, default_value = "{}")]
        body: String,

        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Seconds to wait for the reply
        #[arg(long, env = "PROTOCALL_TIMEOUT", default_value = "5", value_parser = parse_seconds)]
        timeout: Duration,

        /// Seconds to wait for the connection to be established
        #[arg(long, default_value = "5", value_parser = parse_seconds)]
        connect_timeout: Duration,
    },

    /// List the services declared in the protoset
    List,

    /// Describe a service, method, message or enum
    Describe {
        /// Fully qualified name (e.g. my.package.Message or my.package.Service/Method)
        symbol: String,
    },
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = value.split_once('/').ok_or_else(|| {
        format!("Invalid endpoint format: '{value}'. Expected 'package.Service/Method'",)
    })?;

    if service.trim().is_empty() || method.trim().is_empty() {
        return Err("Service and Method names cannot be empty".to_string());
    }

    Ok((service.to_string(), method.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("Invalid number of seconds: '{value}'"))?;

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("Timeout must be a positive number of seconds, got '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("helloworld.Greeter/SayHello"),
            Ok(("helloworld.Greeter".to_string(), "SayHello".to_string()))
        );
        assert!(parse_endpoint("helloworld.Greeter").is_err());
        assert!(parse_endpoint("helloworld.Greeter/ ").is_err());
        assert!(parse_endpoint("/SayHello").is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("authorization: Bearer a:b"),
            Ok(("authorization".to_string(), "Bearer a:b".to_string()))
        );
        assert!(parse_header("no-separator").is_err());
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("1.5"), Ok(Duration::from_millis(1500)));
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn test_call_arguments() {
        let cli = Cli::try_parse_from([
            "protocall",
            "--protoset",
            "greeter.protoset",
            "call",
            "http://localhost:50051",
            "helloworld.Greeter/SayHello",
            "--body",
            r#"{"name": "Ferris"}"#,
            "-H",
            "x-greeting: Howdy",
            "--timeout",
            "0.25",
        ])
        .unwrap();

        assert_eq!(cli.protoset, PathBuf::from("greeter.protoset"));
        match cli.command {
            Commands::Call {
                url,
                endpoint,
                body,
                headers,
                timeout,
                connect_timeout,
            } => {
                assert_eq!(url, "http://localhost:50051");
                assert_eq!(endpoint.1, "SayHello");
                assert_eq!(body, r#"{"name": "Ferris"}"#);
                assert_eq!(headers, vec![("x-greeting".to_string(), "Howdy".to_string())]);
                assert_eq!(timeout, Duration::from_millis(250));
                assert_eq!(connect_timeout, Duration::from_secs(5));
            }
            other => panic!("Expected a call command, got: {:?}", other),
        }
    }

    #[test]
    fn test_describe_and_list_arguments() {
        let cli =
            Cli::try_parse_from(["protocall", "--protoset", "a.bin", "describe", "shop.Order"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Describe { symbol } if symbol == "shop.Order"));

        let cli = Cli::try_parse_from(["protocall", "--protoset", "a.bin", "list"]).unwrap();
        assert!(matches!(cli.command, Commands::List));
    }
}
