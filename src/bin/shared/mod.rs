//! Wire types shared by the `mock-runtime` and `mock-tool` binaries
//!
//! The doubles stand in for the real runtime and management tool in this
//! crate's integration tests. The tool sends one JSON line per request to
//! the runtime's locator port and reads one JSON line back.

// Each binary uses only its own side of the protocol.
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

/// Storage error code for a missing object
pub const NOT_FOUND_CODE: i32 = 2;

/// A request to the mock runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    List {
        collection: String,
    },
    Write {
        collection: String,
        name: String,
        value: Value,
    },
    Remove {
        collection: String,
        name: String,
    },
    Start {
        app: String,
        profile: String,
    },
}

/// The mock runtime's answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok(Value),
    Error(ServiceError),
}

/// An error reported by one of the runtime's services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceError {
    pub service: String,
    pub message: String,
    pub code: i32,
}

impl ServiceError {
    pub fn not_found(service: &str, name: &str, collection: &str) -> Self {
        Self {
            service: service.to_string(),
            message: format!(
                "object '{}' has not been found in '{}': object has not been found",
                name, collection
            ),
            code: NOT_FOUND_CODE,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error in service \"{}\" - {} [{}]",
            self.service, self.message, self.code
        )
    }
}

/// Send one request to the runtime listening on `port`
pub fn call(port: u16, request: &Request) -> std::io::Result<Response> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))?;
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    stream.write_all(line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    Ok(serde_json::from_str(&answer)?)
}
