//! Mock runtime daemon for integration testing
//!
//! Reads the runtime configuration given with `-c`, checks that every
//! declared path exists, and serves storage and node requests on the
//! locator port. Objects are kept as JSON files under the `core` storage
//! path, so a fresh sandbox means an empty storage.

mod shared;

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};

use shared::{Request, Response, ServiceError};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.iter().position(|a| a == "-c") {
        Some(i) if i + 1 < args.len() => PathBuf::from(&args[i + 1]),
        _ => {
            eprintln!("usage: mock-runtime -c <config>");
            std::process::exit(2);
        }
    };

    let config: Value = match std::fs::read_to_string(&config_path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load '{}': {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    for key in ["plugins", "runtime", "spool"] {
        let path = config["paths"][key].as_str().unwrap_or_default();
        if !Path::new(path).is_dir() {
            eprintln!("path '{}' ({}) does not exist", path, key);
            std::process::exit(1);
        }
    }

    let port = config["locator"]["port"].as_u64().unwrap_or(10053) as u16;
    let storage = PathBuf::from(
        config["storages"]["core"]["args"]["path"]
            .as_str()
            .unwrap_or_default(),
    );

    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind locator on port {}: {}", port, e);
            std::process::exit(1);
        }
    };
    log(&format!("locator is listening on port {}", port));

    for stream in listener.incoming().flatten() {
        handle(stream, &storage);
    }
}

fn log(message: &str) {
    println!("[mock] [INFO] core: {}", message);
    std::io::stdout().flush().ok();
}

fn handle(stream: TcpStream, storage: &Path) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut line = String::new();
    if reader.read_line(&mut line).unwrap_or(0) == 0 {
        return;
    }

    let response = match serde_json::from_str::<Request>(&line) {
        Ok(request) => {
            log(&format!("request: {}", line.trim_end()));
            process(&request, storage)
        }
        Err(e) => Response::Error(ServiceError {
            service: "locator".into(),
            message: format!("invalid request: {}", e),
            code: 1,
        }),
    };

    let mut writer = stream;
    if let Ok(mut answer) = serde_json::to_string(&response) {
        answer.push('\n');
        writer.write_all(answer.as_bytes()).ok();
    }
}

fn process(request: &Request, storage: &Path) -> Response {
    match request {
        Request::List { collection } => Response::Ok(json!(list(storage, collection))),
        Request::Write {
            collection,
            name,
            value,
        } => {
            let dir = storage.join(collection);
            let result = std::fs::create_dir_all(&dir)
                .and_then(|_| std::fs::write(dir.join(name), value.to_string()));
            match result {
                Ok(()) => Response::Ok(Value::Null),
                Err(e) => Response::Error(ServiceError {
                    service: "storage".into(),
                    message: format!("unable to write '{}': {}", name, e),
                    code: 1,
                }),
            }
        }
        Request::Remove { collection, name } => {
            match std::fs::remove_file(storage.join(collection).join(name)) {
                Ok(()) => Response::Ok(Value::Null),
                Err(_) => Response::Error(ServiceError::not_found("storage", name, collection)),
            }
        }
        Request::Start { app, profile } => {
            if !storage.join("manifests").join(app).is_file() {
                return Response::Error(ServiceError::not_found("node", app, "manifests"));
            }
            if !storage.join("profiles").join(profile).is_file() {
                return Response::Error(ServiceError::not_found("node", profile, "profiles"));
            }
            let mut started = serde_json::Map::new();
            started.insert(app.clone(), json!("the app has been started"));
            Response::Ok(Value::Object(started))
        }
    }
}

fn list(storage: &Path, collection: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(storage.join(collection))
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
