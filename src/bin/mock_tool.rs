//! Mock management tool for integration testing
//!
//! Implements the subset of the management CLI the functional suite
//! drives, with the same messages and exit codes, against `mock-runtime`.
//! The locator port comes from `COCAINE_TOOL_PORT` (default 10053).

mod shared;

use clap::{Parser, Subcommand};
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use shared::{call, Request, Response};

#[derive(Parser)]
#[command(name = "mock-tool")]
struct Cli {
    #[command(subcommand)]
    command: Group,
}

#[derive(Subcommand)]
enum Group {
    #[command(subcommand)]
    App(AppCommand),
    #[command(subcommand)]
    Profile(ObjectCommand),
    #[command(subcommand)]
    Runlist(ObjectCommand),
}

#[derive(Subcommand)]
enum AppCommand {
    Upload {
        #[arg(long)]
        name: String,
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        package: PathBuf,
    },
    List,
    Remove {
        #[arg(long)]
        name: String,
    },
    Start {
        #[arg(long)]
        name: String,
        #[arg(long)]
        profile: String,
    },
}

#[derive(Subcommand)]
enum ObjectCommand {
    Upload {
        #[arg(long)]
        name: String,
        /// Object body as JSON; `--profile` or `--runlist`
        #[arg(long = "profile", visible_alias = "runlist")]
        body: String,
    },
    List,
    Remove {
        #[arg(long)]
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let port = std::env::var("COCAINE_TOOL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(10053);

    if let Err(message) = run(cli.command, port) {
        eprintln!("Error occurred: {}", message);
        std::process::exit(1);
    }
}

fn run(group: Group, port: u16) -> Result<(), String> {
    match group {
        Group::App(AppCommand::Upload {
            name,
            manifest,
            package,
        }) => {
            let manifest = read_manifest(&manifest)?;
            let entries = check_package(&package, &manifest)?;
            request(
                port,
                Request::Write {
                    collection: "manifests".into(),
                    name: name.clone(),
                    value: manifest,
                },
            )?;
            request(
                port,
                Request::Write {
                    collection: "apps".into(),
                    name: name.clone(),
                    value: json!({ "entries": entries }),
                },
            )?;
            eprintln!("Uploading \"{}\"... OK", name);
        }
        Group::App(AppCommand::List) => print_list(port, "manifests")?,
        Group::App(AppCommand::Remove { name }) => {
            remove(port, "manifests", &name)?;
            remove(port, "apps", &name).ok();
            eprintln!("Removing \"{}\"... OK", name);
        }
        Group::App(AppCommand::Start { name, profile }) => {
            let started = request(port, Request::Start { app: name, profile })?;
            println!("{}", pretty(&started));
        }
        Group::Profile(command) => objects(port, command, "profile", "profiles")?,
        Group::Runlist(command) => objects(port, command, "runlist", "runlists")?,
    }
    Ok(())
}

fn objects(port: u16, command: ObjectCommand, kind: &str, collection: &str) -> Result<(), String> {
    match command {
        ObjectCommand::Upload { name, body } => {
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| format!("invalid {} JSON: {}", kind, e))?;
            request(
                port,
                Request::Write {
                    collection: collection.into(),
                    name: name.clone(),
                    value,
                },
            )?;
            println!("The {} \"{}\" has been successfully uploaded", kind, name);
        }
        ObjectCommand::List => print_list(port, collection)?,
        ObjectCommand::Remove { name } => {
            remove(port, collection, &name)?;
            println!("The {} \"{}\" has been successfully removed", kind, name);
        }
    }
    Ok(())
}

fn request(port: u16, request: Request) -> Result<Value, String> {
    match call(port, &request) {
        Ok(Response::Ok(value)) => Ok(value),
        Ok(Response::Error(err)) => Err(err.to_string()),
        Err(e) => Err(format!("unable to reach the runtime on port {}: {}", port, e)),
    }
}

fn remove(port: u16, collection: &str, name: &str) -> Result<(), String> {
    request(
        port,
        Request::Remove {
            collection: collection.into(),
            name: name.into(),
        },
    )
    .map(|_| ())
}

fn print_list(port: u16, collection: &str) -> Result<(), String> {
    let names = request(
        port,
        Request::List {
            collection: collection.into(),
        },
    )?;
    println!("{}", pretty(&names));
    Ok(())
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn read_manifest(path: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("unable to read manifest '{}': {}", path.display(), e))?;
    let manifest: Value =
        serde_json::from_str(&content).map_err(|e| format!("invalid manifest: {}", e))?;
    if !manifest.is_object() {
        return Err("invalid manifest: expected an object".into());
    }
    Ok(manifest)
}

/// List the package entries, requiring the manifest's entry point
fn check_package(path: &Path, manifest: &Value) -> Result<Vec<String>, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("unable to read package '{}': {}", path.display(), e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();
    for entry in archive
        .entries()
        .map_err(|e| format!("invalid package: {}", e))?
    {
        let entry = entry.map_err(|e| format!("invalid package: {}", e))?;
        let name = entry
            .path()
            .map_err(|e| format!("invalid package: {}", e))?
            .display()
            .to_string();
        entries.push(name);
    }

    if let Some(slave) = manifest.get("slave").and_then(Value::as_str) {
        if !entries.iter().any(|e| Path::new(e).file_name() == Some(OsStr::new(slave))) {
            return Err(format!("invalid package: entry point '{}' is missing", slave));
        }
    }
    Ok(entries)
}
