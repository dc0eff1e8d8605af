//! Application package fixtures
//!
//! A fixture is the smallest package the runtime accepts: an empty
//! executable, a manifest naming it as the entry point, and a gzipped tar
//! archive holding the executable. Every fixture lives in a private
//! directory that is removed when the fixture is released.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use tempfile::TempDir;

use crate::common::{Error, Result};

/// File name of the executable stub, also the manifest entry point
pub const EXECUTABLE_NAME: &str = "app";

pub const MANIFEST_NAME: &str = "manifest.json";

pub const PACKAGE_NAME: &str = "package.tar.gz";

/// Write the manifest naming the entry point
pub fn make_manifest(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(MANIFEST_NAME);
    let manifest = json!({ "slave": EXECUTABLE_NAME });
    std::fs::write(&path, manifest.to_string()).map_err(|e| Error::fixture_io(&path, e))?;
    Ok(path)
}

/// Write an empty executable stub
pub fn make_executable(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(EXECUTABLE_NAME);
    std::fs::write(&path, b"").map_err(|e| Error::fixture_io(&path, e))?;
    set_executable(&path)?;
    Ok(path)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::fixture_io(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Bundle the executable into a tar+gzip package next to it
pub fn make_package(dir: &Path, executable: &Path) -> Result<PathBuf> {
    if !executable.is_file() {
        return Err(Error::Archive(format!(
            "source '{}' does not exist",
            executable.display()
        )));
    }
    let name = executable.file_name().ok_or_else(|| {
        Error::Archive(format!("source '{}' has no file name", executable.display()))
    })?;

    let path = dir.join(PACKAGE_NAME);
    let file = File::create(&path).map_err(|e| Error::fixture_io(&path, e))?;

    let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    archive
        .append_path_with_name(executable, name)
        .map_err(|e| Error::Archive(format!("failed to add '{}': {}", executable.display(), e)))?;
    archive
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| Error::Archive(format!("failed to finish '{}': {}", path.display(), e)))?;

    Ok(path)
}

/// A materialized package; its directory is removed on drop
#[derive(Debug)]
pub struct Fixture {
    dir: TempDir,
    pub executable: PathBuf,
    pub manifest: PathBuf,
    pub package: PathBuf,
}

impl Fixture {
    /// Create a fixture in a fresh private directory under `parent`
    pub fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| Error::fixture_io(parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix("app-")
            .tempdir_in(parent)
            .map_err(|e| Error::fixture_io(parent, e))?;

        let manifest = make_manifest(dir.path())?;
        let executable = make_executable(dir.path())?;
        let package = make_package(dir.path(), &executable)?;

        tracing::debug!(dir = %dir.path().display(), "Created fixture");

        Ok(Self {
            dir,
            executable,
            manifest,
            package,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Run `f` with a fixture that is removed afterwards, whatever `f` returns
pub fn with_fixture<T, F>(parent: &Path, f: F) -> Result<T>
where
    F: FnOnce(&Fixture) -> Result<T>,
{
    let fixture = Fixture::create(parent)?;
    f(&fixture)
}
