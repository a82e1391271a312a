//! On-disk locations and JSON file I/O.
//!
//! The config file may hold proxy credentials and a Redis URL, so it is
//! written owner-only and replaced atomically.

use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

const APP_DIR: &str = "tollgate";

/// Mode applied to files written by [`save_json`] on Unix.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Mode applied to directories created by [`save_json`] on Unix.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

// ============================================================================
// Locations
// ============================================================================

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.map_or_else(|| PathBuf::from("."), |dir| dir.join(APP_DIR))
}

/// Directory holding `config.json`.
///
/// `~/.config/tollgate` on Linux, `~/Library/Application Support/tollgate`
/// on macOS, `%APPDATA%\tollgate` on Windows. Falls back to the working
/// directory when no home is known.
pub fn default_config_dir() -> PathBuf {
    app_dir(dirs::config_dir())
}

/// Directory for browser profiles and other disposable state.
pub fn default_cache_dir() -> PathBuf {
    app_dir(dirs::cache_dir())
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.json")
}

// ============================================================================
// Permissions
// ============================================================================

#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    debug!(path = %path.display(), mode = %format_args!("{mode:o}"), "restricted permissions");
    Ok(())
}

/// Creates the missing ancestors of `path` and locks each new one down.
async fn prepare_parent(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    if tokio::fs::try_exists(parent).await? {
        return Ok(());
    }

    let mut created = Vec::new();
    let mut cursor = Some(parent);
    while let Some(dir) = cursor {
        if tokio::fs::try_exists(dir).await? {
            break;
        }
        created.push(dir.to_path_buf());
        cursor = dir.parent().filter(|p| !p.as_os_str().is_empty());
    }

    tokio::fs::create_dir_all(parent).await?;
    #[cfg(unix)]
    for dir in &created {
        restrict(dir, DIR_MODE).await?;
    }
    debug!(dirs = created.len(), path = %parent.display(), "created parent directories");
    Ok(())
}

// ============================================================================
// JSON I/O
// ============================================================================

/// Writes `data` as pretty JSON, replacing `path` atomically.
///
/// The document goes to a sibling `.tmp` file first and is renamed over the
/// target, so readers never observe a half-written file.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    prepare_parent(path).await?;

    let mut body = serde_json::to_vec_pretty(data)?;
    body.push(b'\n');

    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, &body).await?;
    #[cfg(unix)]
    restrict(&staging, FILE_MODE).await?;
    if let Err(err) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(err.into());
    }

    debug!(path = %path.display(), bytes = body.len(), "wrote json");
    Ok(())
}

/// Reads and deserializes a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let raw = tokio::fs::read(path).await?;
    let value = serde_json::from_slice(&raw)?;
    debug!(path = %path.display(), bytes = raw.len(), "read json");
    Ok(value)
}
