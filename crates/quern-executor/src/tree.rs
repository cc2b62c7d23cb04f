//! File tree transfer between the store and directories
//!
//! The default transfer handles flat trees: a manifest object whose refs
//! are the file blobs and whose payload lists `{name, executable}` entries
//! in file-name order. Deployments with richer tree libraries (nested
//! directories, symlinks) plug in their own implementation.

use std::path::Path;

use async_trait::async_trait;
use quern_cas::{to_canonical_bytes, CasClient, CasObject, DataId};
use quern_engine::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Moves file trees between the store and local directories.
#[async_trait]
pub trait TreeTransfer: Send + Sync {
    /// Import a directory's files into the store, returning the tree id.
    async fn import(&self, cas: &dyn CasClient, dir: &Path) -> Result<DataId>;

    /// Export a stored tree into a directory.
    async fn export(&self, cas: &dyn CasClient, id: &DataId, dir: &Path) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeEntry {
    name: String,
    executable: bool,
}

/// Flat, single-level tree transfer.
///
/// Only regular files directly inside the directory participate;
/// subdirectories are skipped with a warning.
#[derive(Default)]
pub struct FlatTreeTransfer;

impl FlatTreeTransfer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TreeTransfer for FlatTreeTransfer {
    async fn import(&self, cas: &dyn CasClient, dir: &Path) -> Result<DataId> {
        let mut names = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            } else {
                log::warn!(
                    "skipping non-regular tree entry {}",
                    entry.path().display()
                );
            }
        }
        names.sort();

        let mut refs = Vec::with_capacity(names.len());
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(&name);
            let data = tokio::fs::read(&path).await?;
            let blob_id = cas.put(CasObject::leaf(data)).await?;
            refs.push(blob_id);
            entries.push(TreeEntry {
                executable: is_executable(&path).await,
                name,
            });
        }

        let manifest = to_canonical_bytes(&entries).map_err(EngineError::from)?;
        Ok(cas.put(CasObject::with_refs(refs, manifest)).await?)
    }

    async fn export(&self, cas: &dyn CasClient, id: &DataId, dir: &Path) -> Result<()> {
        let manifest = cas
            .get(id)
            .await?
            .ok_or_else(|| EngineError::Cas(format!("missing tree object {}", id)))?;
        let entries: Vec<TreeEntry> = serde_json::from_slice(&manifest.data)?;
        if entries.len() != manifest.refs.len() {
            return Err(EngineError::Serialization(format!(
                "tree {} lists {} entries but carries {} refs",
                id,
                entries.len(),
                manifest.refs.len()
            )));
        }

        tokio::fs::create_dir_all(dir).await?;
        for (entry, blob_id) in entries.iter().zip(&manifest.refs) {
            let blob = cas
                .get(blob_id)
                .await?
                .ok_or_else(|| EngineError::Cas(format!("missing tree blob {}", blob_id)))?;
            let path = dir.join(&entry.name);
            tokio::fs::write(&path, &blob.data).await?;
            if entry.executable {
                set_executable(&path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
async fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
