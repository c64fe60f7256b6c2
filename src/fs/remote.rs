use anyhow::{bail, Context};
use async_trait::async_trait;
use opendal::services::{Fs, Gcs, Memory, S3};
use opendal::{ErrorKind, Metadata, Operator};
use std::path::PathBuf;

use crate::error::StorageError;
use crate::fs::backend::RemoteStorage;
use crate::fs::types::{DeleteResponse, RemoteFileInfo, RemoteItem, UploadResult};
use crate::fs::Result;

/// Remote tree on any OpenDAL operator (S3, GCS, local fs, memory).
///
/// Folder ids are key prefixes (`""` or `"/"` is the operator root, otherwise
/// e.g. `"printer/parts/"`). A file's remote id is its full key.
pub struct OpendalRemote {
    operator: Operator,
    display_root: String,
}

impl OpendalRemote {
    pub fn new(operator: Operator, display_root: impl Into<String>) -> Self {
        Self {
            operator,
            display_root: display_root.into(),
        }
    }

    /// Build a remote from a URI.
    ///
    /// Supported forms:
    /// - `s3://bucket/prefix?region=eu-west-1` (credentials from the usual AWS chain)
    /// - `gcs://bucket/prefix` (Application Default Credentials)
    /// - `file:///srv/mirror`
    /// - `memory://`
    pub fn from_uri(uri: &str) -> anyhow::Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .with_context(|| format!("Remote URI must look like scheme://...: {}", uri))?;
        let (location, query) = rest.split_once('?').unwrap_or((rest, ""));

        match scheme {
            "s3" => {
                let (bucket, prefix) = location.split_once('/').unwrap_or((location, ""));
                let region = query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("region="))
                    .unwrap_or("us-east-1");
                Self::s3(bucket, region, prefix)
            }
            "gcs" | "gs" => {
                let (bucket, prefix) = location.split_once('/').unwrap_or((location, ""));
                Self::gcs(bucket, prefix, None)
            }
            "file" => Self::local_dir(location),
            "memory" => Self::memory(),
            other => bail!("Unsupported remote scheme: {}", other),
        }
    }

    /// S3 bucket using the standard AWS credential chain
    pub fn s3(bucket: &str, region: &str, prefix: &str) -> anyhow::Result<Self> {
        let builder = S3::default()
            .bucket(bucket)
            .region(region)
            .root(&root_of(prefix));

        let operator = Operator::new(builder)
            .context("Failed to configure S3 remote")?
            .finish();

        Ok(Self::new(operator, format!("s3://{}/{}", bucket, prefix.trim_matches('/'))))
    }

    /// GCS bucket, with an optional service account JSON credential
    pub fn gcs(bucket: &str, prefix: &str, credential: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Gcs::default().bucket(bucket).root(&root_of(prefix));

        if let Some(cred) = credential {
            builder = builder.credential(cred);
        }

        let operator = Operator::new(builder)
            .context("Failed to configure GCS remote")?
            .finish();

        Ok(Self::new(operator, format!("gs://{}/{}", bucket, prefix.trim_matches('/'))))
    }

    /// A directory on a (possibly network-mounted) filesystem
    pub fn local_dir(root: &str) -> anyhow::Result<Self> {
        let operator = Operator::new(Fs::default().root(root))
            .context("Failed to configure filesystem remote")?
            .finish();

        Ok(Self::new(operator, format!("file://{}", root)))
    }

    /// Process-local in-memory remote
    pub fn memory() -> anyhow::Result<Self> {
        let operator = Operator::new(Memory::default())
            .context("Failed to configure in-memory remote")?
            .finish();

        Ok(Self::new(operator, "memory://"))
    }

    /// Change tag of an object: ETag, else Content-MD5, else a BLAKE3 digest of the content.
    async fn change_tag(&self, key: &str, meta: &Metadata) -> Result<String> {
        if let Some(etag) = meta.etag() {
            return Ok(etag.trim_matches('"').to_string());
        }
        if let Some(md5) = meta.content_md5() {
            return Ok(md5.to_string());
        }

        let content = self
            .operator
            .read(key)
            .await
            .map_err(|e| remote_error(e, key))?;
        Ok(format!("b3-{}", blake3::hash(&content.to_vec()).to_hex()))
    }

    async fn stat_file(&self, key: &str) -> Result<(Metadata, String)> {
        let meta = self
            .operator
            .stat(key)
            .await
            .map_err(|e| remote_error(e, key))?;
        let tag = self.change_tag(key, &meta).await?;
        Ok((meta, tag))
    }
}

/// Operator root for a key prefix
fn root_of(prefix: &str) -> String {
    format!("/{}", prefix.trim_matches('/'))
}

/// Listing key of a folder id
fn dir_key(folder_id: &str) -> String {
    let trimmed = folder_id.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Object key of a canonical path below a folder id
fn file_key(folder_id: &str, path: &str) -> String {
    let folder = folder_id.trim_matches('/');
    let path = path.trim_start_matches('/');
    if folder.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", folder, path)
    }
}

fn remote_error(err: opendal::Error, key: &str) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound {
            path: key.to_string(),
        },
        _ => StorageError::Remote(format!("{}: {}", key, err)),
    }
}

#[async_trait]
impl RemoteStorage for OpendalRemote {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteItem>> {
        let dir = dir_key(folder_id);
        let entries = self
            .operator
            .list(&dir)
            .await
            .map_err(|e| remote_error(e, &dir))?;

        let mut items = Vec::new();
        for entry in entries {
            let key = entry.path().to_string();
            let name = entry.name().trim_end_matches('/').to_string();

            // Skip the folder's own marker
            if key == dir || name.is_empty() || name == "/" {
                continue;
            }

            if entry.metadata().mode().is_dir() {
                items.push(RemoteItem::folder(key, name));
            } else {
                let (_, tag) = self.stat_file(&key).await?;
                items.push(RemoteItem::file(key, name, tag));
            }
        }

        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn file_info(&self, folder_id: &str, path: &str) -> Result<RemoteFileInfo> {
        let key = file_key(folder_id, path);
        let (meta, change_tag) = self.stat_file(&key).await?;

        Ok(RemoteFileInfo {
            change_tag,
            remote_id: key,
            size: meta.content_length(),
        })
    }

    async fn download(&self, folder_id: &str, path: &str) -> Result<PathBuf> {
        let key = file_key(folder_id, path);
        let content = self
            .operator
            .read(&key)
            .await
            .map_err(|e| remote_error(e, &key))?;

        let temp = tempfile::Builder::new()
            .prefix(".ferry-download-")
            .tempfile()
            .map_err(|e| StorageError::from_io_error(e, "creating temp file for", &key))?;
        let temp_path = temp
            .into_temp_path()
            .keep()
            .map_err(|e| StorageError::from_io_error(e.error, "keeping temp file for", &key))?;

        if let Err(e) = tokio::fs::write(&temp_path, content.to_vec()).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io_error(e, "writing", &temp_path));
        }

        Ok(temp_path)
    }

    async fn upload(&self, folder_id: &str, path: &str, data: Vec<u8>) -> Result<UploadResult> {
        let key = file_key(folder_id, path);
        self.operator
            .write(&key, data)
            .await
            .map_err(|e| remote_error(e, &key))?;

        let (_, change_tag) = self.stat_file(&key).await?;
        Ok(UploadResult {
            change_tag,
            remote_id: key,
        })
    }

    async fn delete(&self, folder_id: &str, path: &str) -> Result<DeleteResponse> {
        let key = file_key(folder_id, path);

        // Object stores delete missing keys silently; report it like a drive API would
        match self.operator.stat(&key).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(DeleteResponse::failed(format!("item not found: {}", key)));
            }
            Err(e) => return Err(remote_error(e, &key)),
        }

        self.operator
            .delete(&key)
            .await
            .map_err(|e| remote_error(e, &key))?;
        Ok(DeleteResponse::ok())
    }

    fn display_path(&self, folder_id: &str, path: &str) -> String {
        format!(
            "{}/{}",
            self.display_root.trim_end_matches('/'),
            file_key(folder_id, path)
        )
    }
}
