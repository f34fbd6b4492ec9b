//! File Storage
//!
//! [`FileStorage`] is where the export worker sends finished spreadsheets.
//! [`GrpcFileStorage`] streams to a remote `FileService`; [`LocalFileStore`]
//! writes under a root directory and is also what the `fleet-files` binary
//! serves from.

use async_trait::async_trait;
use fleet_core::{FleetError, FleetResult, TransferError};
use futures_util::{pin_mut, Stream, StreamExt};
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::constants::PATH_METADATA_KEY;
use crate::grpc::proto::{file_service_client::FileServiceClient, FileChunk};

/// Acknowledgement returned once a whole file has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAck {
    pub path: String,
    pub bytes_written: u64,
}

/// Destination for generated files.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stream `local_file` to `path` (relative to the storage root) in
    /// chunks of `chunk_size` bytes and wait for the acknowledgement.
    async fn upload(&self, path: &str, local_file: &Path, chunk_size: usize)
        -> FleetResult<UploadAck>;
}

fn io_error(path: &Path, err: std::io::Error) -> FleetError {
    TransferError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
    .into()
}

fn upload_error(reason: impl std::fmt::Display) -> FleetError {
    TransferError::Upload {
        reason: reason.to_string(),
    }
    .into()
}

/// Check that `path` stays under a storage root.
pub fn validate_relative_path(path: &str) -> FleetResult<PathBuf> {
    if path.trim().is_empty() {
        return Err(FleetError::invalid("path", "must not be empty"));
    }
    let candidate = Path::new(path);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(FleetError::invalid("path", "must not contain .."));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(FleetError::invalid("path", "must be relative"));
            }
        }
    }
    Ok(candidate.to_path_buf())
}

/// Fill up to `size` bytes, short only at end of file.
async fn read_chunk(file: &mut File, size: usize, path: &Path) -> FleetResult<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = file
            .read(&mut buf[filled..])
            .await
            .map_err(|e| io_error(path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Stream a file as fixed-size chunks; only the last may be shorter.
pub fn chunk_stream(
    mut file: File,
    chunk_size: usize,
    path: PathBuf,
) -> impl Stream<Item = FleetResult<Vec<u8>>> + Send + 'static {
    let chunk_size = chunk_size.max(1);
    async_stream::try_stream! {
        loop {
            let chunk = read_chunk(&mut file, chunk_size, &path).await?;
            if chunk.is_empty() {
                break;
            }
            yield chunk;
        }
    }
}

// ============================================================================
// LOCAL DIRECTORY STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a relative storage path.
    pub fn resolve(&self, path: &str) -> FleetResult<PathBuf> {
        Ok(self.root.join(validate_relative_path(path)?))
    }

    /// Write a chunk stream to `path`, creating parent directories and
    /// replacing any previous file. A failed stream leaves no file behind.
    pub async fn write_chunks<S>(&self, path: &str, chunks: S) -> FleetResult<UploadAck>
    where
        S: Stream<Item = FleetResult<Vec<u8>>> + Send,
    {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        match self.write_all_chunks(&target, chunks).await {
            Ok(bytes_written) => {
                tracing::debug!(path, bytes_written, "Stored file");
                Ok(UploadAck {
                    path: path.to_string(),
                    bytes_written,
                })
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&target).await {
                    tracing::warn!(path, error = %rm, "Failed to remove partial file");
                }
                Err(e)
            }
        }
    }

    async fn write_all_chunks<S>(&self, target: &Path, chunks: S) -> FleetResult<u64>
    where
        S: Stream<Item = FleetResult<Vec<u8>>> + Send,
    {
        let mut file = File::create(target).await.map_err(|e| io_error(target, e))?;
        let mut written = 0u64;
        pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(target, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| io_error(target, e))?;
        Ok(written)
    }

    /// Open a stored file as a chunk stream.
    pub async fn read_chunks(
        &self,
        path: &str,
        chunk_size: usize,
    ) -> FleetResult<impl Stream<Item = FleetResult<Vec<u8>>> + Send + 'static> {
        let target = self.resolve(path)?;
        let file = match File::open(&target).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(fleet_core::StorageError::NotFound {
                    entity: fleet_core::EntityKind::FileArtifact,
                    key: path.to_string(),
                }
                .into());
            }
            Err(e) => return Err(io_error(&target, e)),
        };
        Ok(chunk_stream(file, chunk_size, target))
    }
}

#[async_trait]
impl FileStorage for LocalFileStore {
    async fn upload(
        &self,
        path: &str,
        local_file: &Path,
        chunk_size: usize,
    ) -> FleetResult<UploadAck> {
        let file = File::open(local_file)
            .await
            .map_err(|e| io_error(local_file, e))?;
        self.write_chunks(path, chunk_stream(file, chunk_size, local_file.to_path_buf()))
            .await
    }
}

// ============================================================================
// REMOTE FILE SERVICE
// ============================================================================

/// Client of a remote `FileService`. Connects per upload.
#[derive(Debug, Clone)]
pub struct GrpcFileStorage {
    endpoint: String,
}

impl GrpcFileStorage {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FileStorage for GrpcFileStorage {
    async fn upload(
        &self,
        path: &str,
        local_file: &Path,
        chunk_size: usize,
    ) -> FleetResult<UploadAck> {
        let file = File::open(local_file)
            .await
            .map_err(|e| io_error(local_file, e))?;
        let expected = file
            .metadata()
            .await
            .map_err(|e| io_error(local_file, e))?
            .len();

        let source = chunk_stream(file, chunk_size, local_file.to_path_buf());
        let outbound = async_stream::stream! {
            pin_mut!(source);
            while let Some(item) = source.next().await {
                match item {
                    Ok(content) => yield FileChunk { content },
                    Err(e) => {
                        // The short byte count fails the upload below.
                        tracing::error!(error = %e, "Stopping upload after read failure");
                        break;
                    }
                }
            }
        };

        let mut request = tonic::Request::new(outbound);
        let path_value = tonic::metadata::MetadataValue::try_from(path)
            .map_err(|e| upload_error(format!("path is not valid metadata: {}", e)))?;
        request.metadata_mut().insert(PATH_METADATA_KEY, path_value);

        let mut client = FileServiceClient::connect(self.endpoint.clone())
            .await
            .map_err(|e| upload_error(format!("connect to {}: {}", self.endpoint, e)))?;
        let ack = client
            .upload_file(request)
            .await
            .map_err(|status| upload_error(status.message()))?
            .into_inner();

        let bytes_written = u64::try_from(ack.bytes_written).unwrap_or_default();
        if bytes_written != expected {
            return Err(upload_error(format!(
                "stored {} of {} bytes",
                bytes_written, expected
            )));
        }
        Ok(UploadAck {
            path: ack.path,
            bytes_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(validate_relative_path("7/abc_servers.xlsx").is_ok());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("7/../../x").is_err());
        assert!(validate_relative_path("").is_err());
    }

    #[tokio::test]
    async fn test_upload_creates_parents_and_counts_bytes() {
        let src_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let local = src_dir.path().join("in.bin");
        let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&local, &payload).await.unwrap();

        let store = LocalFileStore::new(root.path());
        let ack = store.upload("9/id_out.bin", &local, 1024).await.unwrap();

        assert_eq!(ack.bytes_written, 2500);
        let stored = fs::read(root.path().join("9/id_out.bin")).await.unwrap();
        assert_eq!(stored, payload);
    }

    #[tokio::test]
    async fn test_chunks_are_fixed_size() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("in.bin");
        fs::write(&local, vec![1u8; 2500]).await.unwrap();

        let file = File::open(&local).await.unwrap();
        let sizes: Vec<usize> = chunk_stream(file, 1024, local.clone())
            .map(|c| c.unwrap().len())
            .collect()
            .await;
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() {
        let root = TempDir::new().unwrap();
        let store = LocalFileStore::new(root.path());
        let chunks = futures_util::stream::iter(vec![
            Ok(vec![1u8, 2, 3]),
            Err(upload_error("client went away")),
        ]);

        assert!(store.write_chunks("1/partial.xlsx", chunks).await.is_err());
        assert!(!root.path().join("1/partial.xlsx").exists());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalFileStore::new(root.path());
        let err = store.read_chunks("nope.xlsx", 16).await.err().unwrap();
        assert!(err.is_not_found());
    }
}
