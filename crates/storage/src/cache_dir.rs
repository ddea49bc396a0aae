//! The flat on-disk cache directory.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-progress temp files; never served, reclaimed at startup.
const TEMP_PREFIX: &str = ".tmp.";

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a cached entry.
#[derive(Clone, Debug)]
pub struct EntryMeta {
    /// Entry size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
}

/// The cache directory holding tarballs and metadata documents.
///
/// The layout is flat: keys are plain filenames, never paths. Key
/// validation rejects anything that could escape the directory.
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    /// Open (creating if needed) a cache directory.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// The cache root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to its path, rejecting traversal attempts.
    ///
    /// Keys are single filenames in a flat directory; separators, parent
    /// references, and temp-file names are all invalid.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.starts_with(TEMP_PREFIX)
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        match Path::new(key).components().next() {
            Some(std::path::Component::Normal(_)) => Ok(self.root.join(key)),
            _ => Err(StorageError::InvalidKey(key.to_string())),
        }
    }

    /// Check whether an entry exists.
    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key)?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    /// Get an entry's size without reading its content.
    #[instrument(skip(self))]
    pub async fn meta(&self, key: &str) -> StorageResult<EntryMeta> {
        let path = self.key_path(key)?;
        let metadata = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(EntryMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    /// Read an entry's full content.
    #[instrument(skip(self))]
    pub async fn read(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key)?;
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }

    /// Read an entry as a byte stream.
    #[instrument(skip(self))]
    pub async fn read_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    /// Write an entry atomically.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn write(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let mut writer = self.writer(key).await?;
        writer.write(data).await?;
        writer.finish().await?;
        Ok(())
    }

    /// Start a streaming write.
    ///
    /// Bytes land in a uniquely named temp file; `finish` fsyncs and
    /// renames it into place, `abort` removes it. Until `finish`, readers
    /// never see the entry.
    #[instrument(skip(self))]
    pub async fn writer(&self, key: &str) -> StorageResult<CacheWriter> {
        let final_path = self.key_path(key)?;
        let temp_path = self.root.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;
        Ok(CacheWriter {
            file,
            temp_path,
            final_path,
            bytes_written: 0,
        })
    }

    /// Delete an entry.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(())
    }

    /// List entry filenames, optionally filtered by extension.
    #[instrument(skip(self))]
    pub async fn list(&self, extension: Option<&str>) -> StorageResult<Vec<String>> {
        let mut results = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            // file_type() does not follow symlinks, so a planted link
            // cannot pull outside content into a listing.
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            if let Some(ext) = extension
                && !name.ends_with(ext)
            {
                continue;
            }
            results.push(name);
        }
        Ok(results)
    }

    /// Remove leftover temp files from interrupted downloads.
    ///
    /// Returns the number of files removed.
    #[instrument(skip(self))]
    pub async fn sweep_temp_files(&self) -> StorageResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(TEMP_PREFIX) && entry.file_type().await?.is_file() {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    tracing::warn!(file = %name, error = %e, "failed to remove temp file");
                } else {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

/// Streaming write handle for a cache entry.
pub struct CacheWriter {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl CacheWriter {
    /// Append a chunk of data.
    pub async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Commit the entry and return the total bytes written.
    pub async fn finish(self) -> StorageResult<u64> {
        // Flush to disk before the rename makes the entry visible.
        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        Ok(self.bytes_written)
    }

    /// Abandon the write and remove the temp file.
    pub async fn abort(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        let data = Bytes::from("tarball bytes");
        cache.write("pkg-1.0.0.tgz", data.clone()).await.unwrap();
        assert!(cache.exists("pkg-1.0.0.tgz").await.unwrap());
        assert_eq!(cache.read("pkg-1.0.0.tgz").await.unwrap(), data);
        assert_eq!(cache.meta("pkg-1.0.0.tgz").await.unwrap().size, 13);
    }

    #[tokio::test]
    async fn read_stream_yields_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        let data: Vec<u8> = (0..150_000u32).map(|i| (i % 256) as u8).collect();
        cache
            .write("big-2.0.0.tgz", Bytes::from(data.clone()))
            .await
            .unwrap();

        let mut stream = cache.read_stream("big-2.0.0.tgz").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, data);
    }

    #[tokio::test]
    async fn unfinished_writer_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        let mut writer = cache.writer("partial-1.0.0.tgz").await.unwrap();
        writer.write(Bytes::from("half")).await.unwrap();
        assert!(!cache.exists("partial-1.0.0.tgz").await.unwrap());

        writer.finish().await.unwrap();
        assert!(cache.exists("partial-1.0.0.tgz").await.unwrap());
    }

    #[tokio::test]
    async fn abort_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        let mut writer = cache.writer("gone-1.0.0.tgz").await.unwrap();
        writer.write(Bytes::from("doomed")).await.unwrap();
        writer.abort().await;

        assert!(!cache.exists("gone-1.0.0.tgz").await.unwrap());
        assert_eq!(cache.sweep_temp_files().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        assert!(cache.exists("../escape").await.is_err());
        assert!(cache.exists("/absolute").await.is_err());
        assert!(cache.exists("nested/key").await.is_err());
        assert!(cache.exists("").await.is_err());
        assert!(cache.exists(".tmp.sneaky").await.is_err());
    }

    #[tokio::test]
    async fn list_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        cache.write("a-1.0.0.tgz", Bytes::from("a")).await.unwrap();
        cache.write("b-2.0.0.tgz", Bytes::from("b")).await.unwrap();
        cache.write("a.json", Bytes::from("{}")).await.unwrap();

        let mut tarballs = cache.list(Some(".tgz")).await.unwrap();
        tarballs.sort();
        assert_eq!(tarballs, vec!["a-1.0.0.tgz", "b-2.0.0.tgz"]);

        let docs = cache.list(Some(".json")).await.unwrap();
        assert_eq!(docs, vec!["a.json"]);
    }

    #[tokio::test]
    async fn sweep_removes_only_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path()).await.unwrap();

        cache.write("keep-1.0.0.tgz", Bytes::from("k")).await.unwrap();
        tokio::fs::write(dir.path().join(".tmp.deadbeef"), b"junk")
            .await
            .unwrap();

        assert_eq!(cache.sweep_temp_files().await.unwrap(), 1);
        assert!(cache.exists("keep-1.0.0.tgz").await.unwrap());
    }
}
