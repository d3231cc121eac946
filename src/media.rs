use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::backend::MediaKind;
use crate::storage::{self, MediaEntry};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file is empty")]
    Empty,
    #[error("file is larger than {0} MB")]
    TooLarge(i64),
    #[error("expected {expected} but the file looks like {detected}")]
    KindMismatch {
        expected: &'static str,
        detected: String,
    },
}

/// A validated media file, ready to push to the object store.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub kind: MediaKind,
    pub extension: String,
}

/// Read, size-check, and MIME-classify a local file before any network
/// call. The detected kind must match the composition mode the user
/// picked.
pub fn prepare_upload(path: &Path, expected: MediaKind, max_bytes: i64) -> Result<Upload> {
    if !path.is_file() {
        return Err(UploadError::NotFound(path.display().to_string()).into());
    }
    let bytes = fs::read(path)
        .with_context(|| format!("media: read {}", path.display()))?;
    if bytes.is_empty() {
        return Err(UploadError::Empty.into());
    }
    if bytes.len() as i64 > max_bytes {
        return Err(UploadError::TooLarge(max_bytes / (1024 * 1024)).into());
    }

    let content_type = detect_mime(&bytes);
    let kind = MediaKind::from_mime(&content_type);
    if kind != expected {
        return Err(UploadError::KindMismatch {
            expected: expected.as_str(),
            detected: content_type,
        }
        .into());
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| extension_for_mime(&content_type).to_string());

    Ok(Upload {
        bytes,
        content_type,
        kind,
        extension,
    })
}

/// Owner-prefixed unique object key, so concurrent uploads never collide.
pub fn object_path(user_id: &str, extension: &str) -> String {
    format!("{}/{}.{}", user_id, Uuid::new_v4(), extension)
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "weba",
        _ => "bin",
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: Option<PathBuf>,
    pub max_size_bytes: i64,
    pub default_ttl: Duration,
    pub http_client: Option<Client>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_size_bytes: 200 * 1024 * 1024,
            default_ttl: Duration::from_secs(6 * 60 * 60),
            http_client: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub url: String,
    pub media_type: Option<String>,
    pub ttl: Option<Duration>,
    pub force: bool,
}

/// Content-addressed local copies of answer media, index kept in the
/// store. Fetches are blocking; callers run them off the event loop.
pub struct Cache {
    store: Arc<storage::Store>,
    cfg: CacheConfig,
    client: Client,
    pruning: Mutex<()>,
}

impl Cache {
    pub fn new(store: Arc<storage::Store>, cfg: CacheConfig) -> Result<Self> {
        let mut cfg = cfg;
        let cache_dir = cfg
            .cache_dir
            .clone()
            .or_else(default_cache_dir)
            .context("media: cache dir not configured")?;
        fs::create_dir_all(&cache_dir)?;
        cfg.cache_dir = Some(cache_dir);

        let client = if let Some(client) = cfg.http_client.clone() {
            client
        } else {
            Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .context("media: build http client")?
        };

        Ok(Self {
            store,
            cfg,
            client,
            pruning: Mutex::new(()),
        })
    }

    pub fn fetch(&self, request: Request) -> Result<MediaEntry> {
        if request.url.is_empty() {
            return Err(anyhow!("media: url required"));
        }

        if let Some(entry) = self.store.get_media_entry_by_url(&request.url)? {
            if !request.force
                && self.is_fresh(&entry, request.ttl)
                && Path::new(&entry.file_path).exists()
            {
                return Ok(entry);
            }
        }

        let response = self
            .client
            .get(&request.url)
            .send()
            .context("media: download")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("media: request failed: {} - {}", status, body));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().context("media: body")?.to_vec();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .map(|s| s.to_string())
            .or(request.media_type.clone())
            .unwrap_or_else(|| detect_mime(&bytes));

        self.store_bytes(&request.url, &bytes, content_type, request.ttl)
    }

    /// Write the blob and index it under the url. When the content
    /// changed, the upsert replaces `file_path` and the previous blob is
    /// removed with it; unindexed files are invisible to pruning.
    fn store_bytes(
        &self,
        url: &str,
        bytes: &[u8],
        content_type: String,
        ttl: Option<Duration>,
    ) -> Result<MediaEntry> {
        let previous = self.store.get_media_entry_by_url(url)?;
        let file_path = self.write_file(bytes)?;
        if let Some(prev) = previous {
            if prev.file_path != file_path {
                let _ = fs::remove_file(&prev.file_path);
            }
        }

        let checksum = sha1_hex(bytes);
        let ttl = ttl.unwrap_or(self.cfg.default_ttl);
        let expires_at = SystemTime::now().checked_add(ttl);

        let media_entry = MediaEntry {
            id: 0,
            url: url.to_string(),
            media_type: content_type,
            file_path,
            size_bytes: bytes.len() as i64,
            fetched_at: Utc::now(),
            expires_at: expires_at.map(DateTime::<Utc>::from),
            checksum,
        };

        self.prune_if_needed(media_entry.size_bytes)?;
        let id = self.store.upsert_media_entry(media_entry.clone())?;
        Ok(MediaEntry { id, ..media_entry })
    }

    fn is_fresh(&self, entry: &MediaEntry, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.cfg.default_ttl);
        if ttl.is_zero() {
            return false;
        }
        let expiry = entry.fetched_at.checked_add_signed(
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0)),
        );
        match expiry {
            Some(expiry) => Utc::now() < expiry,
            None => false,
        }
    }

    fn write_file(&self, data: &[u8]) -> Result<String> {
        let cache_dir = self
            .cfg
            .cache_dir
            .as_ref()
            .context("media: cache dir missing")?;
        let filename = format!("{}.bin", sha1_hex(data));
        let path = cache_dir.join(filename);
        fs::write(&path, data).context("media: write")?;
        Ok(path.to_string_lossy().to_string())
    }

    fn prune_if_needed(&self, new_bytes: i64) -> Result<()> {
        let _guard = self.pruning.lock();
        let mut total = self.store.total_media_size()? + new_bytes;
        if total <= self.cfg.max_size_bytes {
            return Ok(());
        }

        let mut ids = Vec::new();
        let mut paths = Vec::new();

        for entry in self.store.list_oldest_media(100)? {
            total -= entry.size_bytes;
            ids.push(entry.id);
            paths.push(entry.file_path);
            if total <= self.cfg.max_size_bytes {
                break;
            }
        }

        self.store.delete_media_entries(&ids)?;
        for path in paths {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("knowme"))
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn detect_mime(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg".into(),
        Ok(ImageFormat::Png) => "image/png".into(),
        Ok(ImageFormat::Gif) => "image/gif".into(),
        Ok(ImageFormat::WebP) => "image/webp".into(),
        _ => {
            let mut buffer = [0u8; 512];
            let mut cursor = std::io::Cursor::new(bytes);
            let read = cursor.read(&mut buffer).unwrap_or(0);
            tree_magic_mini::from_u8(&buffer[..read]).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use tempfile::tempdir;

    fn cache_in(dir: &Path) -> Cache {
        let store = Store::open(storage::Options {
            path: Some(dir.join("state.db")),
        })
        .unwrap();
        Cache::new(
            Arc::new(store),
            CacheConfig {
                cache_dir: Some(dir.join("media")),
                ..CacheConfig::default()
            },
        )
        .unwrap()
    }

    // Smallest valid PNG: signature + IHDR for a 1x1 image.
    fn png_bytes() -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00,
            0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89,
        ]);
        bytes
    }

    #[test]
    fn prepare_upload_classifies_images() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        fs::write(&path, png_bytes()).unwrap();

        let upload = prepare_upload(&path, MediaKind::Image, 10 * 1024 * 1024).unwrap();
        assert_eq!(upload.kind, MediaKind::Image);
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.extension, "png");
    }

    #[test]
    fn prepare_upload_rejects_kind_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        fs::write(&path, png_bytes()).unwrap();

        let err = prepare_upload(&path, MediaKind::Video, 10 * 1024 * 1024).unwrap_err();
        assert!(err.downcast_ref::<UploadError>().is_some());
    }

    #[test]
    fn prepare_upload_rejects_oversized_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        fs::write(&path, png_bytes()).unwrap();

        let err = prepare_upload(&path, MediaKind::Image, 8).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UploadError>(),
            Some(UploadError::TooLarge(_))
        ));
    }

    #[test]
    fn prepare_upload_rejects_missing_files() {
        let err = prepare_upload(Path::new("/nonexistent/clip.mp4"), MediaKind::Video, 1024)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UploadError>(),
            Some(UploadError::NotFound(_))
        ));
    }

    #[test]
    fn redownload_removes_the_previous_blob() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let url = "https://example.test/answers/clip.png";

        let first = cache
            .store_bytes(url, b"first version", "image/png".to_string(), None)
            .unwrap();
        let second = cache
            .store_bytes(url, b"second version", "image/png".to_string(), None)
            .unwrap();

        assert_eq!(second.id, first.id, "same url keeps one index row");
        assert_ne!(second.file_path, first.file_path);
        assert!(!Path::new(&first.file_path).exists());
        assert!(Path::new(&second.file_path).exists());
    }

    #[test]
    fn unchanged_redownload_keeps_the_blob() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let url = "https://example.test/answers/still.png";

        let first = cache
            .store_bytes(url, b"same bytes", "image/png".to_string(), None)
            .unwrap();
        let second = cache
            .store_bytes(url, b"same bytes", "image/png".to_string(), None)
            .unwrap();

        assert_eq!(second.file_path, first.file_path);
        assert!(Path::new(&second.file_path).exists());
    }

    #[test]
    fn object_path_is_owner_prefixed_and_unique() {
        let first = object_path("user-1", "png");
        let second = object_path("user-1", "png");
        assert!(first.starts_with("user-1/"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);
    }
}
