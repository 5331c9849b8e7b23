//! Decoded text asset cache.
//!
//! Text files are decoded once (BOM, then UTF-8, then Windows-1252) and kept
//! for [`FILE_CACHE_TTL`]. An entry is also refreshed when the file's
//! modification time changes.

use encoding_rs::{Encoding, WINDOWS_1252};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

/// How long a decoded file stays cached.
pub const FILE_CACHE_TTL: Duration = Duration::from_secs(600);

struct CachedText {
    text: Arc<str>,
    modified: Option<SystemTime>,
    loaded_at: Instant,
}

pub struct FileCache {
    entries: Mutex<HashMap<PathBuf, CachedText>>,
    ttl: Duration,
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(FILE_CACHE_TTL)
    }
}

impl FileCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Decoded contents of `path`, from the cache when fresh.
    pub async fn get_or_load(&self, path: &Path) -> io::Result<Arc<str>> {
        let modified = tokio::fs::metadata(path).await?.modified().ok();

        if let Some(entry) = self.entries.lock().get(path) {
            if entry.loaded_at.elapsed() < self.ttl && entry.modified == modified {
                return Ok(entry.text.clone());
            }
        }

        let text: Arc<str> = load_text(path).await?.into();
        debug!(path = %path.display(), "cached text file");
        self.entries.lock().insert(
            path.to_path_buf(),
            CachedText {
                text: text.clone(),
                modified,
                loaded_at: Instant::now(),
            },
        );
        Ok(text)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Read and decode a text file without caching.
pub async fn load_text(path: &Path) -> io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(decode_text(&bytes))
}

/// Decode bytes honouring a BOM, falling back to Windows-1252 for invalid UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}

/// Whether assets of this type are served through the text cache.
pub fn is_text_mime(mime: &mime_guess::Mime) -> bool {
    if mime.type_() == mime_guess::mime::TEXT {
        return true;
    }
    matches!(
        mime.essence_str(),
        "application/javascript"
            | "application/json"
            | "application/xml"
            | "application/xhtml+xml"
            | "image/svg+xml"
    )
}
