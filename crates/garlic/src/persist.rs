//! The one on-disk artifact this client keeps: an opaque, versioned, length-prefixed snapshot of the raw
//! consensus text, at `$TMP/garlic/network_status[_<hash>]`. Overwritten
//! after every successful download; nothing else is persisted.

use garlic_netdir::authorities::DirAuthority;
use garlic_netdir::status::NetworkStatus;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Snapshot format version. Bumped if the encoding below ever changes.
const FORMAT_VERSION: u8 = 1;

/// Errors saving or loading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The snapshot file used a format version this client doesn't understand.
    #[error("persisted network-status snapshot has unsupported format version {0}")]
    UnsupportedVersion(u8),
    /// The snapshot bytes were malformed.
    #[error(transparent)]
    Bytes(#[from] garlic_bytes::Error),
    /// The recovered consensus text failed to parse.
    #[error(transparent)]
    Netdir(#[from] garlic_netdir::Error),
}

/// Result type used throughout this module.
pub type Result<T> = std::result::Result<T, Error>;

/// The default cache directory: `$TMP/garlic`.
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("garlic")
}

/// Hash a custom authority list into the filename suffix used whenever
/// a config overrides the embedded authorities.
pub fn hash_authorities(authorities: &[DirAuthority]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for a in authorities {
        a.nickname.hash(&mut hasher);
        a.ipv4.hash(&mut hasher);
        a.dir_port.hash(&mut hasher);
    }
    hasher.finish()
}

/// The snapshot path for a given cache directory, keyed by an optional
/// custom-authorities hash.
pub fn snapshot_path(cache_dir: &Path, authorities_hash: Option<u64>) -> PathBuf {
    match authorities_hash {
        Some(h) => cache_dir.join(format!("network_status_{h:016x}")),
        None => cache_dir.join("network_status"),
    }
}

fn encode(status: &NetworkStatus) -> Vec<u8> {
    let mut w = garlic_bytes::Writer::new();
    w.write_u8(FORMAT_VERSION);
    let text = status.raw_text().as_bytes();
    w.write_u32(text.len() as u32);
    w.write(text);
    w.into_vec()
}

fn decode(buf: &[u8]) -> Result<NetworkStatus> {
    let mut r = garlic_bytes::Reader::from_slice(buf);
    let version = r.take_u8()?;
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let len = r.take_u32()? as usize;
    let text = r.take(len)?;
    let text = std::str::from_utf8(text).map_err(|_| garlic_bytes::Error::BadValue("snapshot text was not valid UTF-8"))?;
    Ok(NetworkStatus::parse(text)?)
}

/// Write `status`'s snapshot to `path`, creating its parent directory
/// if it doesn't already exist.
pub async fn save(path: &Path, status: &NetworkStatus) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encode(status)).await?;
    Ok(())
}

/// Load a previously-saved snapshot from `path`, if one exists.
/// Returns `Ok(None)` rather than an error when the file is simply
/// absent (first run, or a fresh cache directory).
pub async fn load(path: &Path) -> Result<Option<NetworkStatus>> {
    match tokio::fs::read(path).await {
        Ok(buf) => Ok(Some(decode(&buf)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = "\
valid-after 2020-01-01 00:00:00
fresh-until 2020-01-01 01:00:00
valid-until 2020-01-01 03:00:00
params hsdir_spread_store=4 hsdir_n_replicas=2
shared-rand-current-value 1 QUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUFBQUE=
";

    #[tokio::test]
    async fn round_trips_through_a_temp_file() {
        let status = NetworkStatus::parse(SAMPLE).unwrap();
        let dir = std::env::temp_dir().join(format!("garlic-persist-test-{:x}", rand::random::<u64>()));
        let path = dir.join("network_status");
        save(&path, &status).await.unwrap();
        let loaded = load(&path).await.unwrap().expect("snapshot was just saved");
        assert_eq!(loaded.raw_text(), status.raw_text());
        assert_eq!(loaded.valid_after, status.valid_after);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let path = std::env::temp_dir().join("garlic-persist-test-missing-file-that-does-not-exist");
        assert!(load(&path).await.unwrap().is_none());
    }

    #[test]
    fn snapshot_path_keys_on_authority_hash() {
        let dir = PathBuf::from("/tmp/garlic");
        assert_eq!(snapshot_path(&dir, None), PathBuf::from("/tmp/garlic/network_status"));
        assert_ne!(snapshot_path(&dir, Some(42)), snapshot_path(&dir, None));
    }
}
