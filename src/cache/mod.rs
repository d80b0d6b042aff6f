//! Persisted artifacts keyed by the corpus they were built from
//!
//! Compiling the blacklist automaton or the forbidden-pattern corpus can take
//! a while on large inputs, so both are written to disk and reused. Each file
//! carries a format version and the content key of its source corpus; a
//! caller that knows the current key gets [`ScanError::CacheStale`] instead of
//! silently reusing an artifact built from an older corpus.

pub mod paths;

pub use paths::{default_automaton_path, default_bundle_path, get_cache_dir};

use crate::error::{ScanError, ScanResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Something that can be persisted through an [`ArtifactCache`]
pub trait Artifact: Serialize + DeserializeOwned {
    /// Name used in logs and errors
    const KIND: &'static str;
    /// Bump when the serialized layout changes
    const VERSION: u32;

    /// Reject deserialized values whose internal tables are inconsistent
    fn validate(&self) -> ScanResult<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    kind: String,
    version: u32,
    key: u64,
    payload: T,
}

/// Caller-owned cache file for one artifact
#[derive(Debug, Clone)]
pub struct ArtifactCache<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Artifact> ArtifactCache<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the cached artifact.
    ///
    /// Returns `Ok(None)` when no cache file exists. With `expected_key` set,
    /// a file built from a different corpus yields [`ScanError::CacheStale`];
    /// without it the file is trusted as-is.
    pub fn load(&self, expected_key: Option<u64>) -> ScanResult<Option<T>> {
        if !self.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        let envelope: Envelope<T> =
            bitcode::deserialize(&bytes).map_err(|e| ScanError::serialization(T::KIND, e))?;

        if envelope.kind != T::KIND || envelope.version != T::VERSION {
            return Err(ScanError::serialization(
                T::KIND,
                format!(
                    "{} holds {} v{}, expected {} v{}",
                    self.path.display(),
                    envelope.kind,
                    envelope.version,
                    T::KIND,
                    T::VERSION
                ),
            ));
        }
        if let Some(expected) = expected_key {
            if envelope.key != expected {
                return Err(ScanError::CacheStale {
                    path: self.path.clone(),
                    found: envelope.key,
                    expected,
                });
            }
        }
        envelope.payload.validate()?;
        debug!("Loaded cached {} from {}", T::KIND, self.path.display());
        Ok(Some(envelope.payload))
    }

    /// Write the artifact, replacing any previous file
    pub fn store(&self, value: &T, key: u64) -> ScanResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
        }
        let envelope = Envelope {
            kind: T::KIND.to_string(),
            version: T::VERSION,
            key,
            payload: value,
        };
        let bytes = bitcode::serialize(&envelope).map_err(|e| ScanError::serialization(T::KIND, e))?;

        // Write to a sibling then rename so readers never see a torn file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|e| ScanError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ScanError::io(&self.path, e))?;
        debug!(
            "Stored {} ({} bytes) at {}",
            T::KIND,
            bytes.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Remove the cache file if present
    pub fn invalidate(&self) -> ScanResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScanError::io(&self.path, e)),
        }
    }
}
