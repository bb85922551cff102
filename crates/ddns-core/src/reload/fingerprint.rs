//! Content fingerprints over the watched file set

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

/// SHA-256 digest over the concatenated contents of the watched files
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell generations apart in logs
        write!(f, "ContentFingerprint({})", &hex::encode(self.0)[..12])
    }
}

/// Fingerprint the files at `paths`, in order
///
/// Missing files contribute nothing. Any other read failure is returned as
/// [`Error::TransientIo`] so the caller can retry on the next trigger.
pub async fn fingerprint(paths: &[PathBuf]) -> Result<ContentFingerprint> {
    let mut hasher = Sha256::new();
    for path in paths {
        match tokio::fs::read(path).await {
            Ok(content) => hasher.update(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::trace!(
                    path = %path.display(),
                    "Watched file absent, skipped in fingerprint"
                );
            }
            Err(e) => {
                return Err(Error::transient_io(format!(
                    "Failed to read {} for fingerprint: {}",
                    path.display(),
                    e
                )));
            }
        }
    }
    Ok(ContentFingerprint(hasher.finalize().into()))
}
