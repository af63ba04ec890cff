//! SHA-256 digests and checksum files.
//!
//! Digest files use the `<hex>  <file name>` line format understood by
//! `shasum -a 256 -c` and `sha256sum -c`.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Errors arising from digest parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// A SHA-256 digest is not a valid 64-character lowercase hex string.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidDigest {
        /// Description of the validation failure.
        reason: String,
    },

    /// A checksum line does not follow `<hex>  <file name>`.
    #[error("malformed checksum line: {line:?}")]
    MalformedLine {
        /// The offending line.
        line: String,
    },
}

/// A validated hex-encoded SHA-256 digest string.
///
/// # Examples
///
/// ```
/// use pkgsmith::digest::Sha256Digest;
///
/// let hex = "a".repeat(64);
/// let digest = Sha256Digest::try_from(hex.as_str()).expect("valid digest");
/// assert_eq!(digest.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_hasher(hasher: Sha256) -> Self {
        // Lowercase hex of a 32-byte digest always satisfies validate_sha256.
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: &str) -> Result<Self, DigestError> {
        validate_sha256(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, DigestError> {
        validate_sha256(&value)?;
        Ok(Self(value))
    }
}

impl From<Sha256Digest> for String {
    fn from(value: Sha256Digest) -> Self {
        value.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_sha256(value: &str) -> Result<(), DigestError> {
    if value.len() != DIGEST_HEX_LEN {
        return Err(DigestError::InvalidDigest {
            reason: format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_digit() || ('a'..='f').contains(c)))
    {
        return Err(DigestError::InvalidDigest {
            reason: format!("character '{bad}' is not lowercase hex"),
        });
    }
    Ok(())
}

/// Compute the SHA-256 digest of a file, streaming it in chunks.
///
/// # Errors
///
/// Returns any I/O error from opening or reading the file.
pub fn compute_sha256(path: &Path) -> std::io::Result<Sha256Digest> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(Sha256Digest::from_hasher(hasher))
}

/// Compute the SHA-256 digest of an in-memory buffer.
#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Sha256Digest::from_hasher(hasher)
}

/// Render a checksum line for `file_name`, including the trailing newline.
///
/// # Examples
///
/// ```
/// use pkgsmith::digest::{checksum_line, Sha256Digest};
///
/// let digest = Sha256Digest::try_from("0".repeat(64).as_str()).expect("valid");
/// assert_eq!(
///     checksum_line(&digest, "app.pkg"),
///     format!("{}  app.pkg\n", "0".repeat(64))
/// );
/// ```
#[must_use]
pub fn checksum_line(digest: &Sha256Digest, file_name: &str) -> String {
    format!("{digest}  {file_name}\n")
}

/// Parse a checksum file's first line into its digest and file name.
///
/// # Errors
///
/// Returns [`DigestError`] when the line has no two-space separator or the
/// digest is malformed.
pub fn parse_checksum_line(contents: &str) -> Result<(Sha256Digest, String), DigestError> {
    let line = contents.lines().next().unwrap_or_default();
    let malformed = || DigestError::MalformedLine {
        line: line.to_owned(),
    };
    let (hex, name) = line.split_once("  ").ok_or_else(malformed)?;
    // `sha256sum -b` marks binary mode with a leading '*' on the name.
    let name = name.strip_prefix('*').unwrap_or(name);
    if name.is_empty() {
        return Err(malformed());
    }
    Ok((Sha256Digest::try_from(hex)?, name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    /// SHA-256 of the empty input.
    const EMPTY_SHA256: &str = concat!(
        "e3b0c44298fc1c149afbf4c8996fb924",
        "27ae41e4649b934ca495991b7852b855"
    );

    #[test]
    fn compute_sha256_of_empty_file() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("empty.pkg");
        fs::write(&path, b"").expect("write");
        assert_eq!(compute_sha256(&path).expect("digest").as_str(), EMPTY_SHA256);
    }

    #[test]
    fn file_and_buffer_digests_agree() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("payload.pkg");
        let bytes: Vec<u8> = (0..3_000_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &bytes).expect("write");
        assert_eq!(compute_sha256(&path).expect("digest"), sha256_bytes(&bytes));
    }

    #[rstest]
    #[case::short("abc")]
    #[case::long(&"a".repeat(65))]
    #[case::uppercase(&"A".repeat(64))]
    #[case::non_hex(&format!("{}g", "a".repeat(63)))]
    fn rejects_invalid_digests(#[case] value: &str) {
        assert!(Sha256Digest::try_from(value).is_err());
    }

    #[test]
    fn checksum_line_round_trips() {
        let digest = sha256_bytes(b"installer");
        let line = checksum_line(&digest, "app-1.0-macos-arm64.pkg");
        let (parsed, name) = parse_checksum_line(&line).expect("parse");
        assert_eq!(parsed, digest);
        assert_eq!(name, "app-1.0-macos-arm64.pkg");
    }

    #[test]
    fn parse_accepts_binary_marker() {
        let line = format!("{EMPTY_SHA256}  *app.pkg\n");
        let (_, name) = parse_checksum_line(&line).expect("parse");
        assert_eq!(name, "app.pkg");
    }

    #[rstest]
    #[case::single_space(&format!("{EMPTY_SHA256} app.pkg"))]
    #[case::no_name(&format!("{EMPTY_SHA256}  "))]
    #[case::empty("")]
    fn parse_rejects_malformed_lines(#[case] line: &str) {
        assert!(matches!(
            parse_checksum_line(line),
            Err(DigestError::MalformedLine { .. })
        ));
    }
}
