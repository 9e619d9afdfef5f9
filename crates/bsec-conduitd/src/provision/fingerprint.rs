//! Build fingerprints.
//!
//! The fingerprint file records two digests: one of the build inputs (the
//! embedded driver source plus the selected vendor library) and one of the
//! executable produced from them. Either changing forces a rebuild.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

const INPUTS_KEY: &str = "inputs";
const EXECUTABLE_KEY: &str = "executable";

/// Hex-encoded SHA-256 of the given bytes.
pub(super) fn digest(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

/// Digest of everything that determines the executable's contents.
pub(super) fn inputs_digest(source: &str, library: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0]);
    hasher.update(library.as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

/// Contents of the fingerprint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct BuildFingerprint {
    pub(super) inputs: String,
    pub(super) executable: String,
}

impl BuildFingerprint {
    pub(super) fn render(&self) -> String {
        format!(
            "{INPUTS_KEY}={}\n{EXECUTABLE_KEY}={}\n",
            self.inputs, self.executable
        )
    }

    pub(super) fn parse(text: &str) -> Option<Self> {
        let mut inputs = None;
        let mut executable = None;
        for line in text.lines() {
            match line.trim().split_once('=') {
                Some((INPUTS_KEY, value)) => inputs = Some(value.to_owned()),
                Some((EXECUTABLE_KEY, value)) => executable = Some(value.to_owned()),
                _ => {}
            }
        }
        Some(Self {
            inputs: inputs?,
            executable: executable?,
        })
    }

    /// Reads a recorded fingerprint; `None` when absent or unreadable.
    pub(super) fn read(path: &Path) -> Option<Self> {
        fs::read_to_string(path).ok().as_deref().and_then(Self::parse)
    }
}

/// Digest of a file on disk; `Ok(None)` when the file is missing.
pub(super) fn file_digest(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(digest(&bytes))),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercase_hex() {
        let hex = digest(b"abc");
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_survives_render_and_parse() {
        let fingerprint = BuildFingerprint {
            inputs: digest(b"source"),
            executable: digest(b"binary"),
        };
        assert_eq!(
            BuildFingerprint::parse(&fingerprint.render()),
            Some(fingerprint)
        );
    }

    #[test]
    fn legacy_single_digest_files_are_rejected() {
        assert_eq!(BuildFingerprint::parse("5d41402abc4b2a76b9719d911017c592"), None);
    }

    #[test]
    fn inputs_digest_is_lowercase_hex_of_separated_inputs() {
        let hex = inputs_digest("src", "armv8");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(hex, digest(b"src\0armv8"));
    }

    #[test]
    fn inputs_digest_depends_on_library() {
        assert_ne!(inputs_digest("src", "armv6"), inputs_digest("src", "armv8"));
    }
}
