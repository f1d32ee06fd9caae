//! Delivery of a built artifact onto a board volume.
use std::fs;
use std::io;
use std::path::Path;

/// Copies a file onto a volume. Injected so the workflow can be tested
/// without a mounted board.
pub trait Copier {
    /// Copies `from` to `to`, creating missing parent directories of `to`.
    /// Returns the number of bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// [`Copier`] that performs a plain filesystem copy.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsCopier;

impl Copier for FsCopier {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(from, to)?;
        log::debug!("copied {bytes} bytes to {}", to.display());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_bytes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("blink.uf2");
        fs::write(&from, b"UF2\n\x57\x51\x5d\x9e").unwrap();
        let to = dir.path().join("CIRCUITPY/lib/adafruit/blink.uf2");

        let bytes = FsCopier.copy(&from, &to).unwrap();

        assert_eq!(bytes, 8);
        assert_eq!(fs::read(&to).unwrap(), fs::read(&from).unwrap());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsCopier
            .copy(&dir.path().join("nope.uf2"), &dir.path().join("out.uf2"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
