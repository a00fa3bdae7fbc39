//! Count handoff file read by the worker during shutdown.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `path` with the 8-byte big-endian `count`.
///
/// The bytes go to a temporary file in the same directory, are synced, and the
/// file is then renamed over `path`; readers never see a partial write.
pub fn write_flag_file(path: &Path, count: u64) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&count.to_be_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn read_flag_file(path: &Path) -> io::Result<u64> {
    let bytes = fs::read(path)?;
    let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("flag file holds {} bytes, expected 8", bytes.len()),
        )
    })?;
    Ok(u64::from_be_bytes(raw))
}
