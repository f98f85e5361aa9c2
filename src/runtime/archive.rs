//! Minimal in-memory tar helpers shared by every caller of
//! `copy_to_container`/`copy_from_container` (§4.2) — the runtime trait
//! moves raw tar bytes, not files, so callers that only care about a single
//! file build or unpack a one-entry archive.

use std::io::Read;

/// Build a tar archive containing a single file at `path` (relative to the
/// destination directory passed to `copy_to_container`).
pub fn build_file_tar(path: &str, content: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, path, content)
        .expect("in-memory tar append is infallible");
    builder.into_inner().expect("in-memory tar finish is infallible")
}

/// Read the first entry out of a tar archive, if any.
pub fn read_first_file(tar_bytes: &[u8]) -> Option<Vec<u8>> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut entries = archive.entries().ok()?;
    let mut entry = entries.next()?.ok()?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).ok()?;
    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_file() {
        let tar = build_file_tar("values.yaml", b"hello");
        assert_eq!(read_first_file(&tar).unwrap(), b"hello");
    }
}
