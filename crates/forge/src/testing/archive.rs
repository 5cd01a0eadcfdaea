// Path: crates/forge/src/testing/archive.rs

//! In-memory tar archives for injecting files into containers.

use std::io;
use tar::{Builder, EntryType, Header};

/// Mode given to injected scripts.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Builds a tar archive holding a single regular file at the archive root.
pub fn single_file_archive(file_name: &str, contents: &[u8], mode: u32) -> io::Result<Vec<u8>> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(contents.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);

    let mut bytes = Vec::new();
    {
        let mut ar = Builder::new(&mut bytes);
        ar.append_data(&mut header, file_name, contents)?;
        ar.finish()?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tar::Archive;

    #[test]
    fn archive_holds_one_executable_file() {
        let script = b"#!/bin/sh\necho hi\n";
        let bytes = single_file_archive("start-node.sh", script, EXECUTABLE_MODE).unwrap();

        let mut archive = Archive::new(bytes.as_slice());
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some("start-node.sh"));
        assert_eq!(entry.header().mode().unwrap(), EXECUTABLE_MODE);

        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body, script);
        drop(entry);
        assert!(entries.next().is_none());
    }
}
