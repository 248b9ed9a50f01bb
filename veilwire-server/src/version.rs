//! Release and protocol version files.
//!
//! Both files live in the data directory next to the config: `version`
//! holds a human-readable release string, `crypt_tcp_protocol_version`
//! an integer. Only the first line of each is meaningful; absent or
//! unreadable files fall back to compiled-in values.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const VERSION_FILE: &str = "version";
const PROTOCOL_VERSION_FILE: &str = "crypt_tcp_protocol_version";
const FALLBACK_PROTOCOL_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct VersionInfo {
    pub release: String,
    pub protocol: u32,
}

// Full first line, trimmed. None for a missing/unreadable/empty file.
fn first_line(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    let line = line.trim();
    if line.is_empty() { None } else { Some(line.to_owned()) }
}

/// Load version info from `data_dir`, falling back to the crate version
/// and protocol 1.
pub fn load(data_dir: &Path) -> VersionInfo {
    let release = first_line(&data_dir.join(VERSION_FILE))
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned());
    let protocol = first_line(&data_dir.join(PROTOCOL_VERSION_FILE))
        .and_then(|line| line.parse().ok())
        .unwrap_or(FALLBACK_PROTOCOL_VERSION);
    VersionInfo { release, protocol }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_full_first_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("version"), "0.9.3-rc1\nchangelog junk\n").unwrap();
        fs::write(dir.path().join("crypt_tcp_protocol_version"), "4\n").unwrap();

        let info = load(dir.path());
        assert_eq!(info.release, "0.9.3-rc1");
        assert_eq!(info.protocol, 4);
    }

    #[test]
    fn falls_back_when_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let info = load(dir.path());
        assert_eq!(info.release, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.protocol, FALLBACK_PROTOCOL_VERSION);
    }

    #[test]
    fn garbage_protocol_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("crypt_tcp_protocol_version"), "not a number").unwrap();
        assert_eq!(load(dir.path()).protocol, FALLBACK_PROTOCOL_VERSION);
    }
}
