//! Reader for shadow subordinate-id databases (`subuid`/`subgid`).

use std::fs;
use std::path::Path;

use nsshift_common::error::{Result, ShiftError};

/// One delegated range from a shadow database, for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRecord {
    /// First delegated host id.
    pub host_start: u32,
    /// Number of delegated ids.
    pub size: u32,
}

/// Reads the delegated ranges for `username` from a `user:start:size` file.
///
/// `#` starts a comment; empty lines are ignored. A line with fewer than
/// three colon-separated fields fails the whole file. Records whose numeric
/// fields don't parse as unsigned 32-bit integers are skipped, matching the
/// shadow tooling this format is shared with. Username comparison is
/// case-insensitive.
///
/// # Errors
///
/// Returns [`ShiftError::Io`] if the file cannot be read,
/// [`ShiftError::Parse`] on a short line, and [`ShiftError::NoUserMap`]
/// when no record matched the user.
pub fn read_subordinate_ranges(path: &Path, username: &str) -> Result<Vec<ShadowRecord>> {
    let content = fs::read_to_string(path).map_err(|e| ShiftError::io(path, e))?;

    let mut records = Vec::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 {
            return Err(ShiftError::Parse {
                path: path.to_path_buf(),
                line: line.to_string(),
            });
        }

        if !fields[0].eq_ignore_ascii_case(username) {
            continue;
        }

        let (Ok(host_start), Ok(size)) = (fields[1].parse::<u32>(), fields[2].parse::<u32>())
        else {
            // Auxiliary tooling writes malformed numeric fields; skip the
            // record rather than failing the file.
            tracing::debug!(
                path = %path.display(),
                line,
                "skipping shadow record with malformed numeric fields"
            );
            continue;
        };

        records.push(ShadowRecord { host_start, size });
    }

    if records.is_empty() {
        return Err(ShiftError::NoUserMap {
            user: username.to_string(),
        });
    }

    Ok(records)
}
