//! Reader for kernel namespace maps (`/proc/self/{uid,gid}_map`).

use std::fs;
use std::path::Path;

use nsshift_common::error::{Result, ShiftError};

/// One line of a kernel namespace map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcMapLine {
    /// Container-side start of the range.
    pub nsid_start: u32,
    /// Host-side start of the range.
    pub host_start: u32,
    /// Number of ids covered.
    pub size: u32,
}

/// Reads the `nsid host size` records of a kernel namespace map.
///
/// Comment and numeric handling match the shadow reader; fields are
/// whitespace-separated.
///
/// # Errors
///
/// Returns [`ShiftError::Io`] if the file cannot be read,
/// [`ShiftError::Parse`] on a line with fewer than three fields, and
/// [`ShiftError::EmptyMap`] when the file yields zero records.
pub fn read_proc_map(path: &Path) -> Result<Vec<ProcMapLine>> {
    let content = fs::read_to_string(path).map_err(|e| ShiftError::io(path, e))?;

    let mut lines = Vec::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or_default();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(ShiftError::Parse {
                path: path.to_path_buf(),
                line: line.to_string(),
            });
        }

        let (Ok(nsid_start), Ok(host_start), Ok(size)) = (
            fields[0].parse::<u32>(),
            fields[1].parse::<u32>(),
            fields[2].parse::<u32>(),
        ) else {
            tracing::debug!(
                path = %path.display(),
                line,
                "skipping namespace map record with malformed numeric fields"
            );
            continue;
        };

        lines.push(ProcMapLine {
            nsid_start,
            host_start,
            size,
        });
    }

    if lines.is_empty() {
        return Err(ShiftError::EmptyMap {
            path: path.to_path_buf(),
        });
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn map_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(content.as_bytes()).expect("write fixture");
        file
    }

    #[test]
    fn parses_the_identity_root_map() {
        let file = map_file("         0          0 4294967295\n");
        let lines = read_proc_map(file.path()).expect("records");
        assert_eq!(
            lines,
            vec![ProcMapLine {
                nsid_start: 0,
                host_start: 0,
                size: 4_294_967_295
            }]
        );
    }

    #[test]
    fn parses_multiple_records_in_order() {
        let file = map_file("0 100000 65536\n65536 1000 1\n");
        let lines = read_proc_map(file.path()).expect("records");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].host_start, 1_000);
    }

    #[test]
    fn short_line_fails_the_whole_file() {
        let file = map_file("0 100000\n");
        let err = read_proc_map(file.path()).expect_err("short line");
        assert!(matches!(err, ShiftError::Parse { .. }));
    }

    #[test]
    fn malformed_numeric_fields_skip_the_record() {
        let file = map_file("zero 100000 65536\n0 100000 65536\n");
        let lines = read_proc_map(file.path()).expect("records");
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn file_with_no_records_is_an_empty_map() {
        let file = map_file("# nothing here\n");
        let err = read_proc_map(file.path()).expect_err("no records");
        assert!(matches!(err, ShiftError::EmptyMap { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_proc_map(Path::new("/nonexistent/uid_map")).expect_err("missing file");
        assert!(matches!(err, ShiftError::Io { .. }));
    }
}
