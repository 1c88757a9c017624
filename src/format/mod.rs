//! Format registry for file-backed `FROM '...'` sources.
//!
//! When a query's `FROM` operand is a string literal, it names a file path
//! rather than a catalog table; the registry in this module sniffs the
//! format from the extension (falling back to content sniffing) and loads
//! it into a transient, query-scoped [`Table`].

pub mod csv;
pub mod json;

use crate::error::IoError;
use crate::table::Table;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

/// Picks a format for `path`, preferring the extension and falling back to
/// sniffing the first non-whitespace byte of the file (`{`/`[` reads as
/// JSON, anything else as CSV).
pub fn detect_format(path: &Path) -> Result<FileFormat, IoError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => return Ok(FileFormat::Csv),
        Some(ext) if ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("ndjson") => {
            return Ok(FileFormat::Json)
        }
        _ => {}
    }

    let bytes = std::fs::read(path).map_err(|source| IoError::FailedToLoadFile {
        path: path.display().to_string(),
        source,
    })?;
    let first_non_ws = bytes.iter().find(|b| !b.is_ascii_whitespace());
    match first_non_ws {
        Some(b'{') | Some(b'[') => Ok(FileFormat::Json),
        Some(_) => Ok(FileFormat::Csv),
        None => Err(IoError::InvalidFileFormat(format!(
            "cannot infer format of empty file {}",
            path.display()
        ))),
    }
}

/// Loads `path` into a transient table named after its file stem, detecting
/// the format first.
pub fn load_file(path: &Path) -> Result<Table, IoError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    match detect_format(path)? {
        FileFormat::Csv => csv::load(path, &name),
        FileFormat::Json => json::load(path, &name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_csv_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert_eq!(detect_format(&path).unwrap(), FileFormat::Csv);
    }

    #[test]
    fn detects_json_by_sniffing_content_when_extension_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.dat");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "  [{{\"a\": 1}}]").unwrap();
        assert_eq!(detect_format(&path).unwrap(), FileFormat::Json);
    }
}
