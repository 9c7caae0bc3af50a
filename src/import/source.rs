use sha2::{Digest, Sha256};
use std::path::Path;

use super::error::ImportError;

/// The whole source file, parsed into a header row and data rows.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub delimiter: char,
    pub sha256: String,
    /// Invalid UTF-8 sequences were replaced with U+FFFD while decoding.
    pub lossy: bool,
}

/// Comma by default; a comma request (explicit or implied) switches to semicolon
/// when the text contains one. Any other explicit delimiter is honored as given.
pub fn choose_delimiter(text: &str, requested: Option<char>) -> char {
    let wanted = requested.unwrap_or(',');
    if wanted == ',' && text.contains(';') {
        ';'
    } else {
        wanted
    }
}

pub fn read_source(path: &Path, requested: Option<char>) -> Result<SourceTable, ImportError> {
    let bytes = std::fs::read(path).map_err(|source| ImportError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let (decoded, lossy) = match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(e) => (String::from_utf8_lossy(e.as_bytes()).into_owned(), true),
    };
    let text = decoded.strip_prefix('\u{feff}').unwrap_or(&decoded);
    let mut table = parse_source(path, text, requested, sha256)?;
    table.lossy = lossy;
    Ok(table)
}

fn parse_source(
    path: &Path,
    text: &str,
    requested: Option<char>,
    sha256: String,
) -> Result<SourceTable, ImportError> {
    let delimiter = choose_delimiter(text, requested);
    let malformed = |source: csv::Error| ImportError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ImportError::NoHeader {
            path: path.to_path_buf(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        // Lines made only of delimiters count as blank.
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    if rows.is_empty() {
        return Err(ImportError::NoDataRows {
            path: path.to_path_buf(),
        });
    }

    Ok(SourceTable {
        headers,
        rows,
        delimiter,
        sha256,
        lossy: false,
    })
}
