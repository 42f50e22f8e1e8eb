//! Row counting for exported CSV artifacts.
//!
//! The portal exports `;`-delimited CSV with a header row and usually a
//! UTF-8 BOM. Only data rows count toward the row cap.

use std::fs::File;
use std::path::Path;

use super::DownloadError;

/// Field delimiter used by the portal's exports.
pub const EXPORT_DELIMITER: u8 = b';';

/// Counts data rows (excluding the header) in a CSV artifact.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the file cannot be opened, and
/// [`DownloadError::Fatal`] if it is not readable as CSV.
pub fn count_data_rows(path: &Path) -> Result<u64, DownloadError> {
    let file = File::open(path).map_err(|e| DownloadError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(EXPORT_DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut record = csv::ByteRecord::new();
    let mut rows = 0_u64;
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => rows += 1,
            Ok(false) => break,
            Err(e) => {
                return Err(DownloadError::fatal(format!(
                    "unreadable CSV at {}: {e}",
                    path.display()
                )));
            }
        }
    }
    Ok(rows)
}
