//! CSV output for the retained speakers

use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::models::OutputRow;

/// Write a header row and one row per retained speaker.
///
/// The parent directory is created when missing. An empty slice still
/// produces a file containing just the header.
pub fn write_csv(path: &Path, rows: &[OutputRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(OUTPUT_HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Column order of the output file
pub const OUTPUT_HEADERS: [&str; 6] = [
    "Speaker Name",
    "Speaker Title",
    "Speaker Company",
    "Company Category",
    "Email Subject",
    "Email Body",
];

/// Read rows back from a file written by [`write_csv`]
pub fn read_csv(path: &Path) -> Result<Vec<OutputRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<OutputRow>()
        .collect::<std::result::Result<Vec<_>, csv::Error>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompanyCategory;

    fn row(name: &str, body: &str) -> OutputRow {
        OutputRow {
            speaker_name: name.to_string(),
            speaker_title: "Site Superintendent".to_string(),
            speaker_company: "Riverside Builders".to_string(),
            company_category: CompanyCategory::Builder,
            email_subject: "Aerial progress, weekly".to_string(),
            email_body: body.to_string(),
        }
    }

    #[test]
    fn test_write_csv_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("email_list.csv");

        let rows = vec![
            row("Jane Doe", "Hi Jane, \"stop by\" booth #42, please."),
            row("John Smith", "Hi John"),
        ];
        write_csv(&path, &rows).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let first_line = content.lines().next().unwrap();
        assert_eq!(
            first_line,
            "Speaker Name,Speaker Title,Speaker Company,Company Category,Email Subject,Email Body"
        );

        let read_back = read_csv(&path).unwrap();
        assert_eq!(read_back, rows);
    }

    #[test]
    fn test_write_csv_empty_has_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_csv(&path, &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(read_csv(&path).unwrap().is_empty());
    }
}
