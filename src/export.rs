//! Exporting a [`BatchResult`] as CSV or JSON.
//!
//! CSV is one row per comment, flattened across the batch, under the header
//! `Image Name,Username,Comment Text,Timestamp,Likes`. Quoting is RFC 4180:
//! a field is quoted only when it contains a comma, a quote or a line break,
//! and embedded quotes are doubled. Absent optional fields are empty cells.
//!
//! JSON is the serialised batch itself (results plus stats), useful for
//! keeping raw responses and degradation details next to the comments.

use crate::error::ExtractError;
use crate::output::BatchResult;
use std::path::Path;

/// Column headers of the CSV export, in order.
pub const CSV_HEADER: [&str; 5] = ["Image Name", "Username", "Comment Text", "Timestamp", "Likes"];

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    /// Pick a format from a file extension; anything but `.json` is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown export format '{other}' (expected csv or json)"
            ))),
        }
    }
}

/// Write the flattened comments as CSV to any writer.
pub fn write_csv<W: std::io::Write>(batch: &BatchResult, writer: W) -> Result<(), ExtractError> {
    let records = batch.flatten();
    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    // The header is derived from the record type, but an empty batch has no
    // record to derive it from.
    if records.is_empty() {
        wtr.write_record(CSV_HEADER).map_err(csv_error)?;
    }
    for record in &records {
        wtr.serialize(record).map_err(csv_error)?;
    }
    wtr.flush()
        .map_err(|e| ExtractError::ExportFailed(e.to_string()))
}

/// CSV export as a string.
pub fn to_csv(batch: &BatchResult) -> Result<String, ExtractError> {
    let mut buf = Vec::new();
    write_csv(batch, &mut buf)?;
    String::from_utf8(buf).map_err(|e| ExtractError::ExportFailed(e.to_string()))
}

/// Pretty-printed JSON of the whole batch.
pub fn to_json(batch: &BatchResult) -> Result<String, ExtractError> {
    serde_json::to_string_pretty(batch).map_err(|e| ExtractError::ExportFailed(e.to_string()))
}

/// Render the batch in the given format.
pub fn render(batch: &BatchResult, format: ExportFormat) -> Result<String, ExtractError> {
    match format {
        ExportFormat::Csv => to_csv(batch),
        ExportFormat::Json => to_json(batch),
    }
}

fn csv_error(e: csv::Error) -> ExtractError {
    ExtractError::ExportFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileError;
    use crate::output::{BatchStats, Comment, PageResult};
    use crate::pipeline::normalize::NormalizeStrategy;

    fn page(name: &str, comments: Vec<Comment>) -> PageResult {
        PageResult {
            display_name: name.into(),
            comments,
            raw_response: String::new(),
            source_name: name.into(),
            page: None,
            strategy: Some(NormalizeStrategy::WholeText),
            duration_ms: 0,
            error: None,
        }
    }

    fn batch(results: Vec<PageResult>) -> BatchResult {
        let stats = BatchStats::from_pages(results.len(), &results, 0);
        BatchResult { results, stats }
    }

    #[test]
    fn header_and_rows() {
        let b = batch(vec![page(
            "thread.png",
            vec![Comment {
                username: Some("@ana".into()),
                text: "love it".into(),
                timestamp: Some("2h".into()),
                likes: Some("12".into()),
            }],
        )]);
        assert_eq!(
            to_csv(&b).unwrap(),
            "Image Name,Username,Comment Text,Timestamp,Likes\nthread.png,@ana,love it,2h,12\n"
        );
    }

    #[test]
    fn empty_batch_still_has_header() {
        assert_eq!(
            to_csv(&BatchResult::default()).unwrap(),
            "Image Name,Username,Comment Text,Timestamp,Likes\n"
        );
    }

    #[test]
    fn missing_fields_are_empty_cells() {
        let b = batch(vec![page("a.png", vec![Comment::text_only("just text")])]);
        let csv = to_csv(&b).unwrap();
        assert_eq!(csv.lines().nth(1), Some("a.png,,just text,,"));
    }

    #[test]
    fn quotes_and_commas_round_trip() {
        let text = r#"He said "hi", then left"#;
        let b = batch(vec![page("doc.pdf (Page 2)", vec![Comment::text_only(text)])]);
        let csv = to_csv(&b).unwrap();
        assert!(csv.contains(r#""He said ""hi"", then left""#));

        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER);
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "doc.pdf (Page 2)");
        assert_eq!(&row[2], text);
    }

    #[test]
    fn multiline_text_is_quoted() {
        let b = batch(vec![page("a.png", vec![Comment::text_only("line one\nline two")])]);
        let csv = to_csv(&b).unwrap();
        assert!(csv.contains("\"line one\nline two\""));
    }

    #[test]
    fn degraded_pages_contribute_no_rows() {
        let b = batch(vec![
            page("a.png", vec![Comment::text_only("x")]),
            PageResult::degraded("b.pdf", "b.pdf", None, FileError::PasswordRequired, 0),
        ]);
        assert_eq!(to_csv(&b).unwrap().lines().count(), 2);
    }

    #[test]
    fn json_export_keeps_results_and_stats() {
        let b = batch(vec![page("a.png", vec![Comment::text_only("x")])]);
        let json: serde_json::Value = serde_json::from_str(&to_json(&b).unwrap()).unwrap();
        assert_eq!(json["results"][0]["displayName"], "a.png");
        assert_eq!(json["stats"]["totalComments"], 1);
    }

    #[test]
    fn format_from_path_and_str() {
        assert_eq!(ExportFormat::from_path(Path::new("out.JSON")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
