//! Raw-material parsing for runtime ingest.
//!
//! Converts heterogeneous user inputs (plain text, CSV, base64 PDF) into
//! normalized text before semantic extraction. Parse failures are reported as
//! parse errors so the ingestor can record them per record and continue.

use crate::error::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const CSV_MAX_ROWS: usize = 30;

/// Supported raw-material kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Csv,
    Pdf,
}

impl SourceType {
    /// Parse the wire form.
    ///
    /// # Errors
    ///
    /// Returns a parse error for unsupported source types.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            other => Err(Error::parse(format!("unsupported source_type: {other}"))),
        }
    }
}

/// One raw record submitted for ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_encoding")]
    pub content_encoding: String,
}

fn default_source_type() -> String {
    "text".to_string()
}

fn default_encoding() -> String {
    "plain".to_string()
}

impl RawRecord {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            id: None,
            category: None,
            source_type: "text".to_string(),
            content: content.into(),
            content_encoding: "plain".to_string(),
        }
    }

    /// Record category, defaulting to `general`.
    #[must_use]
    pub fn category_or_default(&self) -> String {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .unwrap_or("general")
            .to_string()
    }
}

/// Normalized text plus parser metadata
#[derive(Debug, Clone)]
pub struct ParsedMaterial {
    pub source_type: SourceType,
    pub text: String,
    pub metadata: Value,
    pub warnings: Vec<String>,
}

/// Parse one raw record into normalized text.
///
/// # Errors
///
/// Returns a parse error for unsupported source types, undecodable PDF
/// payloads, or empty PDF extractions.
pub fn parse_raw_material_record(record: &RawRecord) -> Result<ParsedMaterial> {
    match SourceType::parse(&record.source_type)? {
        SourceType::Text => Ok(ParsedMaterial {
            source_type: SourceType::Text,
            text: record.content.clone(),
            metadata: json!({ "parser": "plain_text" }),
            warnings: Vec::new(),
        }),
        SourceType::Csv => parse_csv_material(&record.content),
        SourceType::Pdf => parse_pdf_material(&record.content, &record.content_encoding),
    }
}

/// Render CSV content as line-per-row text with header detection.
fn parse_csv_material(content: &str) -> Result<ParsedMaterial> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records().take(CSV_MAX_ROWS + 1) {
        let record = record.map_err(|err| Error::parse(format!("invalid CSV: {err}")))?;
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
    }

    let has_header = detect_header(&rows);
    let mut lines = Vec::new();
    let prelude;
    let row_count;

    if has_header {
        let header = rows.first().cloned().unwrap_or_default();
        prelude = format!("CSV table with columns: {}", header.join(", "));
        let data_rows: Vec<&Vec<String>> = rows.iter().skip(1).take(CSV_MAX_ROWS).collect();
        row_count = data_rows.len();
        for (idx, row) in data_rows.iter().enumerate() {
            let pairs: Vec<String> = header
                .iter()
                .enumerate()
                .filter(|(_, name)| !name.is_empty())
                .map(|(col, name)| {
                    format!("{name}={}", row.get(col).map(String::as_str).unwrap_or(""))
                })
                .collect();
            lines.push(format!("row {}: {}", idx + 1, pairs.join(", ")));
        }
    } else {
        prelude = "CSV-like rows without detected header".to_string();
        let data_rows: Vec<&Vec<String>> = rows.iter().take(CSV_MAX_ROWS).collect();
        row_count = data_rows.len();
        for (idx, row) in data_rows.iter().enumerate() {
            lines.push(format!("row {}: {}", idx + 1, row.join(", ")));
        }
    }

    let text = if lines.is_empty() {
        prelude.clone()
    } else {
        format!("{prelude}\n{}", lines.join("\n"))
    };

    Ok(ParsedMaterial {
        source_type: SourceType::Csv,
        text,
        metadata: json!({
            "parser": "csv",
            "rows_parsed": row_count,
            "has_header": has_header,
        }),
        warnings: Vec::new(),
    })
}

/// First row is a header when its cells are non-empty, non-numeric, and unique.
fn detect_header(rows: &[Vec<String>]) -> bool {
    let Some(first) = rows.first() else {
        return false;
    };
    if first.is_empty() || first.iter().any(String::is_empty) {
        return false;
    }
    if first.iter().any(|cell| cell.parse::<f64>().is_ok()) {
        return false;
    }
    let unique: std::collections::HashSet<&String> = first.iter().collect();
    unique.len() == first.len()
}

/// Decode and text-extract a PDF payload.
fn parse_pdf_material(content: &str, encoding: &str) -> Result<ParsedMaterial> {
    match encoding.trim().to_lowercase().as_str() {
        "base64" => {
            let payload = base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map_err(|err| Error::parse(format!("invalid base64 PDF payload: {err}")))?;
            let text = pdf_extract::extract_text_from_mem(&payload)
                .map_err(|err| Error::parse(format!("failed to read PDF payload: {err}")))?;
            let cleaned: String = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if cleaned.is_empty() {
                return Err(Error::parse("PDF text extraction returned empty content"));
            }
            Ok(ParsedMaterial {
                source_type: SourceType::Pdf,
                text: cleaned,
                metadata: json!({ "parser": "pdf_extract" }),
                warnings: Vec::new(),
            })
        }
        // Best effort for already-extracted payloads.
        "plain" => Ok(ParsedMaterial {
            source_type: SourceType::Pdf,
            text: content.to_string(),
            metadata: json!({ "parser": "plain_fallback" }),
            warnings: vec![
                "pdf content_encoding=plain; treated as pre-extracted text".to_string()
            ],
        }),
        other => Err(Error::parse(format!(
            "unsupported content_encoding for pdf: {other}"
        ))),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_passthrough() {
        let record = RawRecord::text("Acme acquired Globex.");
        let parsed = parse_raw_material_record(&record).unwrap();
        assert_eq!(parsed.source_type, SourceType::Text);
        assert_eq!(parsed.text, "Acme acquired Globex.");
        assert_eq!(parsed.metadata["parser"], "plain_text");
    }

    #[test]
    fn test_unsupported_source_type() {
        let record = RawRecord {
            source_type: "spreadsheet".to_string(),
            ..RawRecord::text("x")
        };
        let err = parse_raw_material_record(&record).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_csv_with_header() {
        let record = RawRecord {
            source_type: "csv".to_string(),
            content: "name,employees\nAcme,120\nGlobex,900\n".to_string(),
            ..RawRecord::text("")
        };
        let parsed = parse_raw_material_record(&record).unwrap();
        assert!(parsed.text.starts_with("CSV table with columns: name, employees"));
        assert!(parsed.text.contains("row 1: name=Acme, employees=120"));
        assert_eq!(parsed.metadata["has_header"], true);
        assert_eq!(parsed.metadata["rows_parsed"], 2);
    }

    #[test]
    fn test_csv_without_header() {
        let record = RawRecord {
            source_type: "csv".to_string(),
            content: "1,2,3\n4,5,6\n".to_string(),
            ..RawRecord::text("")
        };
        let parsed = parse_raw_material_record(&record).unwrap();
        assert!(parsed.text.starts_with("CSV-like rows without detected header"));
        assert!(parsed.text.contains("row 2: 4, 5, 6"));
        assert_eq!(parsed.metadata["has_header"], false);
    }

    #[test]
    fn test_csv_duplicate_columns_not_header() {
        let record = RawRecord {
            source_type: "csv".to_string(),
            content: "a,a\nx,y\n".to_string(),
            ..RawRecord::text("")
        };
        let parsed = parse_raw_material_record(&record).unwrap();
        assert_eq!(parsed.metadata["has_header"], false);
    }

    #[test]
    fn test_csv_row_cap() {
        let mut content = String::from("name\n");
        for i in 0..50 {
            content.push_str(&format!("entity{i}\n"));
        }
        let record = RawRecord {
            source_type: "csv".to_string(),
            content,
            ..RawRecord::text("")
        };
        let parsed = parse_raw_material_record(&record).unwrap();
        assert_eq!(parsed.metadata["rows_parsed"], CSV_MAX_ROWS);
    }

    #[test]
    fn test_pdf_invalid_base64() {
        let record = RawRecord {
            source_type: "pdf".to_string(),
            content: "%%not-base64%%".to_string(),
            content_encoding: "base64".to_string(),
            ..RawRecord::text("")
        };
        let err = parse_raw_material_record(&record).unwrap_err();
        assert!(err.to_string().contains("invalid base64"));
    }

    #[test]
    fn test_pdf_plain_fallback_warns() {
        let record = RawRecord {
            source_type: "pdf".to_string(),
            content: "already extracted text".to_string(),
            content_encoding: "plain".to_string(),
            ..RawRecord::text("")
        };
        let parsed = parse_raw_material_record(&record).unwrap();
        assert_eq!(parsed.text, "already extracted text");
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_pdf_unknown_encoding() {
        let record = RawRecord {
            source_type: "pdf".to_string(),
            content: "x".to_string(),
            content_encoding: "hex".to_string(),
            ..RawRecord::text("")
        };
        assert!(parse_raw_material_record(&record).is_err());
    }

    #[test]
    fn test_category_default() {
        let mut record = RawRecord::text("x");
        assert_eq!(record.category_or_default(), "general");
        record.category = Some("  ".to_string());
        assert_eq!(record.category_or_default(), "general");
        record.category = Some("finance".to_string());
        assert_eq!(record.category_or_default(), "finance");
    }
}
