//! Raw record parsing: delimited text and newline-delimited JSON.
//!
//! Both parsers produce a [`RawTable`]. CSV cells are inferred into
//! scalars (or null); NDJSON values keep their nested structure for the
//! normalizer to canonicalize.

use serde_json::Value;

use crate::models::{RawTable, RawValue, Scalar};

/// Cell spellings read as null.
const NULL_TOKENS: [&str; 7] = ["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Parsing error with context
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub column: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(f, "Line {}, column '{}': {}", self.line, col, self.message),
            None => write!(f, "Line {}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// Result of parsing a delimited file, with detection metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub table: RawTable,
    /// Detected encoding
    pub encoding: String,
    /// Detected or configured delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the given encoding (lossy for unknown ones)
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text)
        }
    }
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Infer a CSV cell: null token, integer, decimal, boolean or text.
pub fn infer_cell(raw: &str) -> RawValue {
    let cell = raw.trim();
    if cell.is_empty() || NULL_TOKENS.contains(&cell) {
        return RawValue::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return RawValue::int(i);
    }
    if looks_decimal(cell) {
        if let Ok(f) = cell.parse::<f64>() {
            return RawValue::float(f);
        }
    }
    match cell {
        "true" | "True" | "TRUE" => RawValue::Scalar(Scalar::Bool(true)),
        "false" | "False" | "FALSE" => RawValue::Scalar(Scalar::Bool(false)),
        _ => RawValue::text(cell),
    }
}

/// `f64::from_str` also accepts "inf" and "infinity"; keep those as text.
fn looks_decimal(cell: &str) -> bool {
    cell.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
        && cell.chars().any(|c| c.is_ascii_digit())
}

/// Parse delimited text into a raw table.
///
/// # Example
/// ```ignore
/// let table = parse_csv_str("id,name\n1,Alice\n", ',').unwrap();
/// assert_eq!(table.columns, vec!["id", "name"]);
/// ```
pub fn parse_csv_str(content: &str, delimiter: char) -> Result<RawTable, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::new(1, "Empty CSV file"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::new(1, format!("Cannot read header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(ParseError::new(1, "No headers found"));
    }

    let mut table = RawTable::new(headers);

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.map_err(|e| ParseError::new(line, e.to_string()))?;

        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        // Short rows pad with nulls; extra trailing cells are ignored.
        let row = (0..table.columns.len())
            .map(|i| record.get(i).map(infer_cell).unwrap_or(RawValue::Null))
            .collect();
        table.rows.push(row);
    }

    Ok(table)
}

/// Parse CSV bytes with encoding detection and optional delimiter override.
pub fn parse_csv_bytes(bytes: &[u8], delimiter: Option<char>) -> Result<ParseResult, ParseError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));
    let table = parse_csv_str(&content, delimiter)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter,
    })
}

/// Parse newline-delimited JSON objects into a raw table.
///
/// Columns are the union of keys in first-seen order; a row lacking a
/// column holds [`RawValue::Null`] there.
pub fn parse_ndjson(content: &str) -> Result<RawTable, ParseError> {
    let mut table = RawTable::default();

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line)
            .map_err(|e| ParseError::new(line_num, e.to_string()))?;
        let fields = match RawValue::from_json(value) {
            RawValue::Mapping(fields) => fields,
            _ => return Err(ParseError::new(line_num, "Expected a JSON object")),
        };

        let mut row = vec![RawValue::Null; table.columns.len()];
        for (key, value) in fields {
            match table.column_index(&key) {
                Some(i) => row[i] = value,
                None => {
                    table.columns.push(key);
                    for existing in table.rows.iter_mut() {
                        existing.push(RawValue::Null);
                    }
                    row.push(value);
                }
            }
        }
        table.rows.push(row);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let table = parse_csv_str("id,name,subtotal\n1,Alice,100.00\n2,Bob,150.5", ',').unwrap();

        assert_eq!(table.columns, vec!["id", "name", "subtotal"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], RawValue::int(1));
        assert_eq!(table.rows[0][1], RawValue::text("Alice"));
        assert_eq!(table.rows[0][2], RawValue::float(100.0));
        assert_eq!(table.rows[1][2], RawValue::float(150.5));
    }

    #[test]
    fn test_quoted_values_keep_delimiter() {
        let table = parse_csv_str("name,note\n\"Smith, Jo\",\"hello\"", ',').unwrap();
        assert_eq!(table.rows[0][0], RawValue::text("Smith, Jo"));
        assert_eq!(table.rows[0][1], RawValue::text("hello"));
    }

    #[test]
    fn test_null_tokens_and_short_rows() {
        let table = parse_csv_str("a,b,c\n1,,NA\n2", ',').unwrap();
        assert_eq!(table.rows[0][1], RawValue::Null);
        assert_eq!(table.rows[0][2], RawValue::Null);
        assert_eq!(table.rows[1][1], RawValue::Null);
        assert_eq!(table.rows[1][2], RawValue::Null);
    }

    #[test]
    fn test_infer_cell() {
        assert_eq!(infer_cell("42"), RawValue::int(42));
        assert_eq!(infer_cell("-3.5"), RawValue::float(-3.5));
        assert_eq!(infer_cell("true"), RawValue::Scalar(Scalar::Bool(true)));
        assert_eq!(infer_cell("inf"), RawValue::text("inf"));
        assert_eq!(infer_cell("2024-01-01"), RawValue::text("2024-01-01"));
        assert_eq!(infer_cell("  None "), RawValue::Null);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let table = parse_csv_str("a;b\n1;2\n\n3;4\n", ';').unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_empty_csv_error() {
        let err = parse_csv_str("", ',').unwrap_err();
        assert!(err.message.contains("Empty"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_parse_bytes_detects_settings() {
        let result = parse_csv_bytes(b"id;name\n1;Alice\n", None).unwrap();
        assert_eq!(result.delimiter, ';');
        assert_eq!(result.encoding, "utf-8");
        assert_eq!(result.table.len(), 1);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Soci\xe9t\xe9" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Soci\u{e9}t\u{e9}");
    }

    #[test]
    fn test_ndjson_union_of_columns() {
        let content = r#"{"ticket_id":"T1","order_id":"O1"}

{"ticket_id":"T2","tags":["a","b"]}"#;
        let table = parse_ndjson(content).unwrap();

        assert_eq!(table.columns, vec!["ticket_id", "order_id", "tags"]);
        assert_eq!(table.rows[0][2], RawValue::Null);
        assert_eq!(table.rows[1][1], RawValue::Null);
        assert!(table.rows[1][2].is_nested());
    }

    #[test]
    fn test_ndjson_keeps_key_order_within_a_line() {
        let table = parse_ndjson(r#"{"zone":"north","amount":3,"channel":"web"}"#).unwrap();
        assert_eq!(table.columns, vec!["zone", "amount", "channel"]);
        assert_eq!(table.rows[0][1], RawValue::int(3));
    }

    #[test]
    fn test_ndjson_rejects_non_objects() {
        let err = parse_ndjson("{\"a\":1}\n[1,2]").unwrap_err();
        assert_eq!(err.line, 2);

        let err = parse_ndjson("{not json}").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_ndjson_empty_input() {
        let table = parse_ndjson("").unwrap();
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }
}
