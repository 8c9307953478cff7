//! Reading and writing CSV.
//!
//! The writer quotes every field and prefixes a byte-order mark so that
//! spreadsheet software opens the file as UTF-8. The reader accepts what the
//! writer produces as well as hand-edited files.

use std::collections::BTreeMap;

pub const BOM: char = '\u{feff}';

fn escape(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Renders `header` and `rows`. Lines are separated by `\n`.
pub fn write<I, R, F>(header: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = F>,
    F: AsRef<str>,
{
    let mut lines =
        vec![header.iter().map(|h| escape(h)).collect::<Vec<_>>().join(",")];
    for row in rows {
        lines.push(
            row.into_iter()
                .map(|field| escape(field.as_ref()))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    let mut out = String::with_capacity(lines.iter().map(String::len).sum());
    out.push(BOM);
    out.push_str(&lines.join("\n"));
    out
}

/// Splits `text` into records of trimmed fields. Quoted fields may contain
/// commas, doubled quotes and line breaks. Blank lines are skipped.
pub fn parse(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix(BOM).unwrap_or(text);

    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    let mut end_record = |record: &mut Vec<String>, field: &mut String| {
        record.push(field.trim().to_string());
        field.clear();
        let finished = std::mem::take(record);
        if !(finished.len() == 1 && finished[0].is_empty()) {
            records.push(finished);
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                record.push(field.trim().to_string());
                field.clear();
            }
            '\r' if !in_quotes => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_record(&mut record, &mut field);
            }
            '\n' if !in_quotes => end_record(&mut record, &mut field),
            other => field.push(other),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        end_record(&mut record, &mut field);
    }

    records
}

/// Parses a file whose first record names the columns. Missing trailing
/// fields are `None`.
pub fn parse_with_headers(
    text: &str,
) -> (Vec<String>, Vec<BTreeMap<String, Option<String>>>) {
    let mut records = parse(text).into_iter();
    let Some(headers) = records.next() else {
        return (Vec::new(), Vec::new());
    };
    let rows = records
        .map(|record| {
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).cloned()))
                .collect()
        })
        .collect();
    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awkward_fields_survive_a_round_trip() {
        let awkward = "Smith, \"Jo\"\nline two";
        let out = write(&["Name", "Count"], vec![vec![awkward, "3"]]);

        assert!(out.starts_with(BOM));
        assert!(out.contains("\"Smith, \"\"Jo\"\"\nline two\""));

        let records = parse(&out);
        assert_eq!(records[0], vec!["Name", "Count"]);
        assert_eq!(records[1], vec![awkward.to_string(), "3".to_string()]);
    }

    #[test]
    fn every_field_is_quoted_and_rows_use_newlines() {
        let out = write(&["a", "b"], vec![vec!["1", ""], vec!["x", "y"]]);
        assert_eq!(out, "\u{feff}\"a\",\"b\"\n\"1\",\"\"\n\"x\",\"y\"");
    }

    #[test]
    fn crlf_and_blank_lines() {
        let records = parse("id,label\r\n1, Alice \r\n\r\n2,Bob\r\n");
        assert_eq!(
            records,
            vec![
                vec!["id".to_string(), "label".to_string()],
                vec!["1".to_string(), "Alice".to_string()],
                vec!["2".to_string(), "Bob".to_string()],
            ]
        );
    }

    #[test]
    fn short_records_leave_columns_empty() {
        let (headers, rows) = parse_with_headers("a,b,c\n1,2\n");
        assert_eq!(headers, vec!["a", "b", "c"]);
        assert_eq!(rows[0].get("b"), Some(&Some("2".to_string())));
        assert_eq!(rows[0].get("c"), Some(&None));
    }

    #[test]
    fn empty_input_has_no_headers() {
        let (headers, rows) = parse_with_headers("\n\n");
        assert!(headers.is_empty());
        assert!(rows.is_empty());
    }
}
