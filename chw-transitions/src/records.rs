//! JSON-lines record input and output
//!
//! Every non-blank input line becomes one [`RecordLine`]. A line that does not
//! parse as a data record is kept verbatim so it is written back unchanged and
//! never stops the rest of the batch.

use chw_common::documents::DataRecord;
use std::io::{self, BufRead, Write};
use tracing::warn;

/// One input line, parsed or passed through
#[derive(Debug, Clone, PartialEq)]
pub enum RecordLine {
    Parsed(DataRecord),
    Rejected {
        /// 1-based input line number
        line: usize,
        raw: String,
    },
}

impl RecordLine {
    pub fn record_mut(&mut self) -> Option<&mut DataRecord> {
        match self {
            RecordLine::Parsed(record) => Some(record),
            RecordLine::Rejected { .. } => None,
        }
    }
}

/// Read records, one JSON document per non-blank line
///
/// # Errors
/// Only I/O failures; malformed lines are logged and returned as
/// [`RecordLine::Rejected`].
pub fn read_record_lines<R: BufRead>(reader: R) -> io::Result<Vec<RecordLine>> {
    let mut lines = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DataRecord>(&line) {
            Ok(record) => lines.push(RecordLine::Parsed(record)),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Invalid record, passing through unchanged");
                lines.push(RecordLine::Rejected {
                    line: index + 1,
                    raw: line,
                });
            }
        }
    }
    Ok(lines)
}

/// Write records back as JSON lines, rejected lines verbatim
pub fn write_record_lines<W: Write>(mut writer: W, lines: &[RecordLine]) -> io::Result<()> {
    for line in lines {
        match line {
            RecordLine::Parsed(record) => serde_json::to_writer(&mut writer, record)?,
            RecordLine::Rejected { raw, .. } => writer.write_all(raw.as_bytes())?,
        }
        writer.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const INPUT: &str = concat!(
        "{\"type\":\"data_record\",\"from\":\"+1\"}\n",
        "\n",
        "{\"type\":\"data_record\",\"contact\":{\"phone\":[1]}}\n",
        "not json\n",
        "{\"type\":\"data_record\",\"from\":\"+2\",\"refid\":7}\n",
    );

    #[test]
    fn test_bad_lines_do_not_stop_reading() {
        let lines = read_record_lines(INPUT.as_bytes()).unwrap();

        assert_eq!(lines.len(), 4);
        assert!(matches!(&lines[0], RecordLine::Parsed(r) if r.from_key() == "+1"));
        assert!(matches!(&lines[1], RecordLine::Rejected { line: 3, .. }));
        assert_eq!(
            lines[2],
            RecordLine::Rejected {
                line: 4,
                raw: "not json".to_string()
            }
        );
        assert!(matches!(&lines[3], RecordLine::Parsed(r) if r.refid_key().as_deref() == Some("7")));
    }

    #[test]
    fn test_rejected_lines_are_written_verbatim() {
        let mut lines = read_record_lines(INPUT.as_bytes()).unwrap();
        if let Some(record) = lines[0].record_mut() {
            record.form = Some("V".to_string());
        }
        assert!(lines[2].record_mut().is_none());

        let mut out = Vec::new();
        write_record_lines(&mut out, &lines).unwrap();
        let text = String::from_utf8(out).unwrap();
        let written: Vec<&str> = text.lines().collect();

        assert_eq!(written.len(), 4);
        let first: Value = serde_json::from_str(written[0]).unwrap();
        assert_eq!(first, json!({ "type": "data_record", "from": "+1", "form": "V" }));
        assert_eq!(written[1], "{\"type\":\"data_record\",\"contact\":{\"phone\":[1]}}");
        assert_eq!(written[2], "not json");
    }
}
