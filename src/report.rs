//! Count reports: CSV export, console summary and JSON summary.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aggregate::{ClassCounts, ReportRow};
use crate::session::{SessionOutcome, StreamEnd};

/// Default report file, written to the working directory.
pub const REPORT_FILE_NAME: &str = "traffic_report.csv";

pub const REPORT_HEADER: [&str; 2] = ["Vehicle Type", "Count"];

/// Render rows as CSV with a header line and a trailing newline.
pub fn to_csv(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, REPORT_HEADER.iter().copied());
    for row in rows {
        let count = row.count.to_string();
        push_record(&mut out, [row.class_label.as_str(), count.as_str()]);
    }
    out
}

/// Write the CSV report to `path`, replacing any existing file.
pub fn write_csv(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(to_csv(rows).as_bytes())
        .and_then(|_| writer.flush())
        .with_context(|| format!("failed to write report {}", path.display()))?;
    log::info!("wrote {} report rows to {}", rows.len(), path.display());
    Ok(())
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push('\n');
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// Console summary: the total first, then one line per class.
pub fn summary_text(counts: &ClassCounts) -> String {
    let mut out = format!("Total: {}\n", counts.total());
    for (label, count) in counts.iter() {
        out.push_str(&format!("{}: {}\n", label, count));
    }
    out
}

/// Machine-readable run summary.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<StreamEnd>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub frames_read: u64,
    pub frames_processed: u64,
    pub total: usize,
    pub rows: Vec<ReportRow>,
}

impl RunSummary {
    pub fn from_session(mode: &str, source: &str, outcome: &SessionOutcome) -> Self {
        let detail = match &outcome.end {
            StreamEnd::ReadFailed(msg) | StreamEnd::DetectorFailed(msg) => Some(msg.clone()),
            _ => None,
        };
        Self {
            mode: mode.to_string(),
            source: source.to_string(),
            end: Some(outcome.end.clone()),
            detail,
            frames_read: outcome.frames_read,
            frames_processed: outcome.frames_processed,
            total: outcome.counts.total(),
            rows: outcome.report_rows(),
        }
    }

    pub fn from_still(source: &str, counts: &ClassCounts) -> Self {
        Self {
            mode: "image".to_string(),
            source: source.to_string(),
            end: None,
            detail: None,
            frames_read: 1,
            frames_processed: 1,
            total: counts.total(),
            rows: counts.clone().into_rows(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize run summary")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_has_header_rows_and_trailing_newline() {
        let rows = vec![ReportRow::new("Car", 2), ReportRow::new("Bike", 1)];
        assert_eq!(to_csv(&rows), "Vehicle Type,Count\nCar,2\nBike,1\n");
        assert_eq!(to_csv(&[]), "Vehicle Type,Count\n");
    }

    #[test]
    fn csv_quotes_awkward_labels() {
        let rows = vec![
            ReportRow::new("Truck, heavy", 3),
            ReportRow::new("6\" scooter", 1),
        ];
        assert_eq!(
            to_csv(&rows),
            "Vehicle Type,Count\n\"Truck, heavy\",3\n\"6\"\" scooter\",1\n"
        );
    }

    #[test]
    fn write_csv_replaces_existing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(REPORT_FILE_NAME);
        std::fs::write(&path, "stale")?;
        write_csv(&path, &[ReportRow::new("Bus", 4)])?;
        assert_eq!(std::fs::read_to_string(&path)?, "Vehicle Type,Count\nBus,4\n");
        Ok(())
    }

    #[test]
    fn write_csv_reports_the_path_on_failure() {
        let err = write_csv(Path::new("/nonexistent/dir/report.csv"), &[]).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/dir/report.csv"));
    }

    #[test]
    fn summary_lists_total_then_classes() {
        let counts: ClassCounts = [("Car", 2), ("Bike", 1)].into_iter().collect();
        assert_eq!(summary_text(&counts), "Total: 3\nCar: 2\nBike: 1\n");
        assert_eq!(summary_text(&ClassCounts::default()), "Total: 0\n");
    }

    #[test]
    fn json_summary_carries_end_reason() -> Result<()> {
        let outcome = SessionOutcome {
            end: StreamEnd::ReadFailed("device unplugged".into()),
            frames_read: 9,
            frames_processed: 3,
            counts: [("Car", 2)].into_iter().collect(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&RunSummary::from_session("video", "road.mp4", &outcome).to_json()?)?;
        assert_eq!(json["end"], "read_failed");
        assert_eq!(json["detail"], "device unplugged");
        assert_eq!(json["total"], 2);
        assert_eq!(json["rows"][0]["class_label"], "Car");
        Ok(())
    }
}
