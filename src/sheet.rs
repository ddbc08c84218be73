use crate::error::{IngestError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use std::path::Path;
use tracing::debug;

/// Excel's day-zero for serial date values (the 1900 date system).
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap()
}

/// A spreadsheet cell with its numeric/date ambiguity resolved exactly once,
/// when the row is read. `Date` carries the raw Excel serial value so the
/// accessors can decide between calendar-date and time-of-day rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(f64),
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Data::DateTime(dt) => CellValue::Date(dt.as_f64()),
            Data::DateTimeIso(s) => CellValue::Text(s.clone()),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(e) => CellValue::Text(e.to_string()),
        }
    }
}

impl CellValue {
    /// Generic rendering preserving the literal display text, trimmed.
    /// Missing cells always degrade to the empty string.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(serial) => {
                if *serial < 1.0 {
                    format_time_of_day(*serial)
                } else if serial.fract() == 0.0 {
                    format_serial_date(*serial)
                } else {
                    format!("{} {}", format_serial_date(*serial), format_time_of_day(serial.fract()))
                }
            }
        }
    }

    /// Calendar-date rendering (`dd.mm.yyyy`) for date-formatted cells.
    /// A serial below 1.0 carries no calendar day and renders as time-of-day;
    /// cells without a recognizable date format fall through to `display`.
    pub fn date_text(&self) -> String {
        match self {
            CellValue::Date(serial) if *serial >= 1.0 => format_serial_date(*serial),
            CellValue::Date(serial) => format_time_of_day(*serial),
            other => other.display(),
        }
    }

    /// Time-of-day rendering (`HH:mm:ss`). A date-formatted cell yields its
    /// time component; a plain numeric cell is treated as a day fraction and
    /// multiplied out to seconds.
    pub fn time_text(&self) -> String {
        match self {
            CellValue::Date(serial) => format_time_of_day(serial.fract()),
            CellValue::Number(n) => format_duration_seconds((n * 86_400.0).round() as i64),
            other => other.display(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn format_serial_date(serial: f64) -> String {
    let date = excel_epoch() + Duration::days(serial.trunc() as i64);
    date.format("%d.%m.%Y").to_string()
}

/// Renders a day fraction as wall-clock time.
fn format_time_of_day(fraction: f64) -> String {
    format_duration_seconds((fraction.abs() * 86_400.0).round() as i64)
}

/// Renders a second count as `HH:mm:ss` without wrapping past 24 hours, so a
/// plain numeric above 1.0 stays visibly out of range rather than aliasing.
fn format_duration_seconds(total_seconds: i64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

const EMPTY_CELL: CellValue = CellValue::Empty;

/// Returns the cell at `index`, degrading to `Empty` when the row is short.
pub fn cell(row: &[CellValue], index: usize) -> &CellValue {
    row.get(index).unwrap_or(&EMPTY_CELL)
}

pub fn text_at(row: &[CellValue], index: usize) -> String {
    cell(row, index).display()
}

pub fn date_at(row: &[CellValue], index: usize) -> String {
    cell(row, index).date_text()
}

pub fn time_at(row: &[CellValue], index: usize) -> String {
    cell(row, index).time_text()
}

/// Validates and reads the data rows of an uploaded spreadsheet: extension
/// must be `.xlsx` or `.xls`, the file must be non-empty, only the first
/// worksheet is read, and row 0 (the column header) is skipped.
///
/// The workbook handle is scoped to this call and closed on every exit path.
pub fn read_rows(path: &Path, file_kind: &str) -> Result<Vec<Vec<CellValue>>> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !name.ends_with(".xlsx") && !name.ends_with(".xls") {
        return Err(IngestError::Validation(format!(
            "{file_kind} file must be an Excel file (.xlsx or .xls)"
        )));
    }

    let metadata = std::fs::metadata(path)?;
    if metadata.len() == 0 {
        return Err(IngestError::Validation(format!(
            "{file_kind} file is empty"
        )));
    }

    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            IngestError::Validation(format!("{file_kind} file contains no worksheets"))
        })??;

    let rows: Vec<Vec<CellValue>> = range
        .rows()
        .skip(1)
        .map(|row| row.iter().map(CellValue::from).collect())
        .collect();

    debug!(file_kind, rows = rows.len(), "Read spreadsheet data rows");
    Ok(rows)
}
