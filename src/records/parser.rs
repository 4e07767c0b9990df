//! Tolerant row parsing
//!
//! Converts raw sheet rows into canonical records, collecting non-fatal
//! warnings instead of aborting. A batch always completes: garbled cells
//! degrade to empty dates or fallback numbers, each with a warning naming
//! the offending row.

use crate::records::{Employee, LeaveRecord, Partition, PeriodBalance};
use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// How many warnings an operator is shown before truncation.
///
/// Presentation cap only - the parser itself always collects every warning.
pub const MAX_DISPLAYED_WARNINGS: usize = 20;

// Shared column layout (both partitions)
const COL_RUT: usize = 0;
const COL_NAME: usize = 1;
const COL_ACT_NUMBER: usize = 2;
const COL_DECREE_DATE: usize = 3;
const COL_START_DATE: usize = 4;
const COL_END_DATE: usize = 5;
const COL_REQUESTED: usize = 6;
const COL_ENTITLEMENT: usize = 7;
// Legal-partition period columns
const COL_P1_YEAR: usize = 8;
const COL_P2_YEAR: usize = 12;

lazy_static! {
    static ref MONTHS: HashMap<&'static str, u32> = {
        let mut m = HashMap::new();
        m.insert("enero", 1);
        m.insert("febrero", 2);
        m.insert("marzo", 3);
        m.insert("abril", 4);
        m.insert("mayo", 5);
        m.insert("junio", 6);
        m.insert("julio", 7);
        m.insert("agosto", 8);
        m.insert("septiembre", 9);
        m.insert("setiembre", 9);
        m.insert("octubre", 10);
        m.insert("noviembre", 11);
        m.insert("diciembre", 12);
        m
    };
}

/// A non-fatal anomaly found while parsing a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// Label of the offending row (e.g. "row 3")
    pub row: String,

    /// What was wrong
    pub message: String,
}

/// Outcome of parsing one partition's rows
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    /// Parsed records, in ascending chronological insertion order
    pub records: Vec<LeaveRecord>,

    /// Every anomaly encountered
    pub warnings: Vec<ParseWarning>,
}

/// Parse a date cell into `YYYY-MM-DD`, or `""` when unrecognizable
///
/// Recognized forms: ISO `YYYY-MM-DD` with an optional `THH:MM:SS` suffix,
/// numeric `DD/MM/YYYY` and `DD-MM-YYYY`, and the long local form
/// `"[<weekday>, ]DD de <month> de YYYY"`.
pub fn parse_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return date.format("%Y-%m-%d").to_string();
    }

    for format in ["%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    parse_long_date(trimmed).unwrap_or_default()
}

/// Parse the long local form, e.g. `"lunes, 06 de enero de 2026"`
fn parse_long_date(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    let rest = match lower.split_once(',') {
        Some((_weekday, rest)) => rest,
        None => lower.as_str(),
    };

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() != 5 || tokens[1] != "de" || tokens[3] != "de" {
        return None;
    }

    let day: u32 = tokens[0].parse().ok()?;
    let month = *MONTHS.get(tokens[2])?;
    let year: i32 = tokens[4].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Parse a numeric cell, accepting `.` or `,` as the decimal separator
///
/// Empty or non-numeric input returns the supplied fallback.
pub fn parse_decimal(raw: &str, fallback: f64) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback;
    }
    trimmed.replace(',', ".").parse::<f64>().unwrap_or(fallback)
}

/// Parse a period-year cell: exactly four digits, else the fallback year
pub fn parse_period_year(raw: &str, fallback: i32) -> i32 {
    let trimmed = raw.trim();
    if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        trimmed.parse().unwrap_or(fallback)
    } else {
        fallback
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

fn row_is_empty(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

/// Whether the rows run newest-first and should be reversed
///
/// Compares the decree date of the first and last rows, falling back to the
/// act number when either date is unparseable. Downstream consumers assume
/// ascending insertion order tracks chronological order.
fn rows_descending(rows: &[&Vec<String>]) -> bool {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return false;
    };

    let first_date = parse_date(cell(first, COL_DECREE_DATE));
    let last_date = parse_date(cell(last, COL_DECREE_DATE));
    if !first_date.is_empty() && !last_date.is_empty() {
        // Normalized dates compare lexicographically
        return first_date > last_date;
    }

    let first_act = parse_decimal(cell(first, COL_ACT_NUMBER), f64::NAN);
    let last_act = parse_decimal(cell(last, COL_ACT_NUMBER), f64::NAN);
    if first_act.is_nan() || last_act.is_nan() {
        return false;
    }
    first_act > last_act
}

fn parse_date_cell(
    row: &[String],
    index: usize,
    label: &str,
    field: &str,
    warnings: &mut Vec<ParseWarning>,
) -> String {
    let raw = cell(row, index);
    let parsed = parse_date(raw);
    if parsed.is_empty() && !raw.trim().is_empty() {
        warnings.push(ParseWarning {
            row: label.to_string(),
            message: format!("unrecognized {} \"{}\"", field, raw.trim()),
        });
    }
    parsed
}

fn parse_period(
    row: &[String],
    base: usize,
    fallback_year: i32,
) -> PeriodBalance {
    PeriodBalance {
        year: parse_period_year(cell(row, base), fallback_year),
        available: parse_decimal(cell(row, base + 1), 0.0),
        requested: parse_decimal(cell(row, base + 2), 0.0),
        remaining: parse_decimal(cell(row, base + 3), 0.0),
    }
}

fn period_cells_blank(row: &[String], base: usize) -> bool {
    (base..base + 4).all(|i| {
        let raw = cell(row, i).trim();
        raw.is_empty() || parse_decimal(raw, 0.0) == 0.0
    })
}

/// Convert one partition's raw rows into canonical records
///
/// Ids are deterministic over (partition, source-row index, fetch
/// timestamp) so repeated parses of the same fetch agree.
pub fn records_from_rows(
    partition: Partition,
    rows: &[Vec<String>],
    fetched_at: DateTime<Utc>,
) -> ParsedBatch {
    use chrono::Datelike;

    let mut batch = ParsedBatch::default();
    let fallback_year = fetched_at.year();
    let stamp = fetched_at.timestamp_millis();

    let mut ordered: Vec<&Vec<String>> = rows.iter().filter(|r| !row_is_empty(r)).collect();
    if rows_descending(&ordered) {
        ordered.reverse();
    }

    for (index, row) in ordered.iter().enumerate() {
        let label = format!("row {}", index + 1);

        let raw_rut = cell(row, COL_RUT).trim().to_string();
        if crate::identity::rut::canonicalize(&raw_rut).is_none() {
            batch.warnings.push(ParseWarning {
                row: label.clone(),
                message: format!("invalid identity \"{}\"", raw_rut),
            });
        }

        let mut record = LeaveRecord::new(partition, raw_rut, cell(row, COL_NAME).trim());
        record.id = format!("{}-{}-{}", partition.tag().to_lowercase(), index, stamp);
        record.act_number = cell(row, COL_ACT_NUMBER).trim().to_string();
        record.decree_date =
            parse_date_cell(row, COL_DECREE_DATE, &label, "decree date", &mut batch.warnings);
        record.start_date =
            parse_date_cell(row, COL_START_DATE, &label, "start date", &mut batch.warnings);
        record.end_date =
            parse_date_cell(row, COL_END_DATE, &label, "end date", &mut batch.warnings);
        record.requested_days = parse_decimal(cell(row, COL_REQUESTED), 0.0);
        record.entitlement_days = parse_decimal(cell(row, COL_ENTITLEMENT), 0.0);

        if partition == Partition::Legal {
            record.first_period = Some(parse_period(row, COL_P1_YEAR, fallback_year));
            if period_cells_blank(row, COL_P2_YEAR) {
                record.second_period = None;
            } else {
                let blanks = (COL_P2_YEAR..COL_P2_YEAR + 4)
                    .filter(|i| cell(row, *i).trim().is_empty())
                    .count();
                if blanks > 0 {
                    batch.warnings.push(ParseWarning {
                        row: label.clone(),
                        message: "partially populated second period".to_string(),
                    });
                }
                record.second_period = Some(parse_period(row, COL_P2_YEAR, fallback_year));
            }
        }

        let created_col = if partition == Partition::Legal { 16 } else { 8 };
        let created_raw = cell(row, created_col).trim();
        record.created_at = if created_raw.is_empty() {
            fetched_at.to_rfc3339()
        } else {
            created_raw.to_string()
        };

        batch.records.push(record);
    }

    batch
}

/// Serialize records back into the remote row shape for a push
pub fn records_to_rows(partition: Partition, records: &[LeaveRecord]) -> Vec<Vec<String>> {
    records
        .iter()
        .filter(|r| r.partition == partition)
        .map(|r| {
            let mut row = vec![
                r.rut.clone(),
                r.display_name.clone(),
                r.act_number.clone(),
                r.decree_date.clone(),
                r.start_date.clone(),
                r.end_date.clone(),
                r.requested_days.to_string(),
                r.entitlement_days.to_string(),
            ];
            if partition == Partition::Legal {
                for period in [r.first_period, r.second_period] {
                    match period {
                        Some(p) => row.extend([
                            p.year.to_string(),
                            p.available.to_string(),
                            p.requested.to_string(),
                            p.remaining.to_string(),
                        ]),
                        None => row.extend(std::iter::repeat(String::new()).take(4)),
                    }
                }
            }
            row.push(r.created_at.clone());
            row
        })
        .collect()
}

/// Convert employee-sheet rows into employees
pub fn employees_from_rows(rows: &[Vec<String>]) -> (Vec<Employee>, Vec<ParseWarning>) {
    let mut employees = Vec::new();
    let mut warnings = Vec::new();

    for (index, row) in rows.iter().filter(|r| !row_is_empty(r)).enumerate() {
        let raw_rut = cell(row, 0).trim().to_string();
        if crate::identity::rut::canonicalize(&raw_rut).is_none() {
            warnings.push(ParseWarning {
                row: format!("row {}", index + 1),
                message: format!("invalid identity \"{}\"", raw_rut),
            });
        }

        let department = cell(row, 2).trim();
        employees.push(Employee {
            rut: raw_rut,
            display_name: cell(row, 1).trim().to_string(),
            department: if department.is_empty() {
                None
            } else {
                Some(department.to_string())
            },
        });
    }

    (employees, warnings)
}

/// Serialize employees back into the remote row shape
pub fn employees_to_rows(employees: &[Employee]) -> Vec<Vec<String>> {
    employees
        .iter()
        .map(|e| {
            vec![
                e.rut.clone(),
                e.display_name.clone(),
                e.department.clone().unwrap_or_default(),
            ]
        })
        .collect()
}
