//! Record data structures and row parsing
//!
//! Canonical typed records for both leave partitions plus the tolerant
//! parser that converts raw sheet rows into records without ever aborting
//! a batch.

pub mod model;
pub mod parser;

pub use model::{Employee, LeaveRecord, Partition, PeriodBalance};
pub use parser::{
    employees_from_rows, employees_to_rows, parse_date, parse_decimal, parse_period_year,
    records_from_rows, records_to_rows, ParseWarning, ParsedBatch, MAX_DISPLAYED_WARNINGS,
};
