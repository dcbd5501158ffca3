//! Parsing values found in CSV cells.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::common::*;

/// Parse a value found in a CSV cell. This is analogous to Rust's built-in
/// [`FromStr`](std::str::FromStr) trait, but it follows the conventions of
/// the datasets we load.
pub(crate) trait FromCsvCell: Sized {
    /// Given the contents of a CSV cell, parse it as a value and return it.
    ///
    /// This function is not responsible for translating `""` to an SQL `NULL`
    /// value. That should be handled before calling this, if desired.
    fn from_csv_cell(cell: &str) -> Result<Self>;
}

impl FromCsvCell for bool {
    fn from_csv_cell(cell: &str) -> Result<Self> {
        if cell.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if cell.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(format_err!("cannot parse boolean {:?}", cell))
        }
    }
}

#[test]
fn parse_bool() {
    let examples = &[
        ("true", true),
        ("True", true),
        ("TRUE", true),
        ("false", false),
        ("False", false),
        ("FALSE", false),
    ];
    for (s, expected) in examples {
        let parsed = bool::from_csv_cell(s).unwrap();
        assert_eq!(parsed, *expected);
    }
    assert!(bool::from_csv_cell("1").is_err());
    assert!(bool::from_csv_cell("Y").is_err());
}

impl FromCsvCell for f64 {
    fn from_csv_cell(cell: &str) -> Result<Self> {
        cell.parse::<f64>()
            .with_context(|| format!("cannot parse {:?} as f64", cell))
    }
}

impl FromCsvCell for i64 {
    fn from_csv_cell(cell: &str) -> Result<Self> {
        cell.parse::<i64>()
            .with_context(|| format!("cannot parse {:?} as i64", cell))
    }
}

/// Timestamp formats without a time zone, most common first.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Date formats, which we read as midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

impl FromCsvCell for NaiveDateTime {
    fn from_csv_cell(cell: &str) -> Result<Self> {
        let cell = cell.trim();
        for format in NAIVE_TIMESTAMP_FORMATS {
            if let Ok(timestamp) = NaiveDateTime::parse_from_str(cell, format) {
                return Ok(timestamp);
            }
        }
        // Timestamps with an offset are stored as UTC.
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(cell) {
            return Ok(timestamp.naive_utc());
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
                if let Some(timestamp) = date.and_hms_opt(0, 0, 0) {
                    return Ok(timestamp);
                }
            }
        }
        Err(format_err!("cannot parse {:?} as timestamp", cell))
    }
}

#[test]
fn parse_naive_date_time() {
    let date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let examples = &[
        ("2021-01-01 00:30:10", date.and_hms_opt(0, 30, 10).unwrap()),
        ("2021-01-01T00:30:10", date.and_hms_opt(0, 30, 10).unwrap()),
        (" 2021-01-01 00:30:10 ", date.and_hms_opt(0, 30, 10).unwrap()),
        (
            "2021-01-01 00:30:10.25",
            date.and_hms_milli_opt(0, 30, 10, 250).unwrap(),
        ),
        ("2021-01-01 00:30", date.and_hms_opt(0, 30, 0).unwrap()),
        ("2021-01-01", date.and_hms_opt(0, 0, 0).unwrap()),
        ("2021-01-01T02:30:10+02:00", date.and_hms_opt(0, 30, 10).unwrap()),
        ("2021-01-01T00:30:10Z", date.and_hms_opt(0, 30, 10).unwrap()),
        ("01/01/2021 00:30:10", date.and_hms_opt(0, 30, 10).unwrap()),
        ("01/01/2021 12:30:10 AM", date.and_hms_opt(0, 30, 10).unwrap()),
        ("1/1/2021 13:05", date.and_hms_opt(13, 5, 0).unwrap()),
        ("01/01/2021", date.and_hms_opt(0, 0, 0).unwrap()),
    ];
    for &(input, expected) in examples {
        assert_eq!(NaiveDateTime::from_csv_cell(input).unwrap(), expected);
    }
}

#[test]
fn parse_naive_date_time_rejects_garbage() {
    let examples = &[
        "",
        "not a time",
        "2021-13-01 00:00:00",
        "12:30:00",
        "1609459810",
        "13/01/2021 00:00:00",
    ];
    for input in examples {
        assert!(NaiveDateTime::from_csv_cell(input).is_err(), "{:?}", input);
    }
}
