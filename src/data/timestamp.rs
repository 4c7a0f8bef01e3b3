use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::model::CellValue;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a timestamp from text. Dates without a time of day map to midnight;
/// offsets are normalised to UTC.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Coerce a cell to a timestamp. Numbers and booleans never coerce.
pub fn coerce(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::Timestamp(ts) => Some(*ts),
        CellValue::String(s) => parse_timestamp(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn parses_dates_and_datetimes() {
        assert_eq!(parse_timestamp("2020-01-02"), Some(at(2020, 1, 2, 0, 0, 0)));
        assert_eq!(
            parse_timestamp("2020-01-02 13:45:10"),
            Some(at(2020, 1, 2, 13, 45, 10))
        );
        assert_eq!(
            parse_timestamp("2020-01-02T13:45:10.250"),
            Some(at(2020, 1, 2, 13, 45, 10) + chrono::Duration::milliseconds(250))
        );
        assert_eq!(
            parse_timestamp("2020-01-02T13:45:10+02:00"),
            Some(at(2020, 1, 2, 11, 45, 10))
        );
        assert_eq!(parse_timestamp("03/15/2021"), Some(at(2021, 3, 15, 0, 0, 0)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("2020-13-45"), None);
        assert_eq!(coerce(&CellValue::Integer(20200101)), None);
        assert_eq!(coerce(&CellValue::Null), None);
    }
}
