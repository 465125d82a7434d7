use chrono::{Duration, NaiveDate, Utc};

const BR_DATE_FORMAT: &str = "%d/%m/%Y";

// Largest serial a spreadsheet can hold (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Spreadsheet serial day number to a calendar date, counting days from
/// 1899-12-30. The fractional (time of day) part is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

pub fn format_br(d: NaiveDate) -> String {
    d.format(BR_DATE_FORMAT).to_string()
}

pub fn parse_br(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), BR_DATE_FORMAT).ok()
}

/// Serial number, or text holding one, to `DD/MM/YYYY`.
pub fn serial_to_br(serial: f64) -> Option<String> {
    serial_to_date(serial).map(format_br)
}

/// Shift a `DD/MM/YYYY` date by whole days. Anything else is left alone.
pub fn shift_br(raw: &str, days: i64) -> Option<String> {
    let d = parse_br(raw)?;
    d.checked_add_signed(Duration::days(days)).map(format_br)
}

pub fn today_br() -> String {
    format_br(Utc::now().date_naive())
}

pub fn now_rfc3339() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_44927_is_first_of_january_2023() {
        assert_eq!(serial_to_br(44927.0).as_deref(), Some("01/01/2023"));
    }

    #[test]
    fn serial_time_of_day_is_dropped() {
        assert_eq!(serial_to_br(44927.75).as_deref(), Some("01/01/2023"));
        assert_eq!(serial_to_br(1.0).as_deref(), Some("31/12/1899"));
    }

    #[test]
    fn serial_out_of_range_is_rejected() {
        assert_eq!(serial_to_br(0.0), None);
        assert_eq!(serial_to_br(-3.0), None);
        assert_eq!(serial_to_br(f64::NAN), None);
        assert_eq!(serial_to_br(3_000_000.0), None);
    }

    #[test]
    fn shift_crosses_month_and_year() {
        assert_eq!(shift_br("31/12/2010", 1).as_deref(), Some("01/01/2011"));
        assert_eq!(shift_br("28/02/2012", 1).as_deref(), Some("29/02/2012"));
        assert_eq!(shift_br("2012-02-28", 1), None);
    }
}
