//! Timestamp parsing for artifact time coordinates.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parses the timestamp spellings found in provider CSV and NetCDF metadata.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Decodes CF-convention offsets such as `"hours since 1900-01-01 00:00:00.0"`.
#[cfg(feature = "netcdf")]
pub fn decode_cf_times(values: &[f64], units: &str) -> Result<Vec<DateTime<Utc>>, String> {
    use chrono::TimeDelta;

    let mut parts = units.trim().splitn(3, ' ');
    let unit = parts.next().unwrap_or_default().to_lowercase();
    let since = parts.next().unwrap_or_default();
    let base = parts.next().unwrap_or_default();

    if since != "since" {
        return Err(format!("unexpected time units `{units}`"));
    }

    let millis_per_unit = match unit.as_str() {
        "milliseconds" | "millisecond" | "ms" => 1.0,
        "seconds" | "second" | "secs" | "sec" | "s" => 1_000.0,
        "minutes" | "minute" | "mins" | "min" => 60_000.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000.0,
        "days" | "day" | "d" => 86_400_000.0,
        other => return Err(format!("unsupported time unit `{other}`")),
    };

    let base = parse_timestamp(base).ok_or_else(|| format!("unparseable base time in `{units}`"))?;

    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                return Err(format!("non-finite time offset {v}"));
            }
            TimeDelta::try_milliseconds((v * millis_per_unit).round() as i64)
                .and_then(|delta| base.checked_add_signed(delta))
                .ok_or_else(|| format!("time offset {v} is out of range"))
        })
        .collect()
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn should_parse_timestamp_spellings() {
        let expected = Utc.with_ymd_and_hms(2023, 1, 2, 6, 0, 0).unwrap();

        assert_eq!(parse_timestamp("2023-01-02 06:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-02T06:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-01-02T06:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp(" 2023-01-02 06:00 "), Some(expected));
        assert_eq!(
            parse_timestamp("2023-01-02"),
            Some(Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn should_decode_era5_time_units() {
        let times = decode_cf_times(&[0.0, 86_400.0], "seconds since 1970-01-01").unwrap();
        assert_eq!(times[1], Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap());

        let times = decode_cf_times(&[1_078_200.0], "hours since 1900-01-01 00:00:00.0").unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());

        let times = decode_cf_times(&[1.5], "days since 2024-02-28").unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());
    }

    #[cfg(feature = "netcdf")]
    #[test]
    fn should_reject_bad_time_units() {
        assert!(decode_cf_times(&[0.0], "hours after 1900-01-01").is_err());
        assert!(decode_cf_times(&[0.0], "fortnights since 1900-01-01").is_err());
        assert!(decode_cf_times(&[f64::NAN], "hours since 1900-01-01").is_err());
    }
}
