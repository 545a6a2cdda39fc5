use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcDateTime, UtcOffset};

use crate::{
    Value,
    row::{DecodeError, FromValue, mismatch},
};

/// Julian day of `0000-12-31`, the day before chrono's day `1` of the common era.
const JULIAN_CE_OFFSET: i32 = 1_721_425;

fn out_of_range(expected: &'static str, value: impl ToString) -> DecodeError {
    DecodeError::OutOfRange { expected, value: value.to_string() }
}

fn utc(dt: &DateTime<Tz>) -> Result<UtcDateTime, DecodeError> {
    let secs = UtcDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|_| out_of_range("UtcDateTime", dt))?;
    Ok(secs + Duration::nanoseconds(dt.timestamp_subsec_nanos().into()))
}

fn chrono_utc(dt: UtcDateTime) -> DateTime<Tz> {
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
        .unwrap_or_default()
        .with_timezone(&Tz::UTC)
}

impl FromValue for UtcDateTime {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(dt) => utc(&dt),
            value => mismatch("UtcDateTime", &value),
        }
    }
}

impl FromValue for OffsetDateTime {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(dt) => Ok(utc(&dt)?.to_offset(UtcOffset::UTC)),
            value => mismatch("OffsetDateTime", &value),
        }
    }
}

/// Wall clock time in the value timezone.
impl FromValue for PrimitiveDateTime {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(dt) => {
                let local = dt.naive_local().and_utc().with_timezone(&Tz::UTC);
                let local = utc(&local)?;
                Ok(PrimitiveDateTime::new(local.date(), local.time()))
            }
            value => mismatch("PrimitiveDateTime", &value),
        }
    }
}

impl FromValue for Date {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Date(date) => {
                use chrono::Datelike;
                date.num_days_from_ce()
                    .checked_add(JULIAN_CE_OFFSET)
                    .and_then(|jd| Date::from_julian_day(jd).ok())
                    .ok_or_else(|| out_of_range("Date", date))
            }
            value => mismatch("Date", &value),
        }
    }
}

impl From<UtcDateTime> for Value {
    fn from(value: UtcDateTime) -> Self {
        Value::DateTime(chrono_utc(value))
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::DateTime(chrono_utc(value.to_utc()))
    }
}

/// Assumed to be UTC.
impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::DateTime(chrono_utc(value.assume_utc().to_utc()))
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        let date = NaiveDate::from_num_days_from_ce_opt(value.to_julian_day() - JULIAN_CE_OFFSET);
        date.map_or(Value::Null, Value::Date)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::{Month, Time};

    fn date(y: i32, m: Month, d: u8) -> Date {
        Date::from_calendar_date(y, m, d).unwrap()
    }

    #[test]
    fn datetime_round_trip() {
        let time = Time::from_hms_nano(12, 30, 45, 123_456_789).unwrap();
        let t = UtcDateTime::new(date(2024, Month::March, 1), time);
        let value = Value::from(t);
        let Value::DateTime(dt) = &value else { panic!("expected DateTime") };
        assert_eq!(dt.timestamp(), t.unix_timestamp());
        assert_eq!(UtcDateTime::from_value(value).unwrap(), t);
    }

    #[test]
    fn wall_clock() {
        let dt = DateTime::from_timestamp(0, 0).unwrap().with_timezone(&chrono_tz::Asia::Tokyo);
        let local = PrimitiveDateTime::from_value(Value::DateTime(dt)).unwrap();
        let nine = Time::from_hms(9, 0, 0).unwrap();
        assert_eq!(local, PrimitiveDateTime::new(date(1970, Month::January, 1), nine));
    }

    #[test]
    fn dates() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Date::from_value(Value::Date(d)).unwrap(), date(2024, Month::February, 29));

        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(Value::from(date(1970, Month::January, 1)), Value::Date(epoch));
    }
}
