//! Date and time representation.
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;

/// Days from `0001-01-01` to `1970-01-01`.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Timezone resolution for `DateTime` values of one column.
///
/// A timezone given by the caller for the column wins, then the one in the
/// type name, then `default`, which already carry query level override,
/// server timezone, or UTC, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TzPolicy {
    column: Option<Tz>,
    default: Tz,
}

impl TzPolicy {
    pub const fn new(column: Option<Tz>, default: Tz) -> Self {
        Self { column, default }
    }

    /// Resolve the timezone for a value of type with `type_tz`.
    pub fn resolve(&self, type_tz: Option<Tz>) -> Tz {
        self.column.or(type_tz).unwrap_or(self.default)
    }
}

impl Default for TzPolicy {
    fn default() -> Self {
        Self::new(None, Tz::UTC)
    }
}

pub(crate) fn date_from_days(days: i64) -> NaiveDate {
    i32::try_from(days + EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .unwrap_or_default()
}

pub(crate) fn days_from_date(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) - EPOCH_DAYS_FROM_CE
}

/// Convert ticks of `10^-precision` seconds.
pub(crate) fn datetime_from_ticks(ticks: i64, precision: u8, tz: Tz) -> DateTime<Tz> {
    let scale = 10i64.pow(precision.into());
    let secs = ticks.div_euclid(scale);
    let nanos = ticks.rem_euclid(scale) * (NANOS_PER_SEC / scale);
    DateTime::from_timestamp(secs, nanos as u32)
        .unwrap_or_default()
        .with_timezone(&tz)
}

/// Returns `None` when the instant does not fit `i64` ticks, sub tick digits are truncated.
pub(crate) fn ticks_from_datetime<T: chrono::TimeZone>(dt: &DateTime<T>, precision: u8) -> Option<i64> {
    let scale = 10i64.pow(precision.into());
    let sub = i64::from(dt.timestamp_subsec_nanos()) / (NANOS_PER_SEC / scale);
    dt.timestamp().checked_mul(scale)?.checked_add(sub)
}

pub(crate) fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn days() {
        assert_eq!(date_from_days(0), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(date_from_days(-1), NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
        let date = NaiveDate::from_ymd_opt(2149, 6, 6).unwrap();
        assert_eq!(days_from_date(date), u16::MAX as i64);
        assert_eq!(date_from_days(days_from_date(date)), date);
    }

    #[test]
    fn ticks() {
        let dt = datetime_from_ticks(1_700_000_000_123, 3, Tz::UTC);
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.nanosecond(), 123_000_000);
        assert_eq!(ticks_from_datetime(&dt, 3), Some(1_700_000_000_123));
        assert_eq!(ticks_from_datetime(&dt, 0), Some(1_700_000_000));

        let before_epoch = datetime_from_ticks(-1, 1, Tz::UTC);
        assert_eq!(before_epoch.timestamp(), -1);
        assert_eq!(before_epoch.nanosecond(), 900_000_000);
        assert_eq!(ticks_from_datetime(&before_epoch, 1), Some(-1));
    }

    #[test]
    fn timezone_precedence() {
        let tokyo = chrono_tz::Asia::Tokyo;
        let berlin = chrono_tz::Europe::Berlin;
        let server = chrono_tz::America::New_York;

        // column override beats everything
        assert_eq!(TzPolicy::new(Some(tokyo), server).resolve(Some(berlin)), tokyo);
        // type timezone beats query and server default
        assert_eq!(TzPolicy::new(None, server).resolve(Some(berlin)), berlin);
        // fallback
        assert_eq!(TzPolicy::new(None, server).resolve(None), server);
        assert_eq!(TzPolicy::default().resolve(None), Tz::UTC);
    }
}
