//! Wall-clock helpers shared by sample preparation and forecast alignment.
//!
//! Archive valid times are whole UTC hours, so hour alignment here is done on
//! the UTC instant rather than on the local wall clock.

use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};
use time_tz::{timezones, OffsetDateTimeExt, Tz};

const HOUR_SECS: i64 = 3600;

pub fn timezone(name: &str) -> Option<&'static Tz> {
    timezones::get_by_name(name)
}

/// Attach the UTC offset that `tz` observes at the given wall time.
pub fn localize(local: PrimitiveDateTime, tz: &Tz) -> OffsetDateTime {
    // the offset at the naive instant read as UTC can differ from the one in
    // force at the local instant, a second lookup settles it
    let first = local.assume_utc().to_timezone(tz).offset();
    let settled = local.assume_offset(first).to_timezone(tz).offset();
    local.assume_offset(settled)
}

pub fn local_midnight(date: Date, tz: &Tz) -> OffsetDateTime {
    localize(date.midnight(), tz)
}

pub fn is_on_hour(dt: OffsetDateTime) -> bool {
    dt.unix_timestamp().rem_euclid(HOUR_SECS) == 0 && dt.nanosecond() == 0
}

pub fn floor_hour(dt: OffsetDateTime) -> OffsetDateTime {
    dt - Duration::seconds(dt.unix_timestamp().rem_euclid(HOUR_SECS))
        - Duration::nanoseconds(dt.nanosecond() as i64)
}

pub fn ceil_hour(dt: OffsetDateTime) -> OffsetDateTime {
    if is_on_hour(dt) {
        dt
    } else {
        floor_hour(dt) + Duration::HOUR
    }
}

/// Nearest whole hour, half past rounds up
pub fn round_hour(dt: OffsetDateTime) -> OffsetDateTime {
    let floored = floor_hour(dt);
    if dt - floored >= Duration::minutes(30) {
        floored + Duration::HOUR
    } else {
        floored
    }
}
