//! Packed FAT timestamps
//!
//! FAT stores a local date and time in two 16-bit words with two-second
//! resolution. These helpers convert to and from unix seconds (UTC).

/// Unix time of 1980-01-01 00:00:00, the earliest FAT timestamp
pub const FAT_EPOCH: i64 = 315_532_800;

const SECS_PER_DAY: i64 = 86_400;

/// Convert packed FAT date/time words to unix seconds
///
/// Out-of-range fields (month 0, day 0, ...) are normalized the way
/// `mktime` normalizes them, so a zeroed record still yields a time.
pub fn fat_time_to_unix(date: u16, time: u16) -> i64 {
    let second = i64::from((time << 1) & 0x3e);
    let minute = i64::from((time >> 5) & 0x3f);
    let hour = i64::from((time >> 11) & 0x1f);
    let day = i64::from(date & 0x1f);
    let month0 = i64::from((date >> 5) & 0x0f) - 1;
    let year = i64::from((date >> 9) & 0x7f) + 1980;

    let year = year + month0.div_euclid(12);
    let month = month0.rem_euclid(12) + 1;
    let days = days_from_civil(year, month, 1) + day - 1;

    days * SECS_PER_DAY + hour * 3600 + minute * 60 + second
}

/// Convert unix seconds to packed FAT `(date, time)` words
///
/// Times outside 1980..=2107 clamp to the representable range.
pub fn unix_time_to_fat(epoch: i64) -> (u16, u16) {
    let days = epoch.div_euclid(SECS_PER_DAY);
    let secs = epoch.rem_euclid(SECS_PER_DAY);
    let (year, month, day) = civil_from_days(days);

    if year < 1980 {
        return (pack_date(0, 1, 1), 0);
    }
    if year > 2107 {
        return (pack_date(127, 12, 31), pack_time(23, 59, 58));
    }

    let hour = secs / 3600;
    let minute = (secs % 3600) / 60;
    let second = secs % 60;
    (
        pack_date(year - 1980, month, day),
        pack_time(hour, minute, second),
    )
}

fn pack_date(year_offset: i64, month: i64, day: i64) -> u16 {
    ((year_offset as u16) << 9) | ((month as u16) << 5) | (day as u16)
}

fn pack_time(hour: i64, minute: i64, second: i64) -> u16 {
    ((hour as u16) << 11) | ((minute as u16) << 5) | ((second as u16) >> 1)
}

/// Days since 1970-01-01 of a proleptic Gregorian date (month 1..=12)
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = if year >= 0 { year } else { year - 399 } / 400;
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`]
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
