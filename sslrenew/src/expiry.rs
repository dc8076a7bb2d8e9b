use anyhow::{bail, Context, Result};
use time::{format_description::well_known::Rfc3339, Date, Month, OffsetDateTime, Time};

/// Certificates expiring within this many days may be renewed.
pub const DEFAULT_RENEW_WINDOW_DAYS: i64 = 90;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Parse an expiration date as returned by `namecheap.ssl.getinfo`.
///
/// Accepts `MM/DD/YYYY` (what the API returns), `YYYY-MM-DD` and RFC 3339.
/// Dates without a time component are taken as midnight UTC.
pub fn parse_expiration(text: &str) -> Result<OffsetDateTime> {
    let text = text.trim();
    if let Ok(datetime) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(datetime);
    }
    let date = if text.contains('/') {
        let [month, day, year] = split_date(text, '/')?;
        calendar_date(year, month, day)?
    } else if text.contains('-') {
        let [year, month, day] = split_date(text, '-')?;
        calendar_date(year, month, day)?
    } else {
        bail!("unrecognized date format: {text:?}");
    };
    Ok(date.with_time(Time::MIDNIGHT).assume_utc())
}

fn split_date(text: &str, sep: char) -> Result<[i32; 3]> {
    let parts = text
        .split(sep)
        .map(|part| {
            part.trim()
                .parse::<i32>()
                .with_context(|| format!("invalid date component {part:?} in {text:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    parts
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected three date components in {text:?}"))
}

fn calendar_date(year: i32, month: i32, day: i32) -> Result<Date> {
    let month = u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .with_context(|| format!("invalid month {month}"))?;
    let day = u8::try_from(day).with_context(|| format!("invalid day {day}"))?;
    Date::from_calendar_date(year, month, day).context("invalid calendar date")
}

/// Whole days from `now` until `expires`, rounded up.
pub fn days_until(expires: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let secs = (expires - now).whole_seconds();
    let days = secs.div_euclid(SECS_PER_DAY);
    if secs.rem_euclid(SECS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

/// The renewal window is inclusive: exactly `window_days` left is eligible.
pub fn is_eligible(days_until_expiration: i64, window_days: i64) -> bool {
    days_until_expiration <= window_days
}
