use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days from `now` until the start of `date`, rounding partial days up toward the future.
///
/// `date` is anchored at 00:00 UTC, which is how a bare `YYYY-MM-DD` from the store is read by
/// the browser client. A date earlier today therefore yields 0, yesterday yields -1.
pub fn days_until(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let target = date.and_time(NaiveTime::MIN).and_utc();
    let diff_ms = (target - now).num_milliseconds();
    ceil_div(diff_ms, MILLIS_PER_DAY)
}

fn ceil_div(n: i64, d: i64) -> i64 {
    -((-n).div_euclid(d))
}

/// Calendar date at a fixed UTC offset.
pub fn local_today(now_utc: DateTime<Utc>, utc_offset_minutes: i32) -> anyhow::Result<NaiveDate> {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("invalid UTC offset: {utc_offset_minutes} minutes"))?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

/// Explicit `YYYY-MM-DD` override, or today's date at the configured offset.
pub fn resolve_today(
    as_of_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    utc_offset_minutes: i32,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid date (expected YYYY-MM-DD): {s}"));
    }
    local_today(now_utc, utc_offset_minutes)
}

/// "October 16, 2026"
pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// "Oct 16, 2026"
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}
