use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Timelike, Utc};
use rusqlite::Connection;

use crate::config::BusinessHours;
use crate::db::repository;
use crate::error::ServiceError;

const SLOT_FORMAT: &str = "%H:%M";

/// Parse the `date` query value (`YYYY-MM-DD`).
pub fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ServiceError> {
    let raw = raw.map(str::trim).filter(|d| !d.is_empty()).ok_or_else(|| {
        ServiceError::invalid("`date` query parameter is required in YYYY-MM-DD format")
    })?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ServiceError::invalid(format!("Invalid date {raw:?}, expected YYYY-MM-DD")))
}

/// UTC bounds `[start, end)` of a calendar day.
pub fn day_bounds(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let next = date
        .checked_add_days(Days::new(1))
        .ok_or_else(|| ServiceError::invalid(format!("Date out of range: {date}")))?;
    Ok((
        date.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    ))
}

/// Free slots of one day as ascending `HH:MM` strings.
///
/// A candidate is taken when any booking falls in the same minute,
/// whichever doctor holds it.
pub fn available_slots(booked: &[DateTime<Utc>], hours: &BusinessHours) -> Vec<String> {
    let taken: HashSet<(u32, u32)> = booked.iter().map(|t| (t.hour(), t.minute())).collect();

    hours
        .candidates()
        .into_iter()
        .filter(|slot| !taken.contains(&(slot.hour(), slot.minute())))
        .map(|slot| slot.format(SLOT_FORMAT).to_string())
        .collect()
}

/// Load the day's bookings, cancelled ones included, and compute its free slots.
pub fn slots_for_date(
    conn: &Connection,
    date: NaiveDate,
    hours: &BusinessHours,
) -> Result<Vec<String>, ServiceError> {
    let (start, end) = day_bounds(date)?;
    let booked = repository::booked_instants_between(conn, &start, &end)?;
    let slots = available_slots(&booked, hours);
    tracing::debug!(%date, booked = booked.len(), free = slots.len(), "computed slots");
    Ok(slots)
}
