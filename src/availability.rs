//! Turns a doctor's schedule windows and existing bookings into bookable
//! 30-minute slots.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AppointmentRow, ScheduleRow};
use crate::status::AppointmentStatus;
use crate::timefmt::{hhmm, truncate_to_minute};

pub const SLOT_MINUTES: i64 = 30;
pub const DEFAULT_RANGE_DAYS: u32 = 7;
pub const MAX_RANGE_DAYS: u32 = 31;

/// One availability interval for a doctor on a specific date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub doctor_id: Uuid,
    pub day: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub is_available: bool,
}

/// The part of an appointment that matters for slot occupancy. This is also
/// what the public booked-slots endpoint exposes, so no patient data leaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookedSlot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

impl From<&ScheduleRow> for ScheduleWindow {
    fn from(row: &ScheduleRow) -> Self {
        Self {
            doctor_id: row.doctor_id,
            day: row.day,
            start_time: row.start_time,
            end_time: row.end_time,
            is_available: row.is_available,
        }
    }
}

impl From<&AppointmentRow> for BookedSlot {
    fn from(row: &AppointmentRow) -> Self {
        Self {
            doctor_id: row.doctor_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status,
        }
    }
}

/// Slot start times from `start` (seconds dropped) in 30-minute steps while
/// strictly before `end`. Never wraps past midnight.
pub fn slot_starts(start: NaiveTime, end: NaiveTime) -> Vec<NaiveTime> {
    let step = Duration::minutes(SLOT_MINUTES);
    let mut out = Vec::new();
    let mut t = truncate_to_minute(start);
    while t < end {
        out.push(t);
        let (next, wrapped) = t.overflowing_add_signed(step);
        if wrapped != 0 {
            break;
        }
        t = next;
    }
    out
}

/// Per-day slot lists for `num_days` dates starting at `range_start`.
///
/// Only the first available window matching a date is used; callers pass
/// windows ordered by day then start time. A slot is unavailable when a
/// non-cancelled booking for the same doctor starts at the same minute.
pub fn compute_day_schedules(
    doctor_id: Uuid,
    windows: &[ScheduleWindow],
    booked: &[BookedSlot],
    range_start: NaiveDate,
    num_days: u32,
) -> Vec<DaySchedule> {
    let taken: HashSet<(NaiveDate, NaiveTime)> = booked
        .iter()
        .filter(|b| b.doctor_id == doctor_id && b.status.occupies_slot())
        .map(|b| (b.date, truncate_to_minute(b.start_time)))
        .collect();

    range_start
        .iter_days()
        .take(num_days as usize)
        .map(|date| {
            let window = windows
                .iter()
                .find(|w| w.doctor_id == doctor_id && w.day == date && w.is_available);

            let slots = match window {
                None => Vec::new(),
                Some(w) => slot_starts(w.start_time, w.end_time)
                    .into_iter()
                    .map(|time| TimeSlot {
                        time,
                        available: !taken.contains(&(date, time)),
                    })
                    .collect(),
            };

            DaySchedule { date, slots }
        })
        .collect()
}
