// libs/scheduling-cell/src/services/calendar.rs
//
// Read-side projection of the clinic calendar. Maps stored appointments into
// the day/week/month model the calendar widget renders; never persists
// anything. Drag and resize produce reschedule requests that the caller
// routes through SchedulingService.
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus};
use crate::services::conflict::overlaps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarView {
    Day,
    Week,
    Month,
}

/// Current view granularity and anchored date. Purely presentational state;
/// changing it never touches the underlying appointments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarProjection {
    view: CalendarView,
    anchor: NaiveDate,
}

impl CalendarProjection {
    pub fn new(view: CalendarView, anchor: NaiveDate) -> Self {
        Self { view, anchor }
    }

    pub fn view(&self) -> CalendarView {
        self.view
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn set_view(&mut self, view: CalendarView) {
        self.view = view;
    }

    pub fn forward(&mut self) {
        self.anchor = self.shifted(1);
    }

    pub fn back(&mut self) {
        self.anchor = self.shifted(-1);
    }

    fn shifted(&self, direction: i32) -> NaiveDate {
        match self.view {
            CalendarView::Day => self.anchor + Duration::days(i64::from(direction)),
            CalendarView::Week => self.anchor + Duration::days(7 * i64::from(direction)),
            CalendarView::Month => {
                let months = Months::new(1);
                if direction >= 0 {
                    self.anchor.checked_add_months(months).unwrap_or(self.anchor)
                } else {
                    self.anchor.checked_sub_months(months).unwrap_or(self.anchor)
                }
            }
        }
    }

    /// Half-open visible interval `[start, end)` for the current view.
    /// Weeks start on Sunday, matching the scheduling form's day indexing.
    pub fn visible_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let (first_day, day_count) = match self.view {
            CalendarView::Day => (self.anchor, 1),
            CalendarView::Week => {
                let sunday = self.anchor
                    - Duration::days(i64::from(self.anchor.weekday().num_days_from_sunday()));
                (sunday, 7)
            }
            CalendarView::Month => {
                let first = self.anchor.with_day(1).expect("day 1 exists in every month");
                let next_month = first
                    .checked_add_months(Months::new(1))
                    .expect("in-range month arithmetic");
                (first, (next_month - first).num_days())
            }
        };

        let start = first_day
            .and_hms_opt(0, 0, 0)
            .expect("static time of day")
            .and_utc();
        (start, start + Duration::days(day_count))
    }

    /// Project a flat appointment collection into the renderable model.
    /// Conflict highlighting is render-local: each visible event is compared
    /// only against the other visible events, with the same half-open
    /// predicate the conflict detector uses.
    pub fn project(&self, appointments: &[Appointment]) -> CalendarModel {
        let (range_start, range_end) = self.visible_range();

        let mut events: Vec<CalendarEvent> = appointments
            .iter()
            .filter(|apt| overlaps(apt.start_time, apt.end_time, range_start, range_end))
            .map(CalendarEvent::from_appointment)
            .collect();
        events.sort_by_key(|event| event.start);

        for i in 0..events.len() {
            if !events[i].status.occupies_calendar() {
                continue;
            }
            let conflicted = events.iter().enumerate().any(|(j, other)| {
                i != j
                    && other.status.occupies_calendar()
                    && overlaps(events[i].start, events[i].end, other.start, other.end)
            });
            events[i].conflicted = conflicted;
        }

        CalendarModel {
            view: self.view,
            anchor: self.anchor,
            range_start,
            range_end,
            events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarModel {
    pub view: CalendarView,
    pub anchor: NaiveDate,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub patient_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub is_recurring: bool,
    pub conflicted: bool,
}

impl CalendarEvent {
    fn from_appointment(apt: &Appointment) -> Self {
        Self {
            id: apt.id,
            title: apt.title.clone(),
            patient_id: apt.patient_id,
            start: apt.start_time,
            end: apt.end_time,
            status: apt.status,
            is_recurring: apt.recurrence.is_parent(),
            conflicted: false,
        }
    }

    /// Dropping an event on a new start keeps its duration.
    pub fn dropped_at(&self, new_start: DateTime<Utc>) -> RescheduleRequest {
        RescheduleRequest {
            appointment_id: self.id,
            new_start,
            new_end: new_start + (self.end - self.start),
        }
    }

    /// Resizing an event moves only its end.
    pub fn resized_to(&self, new_end: DateTime<Utc>) -> RescheduleRequest {
        RescheduleRequest {
            appointment_id: self.id,
            new_start: self.start,
            new_end,
        }
    }
}

/// The `(event, new interval)` triple a drag or resize produces. Routed
/// through `SchedulingService::reschedule`; the projection itself never
/// writes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub appointment_id: Uuid,
    pub new_start: DateTime<Utc>,
    pub new_end: DateTime<Utc>,
}
