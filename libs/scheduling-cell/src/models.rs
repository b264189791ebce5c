// libs/scheduling-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

use crate::recurrence::{Frequency, RecurrenceEnd, RecurrenceRule};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(flatten)]
    pub recurrence: RecurrenceLink,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    /// Whether this appointment takes up calendar time for conflict purposes.
    pub fn occupies_calendar(&self) -> bool {
        self.status.occupies_calendar()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Cancelled and no-show slots are free to rebook.
    pub fn occupies_calendar(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

/// Recurrence role of an appointment row. The storage schema keeps the
/// original three columns (`is_recurring`, `recurrence_rule`,
/// `recurrence_parent_id`); the tagged variant makes it impossible to hold a
/// rule and a parent reference at the same time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecurrenceColumns", into = "RecurrenceColumns")]
pub enum RecurrenceLink {
    Standalone,
    Parent { rule: String },
    Child { parent_id: Uuid },
}

impl RecurrenceLink {
    pub fn is_parent(&self) -> bool {
        matches!(self, RecurrenceLink::Parent { .. })
    }

    pub fn rule(&self) -> Option<&str> {
        match self {
            RecurrenceLink::Parent { rule } => Some(rule),
            _ => None,
        }
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            RecurrenceLink::Child { parent_id } => Some(*parent_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecurrenceColumns {
    #[serde(default)]
    is_recurring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recurrence_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recurrence_parent_id: Option<Uuid>,
}

impl From<RecurrenceColumns> for RecurrenceLink {
    fn from(columns: RecurrenceColumns) -> Self {
        if let Some(parent_id) = columns.recurrence_parent_id {
            return RecurrenceLink::Child { parent_id };
        }
        if columns.is_recurring {
            if let Some(rule) = columns.recurrence_rule {
                return RecurrenceLink::Parent { rule };
            }
        }
        RecurrenceLink::Standalone
    }
}

impl From<RecurrenceLink> for RecurrenceColumns {
    fn from(link: RecurrenceLink) -> Self {
        match link {
            RecurrenceLink::Standalone => Self {
                is_recurring: false,
                recurrence_rule: None,
                recurrence_parent_id: None,
            },
            RecurrenceLink::Parent { rule } => Self {
                is_recurring: true,
                recurrence_rule: Some(rule),
                recurrence_parent_id: None,
            },
            RecurrenceLink::Child { parent_id } => Self {
                is_recurring: false,
                recurrence_rule: None,
                recurrence_parent_id: Some(parent_id),
            },
        }
    }
}

/// Insert payload: everything but the columns Supabase fills in (id,
/// created_at, updated_at).
#[derive(Debug, Clone, Serialize)]
pub struct NewAppointmentRecord {
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(flatten)]
    pub recurrence: RecurrenceLink,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Validated template for a new appointment; the same draft seeds every
/// occurrence of a recurring series.
#[derive(Debug, Clone)]
pub struct AppointmentDraft {
    pub patient_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl AppointmentDraft {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.title.trim().is_empty() {
            return Err(SchedulingError::Validation("title is required".to_string()));
        }
        if self.end_time <= self.start_time {
            return Err(SchedulingError::Validation(
                "end time must be after start time".to_string(),
            ));
        }
        Ok(())
    }

    pub fn record(&self, clinic_id: Uuid, recurrence: RecurrenceLink) -> NewAppointmentRecord {
        self.record_at(clinic_id, self.start_time, self.end_time, recurrence)
    }

    pub fn record_at(
        &self,
        clinic_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        recurrence: RecurrenceLink,
    ) -> NewAppointmentRecord {
        NewAppointmentRecord {
            clinic_id,
            patient_id: self.patient_id,
            title: self.title.clone(),
            description: self.description.clone(),
            start_time,
            end_time,
            status: self.status,
            recurrence,
        }
    }
}

fn default_status() -> AppointmentStatus {
    AppointmentStatus::Scheduled
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub confirm_conflicts: bool,
}

impl CreateAppointmentRequest {
    pub fn draft(&self) -> AppointmentDraft {
        AppointmentDraft {
            patient_id: self.patient_id,
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceEndType {
    #[default]
    Never,
    Count,
    Until,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecurringRequest {
    pub patient_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: AppointmentStatus,
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default)]
    pub end_type: RecurrenceEndType,
    pub count: Option<u32>,
    pub until: Option<NaiveDate>,
    #[serde(default)]
    pub confirm_conflicts: bool,
}

impl CreateRecurringRequest {
    pub fn draft(&self) -> AppointmentDraft {
        AppointmentDraft {
            patient_id: self.patient_id,
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
        }
    }

    pub fn rule(&self) -> Result<RecurrenceRule, SchedulingError> {
        let end = match self.end_type {
            RecurrenceEndType::Never => RecurrenceEnd::Never,
            RecurrenceEndType::Count => {
                let count = self.count.ok_or_else(|| {
                    SchedulingError::Validation(
                        "count is required when the series ends after a number of occurrences"
                            .to_string(),
                    )
                })?;
                RecurrenceEnd::Count(count)
            }
            RecurrenceEndType::Until => {
                let date = self.until.ok_or_else(|| {
                    SchedulingError::Validation(
                        "until is required when the series ends on a date".to_string(),
                    )
                })?;
                // Widen a bare date to end-of-day so an occurrence on the
                // until date itself is still included.
                RecurrenceEnd::Until(
                    date.and_hms_opt(23, 59, 59)
                        .expect("static time of day")
                        .and_utc(),
                )
            }
        };

        Ok(RecurrenceRule {
            frequency: self.frequency,
            interval: self.interval,
            weekdays: self.weekdays.iter().copied().collect(),
            end,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    pub new_end_time: DateTime<Utc>,
    #[serde(default)]
    pub confirm_conflicts: bool,
}

// ==============================================================================
// CONFLICT MODELS
// ==============================================================================

/// One existing appointment a candidate interval overlaps, dressed for the
/// warning dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub appointment_id: Uuid,
    pub title: String,
    pub patient_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Conflicts of a single occurrence inside a recurring series, indexed by
/// position in the expansion (0 = the anchor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceConflict {
    pub occurrence_index: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub conflicts: Vec<ConflictDetail>,
}

// ==============================================================================
// SCHEDULING OUTCOMES
// ==============================================================================

/// Caller's position in the soft-conflict protocol: a first attempt is
/// unacknowledged; a retry after the warning dialog carries Proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAck {
    Unacknowledged,
    Proceed,
}

impl ConflictAck {
    pub fn from_confirmed(confirmed: bool) -> Self {
        if confirmed {
            ConflictAck::Proceed
        } else {
            ConflictAck::Unacknowledged
        }
    }
}

/// Result of a scheduling operation. Conflicts are a warning, not a hard
/// constraint: `AwaitingConfirmation` means nothing was persisted and the
/// caller must either retry with `ConflictAck::Proceed` or walk away.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingOutcome<T, C = ConflictDetail> {
    Booked(T),
    AwaitingConfirmation { conflicts: Vec<C> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringBooking {
    pub parent: Appointment,
    pub children: Vec<Appointment>,
}

impl RecurringBooking {
    pub fn occurrence_count(&self) -> usize {
        1 + self.children.len()
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Authentication required: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Persistence(String),
}
