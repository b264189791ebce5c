// libs/scheduling-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentDraft, ConflictAck, NewAppointmentRecord, OccurrenceConflict,
    RecurrenceLink, RecurringBooking, SchedulingError, SchedulingOutcome,
};
use crate::recurrence::{RecurrenceExpander, RecurrenceRule};
use crate::services::conflict::{find_conflicts, ConflictDetectionService};
use crate::storage::{
    AppointmentStore, PatientDirectory, SupabaseAppointmentStore, SupabasePatientDirectory,
};

/// Phases of the soft-conflict booking protocol. Conflicts never hard-block
/// a booking: the flow parks in AwaitingConfirmation with nothing written,
/// and only an explicit acknowledgement moves it to Committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingPhase {
    Checking,
    AwaitingConfirmation,
    Committing,
    Done,
    Aborted,
}

impl BookingPhase {
    pub fn can_transition_to(self, next: BookingPhase) -> bool {
        use BookingPhase::*;
        matches!(
            (self, next),
            (Checking, AwaitingConfirmation)
                | (Checking, Committing)
                | (Checking, Aborted)
                | (AwaitingConfirmation, Committing)
                | (AwaitingConfirmation, Aborted)
                | (Committing, Done)
                | (Committing, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingPhase::Done | BookingPhase::Aborted)
    }
}

struct BookingFlow {
    phase: BookingPhase,
}

impl BookingFlow {
    fn start() -> Self {
        Self {
            phase: BookingPhase::Checking,
        }
    }

    fn advance(&mut self, next: BookingPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal booking transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("Booking flow: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// Decides what gets persisted for create and reschedule requests. The
/// authenticated clinic id is passed into every call; there is no ambient
/// identity anywhere in the cell.
pub struct SchedulingService {
    store: Arc<dyn AppointmentStore>,
    patients: Arc<dyn PatientDirectory>,
    conflicts: ConflictDetectionService,
    expander: RecurrenceExpander,
}

impl SchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let store: Arc<dyn AppointmentStore> =
            Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase)));
        let patients: Arc<dyn PatientDirectory> =
            Arc::new(SupabasePatientDirectory::new(supabase));
        Self::with_collaborators(
            store,
            patients,
            RecurrenceExpander::new(config.recurrence_occurrence_cap),
        )
    }

    pub fn with_collaborators(
        store: Arc<dyn AppointmentStore>,
        patients: Arc<dyn PatientDirectory>,
        expander: RecurrenceExpander,
    ) -> Self {
        let conflicts = ConflictDetectionService::new(Arc::clone(&store), Arc::clone(&patients));
        Self {
            store,
            patients,
            conflicts,
            expander,
        }
    }

    pub fn conflict_service(&self) -> &ConflictDetectionService {
        &self.conflicts
    }

    /// Read passthrough for the calendar view.
    pub async fn clinic_appointments(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.store.list_appointments(clinic_id, auth_token).await
    }

    /// Book a single appointment. Conflicts surface as
    /// `AwaitingConfirmation` with nothing persisted; a retry carrying
    /// `ConflictAck::Proceed` books over them.
    pub async fn create_single(
        &self,
        clinic_id: Uuid,
        draft: AppointmentDraft,
        ack: ConflictAck,
        auth_token: &str,
    ) -> Result<SchedulingOutcome<Appointment>, SchedulingError> {
        draft.validate()?;
        self.verify_patient(clinic_id, draft.patient_id, auth_token)
            .await?;

        let mut flow = BookingFlow::start();
        let conflicts = self
            .conflicts
            .check_conflicts(clinic_id, draft.start_time, draft.end_time, None, auth_token)
            .await?;

        if !conflicts.is_empty() && ack == ConflictAck::Unacknowledged {
            flow.advance(BookingPhase::AwaitingConfirmation);
            info!(
                "Booking for clinic {} held for confirmation over {} conflicts",
                clinic_id,
                conflicts.len()
            );
            return Ok(SchedulingOutcome::AwaitingConfirmation { conflicts });
        }
        if !conflicts.is_empty() {
            info!(
                "Booking for clinic {} proceeds over {} acknowledged conflicts",
                clinic_id,
                conflicts.len()
            );
        }

        flow.advance(BookingPhase::Committing);
        let record = draft.record(clinic_id, RecurrenceLink::Standalone);
        match self.store.insert_appointment(&record, auth_token).await {
            Ok(appointment) => {
                flow.advance(BookingPhase::Done);
                info!("Appointment {} booked for clinic {}", appointment.id, clinic_id);
                Ok(SchedulingOutcome::Booked(appointment))
            }
            Err(err) => {
                flow.advance(BookingPhase::Aborted);
                Err(err)
            }
        }
    }

    /// Book a recurring series: expand the rule, check every occurrence
    /// against one snapshot of the clinic calendar, and persist parent plus
    /// children together or not at all.
    pub async fn create_recurring(
        &self,
        clinic_id: Uuid,
        draft: AppointmentDraft,
        rule: RecurrenceRule,
        ack: ConflictAck,
        auth_token: &str,
    ) -> Result<SchedulingOutcome<RecurringBooking, OccurrenceConflict>, SchedulingError> {
        draft.validate()?;
        self.verify_patient(clinic_id, draft.patient_id, auth_token)
            .await?;

        let occurrences = self
            .expander
            .expand(&rule, draft.start_time, draft.end_time)?;

        let mut flow = BookingFlow::start();
        let existing = self.store.list_appointments(clinic_id, auth_token).await?;

        let mut flagged = Vec::new();
        let mut names: HashMap<Uuid, String> = HashMap::new();
        for (index, occurrence) in occurrences.iter().enumerate() {
            let hits = find_conflicts(clinic_id, occurrence.start, occurrence.end, &existing, None);
            if hits.is_empty() {
                continue;
            }
            let conflicts = self
                .conflicts
                .describe(clinic_id, &hits, &mut names, auth_token)
                .await?;
            flagged.push(OccurrenceConflict {
                occurrence_index: index,
                start_time: occurrence.start,
                end_time: occurrence.end,
                conflicts,
            });
        }

        if !flagged.is_empty() && ack == ConflictAck::Unacknowledged {
            flow.advance(BookingPhase::AwaitingConfirmation);
            info!(
                "Recurring booking for clinic {} held for confirmation: {} of {} occurrences conflict",
                clinic_id,
                flagged.len(),
                occurrences.len()
            );
            return Ok(SchedulingOutcome::AwaitingConfirmation { conflicts: flagged });
        }

        flow.advance(BookingPhase::Committing);

        let parent_record = draft.record(
            clinic_id,
            RecurrenceLink::Parent {
                rule: rule.to_rrule(),
            },
        );
        let parent = match self.store.insert_appointment(&parent_record, auth_token).await {
            Ok(parent) => parent,
            Err(err) => {
                flow.advance(BookingPhase::Aborted);
                return Err(err);
            }
        };

        let child_records: Vec<NewAppointmentRecord> = occurrences[1..]
            .iter()
            .map(|occurrence| {
                draft.record_at(
                    clinic_id,
                    occurrence.start,
                    occurrence.end,
                    RecurrenceLink::Child {
                        parent_id: parent.id,
                    },
                )
            })
            .collect();

        let children = if child_records.is_empty() {
            Vec::new()
        } else {
            match self.store.insert_many(&child_records, auth_token).await {
                Ok(children) => children,
                Err(err) => {
                    // Roll the parent back so no half-written series survives.
                    warn!(
                        "Child occurrences failed to persist, rolling back parent {}",
                        parent.id
                    );
                    if let Err(rollback_err) =
                        self.store.delete_appointment(parent.id, auth_token).await
                    {
                        error!("Rollback of parent {} failed: {}", parent.id, rollback_err);
                    }
                    flow.advance(BookingPhase::Aborted);
                    return Err(SchedulingError::Persistence(format!(
                        "recurring booking incomplete, series rolled back: {}",
                        err
                    )));
                }
            }
        };

        flow.advance(BookingPhase::Done);
        info!(
            "Recurring series booked for clinic {}: parent {} with {} children",
            clinic_id,
            parent.id,
            children.len()
        );
        Ok(SchedulingOutcome::Booked(RecurringBooking { parent, children }))
    }

    /// Move one occurrence to a new interval. Siblings of a recurring series
    /// are never touched, and the appointment being moved is excluded from
    /// its own conflict check.
    pub async fn reschedule(
        &self,
        clinic_id: Uuid,
        appointment_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        ack: ConflictAck,
        auth_token: &str,
    ) -> Result<SchedulingOutcome<Appointment>, SchedulingError> {
        if new_end <= new_start {
            return Err(SchedulingError::Validation(
                "end time must be after start time".to_string(),
            ));
        }

        if self
            .store
            .get_appointment(clinic_id, appointment_id, auth_token)
            .await?
            .is_none()
        {
            return Err(SchedulingError::AppointmentNotFound);
        }

        let mut flow = BookingFlow::start();
        let conflicts = self
            .conflicts
            .check_conflicts(clinic_id, new_start, new_end, Some(appointment_id), auth_token)
            .await?;

        if !conflicts.is_empty() && ack == ConflictAck::Unacknowledged {
            flow.advance(BookingPhase::AwaitingConfirmation);
            return Ok(SchedulingOutcome::AwaitingConfirmation { conflicts });
        }

        flow.advance(BookingPhase::Committing);
        match self
            .store
            .update_appointment_time(appointment_id, new_start, new_end, auth_token)
            .await
        {
            Ok(updated) => {
                flow.advance(BookingPhase::Done);
                info!(
                    "Appointment {} rescheduled to {} - {}",
                    appointment_id, new_start, new_end
                );
                Ok(SchedulingOutcome::Booked(updated))
            }
            Err(err) => {
                flow.advance(BookingPhase::Aborted);
                Err(err)
            }
        }
    }

    async fn verify_patient(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<String, SchedulingError> {
        match self
            .patients
            .display_name(clinic_id, patient_id, auth_token)
            .await?
        {
            Some(name) => Ok(name),
            None => Err(SchedulingError::PatientNotFound),
        }
    }
}
