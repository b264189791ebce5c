// libs/scheduling-cell/src/services/conflict.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, ConflictDetail, SchedulingError};
use crate::storage::{AppointmentStore, PatientDirectory};

/// Half-open interval overlap: `[s1,e1)` and `[s2,e2)` conflict iff
/// `s1 < e2 && s2 < e1`. Touching endpoints are not a conflict.
pub fn overlaps(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Every existing appointment the candidate interval overlaps, ordered by
/// start time. Scoped to one clinic; the appointment being edited is skipped
/// via `exclude_id` so an update never conflicts with itself, and cancelled
/// or no-show appointments never count.
pub fn find_conflicts<'a>(
    clinic_id: Uuid,
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    existing: &'a [Appointment],
    exclude_id: Option<Uuid>,
) -> Vec<&'a Appointment> {
    let mut conflicts: Vec<&Appointment> = existing
        .iter()
        .filter(|apt| apt.clinic_id == clinic_id)
        .filter(|apt| Some(apt.id) != exclude_id)
        .filter(|apt| apt.occupies_calendar())
        .filter(|apt| overlaps(candidate_start, candidate_end, apt.start_time, apt.end_time))
        .collect();
    conflicts.sort_by_key(|apt| apt.start_time);
    conflicts
}

/// Read-side conflict checking against the clinic's stored calendar, with
/// patient names attached for the warning dialog.
pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
    patients: Arc<dyn PatientDirectory>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>, patients: Arc<dyn PatientDirectory>) -> Self {
        Self { store, patients }
    }

    pub async fn check_conflicts(
        &self,
        clinic_id: Uuid,
        candidate_start: DateTime<Utc>,
        candidate_end: DateTime<Utc>,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<ConflictDetail>, SchedulingError> {
        if candidate_end <= candidate_start {
            return Err(SchedulingError::Validation(
                "end time must be after start time".to_string(),
            ));
        }

        debug!(
            "Checking conflicts for clinic {} from {} to {}",
            clinic_id, candidate_start, candidate_end
        );

        let existing = self.store.list_appointments(clinic_id, auth_token).await?;
        let hits = find_conflicts(clinic_id, candidate_start, candidate_end, &existing, exclude_id);

        if !hits.is_empty() {
            warn!(
                "Conflict detected for clinic {} - {} overlapping appointments",
                clinic_id,
                hits.len()
            );
        }

        let mut names = HashMap::new();
        self.describe(clinic_id, &hits, &mut names, auth_token).await
    }

    /// Dress raw conflict hits with patient display names. Lookup failures
    /// degrade to a placeholder: the warning must still be shown even when
    /// the directory is unavailable.
    pub(crate) async fn describe(
        &self,
        clinic_id: Uuid,
        hits: &[&Appointment],
        names: &mut HashMap<Uuid, String>,
        auth_token: &str,
    ) -> Result<Vec<ConflictDetail>, SchedulingError> {
        let mut details = Vec::with_capacity(hits.len());
        for apt in hits {
            let patient_name = match names.get(&apt.patient_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .patients
                        .display_name(clinic_id, apt.patient_id, auth_token)
                        .await
                        .ok()
                        .flatten()
                        .unwrap_or_else(|| "Unknown patient".to_string());
                    names.insert(apt.patient_id, name.clone());
                    name
                }
            };

            details.push(ConflictDetail {
                appointment_id: apt.id,
                title: apt.title.clone(),
                patient_name,
                start_time: apt.start_time,
                end_time: apt.end_time,
            });
        }
        Ok(details)
    }
}
