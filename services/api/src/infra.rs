use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveTime;
use metrics_exporter_prometheus::PrometheusHandle;
use parkpass::enrollment::{
    Activity, ActivityCatalog, ActivityId, CapacityClaim, CommitError, CreateOutcome, Enrollment,
    EnrollmentFilter, EnrollmentId, EnrollmentStore, NationalId, NewEnrollment, NewVisitor,
    Schedule, ScheduleId, ScheduleStatus, StorageError, Visitor, VisitorDirectory, VisitorId,
};
use serde::Serialize;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory backing for the catalog, the visitor directory, and the
/// enrollment store. Everything lives behind one mutex, which is what
/// makes `commit_batch` an atomic check-and-increment.
pub(crate) struct InMemoryPark {
    state: Mutex<ParkState>,
    visitor_seq: AtomicU64,
    enrollment_seq: AtomicU64,
}

#[derive(Default)]
struct ParkState {
    activities: HashMap<ActivityId, Activity>,
    schedules: HashMap<ScheduleId, Schedule>,
    visitors: HashMap<VisitorId, Visitor>,
    enrollments: Vec<Enrollment>,
    enrolled: HashSet<(ScheduleId, VisitorId)>,
}

/// Read-only description of a schedule for the catalog listing.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScheduleOverview {
    pub(crate) schedule_id: ScheduleId,
    pub(crate) activity_name: String,
    pub(crate) starts_at: NaiveTime,
    pub(crate) ends_at: NaiveTime,
    pub(crate) status: &'static str,
    pub(crate) total_capacity: u32,
    pub(crate) occupied_capacity: u32,
    pub(crate) available: u32,
    pub(crate) requires_size: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) minimum_age: Option<u8>,
}

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid seed time")
}

impl InMemoryPark {
    /// Demonstration catalog: four activities with the eligibility rules
    /// the engine enforces, and a handful of finite slots.
    pub(crate) fn seeded() -> Self {
        let mut state = ParkState::default();

        let activities = [
            Activity {
                id: ActivityId(1),
                name: "Zipline".to_string(),
                requires_size: true,
                minimum_age: Some(8),
                description: Some("Canopy ride across the valley".to_string()),
            },
            Activity {
                id: ActivityId(2),
                name: "Safari".to_string(),
                requires_size: false,
                minimum_age: None,
                description: Some("Guided wildlife tour".to_string()),
            },
            Activity {
                id: ActivityId(3),
                name: "Climbing Wall".to_string(),
                requires_size: true,
                minimum_age: Some(12),
                description: Some("Supervised climb with harness".to_string()),
            },
            Activity {
                id: ActivityId(4),
                name: "Garden Tour".to_string(),
                requires_size: false,
                minimum_age: None,
                description: None,
            },
        ];
        for activity in activities {
            state.activities.insert(activity.id, activity);
        }

        let slots = [
            (1, 1, at(10, 0), at(11, 0), 5, ScheduleStatus::Active),
            (2, 1, at(11, 0), at(12, 0), 1, ScheduleStatus::Active),
            (3, 2, at(10, 0), at(12, 0), 10, ScheduleStatus::Active),
            (4, 2, at(14, 0), at(16, 0), 10, ScheduleStatus::Active),
            (5, 3, at(9, 0), at(10, 0), 2, ScheduleStatus::Active),
            (6, 4, at(15, 0), at(16, 0), 1, ScheduleStatus::Active),
            (7, 4, at(16, 0), at(17, 0), 10, ScheduleStatus::Inactive),
        ];
        for (id, activity, starts_at, ends_at, total, status) in slots {
            let schedule = Schedule {
                id: ScheduleId(id),
                activity_id: ActivityId(activity),
                starts_at,
                ends_at,
                total_capacity: total,
                occupied_capacity: 0,
                status,
            };
            state.schedules.insert(schedule.id, schedule);
        }

        Self {
            state: Mutex::new(state),
            visitor_seq: AtomicU64::new(1),
            enrollment_seq: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ParkState> {
        self.state.lock().expect("park mutex poisoned")
    }

    pub(crate) fn overview(&self) -> Vec<ScheduleOverview> {
        let state = self.lock();
        let mut rows: Vec<ScheduleOverview> = state
            .schedules
            .values()
            .map(|schedule| {
                let activity = state.activities.get(&schedule.activity_id);
                ScheduleOverview {
                    schedule_id: schedule.id,
                    activity_name: activity.map(|a| a.name.clone()).unwrap_or_default(),
                    starts_at: schedule.starts_at,
                    ends_at: schedule.ends_at,
                    status: schedule.status.label(),
                    total_capacity: schedule.total_capacity,
                    occupied_capacity: schedule.occupied_capacity,
                    available: schedule.available(),
                    requires_size: activity.map(|a| a.requires_size).unwrap_or(false),
                    minimum_age: activity.and_then(|a| a.minimum_age),
                }
            })
            .collect();
        rows.sort_by_key(|row| row.schedule_id);
        rows
    }
}

impl ActivityCatalog for InMemoryPark {
    fn schedule(&self, id: ScheduleId) -> Result<Option<Schedule>, StorageError> {
        Ok(self.lock().schedules.get(&id).cloned())
    }

    fn activity(&self, id: ActivityId) -> Result<Activity, StorageError> {
        self.lock()
            .activities
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::Unavailable(format!("activity {id} missing from catalog")))
    }
}

impl VisitorDirectory for InMemoryPark {
    fn find_by_national_id(&self, national_id: NationalId) -> Result<Option<Visitor>, StorageError> {
        Ok(self
            .lock()
            .visitors
            .values()
            .find(|v| v.national_id == national_id)
            .cloned())
    }

    fn find_by_id(&self, id: VisitorId) -> Result<Option<Visitor>, StorageError> {
        Ok(self.lock().visitors.get(&id).cloned())
    }

    fn create(&self, visitor: NewVisitor) -> Result<CreateOutcome, StorageError> {
        let mut state = self.lock();
        if let Some(existing) = state
            .visitors
            .values()
            .find(|v| v.national_id == visitor.national_id)
        {
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }

        let id = VisitorId(self.visitor_seq.fetch_add(1, Ordering::Relaxed));
        let record = Visitor {
            id,
            name: visitor.name,
            national_id: visitor.national_id,
            age: visitor.age,
            size: visitor.size,
        };
        state.visitors.insert(id, record.clone());
        Ok(CreateOutcome::Created(record))
    }

    fn delete(&self, id: VisitorId) -> Result<(), StorageError> {
        self.lock().visitors.remove(&id);
        Ok(())
    }
}

impl EnrollmentStore for InMemoryPark {
    fn exists(&self, schedule_id: ScheduleId, visitor_id: VisitorId) -> Result<bool, StorageError> {
        Ok(self.lock().enrolled.contains(&(schedule_id, visitor_id)))
    }

    fn commit_batch(
        &self,
        claim: CapacityClaim,
        rows: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, CommitError> {
        let mut state = self.lock();

        let (total, occupied) = {
            let schedule = state
                .schedules
                .get(&claim.schedule_id)
                .ok_or(CommitError::ScheduleMissing(claim.schedule_id))?;
            (schedule.total_capacity, schedule.occupied_capacity)
        };
        if occupied != claim.observed_occupied || occupied + claim.seats > total {
            return Err(CommitError::OccupancyConflict);
        }

        // validate every row before mutating anything
        let mut fresh = HashSet::new();
        for row in &rows {
            let pair = (row.schedule_id, row.visitor_id);
            if state.enrolled.contains(&pair) || !fresh.insert(pair) {
                return Err(CommitError::AlreadyEnrolled(row.visitor_id));
            }
        }

        let mut committed = Vec::with_capacity(rows.len());
        for row in rows {
            let record = Enrollment {
                id: EnrollmentId(self.enrollment_seq.fetch_add(1, Ordering::Relaxed)),
                schedule_id: row.schedule_id,
                visitor_id: row.visitor_id,
                person_count: row.person_count,
                terms_accepted: row.terms_accepted,
            };
            state.enrolled.insert((record.schedule_id, record.visitor_id));
            state.enrollments.push(record.clone());
            committed.push(record);
        }
        if let Some(schedule) = state.schedules.get_mut(&claim.schedule_id) {
            schedule.occupied_capacity += claim.seats;
        }

        Ok(committed)
    }

    fn list_all(&self, filter: Option<&EnrollmentFilter>) -> Result<Vec<Enrollment>, StorageError> {
        Ok(self
            .lock()
            .enrollments
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(e)))
            .cloned()
            .collect())
    }
}
