use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use axum::Router;
use chrono::NaiveTime;
use serde_json::Value;

use crate::enrollment::domain::{
    Activity, ActivityId, Enrollment, EnrollmentId, NationalId, NewEnrollment, NewVisitor,
    Schedule, ScheduleId, ScheduleStatus, SizeCode, Visitor, VisitorDraft, VisitorId, VisitorInput,
};
use crate::enrollment::repository::{
    ActivityCatalog, CapacityClaim, CommitError, CreateOutcome, EnrollmentFilter, EnrollmentStore,
    StorageError, VisitorDirectory,
};
use crate::enrollment::router::enrollment_router;
use crate::enrollment::service::EnrollmentService;

pub(super) const ZIPLINE: ActivityId = ActivityId(1);
pub(super) const SAFARI: ActivityId = ActivityId(2);
pub(super) const CLIMBING_WALL: ActivityId = ActivityId(3);
pub(super) const GARDEN_TOUR: ActivityId = ActivityId(4);

pub(super) const ZIPLINE_SCHEDULE: ScheduleId = ScheduleId(1);
pub(super) const ZIPLINE_FULL_SCHEDULE: ScheduleId = ScheduleId(2);
pub(super) const SAFARI_SCHEDULE: ScheduleId = ScheduleId(3);
pub(super) const CLIMBING_SCHEDULE: ScheduleId = ScheduleId(4);
pub(super) const CLOSED_SCHEDULE: ScheduleId = ScheduleId(5);
pub(super) const GARDEN_SCHEDULE: ScheduleId = ScheduleId(6);

pub(super) const ANA: VisitorId = VisitorId(1);
pub(super) const LUIS: VisitorId = VisitorId(2);
pub(super) const NOAH: VisitorId = VisitorId(3);

pub(super) const ANA_NATIONAL_ID: u64 = 12345678;

/// Single mutex-guarded fake backing all three collaborator traits, so the
/// commit path exercises the same atomic check-and-increment contract a
/// real store must honor.
pub(super) struct MemoryPark {
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

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

fn activity(
    id: ActivityId,
    name: &str,
    requires_size: bool,
    minimum_age: Option<u8>,
) -> Activity {
    Activity {
        id,
        name: name.to_string(),
        requires_size,
        minimum_age,
        description: None,
    }
}

fn schedule(
    id: ScheduleId,
    activity_id: ActivityId,
    starts_at: NaiveTime,
    total_capacity: u32,
    occupied_capacity: u32,
    status: ScheduleStatus,
) -> Schedule {
    Schedule {
        id,
        activity_id,
        starts_at,
        ends_at: starts_at + chrono::Duration::hours(1),
        total_capacity,
        occupied_capacity,
        status,
    }
}

fn visitor(id: VisitorId, name: &str, national_id: u64, age: u8, size: Option<SizeCode>) -> Visitor {
    Visitor {
        id,
        name: name.to_string(),
        national_id: NationalId(national_id),
        age,
        size,
    }
}

impl MemoryPark {
    pub(super) fn seeded() -> Self {
        let mut state = ParkState::default();

        for entry in [
            activity(ZIPLINE, "Zipline", true, Some(8)),
            activity(SAFARI, "Safari", false, None),
            activity(CLIMBING_WALL, "Climbing Wall", true, Some(12)),
            activity(GARDEN_TOUR, "Garden Tour", false, None),
        ] {
            state.activities.insert(entry.id, entry);
        }

        for entry in [
            schedule(ZIPLINE_SCHEDULE, ZIPLINE, at(10, 0), 5, 0, ScheduleStatus::Active),
            schedule(ZIPLINE_FULL_SCHEDULE, ZIPLINE, at(11, 0), 1, 1, ScheduleStatus::Active),
            schedule(SAFARI_SCHEDULE, SAFARI, at(10, 0), 10, 0, ScheduleStatus::Active),
            schedule(CLIMBING_SCHEDULE, CLIMBING_WALL, at(9, 0), 4, 0, ScheduleStatus::Active),
            schedule(CLOSED_SCHEDULE, SAFARI, at(16, 0), 10, 0, ScheduleStatus::Inactive),
            schedule(GARDEN_SCHEDULE, GARDEN_TOUR, at(15, 0), 1, 0, ScheduleStatus::Active),
        ] {
            state.schedules.insert(entry.id, entry);
        }

        for entry in [
            visitor(ANA, "Ana", ANA_NATIONAL_ID, 25, Some(SizeCode::M)),
            visitor(LUIS, "Luis", 87654321, 30, Some(SizeCode::L)),
            visitor(NOAH, "Noah", 55555555, 10, None),
        ] {
            state.visitors.insert(entry.id, entry);
        }

        Self {
            state: Mutex::new(state),
            visitor_seq: AtomicU64::new(100),
            enrollment_seq: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ParkState> {
        self.state.lock().expect("park mutex poisoned")
    }

    pub(super) fn occupied(&self, id: ScheduleId) -> u32 {
        self.lock().schedules[&id].occupied_capacity
    }

    pub(super) fn visitor_count(&self) -> usize {
        self.lock().visitors.len()
    }

    pub(super) fn has_national_id(&self, national_id: u64) -> bool {
        self.lock()
            .visitors
            .values()
            .any(|v| v.national_id == NationalId(national_id))
    }

    pub(super) fn enrollment_count(&self) -> usize {
        self.lock().enrollments.len()
    }

    pub(super) fn enrollments_for(&self, id: ScheduleId) -> Vec<Enrollment> {
        self.lock()
            .enrollments
            .iter()
            .filter(|e| e.schedule_id == id)
            .cloned()
            .collect()
    }
}

impl ActivityCatalog for MemoryPark {
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

impl VisitorDirectory for MemoryPark {
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

impl EnrollmentStore for MemoryPark {
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
            let id = EnrollmentId(self.enrollment_seq.fetch_add(1, Ordering::Relaxed));
            let record = Enrollment {
                id,
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

/// Store wrapper that reports occupancy conflicts for the first
/// `conflicts` commits, then delegates.
pub(super) struct ContendedStore {
    inner: Arc<MemoryPark>,
    conflicts_left: AtomicU32,
}

impl ContendedStore {
    pub(super) fn new(inner: Arc<MemoryPark>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts_left: AtomicU32::new(conflicts),
        }
    }
}

impl EnrollmentStore for ContendedStore {
    fn exists(&self, schedule_id: ScheduleId, visitor_id: VisitorId) -> Result<bool, StorageError> {
        self.inner.exists(schedule_id, visitor_id)
    }

    fn commit_batch(
        &self,
        claim: CapacityClaim,
        rows: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, CommitError> {
        let remaining = self.conflicts_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts_left.store(remaining - 1, Ordering::SeqCst);
            return Err(CommitError::OccupancyConflict);
        }
        self.inner.commit_batch(claim, rows)
    }

    fn list_all(&self, filter: Option<&EnrollmentFilter>) -> Result<Vec<Enrollment>, StorageError> {
        self.inner.list_all(filter)
    }
}

/// Store wrapper that lets a rival batch take the seat right before the
/// first commit, reproducing the lost-update race deterministically.
pub(super) struct RacingStore {
    inner: Arc<MemoryPark>,
    rival: VisitorId,
    raced: AtomicU32,
}

impl RacingStore {
    pub(super) fn new(inner: Arc<MemoryPark>, rival: VisitorId) -> Self {
        Self {
            inner,
            rival,
            raced: AtomicU32::new(0),
        }
    }
}

impl EnrollmentStore for RacingStore {
    fn exists(&self, schedule_id: ScheduleId, visitor_id: VisitorId) -> Result<bool, StorageError> {
        self.inner.exists(schedule_id, visitor_id)
    }

    fn commit_batch(
        &self,
        claim: CapacityClaim,
        rows: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, CommitError> {
        if self.raced.swap(1, Ordering::SeqCst) == 0 {
            let rival_claim = CapacityClaim {
                schedule_id: claim.schedule_id,
                observed_occupied: claim.observed_occupied,
                seats: 1,
            };
            let rival_row = NewEnrollment {
                schedule_id: claim.schedule_id,
                visitor_id: self.rival,
                person_count: 1,
                terms_accepted: true,
            };
            self.inner
                .commit_batch(rival_claim, vec![rival_row])
                .expect("rival commit succeeds");
            return Err(CommitError::OccupancyConflict);
        }
        self.inner.commit_batch(claim, rows)
    }

    fn list_all(&self, filter: Option<&EnrollmentFilter>) -> Result<Vec<Enrollment>, StorageError> {
        self.inner.list_all(filter)
    }
}

/// Store whose every operation fails, for the infrastructure error paths.
#[derive(Default)]
pub(super) struct BrokenStore;

impl EnrollmentStore for BrokenStore {
    fn exists(&self, _: ScheduleId, _: VisitorId) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable("enrollment store offline".to_string()))
    }

    fn commit_batch(
        &self,
        _: CapacityClaim,
        _: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, CommitError> {
        Err(CommitError::Storage(StorageError::Unavailable(
            "enrollment store offline".to_string(),
        )))
    }

    fn list_all(&self, _: Option<&EnrollmentFilter>) -> Result<Vec<Enrollment>, StorageError> {
        Err(StorageError::Unavailable("enrollment store offline".to_string()))
    }
}

pub(super) type ParkService = EnrollmentService<MemoryPark, MemoryPark, MemoryPark>;

pub(super) fn park() -> Arc<MemoryPark> {
    Arc::new(MemoryPark::seeded())
}

pub(super) fn service(park: &Arc<MemoryPark>) -> ParkService {
    EnrollmentService::new(park.clone(), park.clone(), park.clone())
}

pub(super) fn router(park: &Arc<MemoryPark>) -> Router {
    enrollment_router(Arc::new(service(park)))
}

pub(super) fn natural(name: &str, national_id: u64, age: i64, size: Option<&str>) -> VisitorInput {
    VisitorInput::ByNaturalKey(VisitorDraft {
        name: name.to_string(),
        national_id,
        age,
        size: size.map(str::to_string),
    })
}

pub(super) fn by_reference(id: VisitorId) -> VisitorInput {
    VisitorInput::ByReference(id)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}
