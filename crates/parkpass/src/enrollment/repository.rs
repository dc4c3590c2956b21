use super::domain::{
    Activity, ActivityId, Enrollment, NationalId, NewEnrollment, NewVisitor, Schedule, ScheduleId,
    Visitor, VisitorId,
};

/// Read access to the activity/schedule catalog. The catalog is owned by a
/// separate administrative surface; the engine only ever reads it and
/// advances schedule occupancy through [`EnrollmentStore::commit_batch`].
pub trait ActivityCatalog: Send + Sync {
    fn schedule(&self, id: ScheduleId) -> Result<Option<Schedule>, StorageError>;

    /// An activity referenced by a live schedule must exist; a missing one
    /// is a catalog fault, not a domain outcome.
    fn activity(&self, id: ActivityId) -> Result<Activity, StorageError>;
}

/// Outcome of a visitor insert. `AlreadyExists` makes resolve-or-create
/// idempotent when a concurrent batch wins the race on the natural id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Visitor),
    AlreadyExists(Visitor),
}

/// Storage abstraction for visitor identities.
pub trait VisitorDirectory: Send + Sync {
    fn find_by_national_id(&self, national_id: NationalId) -> Result<Option<Visitor>, StorageError>;
    fn find_by_id(&self, id: VisitorId) -> Result<Option<Visitor>, StorageError>;
    fn create(&self, visitor: NewVisitor) -> Result<CreateOutcome, StorageError>;
    /// Compensating rollback only; visitors are otherwise never removed.
    fn delete(&self, id: VisitorId) -> Result<(), StorageError>;
}

/// The occupancy the engine observed when it validated capacity. A commit
/// is conditional on the stored counter still matching `observed_occupied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityClaim {
    pub schedule_id: ScheduleId,
    pub observed_occupied: u32,
    pub seats: u32,
}

/// Filter criteria for enrollment listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub schedule_id: Option<ScheduleId>,
}

impl EnrollmentFilter {
    pub fn matches(&self, enrollment: &Enrollment) -> bool {
        self.schedule_id
            .map_or(true, |id| enrollment.schedule_id == id)
    }
}

/// Storage abstraction for enrollment records and the occupancy counter
/// they guard.
pub trait EnrollmentStore: Send + Sync {
    fn exists(&self, schedule_id: ScheduleId, visitor_id: VisitorId) -> Result<bool, StorageError>;

    /// Persist the batch and advance the schedule's occupancy by
    /// `claim.seats` as one atomic unit, or change nothing at all. The
    /// store must reject the commit when the stored occupancy no longer
    /// matches `claim.observed_occupied`, and re-check the
    /// (schedule, visitor) uniqueness invariant for every row.
    fn commit_batch(
        &self,
        claim: CapacityClaim,
        rows: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, CommitError>;

    fn list_all(&self, filter: Option<&EnrollmentFilter>) -> Result<Vec<Enrollment>, StorageError>;
}

/// Opaque infrastructure fault raised by any collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the atomic commit step.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("schedule occupancy changed since it was read")]
    OccupancyConflict,
    #[error("schedule {0} no longer exists")]
    ScheduleMissing(ScheduleId),
    #[error("visitor {0} is already enrolled in this schedule")]
    AlreadyEnrolled(VisitorId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
