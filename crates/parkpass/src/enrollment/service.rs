use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{
    Activity, Enrollment, NationalId, NewEnrollment, Schedule, ScheduleId, ScheduleStatus, Visitor,
    VisitorField, VisitorId, VisitorInput,
};
use super::report::{EnrollmentWithActivity, EnrollmentWithVisitor};
use super::repository::{
    ActivityCatalog, CapacityClaim, CommitError, CreateOutcome, EnrollmentFilter, EnrollmentStore,
    StorageError, VisitorDirectory,
};

/// Tuning for the optimistic commit loop.
#[derive(Debug, Clone)]
pub struct EnrollmentPolicy {
    /// Bounded retries when a concurrent batch moves the occupancy counter
    /// between the capacity check and the commit.
    pub max_commit_attempts: u32,
}

impl Default for EnrollmentPolicy {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
        }
    }
}

/// The enrollment engine: validates a batch request against the catalog
/// and the visitor directory, then commits enrollment rows together with
/// the schedule's occupancy counter, all or nothing.
pub struct EnrollmentService<C, V, E> {
    catalog: Arc<C>,
    visitors: Arc<V>,
    enrollments: Arc<E>,
    policy: EnrollmentPolicy,
}

impl<C, V, E> EnrollmentService<C, V, E>
where
    C: ActivityCatalog + 'static,
    V: VisitorDirectory + 'static,
    E: EnrollmentStore + 'static,
{
    pub fn new(catalog: Arc<C>, visitors: Arc<V>, enrollments: Arc<E>) -> Self {
        Self::with_policy(catalog, visitors, enrollments, EnrollmentPolicy::default())
    }

    pub fn with_policy(
        catalog: Arc<C>,
        visitors: Arc<V>,
        enrollments: Arc<E>,
        policy: EnrollmentPolicy,
    ) -> Self {
        Self {
            catalog,
            visitors,
            enrollments,
            policy,
        }
    }

    /// Enroll a batch of visitors into a schedule.
    ///
    /// Checks run in a fixed order: non-empty batch, schedule exists and is
    /// active, terms accepted, capacity against the whole batch, duplicate
    /// natural ids within the batch, then per-visitor resolution and
    /// eligibility in input order. Any failure aborts the whole call and
    /// removes every visitor this attempt created.
    pub fn enroll(
        &self,
        schedule_id: ScheduleId,
        inputs: Vec<VisitorInput>,
        terms_accepted: bool,
    ) -> Result<Vec<Enrollment>, EnrollmentError> {
        if inputs.is_empty() {
            return Err(EnrollmentError::EmptyVisitorList);
        }

        let schedule = self.fetch_schedule(schedule_id)?;
        check_open(&schedule)?;
        if !terms_accepted {
            return Err(EnrollmentError::TermsNotAccepted);
        }
        check_capacity(&schedule, inputs.len() as u32)?;
        check_batch_national_ids(&inputs)?;

        let activity = self.catalog.activity(schedule.activity_id)?;

        let mut created = Vec::new();
        let outcome = self
            .stage_batch(&schedule, &activity, &inputs, terms_accepted, &mut created)
            .and_then(|staged| self.commit_with_retry(schedule, staged));
        if outcome.is_err() {
            self.discard_created(&created);
        }
        outcome
    }

    /// All committed enrollments, each joined with its activity's display
    /// name. Read-only.
    pub fn list(
        &self,
        filter: Option<EnrollmentFilter>,
    ) -> Result<Vec<EnrollmentWithActivity>, EnrollmentError> {
        let rows = self.enrollments.list_all(filter.as_ref())?;
        rows.into_iter()
            .map(|row| {
                let activity_name = self.activity_name(row.schedule_id)?;
                Ok(EnrollmentWithActivity::new(row, activity_name))
            })
            .collect()
    }

    /// Listing variant that additionally exposes each visitor's public
    /// attributes.
    pub fn list_with_visitors(
        &self,
        filter: Option<EnrollmentFilter>,
    ) -> Result<Vec<EnrollmentWithVisitor>, EnrollmentError> {
        let rows = self.enrollments.list_all(filter.as_ref())?;
        rows.into_iter()
            .map(|row| {
                let activity_name = self.activity_name(row.schedule_id)?;
                let visitor = self.visitors.find_by_id(row.visitor_id)?.ok_or_else(|| {
                    StorageError::Unavailable(format!(
                        "visitor {} missing from directory",
                        row.visitor_id
                    ))
                })?;
                Ok(EnrollmentWithVisitor::new(row, activity_name, visitor))
            })
            .collect()
    }

    /// Join freshly committed rows with their activity name for a caller
    /// receipt. All rows of a batch share one schedule.
    pub fn enriched(
        &self,
        rows: Vec<Enrollment>,
    ) -> Result<Vec<EnrollmentWithActivity>, EnrollmentError> {
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let activity_name = self.activity_name(first.schedule_id)?;
        Ok(rows
            .into_iter()
            .map(|row| EnrollmentWithActivity::new(row, activity_name.clone()))
            .collect())
    }

    fn fetch_schedule(&self, id: ScheduleId) -> Result<Schedule, EnrollmentError> {
        self.catalog
            .schedule(id)?
            .ok_or(EnrollmentError::ScheduleNotFound(id))
    }

    fn activity_name(&self, schedule_id: ScheduleId) -> Result<String, EnrollmentError> {
        let schedule = self.catalog.schedule(schedule_id)?.ok_or_else(|| {
            StorageError::Unavailable(format!("schedule {schedule_id} missing from catalog"))
        })?;
        let activity = self.catalog.activity(schedule.activity_id)?;
        Ok(activity.name)
    }

    /// Resolve every input and run the eligibility checks, building the
    /// rows to commit. Visitors created along the way are appended to
    /// `created` so the caller can undo them on any failure.
    fn stage_batch(
        &self,
        schedule: &Schedule,
        activity: &Activity,
        inputs: &[VisitorInput],
        terms_accepted: bool,
        created: &mut Vec<VisitorId>,
    ) -> Result<Vec<NewEnrollment>, EnrollmentError> {
        let mut staged = Vec::with_capacity(inputs.len());
        let mut batch_visitors = HashSet::new();

        for (position, input) in inputs.iter().enumerate() {
            let visitor = self.resolve_visitor(input, position, created)?;

            if !batch_visitors.insert(visitor.id)
                || self.enrollments.exists(schedule.id, visitor.id)?
            {
                return Err(EnrollmentError::DuplicateEnrollment {
                    visitor_id: visitor.id,
                    schedule_id: schedule.id,
                });
            }
            if activity.requires_size && visitor.size.is_none() {
                return Err(EnrollmentError::SizeRequired {
                    visitor_id: visitor.id,
                    activity: activity.name.clone(),
                });
            }
            if let Some(minimum_age) = activity.minimum_age {
                // inclusive lower bound: age == minimum_age passes
                if visitor.age < minimum_age {
                    return Err(EnrollmentError::MinimumAgeNotMet {
                        visitor_id: visitor.id,
                        activity: activity.name.clone(),
                        age: visitor.age,
                        minimum_age,
                    });
                }
            }

            staged.push(NewEnrollment {
                schedule_id: schedule.id,
                visitor_id: visitor.id,
                person_count: 1,
                terms_accepted,
            });
        }

        Ok(staged)
    }

    fn resolve_visitor(
        &self,
        input: &VisitorInput,
        position: usize,
        created: &mut Vec<VisitorId>,
    ) -> Result<Visitor, EnrollmentError> {
        match input {
            VisitorInput::ByReference(id) => self
                .visitors
                .find_by_id(*id)?
                .ok_or(EnrollmentError::VisitorNotFound(*id)),
            VisitorInput::ByNaturalKey(draft) => {
                if draft.national_id != 0 {
                    if let Some(existing) = self
                        .visitors
                        .find_by_national_id(NationalId(draft.national_id))?
                    {
                        return Ok(existing);
                    }
                }

                let new_visitor =
                    draft
                        .validate()
                        .map_err(|fields| EnrollmentError::InvalidVisitorData {
                            label: format!("visitor {}", position + 1),
                            fields,
                        })?;

                match self.visitors.create(new_visitor)? {
                    CreateOutcome::Created(visitor) => {
                        created.push(visitor.id);
                        Ok(visitor)
                    }
                    // a concurrent batch inserted the same natural id
                    // between our lookup and the create; use that record
                    // and leave it out of the rollback list
                    CreateOutcome::AlreadyExists(visitor) => Ok(visitor),
                }
            }
        }
    }

    fn commit_with_retry(
        &self,
        mut schedule: Schedule,
        rows: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, EnrollmentError> {
        let seats = rows.len() as u32;

        for attempt in 1..=self.policy.max_commit_attempts {
            let claim = CapacityClaim {
                schedule_id: schedule.id,
                observed_occupied: schedule.occupied_capacity,
                seats,
            };
            match self.enrollments.commit_batch(claim, rows.clone()) {
                Ok(committed) => {
                    info!(schedule_id = %schedule.id, seats, "enrollment batch committed");
                    return Ok(committed);
                }
                Err(CommitError::OccupancyConflict) => {
                    debug!(
                        schedule_id = %schedule.id,
                        attempt, "occupancy moved during commit, revalidating"
                    );
                    schedule = self.fetch_schedule(schedule.id)?;
                    check_open(&schedule)?;
                    check_capacity(&schedule, seats)?;
                }
                Err(CommitError::AlreadyEnrolled(visitor_id)) => {
                    return Err(EnrollmentError::DuplicateEnrollment {
                        visitor_id,
                        schedule_id: schedule.id,
                    });
                }
                Err(CommitError::ScheduleMissing(id)) => {
                    return Err(EnrollmentError::ScheduleNotFound(id));
                }
                Err(CommitError::Storage(err)) => return Err(err.into()),
            }
        }

        Err(EnrollmentError::Storage(StorageError::Unavailable(format!(
            "schedule {} commit contention persisted after {} attempts",
            schedule.id, self.policy.max_commit_attempts
        ))))
    }

    /// Compensating rollback for visitors created by an aborted attempt,
    /// newest first. Never touches visitors that existed before the call.
    fn discard_created(&self, created: &[VisitorId]) {
        for visitor_id in created.iter().rev() {
            if let Err(error) = self.visitors.delete(*visitor_id) {
                warn!(%visitor_id, %error, "failed to remove visitor created by an aborted enrollment");
            }
        }
    }
}

fn check_open(schedule: &Schedule) -> Result<(), EnrollmentError> {
    match schedule.status {
        ScheduleStatus::Active => Ok(()),
        status => Err(EnrollmentError::InactiveSchedule { status }),
    }
}

/// One comparison against the full batch size, before any per-visitor
/// work.
fn check_capacity(schedule: &Schedule, requested: u32) -> Result<(), EnrollmentError> {
    let available = schedule.available();
    if available < requested {
        return Err(EnrollmentError::InsufficientCapacity {
            available,
            requested,
        });
    }
    Ok(())
}

fn check_batch_national_ids(inputs: &[VisitorInput]) -> Result<(), EnrollmentError> {
    let mut seen = HashSet::new();
    for input in inputs {
        if let VisitorInput::ByNaturalKey(draft) = input {
            if !seen.insert(draft.national_id) {
                return Err(EnrollmentError::DuplicateNationalIdInBatch(NationalId(
                    draft.national_id,
                )));
            }
        }
    }
    Ok(())
}

/// Every expected domain outcome of an enroll call, plus the opaque
/// infrastructure fault class. Domain variants are returned to the caller
/// verbatim and never logged as fatal.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("enrollment requires at least one visitor")]
    EmptyVisitorList,
    #[error("schedule {0} was not found")]
    ScheduleNotFound(ScheduleId),
    #[error("schedule is {status} and does not accept enrollments")]
    InactiveSchedule { status: ScheduleStatus },
    #[error("terms and conditions must be accepted")]
    TermsNotAccepted,
    #[error("insufficient capacity: {available} seat(s) available, {requested} requested")]
    InsufficientCapacity { available: u32, requested: u32 },
    #[error("national id {0} appears more than once in the batch")]
    DuplicateNationalIdInBatch(NationalId),
    #[error("invalid visitor data for {label}: {fields:?}")]
    InvalidVisitorData {
        label: String,
        fields: Vec<VisitorField>,
    },
    #[error("visitor {0} was not found")]
    VisitorNotFound(VisitorId),
    #[error("visitor {visitor_id} is already enrolled in schedule {schedule_id}")]
    DuplicateEnrollment {
        visitor_id: VisitorId,
        schedule_id: ScheduleId,
    },
    #[error("activity {activity} requires a size for visitor {visitor_id}")]
    SizeRequired {
        visitor_id: VisitorId,
        activity: String,
    },
    #[error(
        "activity {activity} requires minimum age {minimum_age}; visitor {visitor_id} is {age}"
    )]
    MinimumAgeNotMet {
        visitor_id: VisitorId,
        activity: String,
        age: u8,
        minimum_age: u8,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}
