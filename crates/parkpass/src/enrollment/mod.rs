//! Visitor enrollment for capacity-bounded activity sessions.
//!
//! A batch enroll call validates the request in a fixed order, resolves or
//! creates visitor identities, checks eligibility against the activity's
//! rules, and commits enrollment rows together with the schedule occupancy
//! counter as one atomic unit. Storage sits behind the collaborator traits
//! in [`repository`], so the engine can run against anything from the
//! in-memory adapters in the api binary to a relational backend.

pub mod domain;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Activity, ActivityId, Enrollment, EnrollmentId, InvalidSizeCode, NationalId, NewEnrollment,
    NewVisitor, Schedule, ScheduleId, ScheduleStatus, SizeCode, Visitor, VisitorDraft,
    VisitorField, VisitorId, VisitorInput, MAX_VISITOR_AGE,
};
pub use report::{EnrollmentWithActivity, EnrollmentWithVisitor};
pub use repository::{
    ActivityCatalog, CapacityClaim, CommitError, CreateOutcome, EnrollmentFilter, EnrollmentStore,
    StorageError, VisitorDirectory,
};
pub use router::{enrollment_router, EnrollmentRequest, VisitorPayload};
pub use service::{EnrollmentError, EnrollmentPolicy, EnrollmentService};
