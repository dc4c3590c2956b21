use serde::Serialize;

use super::domain::{Enrollment, EnrollmentId, NationalId, ScheduleId, SizeCode, Visitor, VisitorId};

/// Enrollment joined with its activity's display name. The engine returns
/// plain id linkage; this is the caller-facing enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentWithActivity {
    pub enrollment_id: EnrollmentId,
    pub schedule_id: ScheduleId,
    pub visitor_id: VisitorId,
    pub person_count: u32,
    pub terms_accepted: bool,
    pub activity_name: String,
}

impl EnrollmentWithActivity {
    pub fn new(enrollment: Enrollment, activity_name: String) -> Self {
        Self {
            enrollment_id: enrollment.id,
            schedule_id: enrollment.schedule_id,
            visitor_id: enrollment.visitor_id,
            person_count: enrollment.person_count,
            terms_accepted: enrollment.terms_accepted,
            activity_name,
        }
    }
}

/// Listing row that additionally exposes the visitor's public attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentWithVisitor {
    pub enrollment_id: EnrollmentId,
    pub schedule_id: ScheduleId,
    pub visitor_id: VisitorId,
    pub person_count: u32,
    pub terms_accepted: bool,
    pub activity_name: String,
    pub visitor_name: String,
    pub national_id: NationalId,
    pub age: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeCode>,
}

impl EnrollmentWithVisitor {
    pub fn new(enrollment: Enrollment, activity_name: String, visitor: Visitor) -> Self {
        Self {
            enrollment_id: enrollment.id,
            schedule_id: enrollment.schedule_id,
            visitor_id: enrollment.visitor_id,
            person_count: enrollment.person_count,
            terms_accepted: enrollment.terms_accepted,
            activity_name,
            visitor_name: visitor.name,
            national_id: visitor.national_id,
            age: visitor.age,
            size: visitor.size,
        }
    }
}
