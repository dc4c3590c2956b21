use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for catalog activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityId(pub u64);

/// Identifier wrapper for activity time slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleId(pub u64);

/// Identifier wrapper for visitor records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisitorId(pub u64);

/// Identifier wrapper for committed enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnrollmentId(pub u64);

/// Natural key identifying a person across visits (e.g. a national id
/// number). Always a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NationalId(pub u64);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A bookable experience with optional eligibility rules. Read-only
/// collaborator data from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub requires_size: bool,
    pub minimum_age: Option<u8>,
    pub description: Option<String>,
}

/// Whether a schedule currently accepts enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Active,
    Inactive,
}

impl ScheduleStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A capacity-bounded time slot for an activity.
///
/// Invariant: `occupied_capacity` never exceeds `total_capacity`. Only the
/// enrollment commit advances the counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub activity_id: ActivityId,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub total_capacity: u32,
    pub occupied_capacity: u32,
    pub status: ScheduleStatus,
}

impl Schedule {
    /// Seats still open on this slot.
    pub fn available(&self) -> u32 {
        self.total_capacity.saturating_sub(self.occupied_capacity)
    }
}

/// Garment/harness size codes accepted for activities that require one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizeCode {
    Xs,
    S,
    M,
    L,
    Xl,
    Xxl,
}

impl SizeCode {
    pub const fn code(self) -> &'static str {
        match self {
            SizeCode::Xs => "XS",
            SizeCode::S => "S",
            SizeCode::M => "M",
            SizeCode::L => "L",
            SizeCode::Xl => "XL",
            SizeCode::Xxl => "XXL",
        }
    }
}

impl fmt::Display for SizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSizeCode(pub String);

impl fmt::Display for InvalidSizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized size code '{}'", self.0)
    }
}

impl std::error::Error for InvalidSizeCode {}

impl FromStr for SizeCode {
    type Err = InvalidSizeCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "XS" => Ok(SizeCode::Xs),
            "S" => Ok(SizeCode::S),
            "M" => Ok(SizeCode::M),
            "L" => Ok(SizeCode::L),
            "XL" => Ok(SizeCode::Xl),
            "XXL" => Ok(SizeCode::Xxl),
            _ => Err(InvalidSizeCode(value.to_string())),
        }
    }
}

/// A person identity. Created once, looked up by national id afterwards;
/// the engine deletes one only as compensating rollback within the failed
/// batch that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: VisitorId,
    pub name: String,
    pub national_id: NationalId,
    pub age: u8,
    pub size: Option<SizeCode>,
}

/// Fields of a natural-key tuple that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorField {
    Name,
    NationalId,
    Age,
    Size,
}

pub const MAX_VISITOR_AGE: i64 = 120;

/// Unvalidated natural-key tuple supplied by a caller for
/// resolve-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorDraft {
    pub name: String,
    pub national_id: u64,
    pub age: i64,
    pub size: Option<String>,
}

impl VisitorDraft {
    /// Check every field, collecting the invalid ones so the caller can be
    /// told about all of them at once.
    pub fn validate(&self) -> Result<NewVisitor, Vec<VisitorField>> {
        let mut invalid = Vec::new();

        let name = self.name.trim();
        if !is_valid_name(name) {
            invalid.push(VisitorField::Name);
        }
        if self.national_id == 0 {
            invalid.push(VisitorField::NationalId);
        }
        if !(0..=MAX_VISITOR_AGE).contains(&self.age) {
            invalid.push(VisitorField::Age);
        }
        let size = match &self.size {
            None => None,
            Some(raw) => match raw.parse::<SizeCode>() {
                Ok(code) => Some(code),
                Err(_) => {
                    invalid.push(VisitorField::Size);
                    None
                }
            },
        };

        if !invalid.is_empty() {
            return Err(invalid);
        }

        Ok(NewVisitor {
            name: name.to_string(),
            national_id: NationalId(self.national_id),
            age: self.age as u8,
            size,
        })
    }
}

fn is_valid_name(name: &str) -> bool {
    name.chars().any(char::is_alphanumeric)
        && name.chars().all(|c| c.is_alphanumeric() || c == ' ')
}

/// Validated visitor payload, ready for the directory to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVisitor {
    pub name: String,
    pub national_id: NationalId,
    pub age: u8,
    pub size: Option<SizeCode>,
}

/// One entry of an enroll batch: an existing visitor reference or the
/// natural-key tuple used to resolve-or-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitorInput {
    ByReference(VisitorId),
    ByNaturalKey(VisitorDraft),
}

/// The binding of one visitor to one schedule. `person_count` is always 1;
/// group bookings are expressed as one row per visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub schedule_id: ScheduleId,
    pub visitor_id: VisitorId,
    pub person_count: u32,
    pub terms_accepted: bool,
}

/// Staged, not-yet-persisted enrollment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEnrollment {
    pub schedule_id: ScheduleId,
    pub visitor_id: VisitorId,
    pub person_count: u32,
    pub terms_accepted: bool,
}
