//! Row types and value enums shared by the store implementations.

use std::fmt;
use std::str::FromStr;

/// Academic period within a year.
///
/// BuscaCursos numbers them `1`, `2` and `3`, the last one being the summer
/// term (TAV, "temporada académica de verano").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "period", rename_all = "UPPERCASE")]
pub enum Period {
    S1,
    S2,
    Tav,
}

impl Period {
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::S1),
            2 => Some(Self::S2),
            3 => Some(Self::Tav),
            _ => None,
        }
    }

    /// The number used in BuscaCursos semester identifiers (`2024-1`).
    pub fn number(self) -> u8 {
        match self {
            Self::S1 => 1,
            Self::S2 => 2,
            Self::Tav => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S1 => "S1",
            Self::S2 => "S2",
            Self::Tav => "TAV",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S1" | "1" => Ok(Self::S1),
            "S2" | "2" => Ok(Self::S2),
            "TAV" | "3" => Ok(Self::Tav),
            other => Err(format!("unknown period '{other}' (expected S1, S2, TAV or 1-3)")),
        }
    }
}

/// Day of the week as abbreviated by BuscaCursos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "L" => Some(Self::Monday),
            "M" => Some(Self::Tuesday),
            "W" => Some(Self::Wednesday),
            "J" => Some(Self::Thursday),
            "V" => Some(Self::Friday),
            "S" => Some(Self::Saturday),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Monday => "L",
            Self::Tuesday => "M",
            Self::Wednesday => "W",
            Self::Thursday => "J",
            Self::Friday => "V",
            Self::Saturday => "S",
        }
    }
}

/// Lowest and highest module (class block) index within a day.
pub const FIRST_MODULE: i16 = 1;
pub const LAST_MODULE: i16 = 7;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Term {
    pub id: i32,
    pub year: i32,
    pub period: Period,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.period.number())
    }
}

/// How a subject's prerequisites combine with its restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[sqlx(type_name = "requirement_relation", rename_all = "lowercase")]
pub enum RequirementRelation {
    And,
    Or,
    #[default]
    Null,
}

/// A subject as scraped from the catalog, ready to be upserted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewSubject {
    pub code: String,
    pub name: String,
    pub credits: i32,
    pub school: Option<String>,
    pub academic_level: Option<String>,
    pub prerequisites_raw: String,
    pub requirements_relation: RequirementRelation,
    pub restrictions: String,
    pub equivalences_raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TeacherRef {
    pub id: i32,
    pub name: String,
}

/// The parts of a stored course the reconciler needs to compute a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCourse {
    pub id: i32,
    pub schedule_summary: Option<String>,
    /// Attached teachers in roster order.
    pub teachers: Vec<TeacherRef>,
}

/// Scalar columns of a course row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRecord {
    pub term_id: i32,
    pub subject_id: i32,
    pub campus_id: i32,
    pub section: i32,
    pub nrc: String,
    pub format: String,
    pub category: String,
    pub fg_area: String,
    pub is_removable: bool,
    pub is_english: bool,
    pub need_special_approval: bool,
    pub total_quota: i32,
    pub available_quota: i32,
    pub schedule_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub day: Day,
    pub module: i16,
    pub classroom: String,
    pub kind: String,
}

/// Teacher association changes for one course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeacherChanges {
    pub detached: Vec<i32>,
    pub attached: Vec<i32>,
    /// Every teacher that should remain attached, in roster order.
    pub roster: Vec<i32>,
}

/// Everything written for one course in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseWrite {
    pub record: CourseRecord,
    pub teachers: TeacherChanges,
    /// `Some` replaces every slot of the course, `None` leaves them untouched.
    pub schedule: Option<Vec<ScheduleSlot>>,
}
