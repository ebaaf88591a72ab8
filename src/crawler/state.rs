use std::collections::{HashMap, HashSet};

use super::failures::FailureRegistry;

/// Identifies a course within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseKey {
    pub subject_code: String,
    pub section: i32,
    pub term_id: i32,
}

impl CourseKey {
    pub fn new(subject_code: &str, section: i32, term_id: i32) -> Self {
        Self {
            subject_code: subject_code.to_owned(),
            section,
            term_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub codes_searched: usize,
    pub units_observed: usize,
    pub units_saved: usize,
    pub cache_hits: usize,
}

/// Caches and bookkeeping scoped to a single run.
///
/// Nothing here outlives the run, so a new run always starts cold and
/// re-reads the store.
#[derive(Debug, Default)]
pub struct RunState {
    /// Courses already reconciled cleanly; repeated sightings are skipped.
    pub processed: HashSet<CourseKey>,
    pub subjects: HashMap<String, i32>,
    pub campuses: HashMap<String, i32>,
    pub teachers: HashMap<String, i32>,
    pub failures: FailureRegistry,
    pub counters: RunCounters,
}
