//! In-memory [`CourseStore`] used for dry runs and tests.
//!
//! Mirrors the constraints of the PostgreSQL schema that the crawler relies
//! on: unique keys, foreign keys on course writes, and all-or-nothing
//! course saves.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::data::models::{
    CourseRecord, CourseWrite, NewSubject, Period, ScheduleSlot, StoredCourse, TeacherRef, Term,
};
use crate::data::store::{CourseStore, StoreError};

/// A schedule slot together with the id it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSlot {
    pub id: i32,
    pub slot: ScheduleSlot,
}

/// A read-only copy of one stored course.
#[derive(Debug, Clone)]
pub struct CourseSnapshot {
    pub id: i32,
    pub subject_code: String,
    pub record: CourseRecord,
    pub teachers: Vec<String>,
    pub slots: Vec<StoredSlot>,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCounts {
    pub terms: usize,
    pub subjects: usize,
    pub campuses: usize,
    pub teachers: usize,
    pub courses: usize,
    pub slots: usize,
}

#[derive(Debug)]
struct CourseRow {
    id: i32,
    record: CourseRecord,
    teachers: Vec<i32>,
    slots: Vec<StoredSlot>,
}

#[derive(Debug, Default)]
struct Tables {
    last_id: i32,
    terms: Vec<Term>,
    subjects: HashMap<String, (i32, NewSubject)>,
    campuses: HashMap<String, i32>,
    teachers: HashMap<String, i32>,
    courses: Vec<CourseRow>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn subject_code(&self, subject_id: i32) -> Option<&str> {
        self.subjects
            .iter()
            .find(|(_, (id, _))| *id == subject_id)
            .map(|(code, _)| code.as_str())
    }

    fn teacher_name(&self, teacher_id: i32) -> Option<&str> {
        self.teachers
            .iter()
            .find(|(_, id)| **id == teacher_id)
            .map(|(name, _)| name.as_str())
    }

    fn snapshot(&self, row: &CourseRow) -> CourseSnapshot {
        CourseSnapshot {
            id: row.id,
            subject_code: self
                .subject_code(row.record.subject_id)
                .unwrap_or_default()
                .to_owned(),
            record: row.record.clone(),
            teachers: row
                .teachers
                .iter()
                .filter_map(|id| self.teacher_name(*id).map(str::to_owned))
                .collect(),
            slots: row.slots.clone(),
        }
    }

    /// Reject writes the PostgreSQL foreign keys would reject.
    fn check_references(&self, write: &CourseWrite) -> Result<(), StoreError> {
        let record = &write.record;
        if !self.terms.iter().any(|t| t.id == record.term_id) {
            return Err(StoreError::Rejected(format!("unknown term {}", record.term_id)));
        }
        if self.subject_code(record.subject_id).is_none() {
            return Err(StoreError::Rejected(format!(
                "unknown subject {}",
                record.subject_id
            )));
        }
        if !self.campuses.values().any(|id| *id == record.campus_id) {
            return Err(StoreError::Rejected(format!(
                "unknown campus {}",
                record.campus_id
            )));
        }
        if let Some(missing) = write
            .teachers
            .roster
            .iter()
            .find(|id| self.teacher_name(**id).is_none())
        {
            return Err(StoreError::Rejected(format!("unknown teacher {missing}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn counts(&self) -> MemoryCounts {
        let tables = self.lock();
        MemoryCounts {
            terms: tables.terms.len(),
            subjects: tables.subjects.len(),
            campuses: tables.campuses.len(),
            teachers: tables.teachers.len(),
            courses: tables.courses.len(),
            slots: tables.courses.iter().map(|c| c.slots.len()).sum(),
        }
    }

    /// Look up a stored course by its natural key.
    pub fn course(&self, term_id: i32, subject_code: &str, section: i32) -> Option<CourseSnapshot> {
        let tables = self.lock();
        let subject_id = tables.subjects.get(subject_code)?.0;
        tables
            .courses
            .iter()
            .find(|c| {
                c.record.term_id == term_id
                    && c.record.subject_id == subject_id
                    && c.record.section == section
            })
            .map(|row| tables.snapshot(row))
    }

    pub fn courses(&self) -> Vec<CourseSnapshot> {
        let tables = self.lock();
        tables.courses.iter().map(|row| tables.snapshot(row)).collect()
    }

    pub fn subject(&self, code: &str) -> Option<NewSubject> {
        self.lock().subjects.get(code).map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn find_term(&self, year: i32, period: Period) -> Result<Option<Term>, StoreError> {
        Ok(self
            .lock()
            .terms
            .iter()
            .find(|t| t.year == year && t.period == period)
            .cloned())
    }

    async fn create_term(&self, year: i32, period: Period) -> Result<Term, StoreError> {
        let mut tables = self.lock();
        if let Some(term) = tables
            .terms
            .iter()
            .find(|t| t.year == year && t.period == period)
        {
            return Ok(term.clone());
        }
        let term = Term {
            id: tables.next_id(),
            year,
            period,
        };
        tables.terms.push(term.clone());
        Ok(term)
    }

    async fn find_subject_id(&self, code: &str) -> Result<Option<i32>, StoreError> {
        Ok(self.lock().subjects.get(code).map(|(id, _)| *id))
    }

    async fn upsert_subject(&self, subject: &NewSubject) -> Result<i32, StoreError> {
        let mut tables = self.lock();
        if let Some((id, existing)) = tables.subjects.get_mut(&subject.code) {
            *existing = subject.clone();
            return Ok(*id);
        }
        let id = tables.next_id();
        tables
            .subjects
            .insert(subject.code.clone(), (id, subject.clone()));
        Ok(id)
    }

    async fn get_or_create_campus(&self, name: &str) -> Result<i32, StoreError> {
        let mut tables = self.lock();
        if let Some(id) = tables.campuses.get(name) {
            return Ok(*id);
        }
        let id = tables.next_id();
        tables.campuses.insert(name.to_owned(), id);
        Ok(id)
    }

    async fn get_or_create_teacher(&self, name: &str) -> Result<i32, StoreError> {
        let mut tables = self.lock();
        if let Some(id) = tables.teachers.get(name) {
            return Ok(*id);
        }
        let id = tables.next_id();
        tables.teachers.insert(name.to_owned(), id);
        Ok(id)
    }

    async fn find_course(
        &self,
        term_id: i32,
        subject_code: &str,
        section: i32,
    ) -> Result<Option<StoredCourse>, StoreError> {
        let tables = self.lock();
        let Some((subject_id, _)) = tables.subjects.get(subject_code) else {
            return Ok(None);
        };
        let Some(row) = tables.courses.iter().find(|c| {
            c.record.term_id == term_id
                && c.record.subject_id == *subject_id
                && c.record.section == section
        }) else {
            return Ok(None);
        };

        Ok(Some(StoredCourse {
            id: row.id,
            schedule_summary: Some(row.record.schedule_summary.clone()),
            teachers: row
                .teachers
                .iter()
                .filter_map(|id| {
                    tables.teacher_name(*id).map(|name| TeacherRef {
                        id: *id,
                        name: name.to_owned(),
                    })
                })
                .collect(),
        }))
    }

    async fn save_course(&self, write: &CourseWrite) -> Result<i32, StoreError> {
        let mut tables = self.lock();
        // Validate before touching anything so a rejected write leaves no trace.
        tables.check_references(write)?;

        let record = &write.record;
        let existing = tables.courses.iter().position(|c| {
            c.record.term_id == record.term_id
                && c.record.subject_id == record.subject_id
                && c.record.section == record.section
        });

        let new_slots: Option<Vec<StoredSlot>> = write.schedule.as_ref().map(|slots| {
            slots
                .iter()
                .map(|slot| StoredSlot {
                    id: tables.next_id(),
                    slot: slot.clone(),
                })
                .collect()
        });

        match existing {
            Some(index) => {
                let row = &mut tables.courses[index];
                row.record = record.clone();
                row.teachers = write.teachers.roster.clone();
                if let Some(slots) = new_slots {
                    row.slots = slots;
                }
                Ok(row.id)
            }
            None => {
                let id = tables.next_id();
                tables.courses.push(CourseRow {
                    id,
                    record: record.clone(),
                    teachers: write.teachers.roster.clone(),
                    slots: new_slots.unwrap_or_default(),
                });
                Ok(id)
            }
        }
    }
}
