//! Reconciles the courses listed by one search against the store.

use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::anyhow;
use indexmap::IndexSet;
use tracing::{Instrument, debug, error, info, info_span, trace};

use super::errors::CrawlError;
use super::state::{CourseKey, RunState};
use crate::buscacursos::{CoursePayload, ScheduleEntry, SearchSession};
use crate::catalogo::SubjectCatalog;
use crate::data::CourseStore;
use crate::data::models::{
    CourseRecord, CourseWrite, Day, FIRST_MODULE, LAST_MODULE, ScheduleSlot, StoredCourse,
    TeacherChanges, Term,
};

/// How a course came out of reconciliation when it did get saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Saved {
    Clean,
    /// Saved with some teachers missing; it must be looked at again.
    Partial,
}

pub struct Reconciler<'a> {
    store: &'a dyn CourseStore,
    catalog: &'a dyn SubjectCatalog,
    term: &'a Term,
    state: &'a mut RunState,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn CourseStore,
        catalog: &'a dyn SubjectCatalog,
        term: &'a Term,
        state: &'a mut RunState,
    ) -> Self {
        Self {
            store,
            catalog,
            term,
            state,
        }
    }

    /// Search `code` and reconcile every listed course.
    ///
    /// Returns how many courses the search listed, which the caller compares
    /// against the result cap. Failures are logged and registered, never
    /// returned: a failed search reports zero courses.
    pub async fn reconcile(&mut self, session: &dyn SearchSession, code: &str) -> usize {
        let span = info_span!("search", code);
        async move { self.reconcile_code(session, code).await }
            .instrument(span)
            .await
    }

    async fn reconcile_code(&mut self, session: &dyn SearchSession, code: &str) -> usize {
        self.state.counters.codes_searched += 1;

        let courses = match session.search(code, self.term.year, self.term.period).await {
            Ok(courses) => courses,
            Err(source) => {
                let err = CrawlError::Fetch {
                    code: code.to_owned(),
                    source,
                };
                error!(error = ?err, "Search failed");
                self.state.failures.record(code);
                return 0;
            }
        };

        if courses.is_empty() {
            trace!("No courses listed");
            return 0;
        }
        debug!(count = courses.len(), "Search listed courses");

        for course in &courses {
            self.state.counters.units_observed += 1;

            let key = CourseKey::new(&course.code, course.section, self.term.id);
            if self.state.processed.contains(&key) {
                self.state.counters.cache_hits += 1;
                trace!(course = %course.code, section = course.section, "Already processed");
                continue;
            }

            match self.reconcile_course(course).await {
                Ok(saved) => {
                    self.state.counters.units_saved += 1;
                    if saved == Saved::Clean {
                        self.state.processed.insert(key);
                    }
                }
                Err(err) => {
                    error!(
                        course = %course.code,
                        section = course.section,
                        error = ?err,
                        "Failed to reconcile course"
                    );
                    self.state.failures.record(&course.code);
                }
            }
        }

        courses.len()
    }

    async fn reconcile_course(&mut self, course: &CoursePayload) -> Result<Saved, CrawlError> {
        let stored = self
            .store
            .find_course(self.term.id, &course.code, course.section)
            .await
            .map_err(|source| CrawlError::Resolution {
                entity: "course",
                key: format!("{}-{}", course.code, course.section),
                source: source.into(),
            })?;

        let subject_id = self.resolve_subject(&course.code).await?;
        let slots = build_slots(&course.schedule)?;
        let summary = schedule_summary(&course.schedule);
        let campus_id = self.resolve_campus(&course.campus).await?;
        let (teachers, complete) = self.reconcile_teachers(course, stored.as_ref()).await;

        let schedule_changed = stored
            .as_ref()
            .and_then(|s| s.schedule_summary.as_deref())
            != Some(summary.as_str());

        let write = CourseWrite {
            record: CourseRecord {
                term_id: self.term.id,
                subject_id,
                campus_id,
                section: course.section,
                nrc: course.nrc.clone(),
                format: course.format.clone(),
                category: course.category.clone(),
                fg_area: course.fg_area.clone(),
                is_removable: course.allows_withdrawal,
                is_english: course.is_in_english,
                need_special_approval: course.requires_special_approval,
                total_quota: course.total_quota,
                available_quota: course.available_quota,
                schedule_summary: summary,
            },
            teachers,
            schedule: schedule_changed.then_some(slots),
        };

        let course_id =
            self.store
                .save_course(&write)
                .await
                .map_err(|source| CrawlError::Persistence {
                    code: course.code.clone(),
                    section: course.section,
                    source,
                })?;

        debug!(
            course = %course.code,
            section = course.section,
            course_id,
            created = stored.is_none(),
            schedule_changed,
            detached = write.teachers.detached.len(),
            attached = write.teachers.attached.len(),
            "Saved course"
        );

        Ok(if complete { Saved::Clean } else { Saved::Partial })
    }

    /// Run cache, then store, then a catalog backfill followed by a re-read.
    async fn resolve_subject(&mut self, code: &str) -> Result<i32, CrawlError> {
        if let Some(&id) = self.state.subjects.get(code) {
            return Ok(id);
        }

        let unresolved = |source: anyhow::Error| CrawlError::Resolution {
            entity: "subject",
            key: code.to_owned(),
            source,
        };

        let id = match self
            .store
            .find_subject_id(code)
            .await
            .map_err(|e| unresolved(e.into()))?
        {
            Some(id) => id,
            None => {
                info!(code, "Subject not in store, backfilling from catalog");
                self.catalog
                    .backfill(code, self.store)
                    .await
                    .map_err(|e| unresolved(e.into()))?;
                self.store
                    .find_subject_id(code)
                    .await
                    .map_err(|e| unresolved(e.into()))?
                    .ok_or_else(|| unresolved(anyhow!("subject still missing after backfill")))?
            }
        };

        self.state.subjects.insert(code.to_owned(), id);
        Ok(id)
    }

    async fn resolve_campus(&mut self, name: &str) -> Result<i32, CrawlError> {
        if let Some(&id) = self.state.campuses.get(name) {
            return Ok(id);
        }

        let id = self
            .store
            .get_or_create_campus(name)
            .await
            .map_err(|source| CrawlError::Resolution {
                entity: "campus",
                key: name.to_owned(),
                source: source.into(),
            })?;

        self.state.campuses.insert(name.to_owned(), id);
        Ok(id)
    }

    async fn resolve_teacher(&mut self, name: &str) -> Result<i32, CrawlError> {
        if let Some(&id) = self.state.teachers.get(name) {
            return Ok(id);
        }

        let id = self
            .store
            .get_or_create_teacher(name)
            .await
            .map_err(|source| CrawlError::Resolution {
                entity: "teacher",
                key: name.to_owned(),
                source: source.into(),
            })?;

        self.state.teachers.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Diff the listed roster against the attached teachers.
    ///
    /// A teacher that cannot be resolved is left out and the course's code is
    /// registered as failed; the returned flag is `false` in that case.
    async fn reconcile_teachers(
        &mut self,
        course: &CoursePayload,
        stored: Option<&StoredCourse>,
    ) -> (TeacherChanges, bool) {
        let roster: IndexSet<&str> = course
            .teachers
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .collect();
        let current = stored.map(|s| s.teachers.as_slice()).unwrap_or_default();

        let mut changes = TeacherChanges::default();
        let mut ids: HashMap<&str, i32> = HashMap::new();

        for teacher in current {
            if roster.contains(teacher.name.as_str()) {
                ids.insert(teacher.name.as_str(), teacher.id);
            } else {
                changes.detached.push(teacher.id);
            }
        }

        let mut complete = true;
        for &name in &roster {
            if ids.contains_key(name) {
                continue;
            }
            match self.resolve_teacher(name).await {
                Ok(id) => {
                    changes.attached.push(id);
                    ids.insert(name, id);
                }
                Err(err) => {
                    error!(
                        course = %course.code,
                        section = course.section,
                        teacher = name,
                        error = ?err,
                        "Failed to resolve teacher"
                    );
                    self.state.failures.record(&course.code);
                    complete = false;
                }
            }
        }

        changes.roster = roster
            .iter()
            .filter_map(|name| ids.get(name).copied())
            .collect();

        (changes, complete)
    }
}

/// Canonical one-line rendering of a schedule, used to detect changes.
///
/// Entries keep their listing order, so a reordered listing counts as a change.
/// Separators inside a field are backslash-escaped, so distinct schedules
/// never render the same.
pub fn schedule_summary(entries: &[ScheduleEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "{}{}:{}:{}",
                escape_field(&e.day),
                e.module,
                escape_field(&e.kind),
                escape_field(&e.classroom)
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if !field.contains(['\\', ':', ';']) {
        return Cow::Borrowed(field);
    }

    let mut escaped = String::with_capacity(field.len() + 2);
    for ch in field.chars() {
        if matches!(ch, '\\' | ':' | ';') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

fn build_slots(entries: &[ScheduleEntry]) -> Result<Vec<ScheduleSlot>, CrawlError> {
    entries
        .iter()
        .map(|entry| {
            let day = Day::from_symbol(&entry.day).ok_or_else(|| {
                CrawlError::InvalidPayload(format!("unknown day '{}'", entry.day))
            })?;

            let module = i16::from(entry.module);
            if !(FIRST_MODULE..=LAST_MODULE).contains(&module) {
                return Err(CrawlError::InvalidPayload(format!(
                    "module {module} outside {FIRST_MODULE}-{LAST_MODULE}"
                )));
            }

            Ok(ScheduleSlot {
                day,
                module,
                classroom: entry.classroom.clone(),
                kind: entry.kind.clone(),
            })
        })
        .collect()
}
