//! In-process stand-ins for BuscaCursos, the catalog and a misbehaving store.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use buscacursos::buscacursos::{
    BuscaCursosError, CoursePayload, CourseSource, ScheduleEntry, SearchSession,
};
use buscacursos::catalogo::{CatalogError, SubjectCatalog};
use buscacursos::crawler::{CrawlSettings, Crawler};
use buscacursos::data::models::{CourseWrite, NewSubject, Period, StoredCourse, Term};
use buscacursos::data::{CourseStore, MemoryStore, StoreError};

pub const YEAR: i32 = 2024;
pub const PERIOD: Period = Period::S1;

/// Number of calls after which an injected fault stops firing.
pub const ALWAYS: usize = usize::MAX;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Consume one pending failure for `key`, if any.
fn trip(faults: &mut HashMap<String, usize>, key: &str) -> bool {
    match faults.get_mut(key) {
        Some(0) | None => false,
        Some(remaining) => {
            if *remaining != ALWAYS {
                *remaining -= 1;
            }
            true
        }
    }
}

pub fn slot(day: &str, module: u8, kind: &str, classroom: &str) -> ScheduleEntry {
    ScheduleEntry {
        day: day.to_owned(),
        module,
        classroom: classroom.to_owned(),
        kind: kind.to_owned(),
    }
}

/// A section with one teacher and a single Monday lecture.
pub fn course(code: &str, section: i32) -> CoursePayload {
    CoursePayload {
        code: code.to_owned(),
        section,
        nrc: format!("2{section:04}"),
        format: "Presencial".to_owned(),
        category: "Mínimo".to_owned(),
        allows_withdrawal: true,
        is_in_english: false,
        total_quota: 60,
        available_quota: 12,
        requires_special_approval: false,
        fg_area: String::new(),
        campus: "San Joaquín".to_owned(),
        teachers: vec!["Ana Pérez".to_owned()],
        schedule: vec![slot("L", 1, "CLAS", "B12")],
    }
}

pub fn with_teachers(mut course: CoursePayload, teachers: &[&str]) -> CoursePayload {
    course.teachers = teachers.iter().map(|t| (*t).to_owned()).collect();
    course
}

pub fn with_schedule(mut course: CoursePayload, schedule: Vec<ScheduleEntry>) -> CoursePayload {
    course.schedule = schedule;
    course
}

#[derive(Default)]
struct Listing {
    courses: Vec<CoursePayload>,
    search_faults: HashMap<String, usize>,
    open_faults: usize,
    /// 1-based open attempts that fail.
    failing_opens: HashSet<usize>,
    open_attempts: usize,
    searches: Vec<String>,
    sessions: usize,
}

/// Serves a fixed set of sections the way BuscaCursos does: every section
/// whose code starts with the searched code, truncated at `cap`.
pub struct ScriptedSource {
    cap: usize,
    listing: Arc<Mutex<Listing>>,
}

impl ScriptedSource {
    pub fn new(cap: usize, courses: Vec<CoursePayload>) -> Self {
        Self {
            cap,
            listing: Arc::new(Mutex::new(Listing {
                courses,
                ..Listing::default()
            })),
        }
    }

    pub fn set_courses(&self, courses: Vec<CoursePayload>) {
        lock(&self.listing).courses = courses;
    }

    /// Fail the next `times` searches for exactly `code`.
    pub fn fail_search(&self, code: &str, times: usize) {
        lock(&self.listing)
            .search_faults
            .insert(code.to_owned(), times);
    }

    /// Fail the next `times` attempts to open a session.
    pub fn fail_open(&self, times: usize) {
        lock(&self.listing).open_faults = times;
    }

    /// Fail only the `nth` attempt to open a session, counting from 1.
    pub fn fail_open_at(&self, nth: usize) {
        lock(&self.listing).failing_opens.insert(nth);
    }

    /// Every searched code, in order.
    pub fn searches(&self) -> Vec<String> {
        lock(&self.listing).searches.clone()
    }

    pub fn search_count(&self, code: &str) -> usize {
        lock(&self.listing)
            .searches
            .iter()
            .filter(|c| *c == code)
            .count()
    }

    pub fn sessions(&self) -> usize {
        lock(&self.listing).sessions
    }
}

#[async_trait]
impl CourseSource for ScriptedSource {
    async fn open_session(&self) -> Result<Box<dyn SearchSession>, BuscaCursosError> {
        let mut listing = lock(&self.listing);
        listing.open_attempts += 1;
        let attempt = listing.open_attempts;
        if listing.failing_opens.contains(&attempt) {
            return Err(BuscaCursosError::Status {
                status: 503,
                url: "scripted://session".to_owned(),
            });
        }
        if listing.open_faults > 0 {
            listing.open_faults -= 1;
            return Err(BuscaCursosError::Status {
                status: 503,
                url: "scripted://session".to_owned(),
            });
        }
        listing.sessions += 1;
        Ok(Box::new(ScriptedSession {
            cap: self.cap,
            listing: self.listing.clone(),
        }))
    }
}

struct ScriptedSession {
    cap: usize,
    listing: Arc<Mutex<Listing>>,
}

#[async_trait]
impl SearchSession for ScriptedSession {
    async fn search(
        &self,
        code: &str,
        year: i32,
        period: Period,
    ) -> Result<Vec<CoursePayload>, BuscaCursosError> {
        assert_eq!((year, period), (YEAR, PERIOD), "searched the wrong term");

        let mut listing = lock(&self.listing);
        listing.searches.push(code.to_owned());
        if trip(&mut listing.search_faults, code) {
            return Err(BuscaCursosError::Status {
                status: 500,
                url: format!("scripted://search/{code}"),
            });
        }

        Ok(listing
            .courses
            .iter()
            .filter(|c| c.code.starts_with(code))
            .take(self.cap)
            .cloned()
            .collect())
    }
}

/// Knows every subject except the ones marked missing.
#[derive(Default)]
pub struct FakeCatalog {
    missing: Mutex<HashSet<String>>,
    backfills: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, code: &str) {
        lock(&self.missing).insert(code.to_owned());
    }

    pub fn backfills(&self) -> Vec<String> {
        lock(&self.backfills).clone()
    }
}

#[async_trait]
impl SubjectCatalog for FakeCatalog {
    async fn backfill(&self, code: &str, store: &dyn CourseStore) -> Result<(), CatalogError> {
        lock(&self.backfills).push(code.to_owned());
        if lock(&self.missing).contains(code) {
            return Err(CatalogError::NotFound(code.to_owned()));
        }

        store
            .upsert_subject(&NewSubject {
                code: code.to_owned(),
                name: format!("Subject {code}"),
                credits: 10,
                ..NewSubject::default()
            })
            .await?;
        Ok(())
    }
}

#[derive(Default)]
struct Faults {
    find_term: usize,
    create_term: usize,
    campuses: HashMap<String, usize>,
    teachers: HashMap<String, usize>,
    /// Keyed by the course's subject code.
    saves: HashMap<String, usize>,
    save_calls: usize,
    /// Subject ids seen so far, to map course writes back to codes.
    subject_codes: HashMap<i32, String>,
}

/// Wraps a [`MemoryStore`] and fails selected calls.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    faults: Mutex<Faults>,
}

fn injected(what: &str) -> StoreError {
    StoreError::Rejected(format!("injected failure: {what}"))
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn fail_find_term(&self, times: usize) {
        lock(&self.faults).find_term = times;
    }

    pub fn fail_create_term(&self, times: usize) {
        lock(&self.faults).create_term = times;
    }

    pub fn fail_campus(&self, name: &str, times: usize) {
        lock(&self.faults).campuses.insert(name.to_owned(), times);
    }

    pub fn fail_teacher(&self, name: &str, times: usize) {
        lock(&self.faults).teachers.insert(name.to_owned(), times);
    }

    pub fn fail_save(&self, subject_code: &str, times: usize) {
        lock(&self.faults)
            .saves
            .insert(subject_code.to_owned(), times);
    }

    /// Number of `save_course` calls, failed ones included.
    pub fn save_calls(&self) -> usize {
        lock(&self.faults).save_calls
    }

    fn tick(counter: &mut usize) -> bool {
        match *counter {
            0 => false,
            ALWAYS => true,
            _ => {
                *counter -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl CourseStore for FlakyStore {
    async fn find_term(&self, year: i32, period: Period) -> Result<Option<Term>, StoreError> {
        if Self::tick(&mut lock(&self.faults).find_term) {
            return Err(injected("find_term"));
        }
        self.inner.find_term(year, period).await
    }

    async fn create_term(&self, year: i32, period: Period) -> Result<Term, StoreError> {
        if Self::tick(&mut lock(&self.faults).create_term) {
            return Err(injected("create_term"));
        }
        self.inner.create_term(year, period).await
    }

    async fn find_subject_id(&self, code: &str) -> Result<Option<i32>, StoreError> {
        let id = self.inner.find_subject_id(code).await?;
        if let Some(id) = id {
            lock(&self.faults).subject_codes.insert(id, code.to_owned());
        }
        Ok(id)
    }

    async fn upsert_subject(&self, subject: &NewSubject) -> Result<i32, StoreError> {
        let id = self.inner.upsert_subject(subject).await?;
        lock(&self.faults)
            .subject_codes
            .insert(id, subject.code.clone());
        Ok(id)
    }

    async fn get_or_create_campus(&self, name: &str) -> Result<i32, StoreError> {
        if trip(&mut lock(&self.faults).campuses, name) {
            return Err(injected("campus"));
        }
        self.inner.get_or_create_campus(name).await
    }

    async fn get_or_create_teacher(&self, name: &str) -> Result<i32, StoreError> {
        if trip(&mut lock(&self.faults).teachers, name) {
            return Err(injected("teacher"));
        }
        self.inner.get_or_create_teacher(name).await
    }

    async fn find_course(
        &self,
        term_id: i32,
        subject_code: &str,
        section: i32,
    ) -> Result<Option<StoredCourse>, StoreError> {
        self.inner.find_course(term_id, subject_code, section).await
    }

    async fn save_course(&self, write: &CourseWrite) -> Result<i32, StoreError> {
        {
            let mut faults = lock(&self.faults);
            faults.save_calls += 1;
            let code = faults.subject_codes.get(&write.record.subject_id).cloned();
            if code.is_some_and(|code| trip(&mut faults.saves, &code)) {
                return Err(injected("save_course"));
            }
        }
        self.inner.save_course(write).await
    }
}

/// Everything a crawler test needs, wired together.
pub struct Harness {
    pub memory: Arc<MemoryStore>,
    pub store: Arc<FlakyStore>,
    pub source: Arc<ScriptedSource>,
    pub catalog: Arc<FakeCatalog>,
    pub settings: CrawlSettings,
}

impl Harness {
    pub fn new(cap: usize, courses: Vec<CoursePayload>) -> Self {
        let memory = Arc::new(MemoryStore::new());
        Self {
            store: Arc::new(FlakyStore::new(memory.clone())),
            memory,
            source: Arc::new(ScriptedSource::new(cap, courses)),
            catalog: Arc::new(FakeCatalog::new()),
            settings: CrawlSettings {
                page_cap: cap,
                ..CrawlSettings::default()
            },
        }
    }

    pub fn crawler(&self) -> Crawler {
        Crawler::new(
            self.store.clone(),
            self.source.clone(),
            self.catalog.clone(),
            self.settings,
        )
    }
}
