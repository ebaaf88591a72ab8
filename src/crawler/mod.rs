//! The crawl-and-reconcile pipeline.
//!
//! A run resolves the term, sweeps the whole code space once, then re-searches
//! every code that failed during that sweep exactly once more.

pub mod codes;
pub mod errors;
pub mod failures;
pub mod reconcile;
pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::buscacursos::{CourseSource, SearchSession};
use crate::catalogo::SubjectCatalog;
use crate::data::CourseStore;
use crate::data::models::{Period, Term};
use crate::utils::fmt_duration;

pub use codes::CodeIterator;
pub use errors::{CrawlError, RunPhase};
pub use failures::FailureRegistry;
pub use reconcile::Reconciler;
pub use state::{CourseKey, RunState};

/// BuscaCursos never lists more than this many courses per search.
pub const DEFAULT_PAGE_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    /// A search listing at least this many courses is assumed truncated.
    pub page_cap: usize,
    pub min_depth: usize,
    pub max_depth: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            page_cap: DEFAULT_PAGE_CAP,
            min_depth: codes::DEFAULT_MIN_DEPTH,
            max_depth: codes::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub term: Term,
    pub codes_searched: usize,
    /// Courses listed by all searches, repeated sightings included.
    pub units_observed: usize,
    pub units_saved: usize,
    /// Sightings skipped because the course was already reconciled this run.
    pub cache_hits: usize,
    /// Failed codes re-searched in the retry sweep.
    pub retried: usize,
    /// Codes that still failed after the retry sweep, sorted.
    pub unresolved: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

pub struct Crawler {
    store: Arc<dyn CourseStore>,
    source: Arc<dyn CourseSource>,
    catalog: Arc<dyn SubjectCatalog>,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(
        store: Arc<dyn CourseStore>,
        source: Arc<dyn CourseSource>,
        catalog: Arc<dyn SubjectCatalog>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            store,
            source,
            catalog,
            settings,
        }
    }

    /// Crawl every course of `year`/`period` into the store.
    ///
    /// Only a failure to resolve the term or to open the first search session
    /// aborts the run. Everything else is logged, retried once and, if it
    /// still fails, listed in [`RunReport::unresolved`].
    pub async fn run(&self, year: i32, period: Period) -> Result<RunReport, CrawlError> {
        let start = Instant::now();
        let started_at = Utc::now();
        info!(year, %period, "Starting crawl");

        let term = self.resolve_term(year, period).await?;
        let mut state = RunState::default();

        let session = self
            .source
            .open_session()
            .await
            .map_err(|e| CrawlError::fatal(RunPhase::PrimarySweep, e))?;
        self.primary_sweep(session.as_ref(), &term, &mut state).await;
        drop(session);

        let failed = state.failures.take();
        let mut retried = 0;
        if failed.is_empty() {
            info!(phase = %RunPhase::RetrySweep, "No failed codes to retry");
        } else {
            match self.source.open_session().await {
                Ok(session) => {
                    retried = failed.len();
                    self.retry_sweep(session.as_ref(), &term, &mut state, &failed)
                        .await;
                }
                Err(e) => {
                    error!(
                        phase = %RunPhase::RetrySweep,
                        error = %e,
                        count = failed.len(),
                        "Failed to open retry session, failed codes stay unresolved"
                    );
                    for code in &failed {
                        state.failures.record(code);
                    }
                }
            }
        }

        let unresolved = state.failures.take();
        if !unresolved.is_empty() {
            error!(
                count = unresolved.len(),
                codes = %unresolved.join(", "),
                "Codes still failing after retry"
            );
        }

        let counters = state.counters;
        let elapsed = start.elapsed();
        info!(
            phase = %RunPhase::Done,
            %term,
            codes_searched = counters.codes_searched,
            units_observed = counters.units_observed,
            units_saved = counters.units_saved,
            cache_hits = counters.cache_hits,
            unresolved = unresolved.len(),
            duration = fmt_duration(elapsed),
            "Crawl finished"
        );

        Ok(RunReport {
            term,
            codes_searched: counters.codes_searched,
            units_observed: counters.units_observed,
            units_saved: counters.units_saved,
            cache_hits: counters.cache_hits,
            retried,
            unresolved,
            started_at,
            elapsed,
        })
    }

    async fn resolve_term(&self, year: i32, period: Period) -> Result<Term, CrawlError> {
        let phase = RunPhase::ResolvingTerm;
        let existing = self
            .store
            .find_term(year, period)
            .await
            .map_err(|e| CrawlError::fatal(phase, e))?;

        let term = match existing {
            Some(term) => term,
            None => {
                let term = self
                    .store
                    .create_term(year, period)
                    .await
                    .map_err(|e| CrawlError::fatal(phase, e))?;
                info!(term_id = term.id, %term, "Created term");
                term
            }
        };

        debug!(term_id = term.id, %term, "Resolved term");
        Ok(term)
    }

    async fn primary_sweep(&self, session: &dyn SearchSession, term: &Term, state: &mut RunState) {
        info!(phase = %RunPhase::PrimarySweep, %term, "Sweeping code space");

        let codes = CodeIterator::with_depths(self.settings.min_depth, self.settings.max_depth);
        let mut reconciler = Reconciler::new(self.store.as_ref(), self.catalog.as_ref(), term, state);
        self.sweep(&mut reconciler, session, codes).await;
    }

    /// Search every failed code once more. A retried code that now saturates
    /// the cap has its longer codes searched as well.
    async fn retry_sweep(
        &self,
        session: &dyn SearchSession,
        term: &Term,
        state: &mut RunState,
        failed: &[String],
    ) {
        info!(phase = %RunPhase::RetrySweep, count = failed.len(), "Retrying failed codes");

        let mut reconciler = Reconciler::new(self.store.as_ref(), self.catalog.as_ref(), term, state);
        for code in failed {
            let count = reconciler.reconcile(session, code).await;
            if count >= self.settings.page_cap {
                debug!(code = %code, count, "Retried code reached the result cap, searching longer codes");
                let below = CodeIterator::below(code, self.settings.max_depth);
                self.sweep(&mut reconciler, session, below).await;
            }
        }
    }

    async fn sweep(
        &self,
        reconciler: &mut Reconciler<'_>,
        session: &dyn SearchSession,
        mut codes: CodeIterator,
    ) {
        while let Some(code) = codes.next() {
            let count = reconciler.reconcile(session, &code).await;
            if count >= self.settings.page_cap && codes.add_depth() {
                debug!(code = %code, count, "Result cap reached, searching longer codes");
            }
        }
    }
}
