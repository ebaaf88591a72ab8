use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{error, info, warn};
use url::Url;

use crate::buscacursos::BuscaCursosClient;
use crate::catalogo::CatalogClient;
use crate::config::Config;
use crate::crawler::Crawler;
use crate::data::models::Period;
use crate::data::{CourseStore, MemoryStore, PgStore};
use crate::utils::fmt_duration;

/// Main application struct: configuration plus a fully wired crawler.
pub struct App {
    crawler: Crawler,
    /// Set on dry runs, so the written rows can be summarized afterwards.
    memory: Option<Arc<MemoryStore>>,
}

impl App {
    /// Connect the store (or create an in-memory one) and build the clients.
    pub async fn new(config: Config, dry_run: bool) -> Result<Self, anyhow::Error> {
        let (store, memory) = if dry_run {
            info!("Dry run, using the in-memory store");
            let memory = Arc::new(MemoryStore::new());
            let store: Arc<dyn CourseStore> = memory.clone();
            (store, Some(memory))
        } else {
            let pool = Self::connect(&config).await?;
            let store: Arc<dyn CourseStore> = Arc::new(PgStore::new(pool));
            (store, None)
        };

        let buscacursos_url =
            Url::parse(&config.buscacursos_url).context("Failed to parse BUSCACURSOS_URL")?;
        let catalogo_url =
            Url::parse(&config.catalogo_url).context("Failed to parse CATALOGO_URL")?;

        let source = BuscaCursosClient::new(
            buscacursos_url,
            config.request_timeout,
            config.requests_per_second,
        );
        let catalog = CatalogClient::new(
            catalogo_url,
            config.request_timeout,
            config.requests_per_second,
        )
        .context("Failed to create catalog client")?;

        info!(
            buscacursos_url = %config.buscacursos_url,
            catalogo_url = %config.catalogo_url,
            request_timeout = fmt_duration(config.request_timeout),
            requests_per_second = config.requests_per_second.get(),
            "Clients configured"
        );

        let crawler = Crawler::new(
            store,
            Arc::new(source),
            Arc::new(catalog),
            config.crawl_settings(),
        );

        Ok(Self { crawler, memory })
    }

    async fn connect(config: &Config) -> Result<sqlx::PgPool, anyhow::Error> {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required unless running with --dry-run")?;

        let connect_options = PgConnectOptions::from_str(database_url)
            .context("Failed to parse database URL")?
            .log_statements(tracing::log::LevelFilter::Debug)
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(1));

        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect_with(connect_options)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 4,
            acquire_timeout = "4s",
            "Database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        Ok(pool)
    }

    /// Crawl one term. Only a fatal crawl error fails the process.
    pub async fn run(&self, year: i32, period: Period) -> ExitCode {
        let report = match self.crawler.run(year, period).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = ?e, "Crawl aborted");
                return ExitCode::FAILURE;
            }
        };

        if !report.unresolved.is_empty() {
            warn!(
                count = report.unresolved.len(),
                "Crawl finished with unresolved codes"
            );
        }

        if let Some(memory) = &self.memory {
            let counts = memory.counts();
            info!(
                terms = counts.terms,
                subjects = counts.subjects,
                campuses = counts.campuses,
                teachers = counts.teachers,
                courses = counts.courses,
                schedule_slots = counts.slots,
                "Dry run complete, rows that would have been written"
            );
        }

        ExitCode::SUCCESS
    }
}
