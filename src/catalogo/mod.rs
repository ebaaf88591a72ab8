//! Course catalog client, used to backfill subjects that BuscaCursos lists
//! but the store has never seen.

pub mod parse;

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, info, trace};
use url::Url;

use crate::data::models::NewSubject;
use crate::data::{CourseStore, StoreError};
use parse::{parse_listing, parse_requisites};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("subject {0} is not listed in the catalog")]
    NotFound(String),
    #[error("catalog responded with status {status}")]
    Status { status: u16, url: String },
    #[error("Failed to parse catalog page")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    RequestFailed(#[from] reqwest::Error),
    #[error("failed to store subject")]
    Store(#[from] StoreError),
}

/// Populates the store with a subject row as a side effect.
#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    async fn backfill(&self, code: &str, store: &dyn CourseStore) -> Result<(), CatalogError>;
}

pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
    limiter: DefaultDirectRateLimiter,
}

impl CatalogClient {
    /// Every page fetch waits on a limiter allowing `requests_per_second`.
    pub fn new(
        base_url: Url,
        timeout: Duration,
        requests_per_second: NonZeroU32,
    ) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
        })
    }

    fn page_url(&self, view: &str, code: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("tmpl", "component")
            .append_pair("option", "com_catalogo")
            .append_pair("view", view)
            .append_pair("sigla", code);
        url
    }

    async fn fetch_page(&self, url: &Url) -> Result<String, CatalogError> {
        self.limiter.until_ready().await;
        trace!(%url, "Requesting catalog page");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Scrape a subject from the listing and requisites pages.
    pub async fn fetch_subject(&self, code: &str) -> Result<NewSubject, CatalogError> {
        let listing_url = self.page_url("cursoslist", code);
        let body = self.fetch_page(&listing_url).await?;
        let listing = parse_listing(&body, code)
            .map_err(|source| CatalogError::ParseFailed {
                url: listing_url.to_string(),
                source,
            })?
            .ok_or_else(|| CatalogError::NotFound(code.to_owned()))?;

        let requisites_url = self.page_url("requisitos", code);
        let requisites = parse_requisites(&self.fetch_page(&requisites_url).await?);
        debug!(code, relation = ?requisites.relation, "Fetched subject requisites");

        Ok(NewSubject {
            code: code.to_owned(),
            name: listing.name,
            credits: listing.credits,
            school: listing.school,
            academic_level: listing.academic_level,
            prerequisites_raw: requisites.prerequisites,
            requirements_relation: requisites.relation,
            restrictions: requisites.restrictions,
            equivalences_raw: requisites.equivalences,
        })
    }
}

#[async_trait]
impl SubjectCatalog for CatalogClient {
    async fn backfill(&self, code: &str, store: &dyn CourseStore) -> Result<(), CatalogError> {
        let subject = self.fetch_subject(code).await?;
        let subject_id = store.upsert_subject(&subject).await?;
        info!(code, subject_id, name = %subject.name, "Backfilled subject from catalog");
        Ok(())
    }
}
