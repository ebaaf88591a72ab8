//! HTTP implementation of the BuscaCursos search.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, trace};
use url::Url;

use super::parse::parse_results;
use super::{BuscaCursosError, CoursePayload, CourseSource, SearchSession};
use crate::data::models::Period;
use crate::utils::log_if_slow;

const USER_AGENT: &str = concat!("buscacursos/", env!("CARGO_PKG_VERSION"));

const SLOW_SEARCH_THRESHOLD: Duration = Duration::from_secs(10);

/// Builds one cookie-carrying session per sweep.
pub struct BuscaCursosClient {
    base_url: Url,
    timeout: Duration,
    requests_per_second: NonZeroU32,
}

impl BuscaCursosClient {
    pub fn new(base_url: Url, timeout: Duration, requests_per_second: NonZeroU32) -> Self {
        Self {
            base_url,
            timeout,
            requests_per_second,
        }
    }
}

/// Search URL for a code within a term, e.g. `?cxml_semestre=2024-1&cxml_sigla=IIC`.
pub fn search_url(base_url: &Url, code: &str, year: i32, period: Period) -> Url {
    let mut url = base_url.clone();
    url.query_pairs_mut()
        .append_pair("cxml_semestre", &format!("{year}-{}", period.number()))
        .append_pair("cxml_sigla", code)
        .append_pair("cxml_nrc", "")
        .append_pair("cxml_nombre", "")
        .append_pair("cxml_categoria", "TODOS")
        .append_pair("cxml_area_fg", "TODOS")
        .append_pair("cxml_formato_cur", "TODOS")
        .append_pair("cxml_profesor", "")
        .append_pair("cxml_campus", "TODOS")
        .append_pair("cxml_unidad_academica", "TODOS");
    url
}

#[async_trait]
impl CourseSource for BuscaCursosClient {
    async fn open_session(&self) -> Result<Box<dyn SearchSession>, BuscaCursosError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        debug!(base_url = %self.base_url, "Opened BuscaCursos session");

        Ok(Box::new(BuscaCursosSession {
            http,
            base_url: self.base_url.clone(),
            limiter: RateLimiter::direct(Quota::per_second(self.requests_per_second)),
        }))
    }
}

struct BuscaCursosSession {
    http: reqwest::Client,
    base_url: Url,
    limiter: DefaultDirectRateLimiter,
}

#[async_trait]
impl SearchSession for BuscaCursosSession {
    async fn search(
        &self,
        code: &str,
        year: i32,
        period: Period,
    ) -> Result<Vec<CoursePayload>, BuscaCursosError> {
        let url = search_url(&self.base_url, code, year, period);

        self.limiter.until_ready().await;
        let start = Instant::now();

        trace!(%url, "Requesting search page");
        let response = self.http.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BuscaCursosError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        log_if_slow(start, SLOW_SEARCH_THRESHOLD, "BuscaCursos search");

        parse_results(&body).map_err(|source| BuscaCursosError::ParseFailed {
            url: url.to_string(),
            source,
        })
    }
}
