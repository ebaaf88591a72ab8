//! BuscaCursos (the course search of the course registration system) client.
//!
//! The crawler only depends on the [`CourseSource`] / [`SearchSession`]
//! traits; [`BuscaCursosClient`] is the HTTP implementation.

pub mod client;
pub mod errors;
pub mod parse;

use async_trait::async_trait;

use crate::data::models::Period;

pub use client::BuscaCursosClient;
pub use errors::BuscaCursosError;

/// One course section as listed by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoursePayload {
    /// Subject code, e.g. `IIC2233`.
    pub code: String,
    pub section: i32,
    pub nrc: String,
    pub format: String,
    pub category: String,
    pub allows_withdrawal: bool,
    pub is_in_english: bool,
    pub total_quota: i32,
    pub available_quota: i32,
    pub requires_special_approval: bool,
    pub fg_area: String,
    pub campus: String,
    /// Teacher names in listing order.
    pub teachers: Vec<String>,
    pub schedule: Vec<ScheduleEntry>,
}

/// One (day, module) block of a section's schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Day symbol as printed by BuscaCursos (`L`, `M`, `W`, `J`, `V`, `S`).
    pub day: String,
    pub module: u8,
    pub classroom: String,
    /// Session type, e.g. `CLAS`, `AYU`, `LAB`.
    pub kind: String,
}

/// Opens search sessions against the course listing.
#[async_trait]
pub trait CourseSource: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn SearchSession>, BuscaCursosError>;
}

/// A session able to run code searches for a term.
#[async_trait]
pub trait SearchSession: Send + Sync {
    /// Every section whose subject code starts with `code`, up to the
    /// source's result cap.
    async fn search(
        &self,
        code: &str,
        year: i32,
        period: Period,
    ) -> Result<Vec<CoursePayload>, BuscaCursosError>;
}
