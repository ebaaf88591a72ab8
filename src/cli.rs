use clap::{Parser, ValueEnum};

use crate::data::models::Period;

/// Crawl BuscaCursos for one term and reconcile it into the database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Academic year, e.g. 2024
    pub year: i32,

    /// Period within the year: s1, s2, tav (or 1, 2, 3)
    pub period: Period,

    /// Log output format
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Run against an in-memory store instead of the database
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, for terminals
    Pretty,
    /// One JSON object per line, for log collectors
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}
