//! HTML parsing for the course catalog's listing and requisites pages.
//!
//! Column and label matching folds case and accents, so `Créditos`,
//! `CREDITOS` and `créditos` all match.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use html_scraper::{ElementRef, Html, Selector};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::data::models::RequirementRelation;

static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());

/// Values the catalog prints when a requisite field is empty.
const EMPTY_MARKERS: &[&str] = &["no tiene", "no hay", "-", "sin requisitos"];

/// Subject columns taken from the listing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectListing {
    pub name: String,
    pub credits: i32,
    pub school: Option<String>,
    pub academic_level: Option<String>,
}

/// Fields of the requisites page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requisites {
    pub prerequisites: String,
    pub relation: RequirementRelation,
    pub restrictions: String,
    pub equivalences: String,
}

/// Lowercase, strip diacritics, collapse whitespace and drop a trailing colon.
pub fn fold(value: &str) -> String {
    let folded: String = value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(':')
        .trim_end()
        .to_owned()
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.select(&CELL_SELECTOR).map(cell_text).collect()
}

/// Column indexes of the listing table, located by header text.
struct ListingColumns {
    code: usize,
    name: usize,
    credits: Option<usize>,
    school: Option<usize>,
    level: Option<usize>,
}

impl ListingColumns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let folded: Vec<String> = cells.iter().map(|c| fold(c)).collect();
        let find = |prefixes: &[&str]| {
            folded
                .iter()
                .position(|h| prefixes.iter().any(|p| h.starts_with(p)))
        };

        Some(Self {
            code: find(&["sigla"])?,
            name: find(&["nombre"])?,
            credits: find(&["credito"]),
            school: find(&["escuela", "unidad academica", "facultad"]),
            level: find(&["nivel"]),
        })
    }
}

/// Find the listing row for exactly `code`. `Ok(None)` when no row matches.
pub fn parse_listing(body: &str, code: &str) -> Result<Option<SubjectListing>> {
    let html = Html::parse_document(body);

    for table in html.select(&TABLE_SELECTOR) {
        let mut rows = table.select(&TR_SELECTOR).map(row_cells);
        let Some(columns) = rows
            .by_ref()
            .find_map(|header| ListingColumns::from_header(&header))
        else {
            continue;
        };

        for cells in rows {
            let matches = cells
                .get(columns.code)
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(code));
            if !matches {
                continue;
            }

            let optional = |index: Option<usize>| {
                index
                    .and_then(|i| cells.get(i))
                    .filter(|v| !v.is_empty())
                    .cloned()
            };

            let credits = match optional(columns.credits) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("invalid credits '{raw}' for {code}"))?,
                None => 0,
            };

            return Ok(Some(SubjectListing {
                name: cells.get(columns.name).cloned().unwrap_or_default(),
                credits,
                school: optional(columns.school),
                academic_level: optional(columns.level),
            }));
        }
    }

    Ok(None)
}

/// Read the label/value rows of a requisites page. Unknown labels are ignored.
pub fn parse_requisites(body: &str) -> Requisites {
    let html = Html::parse_document(body);
    let mut requisites = Requisites::default();

    for row in html.select(&TR_SELECTOR) {
        let cells = row_cells(row);
        let [label, value, ..] = cells.as_slice() else {
            continue;
        };

        let label = fold(label);
        let value = if EMPTY_MARKERS.contains(&fold(value).as_str()) {
            String::new()
        } else {
            value.clone()
        };

        if label.starts_with("prerrequisito") {
            requisites.prerequisites = value;
        } else if label.starts_with("relacion") {
            requisites.relation = match fold(&value).as_str() {
                "y" | "and" => RequirementRelation::And,
                "o" | "or" => RequirementRelation::Or,
                _ => RequirementRelation::Null,
            };
        } else if label.starts_with("restriccion") {
            requisites.restrictions = value;
        } else if label.starts_with("equivalencia") {
            requisites.equivalences = value;
        }
    }

    requisites
}
