//! HTML parsing for BuscaCursos result pages.
//!
//! Each section is one `tr.resultadosRowPar` / `tr.resultadosRowImpar` row
//! whose direct `td` children follow a fixed column order. The last column
//! holds a nested table with one row per schedule block:
//!
//! ```text
//! <tr><td>L-W:2,3</td><td>CLAS</td><td>B12</td></tr>
//! ```
//!
//! A block lists days and modules; every day/module combination becomes one
//! [`ScheduleEntry`].

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use html_scraper::{ElementRef, Html, Selector};

use super::{CoursePayload, ScheduleEntry};

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.resultadosRowPar, tr.resultadosRowImpar").unwrap());
static TR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Column positions within a result row.
mod col {
    pub const NRC: usize = 0;
    pub const CODE: usize = 1;
    pub const ALLOWS_WITHDRAWAL: usize = 2;
    pub const IN_ENGLISH: usize = 3;
    pub const SECTION: usize = 4;
    pub const SPECIAL_APPROVAL: usize = 5;
    pub const FG_AREA: usize = 6;
    pub const FORMAT: usize = 7;
    pub const CATEGORY: usize = 8;
    // 9: course name
    pub const TEACHERS: usize = 10;
    pub const CAMPUS: usize = 11;
    // 12: credits
    pub const TOTAL_QUOTA: usize = 13;
    pub const AVAILABLE_QUOTA: usize = 14;
    // 15: reserved quota
    pub const SCHEDULE: usize = 16;
    pub const COUNT: usize = 17;
}

/// Parse every section listed on a result page. Any malformed row fails the page.
pub fn parse_results(body: &str) -> Result<Vec<CoursePayload>> {
    let html = Html::parse_document(body);
    html.select(&ROW_SELECTOR)
        .enumerate()
        .map(|(i, row)| parse_row(row).with_context(|| format!("result row {}", i + 1)))
        .collect()
}

fn parse_row(row: ElementRef<'_>) -> Result<CoursePayload> {
    let cells: Vec<ElementRef<'_>> = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect();

    if cells.len() < col::COUNT {
        bail!(
            "expected {} columns, found {}",
            col::COUNT,
            cells.len()
        );
    }

    let text = |index: usize| cell_text(cells[index]);

    let code = text(col::CODE);
    if code.is_empty() {
        bail!("missing subject code");
    }

    Ok(CoursePayload {
        section: parse_number(&text(col::SECTION), "section")?,
        nrc: text(col::NRC),
        format: text(col::FORMAT),
        category: text(col::CATEGORY),
        allows_withdrawal: parse_flag(&text(col::ALLOWS_WITHDRAWAL), "allows withdrawal")?,
        is_in_english: parse_flag(&text(col::IN_ENGLISH), "in english")?,
        total_quota: parse_number(&text(col::TOTAL_QUOTA), "total quota")?,
        available_quota: parse_number(&text(col::AVAILABLE_QUOTA), "available quota")?,
        requires_special_approval: parse_flag(
            &text(col::SPECIAL_APPROVAL),
            "special approval",
        )?,
        fg_area: text(col::FG_AREA),
        campus: text(col::CAMPUS),
        teachers: parse_teachers(&text(col::TEACHERS)),
        schedule: parse_schedule(cells[col::SCHEDULE])
            .with_context(|| format!("schedule of {code}"))?,
        code,
    })
}

/// Text content of an element with whitespace runs collapsed.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_flag(value: &str, field: &str) -> Result<bool> {
    match value.to_uppercase().as_str() {
        "SI" | "SÍ" => Ok(true),
        "NO" | "" => Ok(false),
        other => bail!("invalid {field} flag '{other}'"),
    }
}

fn parse_number(value: &str, field: &str) -> Result<i32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {field} '{value}'"))
}

fn parse_teachers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_schedule(cell: ElementRef<'_>) -> Result<Vec<ScheduleEntry>> {
    let mut entries = Vec::new();

    for row in cell.select(&TR_SELECTOR) {
        let parts: Vec<String> = row.select(&TD_SELECTOR).map(cell_text).collect();
        let Some(blocks) = parts.first() else {
            continue;
        };
        let kind = parts.get(1).cloned().unwrap_or_default();
        let classroom = parts.get(2).cloned().unwrap_or_default();

        for (day, module) in parse_blocks(blocks)? {
            entries.push(ScheduleEntry {
                day,
                module,
                classroom: classroom.clone(),
                kind: kind.clone(),
            });
        }
    }

    Ok(entries)
}

/// Expand a block such as `L-W:2,3` into `(day, module)` pairs.
///
/// Blocks without days or modules (`:`, `SIN HORARIO`, empty) expand to nothing.
fn parse_blocks(block: &str) -> Result<Vec<(String, u8)>> {
    let block = block.trim();
    let Some((days, modules)) = block.split_once(':') else {
        if block.is_empty() || block.eq_ignore_ascii_case("SIN HORARIO") {
            return Ok(Vec::new());
        }
        bail!("malformed schedule block '{block}'");
    };

    let days: Vec<&str> = days
        .split('-')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();
    let modules = modules
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| {
            m.parse::<u8>()
                .with_context(|| format!("invalid module '{m}' in '{block}'"))
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(days
        .iter()
        .flat_map(|day| modules.iter().map(move |module| (day.to_string(), *module)))
        .collect())
}
