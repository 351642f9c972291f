//! Table detection from text alignment.
//!
//! No ruling lines are read. A table is a run of vertically adjacent rows
//! that each hold several cells, where enough rows start cells at the same
//! x positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::layout::{PageLayout, TextSpan};
use crate::types::Rect;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDetectorConfig {
    pub min_rows: usize,
    pub min_columns: usize,
    /// More columns than this is treated as noise.
    pub max_columns: usize,
    /// Row baseline tolerance, as a multiple of the median font size.
    pub row_tolerance: f32,
    /// Share of rows that must start a cell at a position for it to count
    /// as a column.
    pub alignment_ratio: f32,
    /// Column stops closer than this (points) are the same column.
    pub column_gap: f32,
    /// Rows further apart than this multiple of the median font size start
    /// a new table.
    pub max_row_spacing: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 20,
            row_tolerance: 0.3,
            alignment_ratio: 0.5,
            column_gap: 10.0,
            max_row_spacing: 2.5,
        }
    }
}

/// Finds tables on one page. Called at most once per page, so it may be
/// slow.
pub trait TableDetector {
    fn detect_tables(&self, page: &PageLayout) -> Vec<Rect>;
}

#[derive(Debug, Clone, Default)]
pub struct AlignmentTableDetector {
    pub config: TableDetectorConfig,
}

impl AlignmentTableDetector {
    pub fn new(config: TableDetectorConfig) -> Self {
        Self { config }
    }
}

impl TableDetector for AlignmentTableDetector {
    fn detect_tables(&self, page: &PageLayout) -> Vec<Rect> {
        let tables = find_tables(&page.spans, &self.config);
        log::debug!("page {}: {} table(s)", page.number, tables.len());
        tables.into_iter().map(|t| t.bbox).collect()
    }
}

/// A table found on the page.
#[derive(Debug, Clone)]
pub struct Table {
    pub bbox: Rect,
    /// Left edge of each column, ascending.
    pub columns: Vec<f32>,
    pub rows: usize,
}

#[derive(Debug, Clone)]
struct Row<'a> {
    y: f32,
    /// Sorted left to right.
    cells: Vec<&'a TextSpan>,
}

impl Row<'_> {
    fn starts_near(&self, x: f32, gap: f32) -> bool {
        self.cells.iter().any(|c| (c.x - x).abs() < gap)
    }
}

pub fn find_tables(spans: &[TextSpan], config: &TableDetectorConfig) -> Vec<Table> {
    let Some(median) = median_size(spans) else {
        return Vec::new();
    };
    let rows = rows(spans, (median * config.row_tolerance).max(1.0));
    let max_spacing = median * config.max_row_spacing;

    let mut tables = Vec::new();
    let mut run: Vec<Row> = Vec::new();
    for row in rows {
        let multi_cell = row.cells.len() >= config.min_columns;
        let adjacent = run.last().map_or(true, |prev| row.y - prev.y <= max_spacing);
        if !(multi_cell && adjacent) {
            tables.extend(table(&run, config));
            run.clear();
        }
        if multi_cell {
            run.push(row);
        }
    }
    tables.extend(table(&run, config));
    tables
}

fn table(run: &[Row], config: &TableDetectorConfig) -> Option<Table> {
    if run.len() < config.min_rows {
        return None;
    }
    let columns = columns(run, config);
    if !(config.min_columns..=config.max_columns).contains(&columns.len()) {
        return None;
    }

    // A row is aligned when it starts a cell at half the columns or more.
    let needed = columns.len().div_ceil(2);
    let aligned = run
        .iter()
        .filter(|row| {
            columns
                .iter()
                .filter(|&&x| row.starts_near(x, config.column_gap))
                .count()
                >= needed
        })
        .count();
    if (aligned as f32) < run.len() as f32 * config.alignment_ratio {
        return None;
    }

    let bbox = run
        .iter()
        .flat_map(|row| row.cells.iter().map(|c| c.bbox()))
        .reduce(|a, b| a.union(&b))?;
    Some(Table {
        bbox,
        columns,
        rows: run.len(),
    })
}

/// Spans grouped by baseline, top to bottom. A row's baseline is the mean
/// of its spans'.
fn rows(spans: &[TextSpan], tolerance: f32) -> Vec<Row<'_>> {
    let mut sorted: Vec<&TextSpan> = spans.iter().collect();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));

    let mut groups: Vec<Vec<&TextSpan>> = Vec::new();
    for span in sorted {
        match groups.last_mut() {
            Some(group) if (span.y - group[0].y).abs() <= tolerance => group.push(span),
            _ => groups.push(vec![span]),
        }
    }

    groups
        .into_iter()
        .map(|mut cells| {
            cells.sort_by(|a, b| a.x.total_cmp(&b.x));
            let y = cells.iter().map(|c| c.y).sum::<f32>() / cells.len() as f32;
            Row { y, cells }
        })
        .collect()
}

/// Column stops: whole-point x positions where enough rows start a cell,
/// averaged and then thinned to `column_gap`.
fn columns(rows: &[Row], config: &TableDetectorConfig) -> Vec<f32> {
    let mut votes: BTreeMap<i32, (f32, usize)> = BTreeMap::new();
    for row in rows {
        let mut last_bucket = None;
        for cell in &row.cells {
            let bucket = cell.x.round() as i32;
            // Cells are sorted, so repeats within a row are adjacent.
            if last_bucket == Some(bucket) {
                continue;
            }
            last_bucket = Some(bucket);
            let (sum, count) = votes.entry(bucket).or_default();
            *sum += cell.x;
            *count += 1;
        }
    }

    let quorum = (rows.len() as f32 * config.alignment_ratio).ceil() as usize;
    let mut stops: Vec<f32> = Vec::new();
    for (sum, count) in votes.into_values() {
        if count < quorum {
            continue;
        }
        let x = sum / count as f32;
        if stops.last().map_or(true, |&prev| x - prev >= config.column_gap) {
            stops.push(x);
        }
    }
    stops
}

fn median_size(spans: &[TextSpan]) -> Option<f32> {
    let mut sizes: Vec<f32> = spans.iter().map(|s| s.font_size).collect();
    sizes.sort_by(f32::total_cmp);
    sizes.get(sizes.len() / 2).map(|s| s.max(1.0))
}
