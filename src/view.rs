//! Derived views over the coil store: search filter, aggregates, and the
//! plain-text table the console renders.

use crate::coil::{Coil, CoilStatus};

/// Empty-state line for a table with no matching rows.
pub const EMPTY_TABLE: &str = "No coils found";

/// Coils whose id or location contains `term`, ignoring case. An empty or
/// blank term matches everything.
#[must_use]
pub fn filter<'a>(coils: &'a [Coil], term: &str) -> Vec<&'a Coil> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return coils.iter().collect();
    }
    coils
        .iter()
        .filter(|coil| {
            coil.coil_id.to_lowercase().contains(&needle) || coil.location.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Sum of known weights. Missing weights count as zero.
#[must_use]
pub fn total_weight(coils: &[Coil]) -> f64 {
    coils.iter().filter_map(|coil| coil.weight).sum()
}

/// Headline counts for the dashboard cards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct YardStats {
    pub in_yard: usize,
    pub dispatched: usize,
    pub total: usize,
    pub total_weight: f64,
}

impl YardStats {
    #[must_use]
    pub fn from_coils(coils: &[Coil]) -> Self {
        let dispatched = coils.iter().filter(|coil| coil.status == CoilStatus::Dispatched).count();
        Self {
            in_yard: coils.len() - dispatched,
            dispatched,
            total: coils.len(),
            total_weight: total_weight(coils),
        }
    }
}

/// `12.5T`, or `N/A` when the weight is unknown.
#[must_use]
pub fn format_weight(weight: Option<f64>) -> String {
    weight.map_or_else(|| "N/A".to_owned(), |w| format!("{w}T"))
}

// =============================================================================
// TABLE
// =============================================================================

const HEADERS: [&str; 5] = ["ID", "Location", "Weight", "Status", "Timestamp"];

/// Render `rows` as aligned text lines: a header then one line per coil, or
/// the header and [`EMPTY_TABLE`] when there are none.
#[must_use]
pub fn render_table(rows: &[&Coil]) -> Vec<String> {
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|coil| {
            [
                coil.coil_id.clone(),
                coil.location.clone(),
                format_weight(coil.weight),
                coil.status.label().to_owned(),
                coil.timestamp.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cols: [&str; 5]| {
        cols.iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_owned()
    };

    let mut out = Vec::with_capacity(cells.len() + 1);
    out.push(line(HEADERS));
    if cells.is_empty() {
        out.push(EMPTY_TABLE.to_owned());
    }
    for row in &cells {
        out.push(line(row.each_ref().map(String::as_str)));
    }
    out
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
