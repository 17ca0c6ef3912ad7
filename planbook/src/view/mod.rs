// View state - derived, display-ready values recomputed on every document
// replacement

use crate::document::checklist::ChecklistDocument;
use crate::document::guest_list::{Attendance, GuestListDocument, Side};
use crate::document::venue_tour::{InputKind, VenueTourDocument};
use crate::document::DocumentFamily;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The document a consumer renders plus its derived summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<D, S> {
    pub document: D,
    pub summary: S,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<D, S> ViewState<D, S> {
    pub fn project<F>(document: D, updated_at: Option<DateTime<Utc>>) -> Self
    where
        F: DocumentFamily<Document = D, Summary = S>,
    {
        let summary = F::summarize(&document);
        ViewState {
            document,
            summary,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Progress { completed, total }
    }

    /// Completion percentage; 0 for an empty set.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    pub fn rounded_percent(&self) -> u32 {
        self.percent().round() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

// ── Checklist ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistSummary {
    pub overall: Progress,
    pub sections: Vec<SectionProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionProgress {
    pub section_id: String,
    pub label: String,
    pub progress: Progress,
}

/// Only ids that still name an item count as completed.
pub fn summarize_checklist(doc: &ChecklistDocument) -> ChecklistSummary {
    let sections: Vec<SectionProgress> = doc
        .sections
        .iter()
        .map(|section| {
            let completed = section
                .items
                .iter()
                .filter(|item| doc.completed.contains(&item.id))
                .count();
            SectionProgress {
                section_id: section.id.clone(),
                label: section.label.clone(),
                progress: Progress::new(completed, section.items.len()),
            }
        })
        .collect();

    let overall = sections.iter().fold(Progress::default(), |acc, s| {
        Progress::new(acc.completed + s.progress.completed, acc.total + s.progress.total)
    });

    ChecklistSummary { overall, sections }
}

// ── Guest list ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SideTotals {
    pub groom: u32,
    pub bride: u32,
    pub unassigned: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestListSummary {
    /// Rows marked as attending.
    pub attending_parties: usize,
    /// Sum of all set headcounts, saturating at `u32::MAX`.
    pub expected_guests: u32,
    pub by_side: SideTotals,
    /// Non-blank individual name slots.
    pub named_guests: usize,
}

pub fn summarize_guest_list(doc: &GuestListDocument) -> GuestListSummary {
    let mut by_side = SideTotals::default();
    let mut attending_parties = 0;
    let mut named_guests = 0;

    for row in &doc.rows {
        let headcount = row.headcount.unwrap_or(0);
        match row.side {
            Side::Groom => by_side.groom = by_side.groom.saturating_add(headcount),
            Side::Bride => by_side.bride = by_side.bride.saturating_add(headcount),
            Side::Unset => by_side.unassigned = by_side.unassigned.saturating_add(headcount),
        }
        if row.attendance == Attendance::Attending {
            attending_parties += 1;
        }
        named_guests += row.guests.iter().filter(|g| !g.trim().is_empty()).count();
    }

    GuestListSummary {
        attending_parties,
        expected_guests: by_side
            .groom
            .saturating_add(by_side.bride)
            .saturating_add(by_side.unassigned),
        by_side,
        named_guests,
    }
}

// ── Venue tour ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueTourSummary {
    pub venue_name: String,
    pub progress: Progress,
    /// Per-category progress in first-appearance order.
    pub categories: Vec<CategoryProgress>,
    /// Star rows that have been given at least one star.
    pub rated_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProgress {
    pub category: String,
    pub progress: Progress,
}

pub fn summarize_venue_tour(doc: &VenueTourDocument) -> VenueTourSummary {
    let mut categories: Vec<CategoryProgress> = Vec::new();
    for row in &doc.rows {
        let idx = match categories.iter().position(|c| c.category == row.category) {
            Some(idx) => idx,
            None => {
                categories.push(CategoryProgress {
                    category: row.category.clone(),
                    progress: Progress::default(),
                });
                categories.len() - 1
            }
        };
        let progress = &mut categories[idx].progress;
        progress.total += 1;
        if row.checked {
            progress.completed += 1;
        }
    }

    let completed = doc.rows.iter().filter(|r| r.checked).count();
    let rated_rows = doc
        .rows
        .iter()
        .filter(|r| r.input_kind == InputKind::Stars && r.stars() > 0)
        .count();

    VenueTourSummary {
        venue_name: doc.venue_name.clone(),
        progress: Progress::new(completed, doc.rows.len()),
        categories,
        rated_rows,
    }
}
