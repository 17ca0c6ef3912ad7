use super::{new_row_id, require_text, DocumentFamily, DocumentKey, Edit};
use crate::codec::fields;
use crate::error::{PlanbookError, Result};
use crate::view::{summarize_checklist, ChecklistSummary};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Task checklist. Completion is tracked by id in `completed`, separately
/// from the items themselves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChecklistDocument {
    pub sections: Vec<Section>,
    pub completed: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    pub id: String,
    pub label: String,
    pub date_range: Option<String>,
    pub items: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChecklistItem {
    pub id: String,
    pub task: String,
    /// Who owns the task: "groom", "bride" or "together".
    pub assignee: String,
    pub memo: Option<String>,
    pub note: Option<String>,
    pub user_memo: Option<String>,
    pub user_added: bool,
}

impl ChecklistItem {
    pub fn new(id: &str, task: &str, assignee: &str) -> Self {
        ChecklistItem {
            id: id.to_string(),
            task: task.to_string(),
            assignee: assignee.to_string(),
            ..Default::default()
        }
    }

    fn with_memo(mut self, memo: &str) -> Self {
        self.memo = Some(memo.to_string());
        self
    }

    fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

impl ChecklistDocument {
    pub fn item(&self, item_id: &str) -> Option<&ChecklistItem> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter())
            .find(|item| item.id == item_id)
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        self.completed.contains(item_id)
    }

    fn section_mut(&mut self, section_id: &str) -> Result<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.id == section_id)
            .ok_or_else(|| PlanbookError::not_found("section", section_id))
    }

    fn item_mut(&mut self, section_id: &str, item_id: &str) -> Result<&mut ChecklistItem> {
        self.section_mut(section_id)?
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| PlanbookError::not_found("item", item_id))
    }

    /// Flip an item's completion. Returns the new state.
    pub fn toggle(&mut self, item_id: &str) -> Result<bool> {
        if self.item(item_id).is_none() {
            return Err(PlanbookError::not_found("item", item_id));
        }
        if self.completed.remove(item_id) {
            Ok(false)
        } else {
            self.completed.insert(item_id.to_string());
            Ok(true)
        }
    }

    pub fn update_task(&mut self, section_id: &str, item_id: &str, task: &str) -> Result<()> {
        require_text("task", task)?;
        self.item_mut(section_id, item_id)?.task = task.to_string();
        Ok(())
    }

    /// Set the free-text memo; a blank memo clears it.
    pub fn update_memo(&mut self, section_id: &str, item_id: &str, memo: &str) -> Result<()> {
        let item = self.item_mut(section_id, item_id)?;
        item.user_memo = if memo.trim().is_empty() {
            None
        } else {
            Some(memo.to_string())
        };
        Ok(())
    }

    /// Append a user-added item to a section. Returns the new item's id.
    pub fn add_item(&mut self, section_id: &str, task: &str, assignee: &str) -> Result<String> {
        require_text("task", task)?;
        let id = new_row_id("custom");
        let mut item = ChecklistItem::new(&id, task, assignee);
        item.user_added = true;
        self.section_mut(section_id)?.items.push(item);
        Ok(id)
    }

    /// Remove an item. Its id always leaves the completed set, so a later
    /// item reusing the id starts incomplete.
    pub fn delete_item(&mut self, section_id: &str, item_id: &str) -> Result<()> {
        self.completed.remove(item_id);
        let section = self.section_mut(section_id)?;
        let before = section.items.len();
        section.items.retain(|item| item.id != item_id);
        if section.items.len() == before {
            return Err(PlanbookError::not_found("item", item_id));
        }
        Ok(())
    }
}

/// Checklist edits issued by a consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChecklistEdit {
    Toggle {
        item_id: String,
    },
    UpdateTask {
        section_id: String,
        item_id: String,
        task: String,
    },
    UpdateMemo {
        section_id: String,
        item_id: String,
        memo: String,
    },
    AddItem {
        section_id: String,
        task: String,
        assignee: String,
    },
    DeleteItem {
        section_id: String,
        item_id: String,
    },
}

impl Edit<ChecklistDocument> for ChecklistEdit {
    fn apply(self, doc: &mut ChecklistDocument) -> Result<()> {
        match self {
            ChecklistEdit::Toggle { item_id } => doc.toggle(&item_id).map(|_| ()),
            ChecklistEdit::UpdateTask {
                section_id,
                item_id,
                task,
            } => doc.update_task(&section_id, &item_id, &task),
            ChecklistEdit::UpdateMemo {
                section_id,
                item_id,
                memo,
            } => doc.update_memo(&section_id, &item_id, &memo),
            ChecklistEdit::AddItem {
                section_id,
                task,
                assignee,
            } => doc.add_item(&section_id, &task, &assignee).map(|_| ()),
            ChecklistEdit::DeleteItem {
                section_id,
                item_id,
            } => doc.delete_item(&section_id, &item_id),
        }
    }
}

/// The shared task checklist.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checklist;

impl DocumentFamily for Checklist {
    type Document = ChecklistDocument;
    type Summary = ChecklistSummary;

    fn key(&self) -> DocumentKey {
        DocumentKey::Checklist
    }

    fn default_document(&self) -> ChecklistDocument {
        ChecklistDocument {
            sections: template_sections(),
            completed: BTreeSet::new(),
        }
    }

    fn decode_fields(&self, f: &Map<String, Value>) -> ChecklistDocument {
        ChecklistDocument {
            sections: fields::objects(f, "sections").map(decode_section).collect(),
            completed: fields::strings(f, "completedItems")
                .into_iter()
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    fn encode_fields(&self, doc: &ChecklistDocument) -> Map<String, Value> {
        let mut f = Map::new();
        f.insert(
            "sections".into(),
            Value::Array(doc.sections.iter().map(encode_section).collect()),
        );
        f.insert(
            "completedItems".into(),
            Value::Array(doc.completed.iter().cloned().map(Value::String).collect()),
        );
        f
    }

    fn summarize(doc: &ChecklistDocument) -> ChecklistSummary {
        summarize_checklist(doc)
    }
}

fn decode_section(f: &Map<String, Value>) -> Section {
    Section {
        id: fields::text(f, "id"),
        label: fields::text(f, "label"),
        date_range: fields::opt_text(f, "dateRange"),
        items: fields::objects(f, "items").map(decode_item).collect(),
    }
}

fn decode_item(f: &Map<String, Value>) -> ChecklistItem {
    ChecklistItem {
        id: fields::text(f, "id"),
        task: fields::text(f, "task"),
        assignee: fields::text(f, "assignee"),
        memo: fields::opt_text(f, "memo"),
        note: fields::opt_text(f, "note"),
        user_memo: fields::opt_text(f, "userMemo"),
        user_added: fields::flag(f, "userAdded"),
    }
}

fn encode_section(section: &Section) -> Value {
    let mut f = Map::new();
    f.insert("id".into(), Value::String(section.id.clone()));
    f.insert("label".into(), Value::String(section.label.clone()));
    fields::put_opt(&mut f, "dateRange", section.date_range.as_ref());
    f.insert(
        "items".into(),
        Value::Array(section.items.iter().map(encode_item).collect()),
    );
    Value::Object(f)
}

fn encode_item(item: &ChecklistItem) -> Value {
    let mut f = Map::new();
    f.insert("id".into(), Value::String(item.id.clone()));
    f.insert("task".into(), Value::String(item.task.clone()));
    f.insert("assignee".into(), Value::String(item.assignee.clone()));
    fields::put_opt(&mut f, "memo", item.memo.as_ref());
    fields::put_opt(&mut f, "note", item.note.as_ref());
    fields::put_opt(&mut f, "userMemo", item.user_memo.as_ref());
    f.insert("userAdded".into(), Value::Bool(item.user_added));
    Value::Object(f)
}

fn section(id: &str, label: &str, date_range: &str, items: Vec<ChecklistItem>) -> Section {
    Section {
        id: id.to_string(),
        label: label.to_string(),
        date_range: Some(date_range.to_string()),
        items,
    }
}

/// Built-in checklist used for a freshly created document.
pub fn template_sections() -> Vec<Section> {
    vec![
        section(
            "d-365",
            "12 months out",
            "D-365 ~ D-240",
            vec![
                ChecklistItem::new("d-365-budget", "Agree on an overall budget", "together"),
                ChecklistItem::new("d-365-date", "Pick a season and shortlist dates", "together"),
                ChecklistItem::new("d-365-tours", "Tour and compare venues", "together")
                    .with_memo("Use the venue tour sheet for each visit"),
                ChecklistItem::new("d-365-contract", "Sign the venue contract", "groom")
                    .with_note("Check the refund window before paying the deposit"),
            ],
        ),
        section(
            "d-240",
            "8 months out",
            "D-240 ~ D-150",
            vec![
                ChecklistItem::new("d-240-sdm", "Book studio, dress and makeup", "bride"),
                ChecklistItem::new("d-240-photo", "Book the ceremony photographer", "together"),
                ChecklistItem::new("d-240-guests", "Draft the guest list", "together")
                    .with_memo("Both families' lists"),
                ChecklistItem::new("d-240-honeymoon", "Book honeymoon flights", "groom"),
            ],
        ),
        section(
            "d-150",
            "5 months out",
            "D-150 ~ D-90",
            vec![
                ChecklistItem::new("d-150-studio", "Studio photo shoot", "together"),
                ChecklistItem::new("d-150-suit", "Order the suit", "groom"),
                ChecklistItem::new("d-150-rings", "Choose wedding rings", "together"),
            ],
        ),
        section(
            "d-90",
            "3 months out",
            "D-90 ~ D-30",
            vec![
                ChecklistItem::new("d-90-invites", "Order invitations", "bride"),
                ChecklistItem::new("d-90-send", "Send invitations", "together"),
                ChecklistItem::new("d-90-mc", "Confirm the MC and ceremony music", "groom"),
                ChecklistItem::new("d-90-headcount", "Confirm guaranteed headcount", "together")
                    .with_note("Venue deadline is usually 2-3 weeks before"),
            ],
        ),
        section(
            "d-30",
            "Final month",
            "D-30 ~ D-day",
            vec![
                ChecklistItem::new("d-30-fitting", "Final dress fitting", "bride"),
                ChecklistItem::new("d-30-balance", "Pay the venue balance", "groom"),
                ChecklistItem::new("d-30-rehearsal", "Run through the ceremony timeline", "together"),
            ],
        ),
    ]
}
