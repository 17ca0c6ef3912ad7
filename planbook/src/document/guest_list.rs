use super::{new_row_id, DocumentFamily, DocumentKey, Edit};
use crate::codec::fields;
use crate::error::{PlanbookError, Result};
use crate::view::{summarize_guest_list, GuestListSummary};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Number of individual guest-name slots on every row.
pub const GUEST_SLOTS: usize = 12;

/// Rows in a freshly created guest list.
const DEFAULT_ROWS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Groom,
    Bride,
    #[default]
    Unset,
}

impl Side {
    pub fn token(self) -> &'static str {
        match self {
            Side::Groom => "groom",
            Side::Bride => "bride",
            Side::Unset => "",
        }
    }

    /// Also accepts the older app's labels. Unknown tokens read as `Unset`.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "groom" | "신랑 측" => Side::Groom,
            "bride" | "신부 측" => Side::Bride,
            _ => Side::Unset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attendance {
    Attending,
    NotAttending,
    #[default]
    Unset,
}

impl Attendance {
    pub fn token(self) -> &'static str {
        match self {
            Attendance::Attending => "O",
            Attendance::NotAttending => "X",
            Attendance::Unset => "",
        }
    }

    /// Unknown tokens read as `Unset`.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "O" | "o" => Attendance::Attending,
            "X" | "x" => Attendance::NotAttending,
            _ => Attendance::Unset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuestRow {
    pub id: String,
    /// Display order shown to users.
    pub number: u32,
    pub side: Side,
    pub relation: String,
    pub name_group: String,
    pub headcount: Option<u32>,
    pub attendance: Attendance,
    pub notes: String,
    /// Always exactly `GUEST_SLOTS` entries.
    pub guests: Vec<String>,
}

impl GuestRow {
    pub fn blank(id: &str, number: u32) -> Self {
        GuestRow {
            id: id.to_string(),
            number,
            side: Side::Unset,
            relation: String::new(),
            name_group: String::new(),
            headcount: None,
            attendance: Attendance::Unset,
            notes: String::new(),
            guests: vec![String::new(); GUEST_SLOTS],
        }
    }
}

/// Pad or truncate a slot list to `GUEST_SLOTS`.
pub fn fit_slots(mut guests: Vec<String>) -> Vec<String> {
    guests.resize(GUEST_SLOTS, String::new());
    guests
}

/// Parse headcount text the way the entry field does: blank is unset, a
/// leading integer is taken as-is and anything else counts as 0.
pub fn parse_headcount(input: &str) -> Option<u32> {
    static LEADING_INT: OnceLock<Regex> = OnceLock::new();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let re = LEADING_INT.get_or_init(|| Regex::new(r"^[+-]?\d+").expect("valid headcount pattern"));
    let parsed = re
        .find(trimmed)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(0);
    Some(parsed)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuestListDocument {
    pub rows: Vec<GuestRow>,
}

/// Field changes for one row. `None` leaves a field untouched;
/// `headcount: Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuestRowPatch {
    pub side: Option<Side>,
    pub relation: Option<String>,
    pub name_group: Option<String>,
    pub headcount: Option<Option<u32>>,
    pub attendance: Option<Attendance>,
    pub notes: Option<String>,
    pub guests: Option<Vec<String>>,
}

impl GuestRowPatch {
    fn apply_to(self, row: &mut GuestRow) {
        if let Some(side) = self.side {
            row.side = side;
        }
        if let Some(relation) = self.relation {
            row.relation = relation;
        }
        if let Some(name_group) = self.name_group {
            row.name_group = name_group;
        }
        if let Some(headcount) = self.headcount {
            row.headcount = headcount;
        }
        if let Some(attendance) = self.attendance {
            row.attendance = attendance;
        }
        if let Some(notes) = self.notes {
            row.notes = notes;
        }
        if let Some(guests) = self.guests {
            row.guests = fit_slots(guests);
        }
    }

    /// Set one field from its textual form, as entered by a user.
    pub fn set(&mut self, field: &str, value: &str) -> Result<()> {
        match field {
            "side" => self.side = Some(Side::from_token(value)),
            "relation" => self.relation = Some(value.to_string()),
            "name_group" | "nameGroup" => self.name_group = Some(value.to_string()),
            "headcount" => self.headcount = Some(parse_headcount(value)),
            "attendance" => self.attendance = Some(Attendance::from_token(value)),
            "notes" => self.notes = Some(value.to_string()),
            _ => {
                return Err(PlanbookError::Validation(format!(
                    "Unknown guest row field '{field}'"
                )))
            }
        }
        Ok(())
    }
}

impl GuestListDocument {
    pub fn row(&self, row_id: &str) -> Option<&GuestRow> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    fn row_mut(&mut self, row_id: &str) -> Result<&mut GuestRow> {
        self.rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or_else(|| PlanbookError::not_found("guest row", row_id))
    }

    pub fn update_row(&mut self, row_id: &str, patch: GuestRowPatch) -> Result<()> {
        patch.apply_to(self.row_mut(row_id)?);
        Ok(())
    }

    pub fn set_guest(&mut self, row_id: &str, slot: usize, name: &str) -> Result<()> {
        if slot >= GUEST_SLOTS {
            return Err(PlanbookError::Validation(format!(
                "Guest slot {slot} out of range (0..{GUEST_SLOTS})"
            )));
        }
        self.row_mut(row_id)?.guests[slot] = name.to_string();
        Ok(())
    }

    /// Append a blank row numbered after the current last. Returns its id.
    pub fn add_row(&mut self) -> String {
        let number = self.rows.iter().map(|r| r.number).max().unwrap_or(0) + 1;
        let id = new_row_id("guest-row");
        self.rows.push(GuestRow::blank(&id, number));
        id
    }

    pub fn delete_row(&mut self, row_id: &str) -> Result<()> {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != row_id);
        if self.rows.len() == before {
            return Err(PlanbookError::not_found("guest row", row_id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuestListEdit {
    UpdateRow { row_id: String, patch: GuestRowPatch },
    SetGuest { row_id: String, slot: usize, name: String },
    AddRow,
    DeleteRow { row_id: String },
}

impl Edit<GuestListDocument> for GuestListEdit {
    fn apply(self, doc: &mut GuestListDocument) -> Result<()> {
        match self {
            GuestListEdit::UpdateRow { row_id, patch } => doc.update_row(&row_id, patch),
            GuestListEdit::SetGuest { row_id, slot, name } => doc.set_guest(&row_id, slot, &name),
            GuestListEdit::AddRow => {
                doc.add_row();
                Ok(())
            }
            GuestListEdit::DeleteRow { row_id } => doc.delete_row(&row_id),
        }
    }
}

/// The shared guest ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestList;

impl DocumentFamily for GuestList {
    type Document = GuestListDocument;
    type Summary = GuestListSummary;

    fn key(&self) -> DocumentKey {
        DocumentKey::GuestList
    }

    fn default_document(&self) -> GuestListDocument {
        GuestListDocument {
            rows: template_rows(),
        }
    }

    fn decode_fields(&self, f: &Map<String, Value>) -> GuestListDocument {
        GuestListDocument {
            rows: fields::objects(f, "rows").map(decode_row).collect(),
        }
    }

    fn encode_fields(&self, doc: &GuestListDocument) -> Map<String, Value> {
        let mut f = Map::new();
        f.insert(
            "rows".into(),
            Value::Array(doc.rows.iter().map(encode_row).collect()),
        );
        f
    }

    fn summarize(doc: &GuestListDocument) -> GuestListSummary {
        summarize_guest_list(doc)
    }
}

fn decode_row(f: &Map<String, Value>) -> GuestRow {
    GuestRow {
        id: fields::text(f, "id"),
        number: fields::count(f, "number"),
        side: Side::from_token(&fields::text(f, "side")),
        relation: fields::text(f, "relation"),
        name_group: fields::text(f, "nameGroup"),
        headcount: decode_headcount(f.get("headcount")),
        attendance: Attendance::from_token(&fields::text(f, "attendance")),
        notes: fields::text(f, "notes"),
        guests: fit_slots(fields::strings(f, "guests")),
    }
}

fn decode_headcount(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::String(s) => parse_headcount(s),
        other => fields::number(other),
    }
}

fn encode_row(row: &GuestRow) -> Value {
    let mut f = Map::new();
    f.insert("id".into(), Value::String(row.id.clone()));
    f.insert("number".into(), Value::from(row.number));
    f.insert("side".into(), Value::String(row.side.token().into()));
    f.insert("relation".into(), Value::String(row.relation.clone()));
    f.insert("nameGroup".into(), Value::String(row.name_group.clone()));
    f.insert(
        "headcount".into(),
        match row.headcount {
            Some(n) => Value::from(n),
            None => Value::String(String::new()),
        },
    );
    f.insert(
        "attendance".into(),
        Value::String(row.attendance.token().into()),
    );
    f.insert("notes".into(), Value::String(row.notes.clone()));
    f.insert(
        "guests".into(),
        Value::Array(row.guests.iter().cloned().map(Value::String).collect()),
    );
    Value::Object(f)
}

/// Built-in guest list: one row per common side/relation group, then blank
/// rows to fill in.
pub fn template_rows() -> Vec<GuestRow> {
    let presets = [
        (Side::Groom, "Family", "Immediate family"),
        (Side::Bride, "Family", "Immediate family"),
        (Side::Groom, "Relatives", ""),
        (Side::Bride, "Relatives", ""),
        (Side::Groom, "Friends", "School friends"),
        (Side::Bride, "Friends", "School friends"),
        (Side::Groom, "Work", ""),
        (Side::Bride, "Work", ""),
        (Side::Groom, "Parents' guests", ""),
        (Side::Bride, "Parents' guests", ""),
    ];

    (1..=DEFAULT_ROWS)
        .map(|number| {
            let mut row = GuestRow::blank(&format!("guest-row-{number}"), number);
            if let Some((side, relation, group)) = presets.get(number as usize - 1) {
                row.side = *side;
                row.relation = relation.to_string();
                row.name_group = group.to_string();
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_headcount() {
        assert_eq!(parse_headcount(""), None);
        assert_eq!(parse_headcount("   "), None);
        assert_eq!(parse_headcount("3"), Some(3));
        assert_eq!(parse_headcount(" 12 people"), Some(12));
        assert_eq!(parse_headcount("-4"), Some(0));
        assert_eq!(parse_headcount("about five"), Some(0));
    }

    #[test]
    fn test_fit_slots() {
        assert_eq!(fit_slots(vec![]).len(), GUEST_SLOTS);
        let long = fit_slots((0..30).map(|i| i.to_string()).collect());
        assert_eq!(long.len(), GUEST_SLOTS);
        assert_eq!(long[0], "0");
    }

    #[test]
    fn test_template_rows() {
        let rows = template_rows();
        assert_eq!(rows.len(), DEFAULT_ROWS as usize);
        assert_eq!(rows[0].side, Side::Groom);
        assert_eq!(rows[1].side, Side::Bride);
        assert_eq!(rows[19].side, Side::Unset);
        assert!(rows.iter().all(|r| r.guests.len() == GUEST_SLOTS));
    }

    #[test]
    fn test_missing_attendance_defaults_to_unset() {
        let raw = json!({ "rows": [{ "id": "r1", "number": 1, "side": "bride", "headcount": 2 }] });
        let doc = GuestList.decode_fields(raw.as_object().unwrap());
        let row = &doc.rows[0];
        assert_eq!(row.attendance, Attendance::Unset);
        assert_eq!(row.side, Side::Bride);
        assert_eq!(row.headcount, Some(2));
        assert_eq!(row.notes, "");
    }

    #[test]
    fn test_older_side_labels() {
        let raw = json!({ "rows": [
            { "id": "a", "side": "신랑 측" },
            { "id": "b", "side": "신부 측" },
            { "id": "c", "side": "cousin" }
        ] });
        let doc = GuestList.decode_fields(raw.as_object().unwrap());
        let sides: Vec<Side> = doc.rows.iter().map(|r| r.side).collect();
        assert_eq!(sides, vec![Side::Groom, Side::Bride, Side::Unset]);
        assert_eq!(GuestList.encode_fields(&doc)["rows"][0]["side"], json!("groom"));
    }

    #[test]
    fn test_headcount_wire_forms() {
        let raw = json!({ "rows": [
            { "id": "a", "headcount": "" },
            { "id": "b", "headcount": "7" },
            { "id": "c", "headcount": null },
            { "id": "d", "headcount": 3 },
            { "id": "e" }
        ] });
        let doc = GuestList.decode_fields(raw.as_object().unwrap());
        let counts: Vec<Option<u32>> = doc.rows.iter().map(|r| r.headcount).collect();
        assert_eq!(counts, vec![None, Some(7), None, Some(3), None]);

        let encoded = GuestList.encode_fields(&doc);
        assert_eq!(encoded["rows"][0]["headcount"], json!(""));
        assert_eq!(encoded["rows"][3]["headcount"], json!(3));
    }

    #[test]
    fn test_update_row_patch() {
        let mut doc = GuestList.default_document();
        let mut patch = GuestRowPatch::default();
        patch.set("headcount", "3").unwrap();
        patch.set("attendance", "O").unwrap();
        doc.update_row("guest-row-5", patch).unwrap();

        let row = doc.row("guest-row-5").unwrap();
        assert_eq!(row.headcount, Some(3));
        assert_eq!(row.attendance, Attendance::Attending);
        assert_eq!(row.relation, "Friends");
    }

    #[test]
    fn test_patch_guests_are_fitted() {
        let mut doc = GuestList.default_document();
        let patch = GuestRowPatch {
            guests: Some(vec!["Ana".into()]),
            ..Default::default()
        };
        doc.update_row("guest-row-1", patch).unwrap();
        let row = doc.row("guest-row-1").unwrap();
        assert_eq!(row.guests.len(), GUEST_SLOTS);
        assert_eq!(row.guests[0], "Ana");
    }

    #[test]
    fn test_unknown_patch_field() {
        let mut patch = GuestRowPatch::default();
        assert!(matches!(
            patch.set("mood", "happy"),
            Err(PlanbookError::Validation(_))
        ));
    }

    #[test]
    fn test_set_guest_bounds() {
        let mut doc = GuestList.default_document();
        doc.set_guest("guest-row-2", 0, "Mina").unwrap();
        assert_eq!(doc.row("guest-row-2").unwrap().guests[0], "Mina");
        assert!(doc.set_guest("guest-row-2", GUEST_SLOTS, "x").is_err());
    }

    #[test]
    fn test_add_and_delete_row() {
        let mut doc = GuestList.default_document();
        let id = doc.add_row();
        let row = doc.row(&id).unwrap();
        assert_eq!(row.number, DEFAULT_ROWS + 1);
        assert_eq!(row.guests.len(), GUEST_SLOTS);

        doc.delete_row(&id).unwrap();
        assert!(doc.row(&id).is_none());
        assert!(matches!(
            doc.delete_row(&id),
            Err(PlanbookError::NotFound { .. })
        ));
    }
}
