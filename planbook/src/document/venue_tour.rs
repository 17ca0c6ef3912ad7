use super::{new_row_id, require_text, DocumentFamily, DocumentKey, Edit};
use crate::codec::{self, fields};
use crate::error::{PlanbookError, Result};
use crate::view::{summarize_venue_tour, VenueTourSummary};
use serde::Serialize;
use serde_json::{Map, Value};

/// Bump when `template_rows` changes shape. Stored tours at an older
/// version are regenerated from the template on load.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

pub const MAX_STARS: u8 = 5;
pub const STAR: char = '★';
pub const YES: &str = "yes";
pub const NO: &str = "no";

/// How a row's value is entered and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Text,
    /// A run of `STAR` glyphs, 0..=MAX_STARS.
    Stars,
    /// `YES` or `NO`.
    YesNo,
}

impl InputKind {
    pub fn token(self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Stars => "stars",
            InputKind::YesNo => "checkbox",
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "stars" => InputKind::Stars,
            "checkbox" => InputKind::YesNo,
            _ => InputKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TourRow {
    pub id: String,
    pub category: String,
    pub item: String,
    pub input_kind: InputKind,
    pub value: String,
    pub checked: bool,
    pub memo: Option<String>,
}

impl TourRow {
    fn template(category: &str, item: &str, input_kind: InputKind) -> Self {
        TourRow {
            id: String::new(),
            category: category.to_string(),
            item: item.to_string(),
            input_kind,
            value: String::new(),
            checked: false,
            memo: None,
        }
    }

    /// Star count encoded in the value, capped at `MAX_STARS`.
    pub fn stars(&self) -> u8 {
        self.value
            .chars()
            .filter(|c| *c == STAR)
            .count()
            .min(MAX_STARS as usize) as u8
    }

    pub fn yes_no(&self) -> Option<bool> {
        match self.value.as_str() {
            YES => Some(true),
            NO => Some(false),
            _ => None,
        }
    }
}

pub fn encode_stars(stars: u8) -> String {
    std::iter::repeat(STAR)
        .take(stars.min(MAX_STARS) as usize)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct VenueTourDocument {
    pub venue_name: String,
    pub schema_version: u32,
    pub rows: Vec<TourRow>,
}

impl VenueTourDocument {
    pub fn row(&self, row_id: &str) -> Option<&TourRow> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    fn row_mut(&mut self, row_id: &str) -> Result<&mut TourRow> {
        self.rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or_else(|| PlanbookError::not_found("tour row", row_id))
    }

    pub fn rename(&mut self, name: &str) {
        self.venue_name = name.to_string();
    }

    pub fn set_value(&mut self, row_id: &str, value: &str) -> Result<()> {
        self.row_mut(row_id)?.value = value.to_string();
        Ok(())
    }

    /// Set the memo; a blank memo clears it.
    pub fn set_memo(&mut self, row_id: &str, memo: &str) -> Result<()> {
        self.row_mut(row_id)?.memo = if memo.trim().is_empty() {
            None
        } else {
            Some(memo.to_string())
        };
        Ok(())
    }

    /// Flip the row's checked flag. Returns the new state.
    pub fn toggle(&mut self, row_id: &str) -> Result<bool> {
        let row = self.row_mut(row_id)?;
        row.checked = !row.checked;
        Ok(row.checked)
    }

    pub fn rate(&mut self, row_id: &str, stars: u8) -> Result<()> {
        let row = self.row_mut(row_id)?;
        expect_kind(row, InputKind::Stars)?;
        row.value = encode_stars(stars);
        Ok(())
    }

    pub fn set_yes_no(&mut self, row_id: &str, yes: bool) -> Result<()> {
        let row = self.row_mut(row_id)?;
        expect_kind(row, InputKind::YesNo)?;
        row.value = if yes { YES } else { NO }.to_string();
        Ok(())
    }

    /// Insert a row after the last row of its category, or at the end for a
    /// new category. Returns the new row's id.
    pub fn add_row(&mut self, category: &str, item: &str, input_kind: InputKind) -> Result<String> {
        require_text("category", category)?;
        require_text("item", item)?;
        let mut row = TourRow::template(category, item, input_kind);
        row.id = new_row_id("custom");
        let id = row.id.clone();
        let at = self
            .rows
            .iter()
            .rposition(|r| r.category == category)
            .map(|idx| idx + 1)
            .unwrap_or(self.rows.len());
        self.rows.insert(at, row);
        Ok(id)
    }

    pub fn delete_row(&mut self, row_id: &str) -> Result<()> {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != row_id);
        if self.rows.len() == before {
            return Err(PlanbookError::not_found("tour row", row_id));
        }
        Ok(())
    }
}

fn expect_kind(row: &TourRow, kind: InputKind) -> Result<()> {
    if row.input_kind != kind {
        return Err(PlanbookError::Validation(format!(
            "Row '{}' takes {} input, not {}",
            row.id,
            row.input_kind.token(),
            kind.token()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum VenueTourEdit {
    Rename { name: String },
    SetValue { row_id: String, value: String },
    SetMemo { row_id: String, memo: String },
    Toggle { row_id: String },
    Rate { row_id: String, stars: u8 },
    SetYesNo { row_id: String, yes: bool },
    AddRow { category: String, item: String, input_kind: InputKind },
    DeleteRow { row_id: String },
}

impl Edit<VenueTourDocument> for VenueTourEdit {
    fn apply(self, doc: &mut VenueTourDocument) -> Result<()> {
        match self {
            VenueTourEdit::Rename { name } => {
                doc.rename(&name);
                Ok(())
            }
            VenueTourEdit::SetValue { row_id, value } => doc.set_value(&row_id, &value),
            VenueTourEdit::SetMemo { row_id, memo } => doc.set_memo(&row_id, &memo),
            VenueTourEdit::Toggle { row_id } => doc.toggle(&row_id).map(|_| ()),
            VenueTourEdit::Rate { row_id, stars } => doc.rate(&row_id, stars),
            VenueTourEdit::SetYesNo { row_id, yes } => doc.set_yes_no(&row_id, yes),
            VenueTourEdit::AddRow {
                category,
                item,
                input_kind,
            } => doc.add_row(&category, &item, input_kind).map(|_| ()),
            VenueTourEdit::DeleteRow { row_id } => doc.delete_row(&row_id),
        }
    }
}

/// The tour sheet for one venue.
#[derive(Debug, Clone)]
pub struct VenueTour {
    venue_id: String,
    default_name: String,
}

impl VenueTour {
    pub fn new(venue_id: &str) -> Self {
        VenueTour {
            venue_id: venue_id.to_string(),
            default_name: venue_id.to_string(),
        }
    }

    /// Use `name` as the display name of a freshly created tour.
    pub fn with_name(venue_id: &str, name: &str) -> Self {
        VenueTour {
            venue_id: venue_id.to_string(),
            default_name: name.to_string(),
        }
    }

    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }
}

impl DocumentFamily for VenueTour {
    type Document = VenueTourDocument;
    type Summary = VenueTourSummary;

    fn key(&self) -> DocumentKey {
        DocumentKey::venue(&self.venue_id)
    }

    fn schema_version(&self) -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    fn default_document(&self) -> VenueTourDocument {
        VenueTourDocument {
            venue_name: self.default_name.clone(),
            schema_version: CURRENT_SCHEMA_VERSION,
            rows: template_rows(),
        }
    }

    /// Keeps the venue name; every row comes from the current template.
    fn regenerate(&self, stale: VenueTourDocument) -> VenueTourDocument {
        let mut fresh = self.default_document();
        if !stale.venue_name.is_empty() {
            fresh.venue_name = stale.venue_name;
        }
        fresh
    }

    fn decode_fields(&self, f: &Map<String, Value>) -> VenueTourDocument {
        VenueTourDocument {
            venue_name: fields::first_text(f, &["venueName", "hallName"])
                .unwrap_or_else(|| self.default_name.clone()),
            schema_version: codec::stored_version(f),
            rows: fields::objects(f, "rows").map(decode_row).collect(),
        }
    }

    fn encode_fields(&self, doc: &VenueTourDocument) -> Map<String, Value> {
        let mut f = Map::new();
        f.insert("venueName".into(), Value::String(doc.venue_name.clone()));
        f.insert(codec::SCHEMA_VERSION.into(), Value::from(doc.schema_version));
        f.insert(
            "rows".into(),
            Value::Array(doc.rows.iter().map(encode_row).collect()),
        );
        f
    }

    fn summarize(doc: &VenueTourDocument) -> VenueTourSummary {
        summarize_venue_tour(doc)
    }
}

// Rows written by the older app carry `inputType`, `userMemo` and a value
// per side (`groomValue`/`brideValue`); the first non-blank side wins.
fn decode_row(f: &Map<String, Value>) -> TourRow {
    TourRow {
        id: fields::text(f, "id"),
        category: fields::text(f, "category"),
        item: fields::text(f, "item"),
        input_kind: InputKind::from_token(
            &fields::first_text(f, &["inputKind", "inputType"]).unwrap_or_default(),
        ),
        value: first_filled(f, &["value", "groomValue", "brideValue"]).unwrap_or_default(),
        checked: fields::flag(f, "checked"),
        memo: first_filled(f, &["memo", "userMemo"]),
    }
}

fn first_filled(f: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields::opt_text(f, key))
        .find(|text| !text.trim().is_empty())
}

fn encode_row(row: &TourRow) -> Value {
    let mut f = Map::new();
    f.insert("id".into(), Value::String(row.id.clone()));
    f.insert("category".into(), Value::String(row.category.clone()));
    f.insert("item".into(), Value::String(row.item.clone()));
    f.insert("inputKind".into(), Value::String(row.input_kind.token().into()));
    f.insert("value".into(), Value::String(row.value.clone()));
    f.insert("checked".into(), Value::Bool(row.checked));
    fields::put_opt(&mut f, "memo", row.memo.as_ref());
    Value::Object(f)
}

/// The venue contract sheet. Row ids are stable across calls so that
/// regenerated tours line up between clients.
pub fn template_rows() -> Vec<TourRow> {
    use InputKind::{Stars, Text, YesNo};

    let rows: [(&str, &str, InputKind); 40] = [
        ("Costs", "Venue rental fee", Text),
        ("Costs", "Studio/dress/makeup package", Text),
        ("Costs", "Meal price (adult)", Text),
        ("Costs", "Meal price (child)", Text),
        ("Costs", "VAT included", YesNo),
        ("Costs", "Service charge included", YesNo),
        ("Costs", "Deposit", Text),
        ("Costs", "Balance due date", Text),
        ("Ceremony", "Date and time", Text),
        ("Ceremony", "Hall (exclusive use?)", Text),
        ("Ceremony", "Ceremony length", Text),
        ("Ceremony", "Seating capacity", Text),
        ("Ceremony", "Gap between ceremonies", Text),
        ("Ceremony", "Hall atmosphere", Stars),
        ("Package", "Studio", Text),
        ("Package", "Dress", Text),
        ("Package", "Makeup", Text),
        ("Package", "Ceremony snaps included", YesNo),
        ("Package", "Video included", YesNo),
        ("Package", "Parents' hair and makeup", YesNo),
        ("Options", "Flower shower", Text),
        ("Options", "Bouquet and corsages", Text),
        ("Options", "Photo table and frames", Text),
        ("Options", "Photo booth", YesNo),
        ("Options", "MC provided", YesNo),
        ("Options", "Screen, sound and lighting", Text),
        ("Catering", "Guaranteed headcount", Text),
        ("Catering", "Headcount change deadline", Text),
        ("Catering", "Payment method", Text),
        ("Catering", "Drinks included", YesNo),
        ("Catering", "Banquet hall (exclusive use?)", Text),
        ("Catering", "Food tasting", Stars),
        ("Refunds", "Free cancellation window", Text),
        ("Refunds", "Date change penalty", Text),
        ("Refunds", "Cancellation penalty", Text),
        ("Other", "Parking (spaces / free hours)", Text),
        ("Other", "Couple parking support", YesNo),
        ("Other", "Venue contact", Text),
        ("Other", "Bridal room restroom", YesNo),
        ("Other", "Overall impression", Stars),
    ];

    rows.iter()
        .enumerate()
        .map(|(index, (category, item, kind))| {
            let mut row = TourRow::template(category, item, *kind);
            row.id = format!("contract-{index}-{}", slug::slugify(format!("{category} {item}")));
            row
        })
        .collect()
}
