use clap::{Parser, Subcommand, ValueEnum};
use planbook::document::checklist::{Checklist, ChecklistEdit};
use planbook::document::guest_list::{GuestList, GuestListEdit, GuestRowPatch};
use planbook::document::venue_tour::{InputKind, VenueTour, VenueTourEdit};
use planbook::document::Edit;
use planbook::fallback::FallbackStore;
use planbook::remote::RemoteChannel;
use planbook::sync::FamilyView;
use planbook::{DocumentFamily, DocumentKey, PlanbookConfig, SyncController, SyncState};
use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

const WATCH_INTERVAL: Duration = Duration::from_millis(200);

/// Planbook CLI: view and edit the shared planning documents
#[derive(Parser)]
#[command(name = "planbook", version, about)]
struct Cli {
    /// Path to planbook.yaml (default: $PLANBOOK_CONFIG, then ./planbook.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    /// Seconds to wait for the first snapshot of a document
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print a document with its summary (checklist, guest-list or venue-tour/<id>)
    Show { doc: String },

    /// Show configured stores and the sync state of every document
    Status,

    /// Print a document every time it changes
    Watch { doc: String },

    /// Edit the checklist
    Checklist {
        #[command(subcommand)]
        action: ChecklistAction,
    },

    /// Edit the guest list
    Guests {
        #[command(subcommand)]
        action: GuestAction,
    },

    /// Edit a venue's tour sheet
    Venue {
        /// Venue id from the config
        id: String,
        #[command(subcommand)]
        action: VenueAction,
    },
}

#[derive(Subcommand)]
enum ChecklistAction {
    /// Mark an item done, or undo it
    Toggle { item: String },
    /// Change an item's task text
    Task {
        section: String,
        item: String,
        text: String,
    },
    /// Set an item's memo (empty clears it)
    Memo {
        section: String,
        item: String,
        text: String,
    },
    /// Add an item to a section
    Add {
        section: String,
        task: String,
        #[arg(long, default_value = "together")]
        assignee: String,
    },
    /// Delete an item
    Delete { section: String, item: String },
}

#[derive(Subcommand)]
enum GuestAction {
    /// Update row fields (e.g. --field headcount=3 --field attendance=O)
    Set {
        row: String,
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },
    /// Fill one guest name slot
    Name {
        row: String,
        slot: usize,
        name: String,
    },
    /// Append a blank row
    Add,
    /// Delete a row
    Delete { row: String },
}

#[derive(Subcommand)]
enum VenueAction {
    /// Rename the venue
    Rename { name: String },
    /// Set a row's free-text value
    Set { row: String, value: String },
    /// Set a row's memo (empty clears it)
    Memo { row: String, text: String },
    /// Flip a row's checked flag
    Toggle { row: String },
    /// Give a star row 0-5 stars
    Rate { row: String, stars: u8 },
    /// Answer a yes/no row
    YesNo {
        row: String,
        #[arg(value_parser = parse_yes_no, action = clap::ArgAction::Set)]
        answer: bool,
    },
    /// Add a row to a category
    Add {
        category: String,
        item: String,
        #[arg(long, default_value = "text")]
        kind: RowKind,
    },
    /// Delete a row
    Delete { row: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum RowKind {
    Text,
    Stars,
    YesNo,
}

impl From<RowKind> for InputKind {
    fn from(kind: RowKind) -> Self {
        match kind {
            RowKind::Text => InputKind::Text,
            RowKind::Stars => InputKind::Stars,
            RowKind::YesNo => InputKind::YesNo,
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_yes_no(s: &str) -> Result<bool, String> {
    match s {
        "yes" | "y" | "true" => Ok(true),
        "no" | "n" | "false" => Ok(false),
        _ => Err(format!("Expected yes or no, got '{s}'")),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

/// Stores opened once per invocation and shared by every controller.
struct Session {
    config: PlanbookConfig,
    remote: Arc<dyn RemoteChannel>,
    fallback: Arc<dyn FallbackStore>,
    timeout: Duration,
    format: OutputFormat,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let config = PlanbookConfig::discover(cli.config.as_deref())?;
        let remote = config.open_remote()?;
        let fallback = config.open_fallback()?;
        log::debug!("Client '{}' using {:?} remote", config.client, config.remote.kind);
        Ok(Session {
            config,
            remote,
            fallback,
            timeout: Duration::from_secs(cli.timeout),
            format: cli.format,
        })
    }

    fn connect<F: DocumentFamily>(&self, family: F) -> Result<SyncController<F>, Box<dyn Error>> {
        let mut controller = SyncController::new(family, self.remote.clone(), self.fallback.clone());
        let key = controller.key().to_string();
        controller.subscribe(|_| {}, move |e| log::warn!("'{key}' is offline: {e}"))?;
        match controller.wait_until_loaded(self.timeout) {
            SyncState::Loading => Err(format!(
                "Timed out waiting for '{}' after {}s",
                controller.key(),
                self.timeout.as_secs()
            )
            .into()),
            _ => Ok(controller),
        }
    }

    fn edit<F, E>(&self, family: F, edit: E) -> Result<(), Box<dyn Error>>
    where
        F: DocumentFamily,
        E: Edit<F::Document>,
    {
        let mut controller = self.connect(family)?;
        controller.apply(edit)?;
        controller.process_events();
        print_output(&render(&controller)?, self.format)
    }

    fn show<F: DocumentFamily>(&self, family: F) -> Result<(), Box<dyn Error>> {
        let controller = self.connect(family)?;
        print_output(&render(&controller)?, self.format)
    }

    fn watch<F>(&self, family: F) -> Result<(), Box<dyn Error>>
    where
        F: DocumentFamily + Clone + 'static,
    {
        let mut controller = SyncController::new(family.clone(), self.remote.clone(), self.fallback.clone());
        let format = self.format;
        controller.subscribe(
            move |view: &FamilyView<F>| {
                let printed = render_view(&family, view).and_then(|v| print_output(&v, format));
                if let Err(e) = printed {
                    log::warn!("Could not print update: {e}");
                }
            },
            |e| log::warn!("{e}"),
        )?;

        loop {
            controller.process_events();
            if controller.state() == SyncState::Degraded {
                return Err(format!("Lost the subscription to '{}'", controller.key()).into());
            }
            std::thread::sleep(WATCH_INTERVAL);
        }
    }

    fn status_entry<F: DocumentFamily>(&self, family: F) -> Result<serde_json::Value, Box<dyn Error>> {
        let controller = self.connect(family)?;
        Ok(serde_json::json!({
            "key": controller.key().to_string(),
            "state": controller.state(),
            "updatedAt": controller.view().updated_at.map(|t| t.to_rfc3339()),
            "summary": serde_json::to_value(&controller.view().summary)?,
        }))
    }

    fn venue(&self, id: &str) -> Result<VenueTour, Box<dyn Error>> {
        Ok(self.config.venue_family(id)?)
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let session = Session::open(&cli)?;

    match cli.command {
        Command::Show { doc } => match doc.parse::<DocumentKey>()? {
            DocumentKey::Checklist => session.show(Checklist)?,
            DocumentKey::GuestList => session.show(GuestList)?,
            DocumentKey::VenueTour(id) => session.show(session.venue(&id)?)?,
        },

        Command::Watch { doc } => match doc.parse::<DocumentKey>()? {
            DocumentKey::Checklist => session.watch(Checklist)?,
            DocumentKey::GuestList => session.watch(GuestList)?,
            DocumentKey::VenueTour(id) => session.watch(session.venue(&id)?)?,
        },

        Command::Status => {
            let mut documents = vec![
                session.status_entry(Checklist)?,
                session.status_entry(GuestList)?,
            ];
            for venue in &session.config.venues {
                documents.push(session.status_entry(session.venue(&venue.id)?)?);
            }
            print_output(
                &status_report(&session.config, session.fallback.as_ref(), documents)?,
                session.format,
            )?;
        }

        Command::Checklist { action } => {
            let edit = match action {
                ChecklistAction::Toggle { item } => ChecklistEdit::Toggle { item_id: item },
                ChecklistAction::Task {
                    section,
                    item,
                    text,
                } => ChecklistEdit::UpdateTask {
                    section_id: section,
                    item_id: item,
                    task: text,
                },
                ChecklistAction::Memo {
                    section,
                    item,
                    text,
                } => ChecklistEdit::UpdateMemo {
                    section_id: section,
                    item_id: item,
                    memo: text,
                },
                ChecklistAction::Add {
                    section,
                    task,
                    assignee,
                } => ChecklistEdit::AddItem {
                    section_id: section,
                    task,
                    assignee,
                },
                ChecklistAction::Delete { section, item } => ChecklistEdit::DeleteItem {
                    section_id: section,
                    item_id: item,
                },
            };
            session.edit(Checklist, edit)?;
        }

        Command::Guests { action } => {
            let edit = match action {
                GuestAction::Set { row, fields } => {
                    let mut patch = GuestRowPatch::default();
                    for (field, value) in &fields {
                        patch.set(field, value)?;
                    }
                    GuestListEdit::UpdateRow { row_id: row, patch }
                }
                GuestAction::Name { row, slot, name } => GuestListEdit::SetGuest {
                    row_id: row,
                    slot,
                    name,
                },
                GuestAction::Add => GuestListEdit::AddRow,
                GuestAction::Delete { row } => GuestListEdit::DeleteRow { row_id: row },
            };
            session.edit(GuestList, edit)?;
        }

        Command::Venue { id, action } => {
            let edit = match action {
                VenueAction::Rename { name } => VenueTourEdit::Rename { name },
                VenueAction::Set { row, value } => VenueTourEdit::SetValue { row_id: row, value },
                VenueAction::Memo { row, text } => VenueTourEdit::SetMemo {
                    row_id: row,
                    memo: text,
                },
                VenueAction::Toggle { row } => VenueTourEdit::Toggle { row_id: row },
                VenueAction::Rate { row, stars } => VenueTourEdit::Rate { row_id: row, stars },
                VenueAction::YesNo { row, answer } => VenueTourEdit::SetYesNo {
                    row_id: row,
                    yes: answer,
                },
                VenueAction::Add {
                    category,
                    item,
                    kind,
                } => VenueTourEdit::AddRow {
                    category,
                    item,
                    input_kind: kind.into(),
                },
                VenueAction::Delete { row } => VenueTourEdit::DeleteRow { row_id: row },
            };
            session.edit(session.venue(&id)?, edit)?;
        }
    }

    Ok(())
}

fn render<F: DocumentFamily>(controller: &SyncController<F>) -> Result<serde_json::Value, Box<dyn Error>> {
    let mut value = render_view(controller.family(), controller.view())?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("key".into(), controller.key().to_string().into());
        map.insert("state".into(), serde_json::to_value(controller.state())?);
    }
    Ok(value)
}

fn render_view<F: DocumentFamily>(
    family: &F,
    view: &FamilyView<F>,
) -> Result<serde_json::Value, Box<dyn Error>> {
    Ok(serde_json::json!({
        "updatedAt": view.updated_at.map(|t| t.to_rfc3339()),
        "summary": serde_json::to_value(&view.summary)?,
        "document": serde_json::Value::Object(family.encode_fields(&view.document)),
    }))
}

/// Store locations, the keys held in the local fallback, and one entry per
/// document.
fn status_report(
    config: &PlanbookConfig,
    fallback: &dyn FallbackStore,
    documents: Vec<serde_json::Value>,
) -> Result<serde_json::Value, Box<dyn Error>> {
    Ok(serde_json::json!({
        "client": config.client,
        "remote": {
            "kind": config.remote.kind,
            "path": config.remote.path.as_deref().map(|p| config.resolve(p)),
        },
        "fallback": {
            "kind": config.fallback.kind,
            "path": config.fallback.path.as_deref().map(|p| config.resolve(p)),
            "keys": fallback.keys()?,
        },
        "documents": documents,
    }))
}

fn print_output(value: &serde_json::Value, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
