// Sync controller - keeps one family's view, the remote document and the
// local fallback in agreement

use crate::codec;
use crate::document::{DocumentFamily, DocumentKey, Edit};
use crate::error::{PlanbookError, Result};
use crate::fallback::{self, FallbackStore};
use crate::remote::{ChannelEvent, RemoteChannel, Subscription};
use crate::view::ViewState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on flush/drain rounds in one `process_events` call.
const MAX_ROUNDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninitialized,
    Loading,
    Synced,
    /// The subscription failed. Realtime updates stay off until the session
    /// is ended with `unsubscribe` and started again.
    Degraded,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Loading => "loading",
            SyncState::Synced => "synced",
            SyncState::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

pub type FamilyView<F> =
    ViewState<<F as DocumentFamily>::Document, <F as DocumentFamily>::Summary>;

type SnapshotCallback<F> = Box<dyn FnMut(&FamilyView<F>)>;
type ErrorCallback = Box<dyn FnMut(&PlanbookError)>;

/// Drives one document family.
///
/// Edits are applied to the in-memory copy and become the view at once;
/// the whole encoded document is queued for the remote and sent on the next
/// `process_events`. Snapshots from the subscription replace the view
/// unconditionally, so the last write the remote accepted wins.
pub struct SyncController<F: DocumentFamily> {
    family: F,
    key: DocumentKey,
    remote: Arc<dyn RemoteChannel>,
    fallback: Arc<dyn FallbackStore>,
    state: SyncState,
    view: FamilyView<F>,
    subscription: Option<Subscription>,
    outbox: VecDeque<Value>,
    on_snapshot: Option<SnapshotCallback<F>>,
    on_error: Option<ErrorCallback>,
}

impl<F: DocumentFamily> SyncController<F> {
    pub fn new(family: F, remote: Arc<dyn RemoteChannel>, fallback: Arc<dyn FallbackStore>) -> Self {
        let key = family.key();
        let view = ViewState::project::<F>(family.default_document(), None);
        SyncController {
            family,
            key,
            remote,
            fallback,
            state: SyncState::Uninitialized,
            view,
            subscription: None,
            outbox: VecDeque::new(),
            on_snapshot: None,
            on_error: None,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn family(&self) -> &F {
        &self.family
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn view(&self) -> &FamilyView<F> {
        &self.view
    }

    pub fn document(&self) -> &F::Document {
        &self.view.document
    }

    /// Writes queued but not yet sent.
    pub fn pending_writes(&self) -> usize {
        self.outbox.len()
    }

    /// Start the session. `on_snapshot` runs after every view replacement
    /// that came from outside (remote snapshot or degraded seeding);
    /// `on_error` runs once when the session degrades.
    ///
    /// A refused subscription does not fail the call: the controller goes
    /// straight to `Degraded`.
    ///
    /// The controller owns the remote `Subscription`, so there is no
    /// separate disposer handle. Call `unsubscribe`, or drop the controller;
    /// either one drops the subscription, which runs its disposer.
    pub fn subscribe<S, E>(&mut self, on_snapshot: S, on_error: E) -> Result<()>
    where
        S: FnMut(&FamilyView<F>) + 'static,
        E: FnMut(&PlanbookError) + 'static,
    {
        if self.state != SyncState::Uninitialized {
            return Err(PlanbookError::AlreadySubscribed {
                key: self.key.to_string(),
            });
        }

        self.on_snapshot = Some(Box::new(on_snapshot));
        self.on_error = Some(Box::new(on_error));
        self.transition(SyncState::Loading);

        match self.remote.subscribe(&self.key) {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => self.degrade(e),
        }
        Ok(())
    }

    /// End the session. Queued writes are sent first; the view is kept.
    pub fn unsubscribe(&mut self) {
        self.flush_outbox();
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.on_snapshot = None;
        self.on_error = None;
        self.transition(SyncState::Uninitialized);
    }

    /// Apply an edit optimistically and queue the whole document for the
    /// remote. A rejected edit leaves the view untouched and queues nothing.
    pub fn apply<E: Edit<F::Document>>(&mut self, edit: E) -> Result<&FamilyView<F>> {
        self.mutate_with(|document| edit.apply(document))
    }

    /// Like `apply`, for an arbitrary change to the document.
    pub fn mutate_with<M>(&mut self, mutate: M) -> Result<&FamilyView<F>>
    where
        M: FnOnce(&mut F::Document) -> Result<()>,
    {
        if !matches!(self.state, SyncState::Synced | SyncState::Degraded) {
            return Err(PlanbookError::NotLoaded {
                key: self.key.to_string(),
            });
        }

        let mut next = self.view.document.clone();
        mutate(&mut next)?;

        let stamp = Utc::now();
        self.outbox
            .push_back(codec::encode(&self.family, &next, stamp));
        self.view = ViewState::project::<F>(next, Some(stamp));
        Ok(&self.view)
    }

    /// One turn of the event loop: send queued writes in order, then handle
    /// buffered subscription events in channel order. Repeats while either
    /// side produced work. Returns the number of writes and events handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        for _ in 0..MAX_ROUNDS {
            let round = self.flush_outbox() + self.drain_events();
            if round == 0 {
                break;
            }
            handled += round;
        }
        handled
    }

    /// Block until the first snapshot arrives (or the session degrades), up
    /// to `timeout`. Returns the state reached.
    pub fn wait_until_loaded(&mut self, timeout: Duration) -> SyncState {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_events();
            if self.state != SyncState::Loading {
                return self.state;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.state;
            }
            let event = self
                .subscription
                .as_ref()
                .and_then(|s| s.next_timeout(remaining));
            if let Some(event) = event {
                self.handle(event);
            }
        }
    }

    fn flush_outbox(&mut self) -> usize {
        let mut sent = 0;
        while let Some(payload) = self.outbox.pop_front() {
            sent += 1;
            match self.remote.write(&self.key, &payload) {
                Ok(()) => log::debug!("Wrote '{}'", self.key),
                Err(e) => {
                    log::warn!("Write to '{}' failed, keeping a local copy: {e}", self.key);
                    if let Err(e) = fallback::put_payload(self.fallback.as_ref(), &self.key, &payload) {
                        log::warn!("Local copy of '{}' failed: {e}", self.key);
                    }
                }
            }
        }
        sent
    }

    fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(event) = self.subscription.as_ref().and_then(|s| s.try_next()) else {
                break;
            };
            handled += 1;
            self.handle(event);
        }
        handled
    }

    fn handle(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Snapshot(Some(raw)) => {
                let decoded = codec::decode(&self.family, &raw, self.family.schema_version());
                if decoded.migrated {
                    log::info!(
                        "'{}' upgraded from schema {}, writing it back",
                        self.key,
                        decoded.stored_version
                    );
                    self.outbox
                        .push_back(codec::encode(&self.family, &decoded.document, Utc::now()));
                }
                self.replace(decoded.document, decoded.updated_at);
            }
            ChannelEvent::Snapshot(None) => {
                log::info!("'{}' does not exist yet, creating it", self.key);
                let document = self.family.default_document();
                let stamp = Utc::now();
                self.outbox
                    .push_back(codec::encode(&self.family, &document, stamp));
                self.replace(document, Some(stamp));
            }
            ChannelEvent::Error(message) => self.degrade(PlanbookError::Subscription(message)),
        }
    }

    fn replace(&mut self, document: F::Document, updated_at: Option<DateTime<Utc>>) {
        self.view = ViewState::project::<F>(document, updated_at);
        if self.state == SyncState::Loading {
            self.transition(SyncState::Synced);
        }
        self.notify();
    }

    /// Drop the subscription and continue from the local copy, or the
    /// default document when there is none.
    fn degrade(&mut self, error: PlanbookError) {
        log::warn!("Subscription to '{}' failed, working offline: {error}", self.key);
        self.subscription = None;
        self.transition(SyncState::Degraded);

        let (document, updated_at) = match fallback::get_payload(self.fallback.as_ref(), &self.key) {
            Ok(Some(raw)) => {
                let decoded = codec::decode(&self.family, &raw, self.family.schema_version());
                (decoded.document, decoded.updated_at)
            }
            Ok(None) => (self.family.default_document(), None),
            Err(e) => {
                log::warn!("Reading local copy of '{}' failed: {e}", self.key);
                (self.family.default_document(), None)
            }
        };
        self.view = ViewState::project::<F>(document, updated_at);

        if let Some(on_error) = self.on_error.as_mut() {
            on_error(&error);
        }
        self.notify();
    }

    fn notify(&mut self) {
        if let Some(on_snapshot) = self.on_snapshot.as_mut() {
            on_snapshot(&self.view);
        }
    }

    fn transition(&mut self, to: SyncState) {
        if self.state != to {
            log::debug!("'{}': {} -> {}", self.key, self.state, to);
            self.state = to;
        }
    }
}

impl<F: DocumentFamily> Drop for SyncController<F> {
    fn drop(&mut self) {
        if !self.outbox.is_empty() {
            self.flush_outbox();
        }
    }
}

impl<F: DocumentFamily> fmt::Debug for SyncController<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("pending_writes", &self.outbox.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::checklist::{Checklist, ChecklistEdit};
    use crate::document::guest_list::{Attendance, GuestList, GuestListEdit, GuestRowPatch};
    use crate::document::venue_tour::{template_rows, VenueTour, VenueTourEdit, CURRENT_SCHEMA_VERSION};
    use crate::document::UNVERSIONED;
    use crate::fallback::MemoryFallback;
    use crate::remote::MemoryChannel;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Harness {
        channel: MemoryChannel,
        fallback: Arc<MemoryFallback>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                channel: MemoryChannel::new(),
                fallback: Arc::new(MemoryFallback::new()),
            }
        }

        fn controller<F: DocumentFamily>(&self, family: F) -> SyncController<F> {
            SyncController::new(
                family,
                Arc::new(self.channel.clone()),
                self.fallback.clone(),
            )
        }

        fn synced<F: DocumentFamily>(&self, family: F) -> SyncController<F> {
            let mut controller = self.controller(family);
            controller.subscribe(|_| {}, |_| {}).unwrap();
            controller.process_events();
            assert_eq!(controller.state(), SyncState::Synced);
            controller
        }

        fn remote<F: DocumentFamily>(&self, family: &F) -> F::Document {
            let raw = self.channel.read(&family.key()).unwrap().unwrap();
            codec::decode(family, &raw, family.schema_version()).document
        }
    }

    fn headcount_patch(text: &str) -> GuestRowPatch {
        let mut patch = GuestRowPatch::default();
        patch.set("headcount", text).unwrap();
        patch
    }

    #[test]
    fn test_missing_document_is_created() {
        let h = Harness::new();
        let controller = h.synced(GuestList);
        assert!(h.channel.read(&DocumentKey::GuestList).unwrap().is_some());
        assert_eq!(h.remote(&GuestList), GuestList.default_document());
        assert_eq!(controller.document(), &GuestList.default_document());
        assert!(controller.view().updated_at.is_some());
    }

    #[test]
    fn test_existing_document_is_loaded() {
        let h = Harness::new();
        let mut doc = Checklist.default_document();
        doc.toggle("d-365-budget").unwrap();
        h.channel
            .write(&DocumentKey::Checklist, &codec::encode(&Checklist, &doc, Utc::now()))
            .unwrap();

        let controller = h.synced(Checklist);
        assert!(controller.document().is_completed("d-365-budget"));
        assert_eq!(controller.view().summary.overall.completed, 1);
        assert_eq!(h.channel.write_count(), 1);
    }

    #[test]
    fn test_second_subscribe_is_rejected() {
        let h = Harness::new();
        let mut controller = h.synced(Checklist);
        assert!(matches!(
            controller.subscribe(|_| {}, |_| {}),
            Err(PlanbookError::AlreadySubscribed { .. })
        ));
        assert_eq!(h.channel.subscriber_count(&DocumentKey::Checklist), 1);

        controller.unsubscribe();
        assert_eq!(controller.state(), SyncState::Uninitialized);
        assert_eq!(h.channel.subscriber_count(&DocumentKey::Checklist), 0);
        controller.subscribe(|_| {}, |_| {}).unwrap();
        assert_eq!(h.channel.subscriber_count(&DocumentKey::Checklist), 1);
    }

    #[test]
    fn test_oversized_remote_headcounts_load() {
        let h = Harness::new();
        let row = |id: &str, number: u32| {
            json!({"id": id, "number": number, "side": "groom", "headcount": 4000000000u64})
        };
        h.channel
            .write(
                &DocumentKey::GuestList,
                &json!({"rows": [row("big-1", 1), row("big-2", 2)]}),
            )
            .unwrap();

        let controller = h.synced(GuestList);
        assert_eq!(controller.document().rows.len(), 2);
        assert_eq!(controller.view().summary.by_side.groom, u32::MAX);
        assert_eq!(controller.view().summary.expected_guests, u32::MAX);
    }

    #[test]
    fn test_edit_before_load_is_rejected() {
        let h = Harness::new();
        let mut controller = h.controller(Checklist);
        let edit = ChecklistEdit::Toggle {
            item_id: "d-365-budget".into(),
        };
        assert!(matches!(controller.apply(edit.clone()), Err(PlanbookError::NotLoaded { .. })));

        controller.subscribe(|_| {}, |_| {}).unwrap();
        assert_eq!(controller.state(), SyncState::Loading);
        assert!(controller.apply(edit).is_err());
        assert_eq!(controller.pending_writes(), 0);
    }

    #[test]
    fn test_failed_headcount_write_is_kept_locally() {
        let h = Harness::new();
        let mut controller = h.synced(GuestList);
        h.channel.reject_writes(true);

        let view = controller
            .apply(GuestListEdit::UpdateRow {
                row_id: "guest-row-1".into(),
                patch: headcount_patch("3"),
            })
            .unwrap();
        assert_eq!(view.document.row("guest-row-1").unwrap().headcount, Some(3));
        assert_eq!(view.summary.expected_guests, 3);

        controller.process_events();
        assert_eq!(controller.state(), SyncState::Synced);
        assert_eq!(controller.document().row("guest-row-1").unwrap().headcount, Some(3));

        let stored = fallback::get_payload(h.fallback.as_ref(), &DocumentKey::GuestList)
            .unwrap()
            .unwrap();
        let local = codec::decode(&GuestList, &stored, UNVERSIONED).document;
        assert_eq!(local.row("guest-row-1").unwrap().headcount, Some(3));
        assert_eq!(h.remote(&GuestList).row("guest-row-1").unwrap().headcount, None);
    }

    #[test]
    fn test_sequential_writes_keep_order() {
        let h = Harness::new();
        let mut controller = h.synced(GuestList);
        for text in ["2", "7"] {
            controller
                .apply(GuestListEdit::UpdateRow {
                    row_id: "guest-row-2".into(),
                    patch: headcount_patch(text),
                })
                .unwrap();
        }
        assert_eq!(controller.pending_writes(), 2);
        controller.process_events();

        assert_eq!(h.remote(&GuestList).row("guest-row-2").unwrap().headcount, Some(7));
        assert_eq!(controller.document().row("guest-row-2").unwrap().headcount, Some(7));
    }

    #[test]
    fn test_concurrent_clients_last_write_wins() {
        let h = Harness::new();
        let mut alice = h.synced(Checklist);
        let mut bob = h.synced(Checklist);

        alice
            .apply(ChecklistEdit::Toggle {
                item_id: "d-365-budget".into(),
            })
            .unwrap();
        bob.apply(ChecklistEdit::Toggle {
            item_id: "d-365-date".into(),
        })
        .unwrap();

        alice.process_events();
        bob.process_events();
        alice.process_events();

        for doc in [alice.document(), bob.document(), &h.remote(&Checklist)] {
            assert!(!doc.is_completed("d-365-budget"));
            assert!(doc.is_completed("d-365-date"));
        }
    }

    #[test]
    fn test_remote_change_notifies() {
        let h = Harness::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut controller = h.controller(VenueTour::new("hall-1"));
        controller
            .subscribe(
                move |view: &FamilyView<VenueTour>| sink.borrow_mut().push(view.document.venue_name.clone()),
                |_| {},
            )
            .unwrap();
        controller.process_events();

        let mut other = h.synced(VenueTour::new("hall-1"));
        other
            .apply(VenueTourEdit::Rename {
                name: "Lakeside".into(),
            })
            .unwrap();
        other.process_events();
        controller.process_events();

        assert_eq!(controller.document().venue_name, "Lakeside");
        assert_eq!(seen.borrow().last().map(String::as_str), Some("Lakeside"));
    }

    #[test]
    fn test_subscription_error_seeds_from_fallback() {
        let h = Harness::new();
        let mut local = GuestList.default_document();
        local.rows[0].headcount = Some(9);
        fallback::put_payload(
            h.fallback.as_ref(),
            &DocumentKey::GuestList,
            &codec::encode(&GuestList, &local, Utc::now()),
        )
        .unwrap();

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let mut controller = h.controller(GuestList);
        controller
            .subscribe(|_| {}, move |e: &PlanbookError| sink.borrow_mut().push(e.to_string()))
            .unwrap();
        controller.process_events();
        assert_eq!(controller.state(), SyncState::Synced);
        assert_eq!(controller.document().rows[0].headcount, None);

        h.channel.disconnect(&DocumentKey::GuestList);
        controller.process_events();

        assert_eq!(controller.state(), SyncState::Degraded);
        assert_eq!(controller.document().rows[0].headcount, Some(9));
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn test_refused_subscription_seeds_default() {
        let h = Harness::new();
        h.channel.reject_subscriptions(true);
        let mut controller = h.controller(Checklist);
        controller.subscribe(|_| {}, |_| {}).unwrap();
        assert_eq!(controller.state(), SyncState::Degraded);
        assert_eq!(controller.document(), &Checklist.default_document());
    }

    #[test]
    fn test_degraded_session_stays_degraded() {
        let h = Harness::new();
        let mut controller = h.synced(Checklist);
        h.channel.disconnect(&DocumentKey::Checklist);
        controller.process_events();
        assert_eq!(controller.state(), SyncState::Degraded);

        let mut other = h.synced(Checklist);
        other
            .apply(ChecklistEdit::Toggle {
                item_id: "d-240-photo".into(),
            })
            .unwrap();
        other.process_events();
        controller.process_events();
        assert_eq!(controller.state(), SyncState::Degraded);
        assert!(!controller.document().is_completed("d-240-photo"));

        // Edits still go out while degraded
        controller
            .apply(ChecklistEdit::Toggle {
                item_id: "d-365-tours".into(),
            })
            .unwrap();
        controller.process_events();
        assert!(h.remote(&Checklist).is_completed("d-365-tours"));

        controller.unsubscribe();
        controller.subscribe(|_| {}, |_| {}).unwrap();
        controller.process_events();
        assert_eq!(controller.state(), SyncState::Synced);
        assert!(controller.document().is_completed("d-365-tours"));
    }

    #[test]
    fn test_outdated_venue_is_written_back() {
        let h = Harness::new();
        let family = VenueTour::new("hall-1");
        h.channel
            .write(
                &family.key(),
                &json!({
                    "venueName": "Old Hall",
                    "schemaVersion": 1,
                    "rows": [{ "id": "r1", "category": "Costs", "item": "Rent", "value": "lots" }]
                }),
            )
            .unwrap();

        let controller = h.synced(family.clone());
        assert_eq!(controller.document().rows, template_rows());

        let raw = h.channel.read(&family.key()).unwrap().unwrap();
        assert_eq!(raw["schemaVersion"], json!(CURRENT_SCHEMA_VERSION));
        assert_eq!(raw["venueName"], json!("Old Hall"));
        assert_eq!(h.remote(&family).rows, template_rows());
    }

    #[test]
    fn test_absent_attendance_is_unset() {
        let h = Harness::new();
        h.channel
            .write(
                &DocumentKey::GuestList,
                &json!({ "rows": [{ "id": "r1", "side": "bride", "headcount": 2 }] }),
            )
            .unwrap();
        let controller = h.synced(GuestList);
        let row = controller.document().row("r1").unwrap();
        assert_eq!(row.attendance, Attendance::Unset);
        assert_eq!(row.headcount, Some(2));
    }

    #[test]
    fn test_rejected_edit_queues_nothing() {
        let h = Harness::new();
        let mut controller = h.synced(Checklist);
        let before = controller.view().clone();
        assert!(matches!(
            controller.apply(ChecklistEdit::Toggle {
                item_id: "nope".into()
            }),
            Err(PlanbookError::NotFound { .. })
        ));
        assert_eq!(controller.pending_writes(), 0);
        assert_eq!(controller.view(), &before);
    }

    #[test]
    fn test_delete_prunes_completion_through_controller() {
        let h = Harness::new();
        let mut controller = h.synced(Checklist);
        controller
            .apply(ChecklistEdit::Toggle {
                item_id: "d-240-sdm".into(),
            })
            .unwrap();
        controller
            .apply(ChecklistEdit::DeleteItem {
                section_id: "d-240".into(),
                item_id: "d-240-sdm".into(),
            })
            .unwrap();
        controller.process_events();
        assert!(!h.remote(&Checklist).completed.contains("d-240-sdm"));
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let h = Harness::new();
        {
            let mut controller = h.synced(GuestList);
            controller.apply(GuestListEdit::AddRow).unwrap();
        }
        assert_eq!(h.remote(&GuestList).rows.len(), GuestList.default_document().rows.len() + 1);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let h = Harness::new();
        let first = h.synced(Checklist);
        let second = h.synced(Checklist);
        assert_eq!(h.channel.subscriber_count(&DocumentKey::Checklist), 2);

        drop(first);
        assert_eq!(h.channel.subscriber_count(&DocumentKey::Checklist), 1);
        drop(second);
        assert_eq!(h.channel.subscriber_count(&DocumentKey::Checklist), 0);
    }

    #[test]
    fn test_wait_until_loaded() {
        let h = Harness::new();
        let mut controller = h.controller(Checklist);
        assert_eq!(controller.wait_until_loaded(Duration::from_millis(10)), SyncState::Uninitialized);
        controller.subscribe(|_| {}, |_| {}).unwrap();
        assert_eq!(controller.wait_until_loaded(Duration::from_secs(1)), SyncState::Synced);
    }
}
