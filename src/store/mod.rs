//! The persisted conversation store.
//!
//! [`ConversationStore`] owns every conversation, the current-conversation pointer, and the two
//! UI flags (sidebar and theme).  Each mutation is applied in place, written through to a
//! [`StateSlot`], and then announced to registered [`StoreObserver`]s.  Operations never fail:
//! unknown ids make them no-ops, and persistence failures are logged and counted rather than
//! surfaced.
//!
//! Wrap the store in a [`SharedStore`] to give it a single owner when it is shared between the
//! streaming controller and a front end.

mod observer;
mod persistence;
mod shared;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::{
    STORE_IMPORTS, STORE_IMPORTS_REJECTED, STORE_WRITE_ERRORS, STORE_WRITES,
};
use crate::types::{
    Conversation, DEFAULT_TITLE, ExportDocument, Message, PERSISTED_VERSION, PersistedState,
    Role, StoreState, Theme,
};
use crate::utils::now_millis;

pub use observer::{StoreEvent, StoreObserver};
pub use persistence::{FileSlot, MemorySlot, STORAGE_NAMESPACE, StateSlot};
pub use shared::SharedStore;

/// Prefix of exported file names.
pub const EXPORT_FILE_PREFIX: &str = "confab-export";

/// Minimum spacing between saves caused by message content updates.
pub const DEFAULT_WRITE_INTERVAL: Duration = Duration::from_millis(250);

type Clock = Box<dyn Fn() -> i64 + Send>;

/// Borrowed form of [`PersistedState`] so persisting does not clone the state.
#[derive(Serialize)]
struct PersistedRecord<'a> {
    state: &'a StoreState,
    version: u32,
}

/// An in-memory, persisted table of conversations.
///
/// Streaming overwrites arrive once per token, so saves caused by
/// [`update_message_content`](Self::update_message_content) are spaced at least one write
/// interval apart.  Anything left pending is written by the next other mutation, by
/// [`flush`](Self::flush), or when the store is dropped.
pub struct ConversationStore {
    state: StoreState,
    slot: Box<dyn StateSlot>,
    observers: Vec<Arc<dyn StoreObserver>>,
    clock: Clock,
    // False when the slot holds a record we could neither read nor move aside.
    writable: bool,
    write_interval: Duration,
    last_write: Option<Instant>,
    pending: bool,
}

impl ConversationStore {
    /// Open the store backed by `slot`, rehydrating whatever it holds.
    ///
    /// An empty slot starts from the default state.  So does a malformed record, which is first
    /// set aside through [`StateSlot::set_aside`] so later saves cannot destroy it.  When the
    /// record cannot be read, or cannot be set aside, the store still opens with the default
    /// state but never writes to the slot.
    pub fn open(slot: impl StateSlot + 'static) -> Self {
        let mut slot: Box<dyn StateSlot> = Box::new(slot);
        let mut writable = true;
        let state = match slot.load() {
            Ok(Some(contents)) => match serde_json::from_str::<PersistedState>(&contents) {
                Ok(record) => record.state,
                Err(err) => {
                    log::warn!("discarding malformed persisted state: {err}");
                    if let Err(err) = slot.set_aside(now_millis()) {
                        log::warn!("could not set malformed state aside, changes will not be saved: {err}");
                        writable = false;
                    }
                    StoreState::default()
                }
            },
            Ok(None) => StoreState::default(),
            Err(err) => {
                log::warn!("could not read persisted state, changes will not be saved: {err}");
                writable = false;
                StoreState::default()
            }
        };
        let mut store = Self {
            state,
            slot,
            observers: Vec::new(),
            clock: Box::new(now_millis),
            writable,
            write_interval: DEFAULT_WRITE_INTERVAL,
            last_write: None,
            pending: false,
        };
        store.repair_current();
        store
    }

    /// Open a store over a fresh [`MemorySlot`].
    pub fn in_memory() -> Self {
        Self::open(MemorySlot::new())
    }

    /// Replace the clock used to stamp conversations and messages.
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Set the minimum spacing between saves caused by message content updates.
    ///
    /// `Duration::ZERO` saves after every update.
    pub fn with_write_interval(mut self, interval: Duration) -> Self {
        self.write_interval = interval;
        self
    }

    /// Whether mutations are being written to the slot.
    pub fn is_persisting(&self) -> bool {
        self.writable
    }

    /// Write any debounced update now.
    pub fn flush(&mut self) {
        if self.pending {
            self.persist();
        }
    }

    /// Register an observer for every subsequent mutation.
    pub fn subscribe(&mut self, observer: Arc<dyn StoreObserver>) {
        self.observers.push(observer);
    }

    /// The complete state.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    /// All conversations, newest-created first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.state.chats
    }

    /// Look up a conversation by id.
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.state.chats.iter().find(|c| c.id == id)
    }

    /// The id of the selected conversation.
    pub fn current_conversation_id(&self) -> Option<&str> {
        self.state.current_chat_id.as_deref()
    }

    /// The selected conversation, if the pointer is set and valid.
    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current_conversation_id()
            .and_then(|id| self.conversation(id))
    }

    /// Whether the conversation list is hidden.
    pub fn sidebar_collapsed(&self) -> bool {
        self.state.sidebar_collapsed
    }

    /// The theme the host should apply.
    pub fn theme(&self) -> Theme {
        self.state.theme
    }

    /// Conversations whose title contains `query`, ignoring case, in store order.
    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        let query = query.to_lowercase();
        self.state
            .chats
            .iter()
            .filter(|c| c.title.to_lowercase().contains(&query))
            .collect()
    }

    /// Insert a new empty conversation at the head, make it current, and return its id.
    pub fn create_conversation(&mut self) -> String {
        let conversation = Conversation::new(self.now());
        let id = conversation.id.clone();
        self.state.chats.insert(0, conversation);
        self.state.current_chat_id = Some(id.clone());
        self.commit(StoreEvent::ConversationCreated {
            conversation_id: id.clone(),
        });
        id
    }

    /// Remove a conversation.
    ///
    /// If it was current, the new head becomes current, or nothing when none remain.
    pub fn delete_conversation(&mut self, id: &str) {
        let Some(index) = self.state.chats.iter().position(|c| c.id == id) else {
            return;
        };
        self.state.chats.remove(index);
        if self.current_conversation_id() == Some(id) {
            self.state.current_chat_id = self.state.chats.first().map(|c| c.id.clone());
        }
        self.commit(StoreEvent::ConversationDeleted {
            conversation_id: id.to_string(),
        });
    }

    /// Give a conversation an explicit title.
    ///
    /// The title is trimmed; an empty result leaves the conversation untouched.
    pub fn rename_conversation(&mut self, id: &str, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            return;
        }
        let now = self.now();
        let Some(conversation) = self.conversation_mut(id) else {
            return;
        };
        conversation.title = title.to_string();
        conversation.touch(now);
        self.commit(StoreEvent::ConversationRenamed {
            conversation_id: id.to_string(),
            title: title.to_string(),
        });
    }

    /// Point at a conversation, or at none.
    ///
    /// The id is not checked; callers pass ids they got from this store.
    pub fn set_current(&mut self, id: Option<&str>) {
        self.state.current_chat_id = id.map(str::to_string);
        self.commit(StoreEvent::CurrentChanged {
            conversation_id: self.state.current_chat_id.clone(),
        });
    }

    /// Append a message and return its generated id.
    ///
    /// The first message of a conversation names it when the user wrote it.  Returns `None`,
    /// changing nothing, when the conversation does not exist.
    pub fn add_message(
        &mut self,
        conversation_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Option<String> {
        let message = Message::new(role, content, self.now());
        let message_id = message.id.clone();
        self.conversation_mut(conversation_id)?.push(message);
        self.commit(StoreEvent::MessageAdded {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.clone(),
        });
        Some(message_id)
    }

    /// Replace the content of an existing message.
    ///
    /// Writing the content a message already has is a no-op, so repeated updates converge on
    /// the same state.
    pub fn update_message_content(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        content: impl Into<String>,
    ) {
        let content = content.into();
        let now = self.now();
        let Some(conversation) = self.conversation_mut(conversation_id) else {
            return;
        };
        let Some(message) = conversation.messages.iter_mut().find(|m| m.id == message_id) else {
            return;
        };
        if message.content == content {
            return;
        }
        message.content = content;
        conversation.touch(now);
        self.commit(StoreEvent::MessageUpdated {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
        });
    }

    /// Drop every message of a conversation and restore the default title.
    pub fn clear_messages(&mut self, conversation_id: &str) {
        let now = self.now();
        let Some(conversation) = self.conversation_mut(conversation_id) else {
            return;
        };
        conversation.messages.clear();
        conversation.title = DEFAULT_TITLE.to_string();
        conversation.touch(now);
        self.commit(StoreEvent::MessagesCleared {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Flip the sidebar flag and return the new value.
    pub fn toggle_sidebar(&mut self) -> bool {
        self.state.sidebar_collapsed = !self.state.sidebar_collapsed;
        let collapsed = self.state.sidebar_collapsed;
        self.commit(StoreEvent::SidebarToggled { collapsed });
        collapsed
    }

    /// Flip the theme and return the new one.
    pub fn toggle_theme(&mut self) -> Theme {
        self.state.theme = self.state.theme.toggled();
        let theme = self.state.theme;
        self.commit(StoreEvent::ThemeChanged { theme });
        theme
    }

    /// Serialize every conversation as a versioned export document.
    pub fn export_all(&self) -> Result<String> {
        let document = ExportDocument::new(self.state.chats.clone());
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Replace every conversation with those in `data`, ignoring failures.
    ///
    /// A payload that is not JSON, has no `chats` array, or holds malformed conversations is
    /// logged and otherwise ignored.  Use [`try_import`](Self::try_import) to see why.
    pub fn import_all(&mut self, data: &str) {
        let _ = self.try_import(data);
    }

    /// Replace every conversation with those in `data` and return how many were imported.
    ///
    /// On error the store is left exactly as it was.  On success the current pointer is kept if
    /// it names an imported conversation and otherwise moves to the head.
    pub fn try_import(&mut self, data: &str) -> Result<usize> {
        match parse_export(data) {
            Ok(chats) => {
                let count = chats.len();
                self.state.chats = chats;
                self.repair_current();
                STORE_IMPORTS.click();
                self.commit(StoreEvent::Imported { count });
                Ok(count)
            }
            Err(err) => {
                STORE_IMPORTS_REJECTED.click();
                log::warn!("failed to import chats: {err}");
                self.notify(&StoreEvent::ImportRejected {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Write an export document into `dir` under a timestamped name and return its path.
    pub fn export_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir
            .as_ref()
            .join(format!("{EXPORT_FILE_PREFIX}-{}.json", (self.clock)()));
        let document = self.export_all()?;
        fs::write(&path, document)
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))?;
        Ok(path)
    }

    /// Import the export document stored at `path`.
    pub fn import_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        self.try_import(&data)
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.state.chats.iter_mut().find(|c| c.id == id)
    }

    fn repair_current(&mut self) {
        let dangling = self
            .state
            .current_chat_id
            .as_deref()
            .is_some_and(|id| self.conversation(id).is_none());
        if dangling {
            self.state.current_chat_id = self.state.chats.first().map(|c| c.id.clone());
        }
    }

    fn commit(&mut self, event: StoreEvent) {
        let debounce = matches!(event, StoreEvent::MessageUpdated { .. })
            && self
                .last_write
                .is_some_and(|at| at.elapsed() < self.write_interval);
        if debounce {
            self.pending = true;
        } else {
            self.persist();
        }
        self.notify(&event);
    }

    fn persist(&mut self) {
        self.pending = false;
        if !self.writable {
            return;
        }
        self.last_write = Some(Instant::now());
        let record = PersistedRecord {
            state: &self.state,
            version: PERSISTED_VERSION,
        };
        let result = serde_json::to_string(&record)
            .map_err(Error::from)
            .and_then(|contents| self.slot.save(&contents));
        match result {
            Ok(()) => STORE_WRITES.click(),
            Err(err) => {
                STORE_WRITE_ERRORS.click();
                log::warn!("failed to persist conversation store: {err}");
            }
        }
    }

    fn notify(&self, event: &StoreEvent) {
        for observer in &self.observers {
            observer.on_event(self, event);
        }
    }
}

impl Drop for ConversationStore {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Pull the conversations out of an export document.
fn parse_export(data: &str) -> Result<Vec<Conversation>> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    let chats = value
        .get("chats")
        .filter(|chats| chats.is_array())
        .ok_or_else(|| {
            Error::validation(
                "import payload has no chats array",
                Some("chats".to_string()),
            )
        })?;
    Ok(Vec::<Conversation>::deserialize(chats)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    fn ticking_clock(start: i64) -> impl Fn() -> i64 + Send + 'static {
        let tick = AtomicI64::new(start);
        move || tick.fetch_add(1, Ordering::Relaxed)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<StoreEvent>>,
    }

    impl StoreObserver for Recorder {
        fn on_event(&self, _: &ConversationStore, event: &StoreEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    /// A slot that fails on command and counts save attempts.
    #[derive(Clone, Default)]
    struct FailingSlot {
        record: Option<String>,
        fail_load: bool,
        fail_save: bool,
        fail_set_aside: bool,
        saves: Arc<AtomicUsize>,
    }

    impl FailingSlot {
        fn saves(&self) -> usize {
            self.saves.load(Ordering::Relaxed)
        }
    }

    fn injected() -> std::io::Error {
        std::io::Error::other("injected failure")
    }

    impl StateSlot for FailingSlot {
        fn load(&self) -> Result<Option<String>> {
            if self.fail_load {
                return Err(Error::io("failed to read slot", injected()));
            }
            Ok(self.record.clone())
        }

        fn save(&mut self, _: &str) -> Result<()> {
            self.saves.fetch_add(1, Ordering::Relaxed);
            if self.fail_save {
                return Err(Error::io("failed to write slot", injected()));
            }
            Ok(())
        }

        fn set_aside(&mut self, _: i64) -> Result<()> {
            if self.fail_set_aside {
                return Err(Error::io("failed to move slot", injected()));
            }
            self.record = None;
            Ok(())
        }
    }

    #[test]
    fn create_adds_at_head_and_selects() {
        let mut store = ConversationStore::in_memory();
        let first = store.create_conversation();
        let second = store.create_conversation();
        let ids: Vec<&str> = store.conversations().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);
        assert_eq!(store.current_conversation_id(), Some(second.as_str()));
        assert_eq!(store.conversation(&first).unwrap().title, DEFAULT_TITLE);
    }

    #[test]
    fn first_user_message_names_conversation() {
        let mut store = ConversationStore::in_memory();
        let c1 = store.create_conversation();
        store.add_message(&c1, Role::User, "Hi");
        let conversation = store.conversation(&c1).unwrap();
        assert_eq!(conversation.title, "Hi");
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "Hi");
    }

    #[test]
    fn long_first_message_is_truncated() {
        let mut store = ConversationStore::in_memory();
        let id = store.create_conversation();
        let content = "a".repeat(51);
        store.add_message(&id, Role::User, content);
        assert_eq!(
            store.conversation(&id).unwrap().title,
            format!("{}...", "a".repeat(50))
        );
    }

    #[test]
    fn add_message_to_missing_conversation_is_noop() {
        let slot = MemorySlot::new();
        let mut store = ConversationStore::open(slot.clone());
        assert_eq!(store.add_message("chat-nope", Role::User, "Hi"), None);
        assert!(store.conversations().is_empty());
        assert_eq!(slot.contents(), None);
    }

    #[test]
    fn delete_only_current_conversation() {
        let mut store = ConversationStore::in_memory();
        let id = store.create_conversation();
        store.delete_conversation(&id);
        assert_eq!(store.current_conversation_id(), None);
        assert!(store.conversations().is_empty());
    }

    #[test]
    fn delete_current_falls_back_to_head() {
        let mut store = ConversationStore::in_memory();
        let a = store.create_conversation();
        let b = store.create_conversation();
        let c = store.create_conversation();
        store.set_current(Some(&b));
        store.delete_conversation(&b);
        assert_eq!(store.current_conversation_id(), Some(c.as_str()));
        store.delete_conversation(&a);
        assert_eq!(store.current_conversation_id(), Some(c.as_str()));
        store.delete_conversation("chat-missing");
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn current_pointer_stays_valid() {
        // Deterministic pseudo-random walk over create/delete.
        let mut store = ConversationStore::in_memory();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let ids: Vec<String> = store.conversations().iter().map(|c| c.id.clone()).collect();
            if ids.is_empty() || seed % 3 == 0 {
                store.create_conversation();
            } else {
                let victim = &ids[(seed as usize / 3) % ids.len()];
                store.delete_conversation(victim);
            }
            match store.current_conversation_id() {
                None => {}
                Some(id) => assert!(store.conversation(id).is_some()),
            }
            if store.conversations().is_empty() {
                assert_eq!(store.current_conversation_id(), None);
            }
        }
    }

    #[test]
    fn rename_trims_and_ignores_empty() {
        let mut store = ConversationStore::in_memory().with_clock(ticking_clock(1_000));
        let id = store.create_conversation();
        let before = store.conversation(&id).unwrap().updated_at;
        store.rename_conversation(&id, "   ");
        assert_eq!(store.conversation(&id).unwrap().title, DEFAULT_TITLE);
        assert_eq!(store.conversation(&id).unwrap().updated_at, before);
        store.rename_conversation(&id, "  Trip plans ");
        let conversation = store.conversation(&id).unwrap();
        assert_eq!(conversation.title, "Trip plans");
        assert!(conversation.updated_at > before);
        store.rename_conversation("chat-missing", "x");
    }

    #[test]
    fn rename_survives_later_messages() {
        let mut store = ConversationStore::in_memory();
        let id = store.create_conversation();
        store.rename_conversation(&id, "Pinned");
        store.add_message(&id, Role::User, "Hello there");
        assert_eq!(store.conversation(&id).unwrap().title, "Pinned");
    }

    #[test]
    fn update_message_content_is_idempotent() {
        let mut store = ConversationStore::in_memory().with_clock(ticking_clock(1));
        let id = store.create_conversation();
        let msg = store.add_message(&id, Role::Assistant, "").unwrap();
        store.update_message_content(&id, &msg, "Hello");
        let once = store.state().clone();
        store.update_message_content(&id, &msg, "Hello");
        assert_eq!(store.state(), &once);
        assert_eq!(store.conversation(&id).unwrap().messages[0].content, "Hello");
    }

    #[test]
    fn update_with_unknown_ids_is_noop() {
        let mut store = ConversationStore::in_memory().with_clock(ticking_clock(1));
        let id = store.create_conversation();
        store.add_message(&id, Role::User, "Hi");
        let before = store.state().clone();
        store.update_message_content(&id, "msg-missing", "x");
        store.update_message_content("chat-missing", "msg-missing", "x");
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn updated_at_never_decreases() {
        let backwards = AtomicI64::new(10_000);
        let mut store = ConversationStore::in_memory()
            .with_clock(move || backwards.fetch_sub(10, Ordering::Relaxed));
        let id = store.create_conversation();
        let mut last = store.conversation(&id).unwrap().updated_at;
        for i in 0..5 {
            store.add_message(&id, Role::User, format!("m{i}"));
            let now = store.conversation(&id).unwrap().updated_at;
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn clear_messages_resets_title() {
        let mut store = ConversationStore::in_memory();
        let id = store.create_conversation();
        store.add_message(&id, Role::User, "Hi");
        store.add_message(&id, Role::Assistant, "Hello!");
        store.clear_messages(&id);
        let conversation = store.conversation(&id).unwrap();
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.title, DEFAULT_TITLE);
        store.add_message(&id, Role::User, "Again");
        assert_eq!(store.conversation(&id).unwrap().title, "Again");
    }

    #[test]
    fn toggles_flip_flags() {
        let mut store = ConversationStore::in_memory();
        assert!(!store.sidebar_collapsed());
        assert_eq!(store.theme(), Theme::Dark);
        assert!(store.toggle_sidebar());
        assert_eq!(store.toggle_theme(), Theme::Light);
        assert!(store.sidebar_collapsed());
        assert_eq!(store.theme(), Theme::Light);
        assert!(!store.toggle_sidebar());
        assert_eq!(store.toggle_theme(), Theme::Dark);
    }

    #[test]
    fn export_then_import_round_trips() {
        let mut store = ConversationStore::in_memory();
        let a = store.create_conversation();
        store.add_message(&a, Role::User, "Hi");
        store.add_message(&a, Role::Assistant, "Hello!");
        let b = store.create_conversation();
        store.rename_conversation(&b, "Second");
        let before = store.conversations().to_vec();

        let exported = store.export_all().unwrap();
        let document: serde_json::Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(document["version"], "1.0");

        assert_eq!(store.try_import(&exported).unwrap(), 2);
        assert_eq!(store.conversations(), before.as_slice());
        assert_eq!(store.current_conversation_id(), Some(b.as_str()));
    }

    #[test]
    fn import_into_fresh_store() {
        let mut source = ConversationStore::in_memory();
        let id = source.create_conversation();
        source.add_message(&id, Role::User, "Carry me over");
        let exported = source.export_all().unwrap();

        let mut target = ConversationStore::in_memory();
        target.import_all(&exported);
        assert_eq!(target.conversations(), source.conversations());
        assert_eq!(target.current_conversation_id(), None);
    }

    #[test]
    fn import_repairs_dangling_current() {
        let mut store = ConversationStore::in_memory();
        store.create_conversation();
        let mut other = ConversationStore::in_memory();
        let kept = other.create_conversation();
        store.import_all(&other.export_all().unwrap());
        assert_eq!(store.current_conversation_id(), Some(kept.as_str()));
    }

    #[test]
    fn rejected_imports_leave_store_unchanged() {
        let slot = MemorySlot::new();
        let recorder = Arc::new(Recorder::default());
        let mut store = ConversationStore::open(slot.clone());
        let id = store.create_conversation();
        store.add_message(&id, Role::User, "Keep me");
        store.subscribe(recorder.clone());
        let before = store.state().clone();
        let persisted = slot.contents();

        for payload in [
            "not json at all",
            r#"{"version":"1.0"}"#,
            r#"{"chats":{"id":"x"}}"#,
            r#"{"chats":"nope"}"#,
            r#"{"chats":[{"id":"x"}]}"#,
            "[]",
        ] {
            store.import_all(payload);
            assert_eq!(store.state(), &before, "{payload}");
        }
        assert_eq!(slot.contents(), persisted);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 6);
        assert!(
            events
                .iter()
                .all(|e| matches!(e, StoreEvent::ImportRejected { .. }))
        );
    }

    #[test]
    fn try_import_reports_reason() {
        let mut store = ConversationStore::in_memory();
        let err = store.try_import(r#"{"version":"1.0"}"#).unwrap_err();
        assert!(err.is_validation());
        let err = store.try_import("{").unwrap_err();
        assert!(err.is_serialization());
    }

    #[test]
    fn search_filters_titles_case_insensitively() {
        let mut store = ConversationStore::in_memory();
        let rust = store.create_conversation();
        store.rename_conversation(&rust, "Rust lifetimes");
        let trip = store.create_conversation();
        store.rename_conversation(&trip, "Trip to Lisbon");
        let found: Vec<&str> = store.search("RUST").iter().map(|c| c.id.as_str()).collect();
        assert_eq!(found, vec![rust.as_str()]);
        assert_eq!(store.search("").len(), 2);
        assert!(store.search("nothing").is_empty());
    }

    #[test]
    fn every_mutation_is_persisted_and_rehydrated() {
        let slot = MemorySlot::new();
        let mut store = ConversationStore::open(slot.clone());
        let id = store.create_conversation();
        store.add_message(&id, Role::User, "Remember me");
        store.toggle_theme();
        store.toggle_sidebar();
        let state = store.state().clone();
        drop(store);

        let record: serde_json::Value =
            serde_json::from_str(&slot.contents().unwrap()).unwrap();
        assert_eq!(record["version"], 0);
        assert_eq!(record["state"]["currentChatId"], id.as_str());
        assert_eq!(record["state"]["theme"], "light");
        assert_eq!(record["state"]["sidebarCollapsed"], true);

        let reopened = ConversationStore::open(slot);
        assert_eq!(reopened.state(), &state);
    }

    #[test]
    fn malformed_record_starts_fresh() {
        let slot = MemorySlot::with_contents("{{{");
        let mut store = ConversationStore::open(slot.clone());
        assert_eq!(store.state(), &StoreState::default());
        assert!(store.is_persisting());
        store.toggle_theme();
        assert_eq!(slot.set_aside_contents().as_deref(), Some("{{{"));
        assert!(slot.contents().unwrap().contains("\"light\""));
    }

    #[test]
    fn conversation_missing_timestamps_is_kept() {
        let record = r#"{"state":{"chats":[{"id":"chat-1","title":"Old","messages":[{"id":"msg-1","role":"user","content":"Old","timestamp":5}],"createdAt":5}],"currentChatId":"chat-1","sidebarCollapsed":false,"theme":"dark"},"version":0}"#;
        let slot = MemorySlot::with_contents(record);
        let mut store = ConversationStore::open(slot.clone()).with_clock(|| 10);
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.current_conversation().unwrap().messages[0].content, "Old");
        store.toggle_theme();

        let reopened = ConversationStore::open(slot.clone());
        let conversation = reopened.conversation("chat-1").unwrap();
        assert_eq!(conversation.title, "Old");
        assert_eq!(conversation.updated_at, 0);
        assert_eq!(slot.set_aside_contents(), None);
    }

    #[test]
    fn unparseable_history_is_set_aside_before_overwrite() {
        // Missing a title, so the record cannot be rehydrated.
        let record = r#"{"state":{"chats":[{"id":"chat-1","messages":[]}]},"version":0}"#;
        let slot = MemorySlot::with_contents(record);
        let mut store = ConversationStore::open(slot.clone());
        assert!(store.conversations().is_empty());
        store.create_conversation();
        assert_eq!(slot.set_aside_contents().as_deref(), Some(record));
        assert_ne!(slot.contents().as_deref(), Some(record));
    }

    #[test]
    fn record_that_cannot_be_set_aside_is_never_overwritten() {
        let slot = FailingSlot {
            record: Some("{{{".to_string()),
            fail_set_aside: true,
            ..FailingSlot::default()
        };
        let mut store = ConversationStore::open(slot.clone());
        assert!(!store.is_persisting());
        let id = store.create_conversation();
        store.add_message(&id, Role::User, "Hi");
        assert_eq!(store.conversation(&id).unwrap().title, "Hi");
        assert_eq!(slot.saves(), 0);
    }

    #[test]
    fn unreadable_slot_opens_fresh_without_writing() {
        let slot = FailingSlot {
            fail_load: true,
            ..FailingSlot::default()
        };
        let recorder = Arc::new(Recorder::default());
        let mut store = ConversationStore::open(slot.clone());
        store.subscribe(recorder.clone());
        assert_eq!(store.state(), &StoreState::default());
        assert!(!store.is_persisting());
        let id = store.create_conversation();
        assert_eq!(store.current_conversation_id(), Some(id.as_str()));
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
        assert_eq!(slot.saves(), 0);
    }

    #[test]
    fn failed_save_does_not_fail_mutation() {
        let slot = FailingSlot {
            fail_save: true,
            ..FailingSlot::default()
        };
        let recorder = Arc::new(Recorder::default());
        let mut store = ConversationStore::open(slot.clone());
        store.subscribe(recorder.clone());
        let id = store.create_conversation();
        let msg = store.add_message(&id, Role::User, "Hi").unwrap();
        assert_eq!(store.toggle_theme(), Theme::Light);

        assert_eq!(store.conversation(&id).unwrap().message(&msg).unwrap().content, "Hi");
        assert_eq!(store.theme(), Theme::Light);
        assert_eq!(slot.saves(), 3);
        assert_eq!(
            recorder.events.lock().unwrap().clone(),
            vec![
                StoreEvent::ConversationCreated {
                    conversation_id: id.clone()
                },
                StoreEvent::MessageAdded {
                    conversation_id: id.clone(),
                    message_id: msg
                },
                StoreEvent::ThemeChanged {
                    theme: Theme::Light
                },
            ]
        );
    }

    #[test]
    fn content_updates_are_debounced_until_flush() {
        let slot = MemorySlot::new();
        let recorder = Arc::new(Recorder::default());
        let mut store =
            ConversationStore::open(slot.clone()).with_write_interval(Duration::from_secs(3600));
        store.subscribe(recorder.clone());
        let id = store.create_conversation();
        let msg = store.add_message(&id, Role::Assistant, "").unwrap();
        let before = slot.contents();
        for partial in ["H", "He", "Hel", "Hello"] {
            store.update_message_content(&id, &msg, partial);
        }
        assert_eq!(slot.contents(), before);
        assert_eq!(recorder.events.lock().unwrap().len(), 6);

        store.flush();
        let reopened = ConversationStore::open(slot.clone());
        assert_eq!(reopened.conversation(&id).unwrap().messages[0].content, "Hello");
    }

    #[test]
    fn pending_update_is_written_on_drop() {
        let slot = MemorySlot::new();
        let mut store =
            ConversationStore::open(slot.clone()).with_write_interval(Duration::from_secs(3600));
        let id = store.create_conversation();
        let msg = store.add_message(&id, Role::Assistant, "").unwrap();
        store.update_message_content(&id, &msg, "partial");
        drop(store);
        let reopened = ConversationStore::open(slot);
        assert_eq!(reopened.conversation(&id).unwrap().messages[0].content, "partial");
    }

    #[test]
    fn zero_interval_saves_every_update() {
        let slot = FailingSlot::default();
        let mut store = ConversationStore::open(slot.clone()).with_write_interval(Duration::ZERO);
        let id = store.create_conversation();
        let msg = store.add_message(&id, Role::Assistant, "").unwrap();
        store.update_message_content(&id, &msg, "a");
        store.update_message_content(&id, &msg, "ab");
        assert_eq!(slot.saves(), 4);
        store.flush();
        assert_eq!(slot.saves(), 4);
    }

    #[test]
    fn rehydrate_clears_dangling_current() {
        let slot = MemorySlot::with_contents(
            r#"{"state":{"chats":[],"currentChatId":"chat-gone","sidebarCollapsed":false,"theme":"dark"},"version":0}"#,
        );
        let store = ConversationStore::open(slot);
        assert_eq!(store.current_conversation_id(), None);
    }

    #[test]
    fn observers_see_events_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut store = ConversationStore::in_memory();
        store.subscribe(recorder.clone());
        let id = store.create_conversation();
        let msg = store.add_message(&id, Role::Assistant, "").unwrap();
        store.update_message_content(&id, &msg, "tok");
        store.toggle_theme();
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                StoreEvent::ConversationCreated {
                    conversation_id: id.clone()
                },
                StoreEvent::MessageAdded {
                    conversation_id: id.clone(),
                    message_id: msg.clone()
                },
                StoreEvent::MessageUpdated {
                    conversation_id: id.clone(),
                    message_id: msg.clone()
                },
                StoreEvent::ThemeChanged {
                    theme: Theme::Light
                },
            ]
        );
    }

    #[test]
    fn export_and_import_files() {
        let dir = std::env::temp_dir().join(format!(
            "confab-export-test-{}",
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(&dir).unwrap();
        let mut store = ConversationStore::in_memory().with_clock(|| 1_700_000_000_000);
        let id = store.create_conversation();
        store.add_message(&id, Role::User, "Export me");
        let path = store.export_to_dir(&dir).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("confab-export-1700000000000.json")
        );

        let mut other = ConversationStore::in_memory();
        assert_eq!(other.import_from_file(&path).unwrap(), 1);
        assert_eq!(other.conversations(), store.conversations());
        assert!(other.import_from_file(dir.join("missing.json")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
