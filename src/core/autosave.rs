//! Timer-driven auto-save of the editor buffer
//!
//! The manager owns one repeating timer task and the name of the file the
//! buffer currently represents. Each tick snapshots the buffer into the
//! record store under that name. A failed write is logged and the timer
//! stays armed; the next tick is the retry.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::clock::Clock;
use super::document::EditorContent;
use super::store::{unique_name, FileRecord, KeyedRecordStore, StoreError, StoreResult};

/// Default time between ticks
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_millis(10_000);

/// Result of a single save attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A record was written
    Saved,
    /// The buffer was empty, nothing was written
    SkippedEmpty,
    /// The buffer was being switched to another file, nothing was written
    SkippedSwitching,
}

struct ManagerState {
    current_file_name: Option<String>,
    /// Set while the buffer is loaded with another file's content
    switching: bool,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    store: Arc<KeyedRecordStore>,
    editor: Arc<dyn EditorContent>,
    clock: Arc<dyn Clock>,
    state: Mutex<ManagerState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Blocking: the store write runs on the calling thread with the state
    // lock held, one small blob per tick.
    fn save(&self) -> StoreResult<SaveOutcome> {
        // Content and target name are read under the same lock
        let mut state = self.state();
        if state.switching {
            return Ok(SaveOutcome::SkippedSwitching);
        }
        let content = self.editor.get_content();
        if content.is_empty() {
            return Ok(SaveOutcome::SkippedEmpty);
        }

        let name = file_name_or_default(&mut state, &self.store, self.clock.as_ref());
        let now = self.clock.now();
        self.store.upsert(&name, FileRecord::new(content, now))?;
        tracing::debug!("Auto-saved '{}'", name);
        Ok(SaveOutcome::Saved)
    }

    fn tick(&self) {
        if let Err(e) = self.save() {
            tracing::warn!("Auto-save skipped this cycle: {}", e);
        }
    }
}

fn file_name_or_default(
    state: &mut ManagerState,
    store: &KeyedRecordStore,
    clock: &dyn Clock,
) -> String {
    state
        .current_file_name
        .get_or_insert_with(|| unique_name(&default_file_name(clock), &store.read_all()))
        .clone()
}

/// Base name of the form `untitled_<millis>`; not checked against the store
pub fn default_file_name(clock: &dyn Clock) -> String {
    format!("untitled_{}", clock.now().timestamp_millis())
}

/// Periodically persists the live editor buffer
pub struct AutoSaveManager {
    shared: Arc<Shared>,
    interval: Duration,
}

impl AutoSaveManager {
    /// Create a stopped manager
    pub fn new(
        store: Arc<KeyedRecordStore>,
        editor: Arc<dyn EditorContent>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                editor,
                clock,
                state: Mutex::new(ManagerState {
                    current_file_name: None,
                    switching: false,
                    timer: None,
                }),
            }),
            interval,
        }
    }

    /// Save once, then arm the repeating timer
    ///
    /// Restarting while running replaces the existing timer. A zero interval
    /// performs the immediate save but arms no timer. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        self.shared.tick();

        let mut state = self.shared.state();
        if let Some(timer) = state.timer.take() {
            timer.abort();
            tracing::debug!("Replaced running auto-save timer");
        }
        if self.interval.is_zero() {
            tracing::info!("Auto-save timer disabled");
            return;
        }

        let shared = Arc::clone(&self.shared);
        let period = self.interval;
        state.timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                shared.tick();
            }
        }));
        tracing::info!("Auto-save started (every {:?})", period);
    }

    /// Start once `ready` fires
    ///
    /// If the sender is dropped the editor never became ready and the
    /// manager stays stopped.
    pub fn start_when_ready(self: &Arc<Self>, ready: oneshot::Receiver<()>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match ready.await {
                Ok(()) => manager.start(),
                Err(_) => tracing::warn!("Editor was never ready; auto-save not started"),
            }
        })
    }

    /// Cancel the timer; no-op when already stopped
    pub fn stop(&self) {
        if let Some(timer) = self.shared.state().timer.take() {
            timer.abort();
            tracing::info!("Auto-save stopped");
        }
    }

    /// Whether a timer is armed
    pub fn is_running(&self) -> bool {
        self.shared.state().timer.is_some()
    }

    /// Snapshot the buffer into the store under the current file name
    pub fn save(&self) -> StoreResult<SaveOutcome> {
        self.shared.save()
    }

    /// Name the next save targets, generating one on first use
    pub fn get_file_name(&self) -> String {
        let mut state = self.shared.state();
        file_name_or_default(&mut state, &self.shared.store, self.shared.clock.as_ref())
    }

    /// Rebind the current file name; blank names are ignored
    ///
    /// No record is moved. Use [`AutoSaveManager::rename_file`] to rename
    /// the stored file as well.
    pub fn set_file_name(&self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            tracing::debug!("Ignoring blank file name");
            return;
        }
        self.shared.state().current_file_name = Some(name.to_string());
    }

    /// Load another file into the buffer and make it current
    ///
    /// Saves are skipped while `load` runs, so no save can write the
    /// incoming content under the outgoing name or the reverse. `load` may
    /// itself trigger a save; it is not called with the state lock held.
    pub fn switch_file(&self, name: &str, load: impl FnOnce()) {
        let name = name.trim();
        if name.is_empty() {
            tracing::debug!("Ignoring switch to blank file name");
            return;
        }

        self.shared.state().switching = true;
        load();
        let mut state = self.shared.state();
        state.current_file_name = Some(name.to_string());
        state.switching = false;
    }

    /// Rename a stored file, following it if it is the current one
    ///
    /// The store rename and the rebind happen under one lock, so no tick can
    /// land under the old name in between.
    pub fn rename_file(&self, old_name: &str, new_name: &str) -> StoreResult<bool> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(StoreError::InvalidName(new_name.to_string()));
        }

        let mut state = self.shared.state();
        let renamed = self.shared.store.rename(old_name, new_name)?;
        if renamed && state.current_file_name.as_deref() == Some(old_name) {
            state.current_file_name = Some(new_name.to_string());
        }
        Ok(renamed)
    }
}

impl Drop for AutoSaveManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::document::EditorBuffer;
    use crate::core::storage::MemoryStorage;
    use chrono::{TimeZone, Utc};

    const INTERVAL: Duration = Duration::from_millis(10_000);

    struct Harness {
        storage: Arc<MemoryStorage>,
        store: Arc<KeyedRecordStore>,
        editor: Arc<EditorBuffer>,
        clock: Arc<ManualClock>,
        manager: AutoSaveManager,
    }

    fn harness_with(storage: MemoryStorage, content: &str) -> Harness {
        let storage = Arc::new(storage);
        let store = Arc::new(KeyedRecordStore::new(storage.clone()));
        let editor = Arc::new(EditorBuffer::new(content));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let manager = AutoSaveManager::new(store.clone(), editor.clone(), clock.clone(), INTERVAL);
        Harness {
            storage,
            store,
            editor,
            clock,
            manager,
        }
    }

    fn harness(content: &str) -> Harness {
        harness_with(MemoryStorage::new(), content)
    }

    async fn wait(duration: Duration) {
        time::sleep(duration).await;
    }

    #[test]
    fn test_default_file_name_is_generated_once() {
        let h = harness("x");
        let name = h.manager.get_file_name();
        assert_eq!(name, format!("untitled_{}", h.clock.now().timestamp_millis()));

        h.clock.advance(chrono::Duration::seconds(5));
        assert_eq!(h.manager.get_file_name(), name);
    }

    #[test]
    fn test_blank_file_name_is_ignored() {
        let h = harness("x");
        h.manager.set_file_name("  notes  ");
        h.manager.set_file_name("   ");
        h.manager.set_file_name("");
        assert_eq!(h.manager.get_file_name(), "notes");
    }

    #[test]
    fn test_save_writes_record() {
        let h = harness("hello");
        h.manager.set_file_name("f");

        assert_eq!(h.manager.save().unwrap(), SaveOutcome::Saved);
        let record = h.store.get("f").unwrap();
        assert_eq!(record.content, "hello");
        assert_eq!(record.save_time, h.clock.now());
        assert_eq!(record.last_open_time, h.clock.now());
    }

    #[test]
    fn test_save_skips_empty_content() {
        let h = harness("");
        h.manager.set_file_name("fresh");

        assert_eq!(h.manager.save().unwrap(), SaveOutcome::SkippedEmpty);
        assert!(h.store.get("fresh").is_none());
        assert_eq!(h.storage.writes(), 0);
    }

    #[test]
    fn test_empty_save_keeps_existing_record() {
        let h = harness("draft");
        h.manager.set_file_name("f");
        h.manager.save().unwrap();

        h.editor.set_value("");
        h.manager.save().unwrap();
        assert_eq!(h.store.get("f").unwrap().content, "draft");
    }

    #[test]
    fn test_set_file_name_does_not_move_records() {
        let h = harness("x");
        h.manager.set_file_name("a");
        h.manager.save().unwrap();

        h.manager.set_file_name("b");
        assert!(h.store.get("a").is_some());
        assert!(h.store.get("b").is_none());
    }

    #[test]
    fn test_rename_follows_current_file() {
        let h = harness("x");
        h.manager.set_file_name("a");
        h.manager.save().unwrap();

        assert!(h.manager.rename_file("a", " b ").unwrap());
        assert_eq!(h.manager.get_file_name(), "b");

        h.editor.set_value("y");
        h.manager.save().unwrap();
        assert!(h.store.get("a").is_none());
        assert_eq!(h.store.get("b").unwrap().content, "y");
    }

    #[test]
    fn test_rename_of_other_file_keeps_current() {
        let h = harness("x");
        h.store
            .upsert("other", FileRecord::new("o", h.clock.now()))
            .unwrap();
        h.manager.set_file_name("mine");

        assert!(h.manager.rename_file("other", "renamed").unwrap());
        assert_eq!(h.manager.get_file_name(), "mine");
        assert!(matches!(
            h.manager.rename_file("renamed", "  "),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_generated_name_skips_existing_files() {
        let h = harness("x");
        let base = default_file_name(h.clock.as_ref());
        h.store
            .upsert(&base, FileRecord::new("earlier", h.clock.now()))
            .unwrap();

        assert_eq!(h.manager.get_file_name(), format!("{base}_1"));
        h.manager.save().unwrap();
        assert_eq!(h.store.get(&base).unwrap().content, "earlier");
    }

    #[test]
    fn test_save_during_switch_is_skipped() {
        let h = harness("A content");
        h.manager.set_file_name("a");
        h.manager.save().unwrap();

        let mut during = None;
        h.manager.switch_file("b", || {
            h.editor.set_value("B content");
            during = Some(h.manager.save().unwrap());
        });

        assert_eq!(during, Some(SaveOutcome::SkippedSwitching));
        assert_eq!(h.manager.get_file_name(), "b");
        assert_eq!(h.store.get("a").unwrap().content, "A content");

        assert_eq!(h.manager.save().unwrap(), SaveOutcome::Saved);
        assert_eq!(h.store.get("b").unwrap().content, "B content");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_saves_immediately_and_on_each_tick() {
        let h = harness("x");
        h.manager.set_file_name("f");

        h.manager.start();
        assert!(h.manager.is_running());
        assert_eq!(h.storage.writes(), 1);

        wait(INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(h.storage.writes(), 2);

        wait(INTERVAL).await;
        assert_eq!(h.storage.writes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_timer() {
        let h = harness("x");
        h.manager.start();
        h.manager.start();
        let after_second_start = h.storage.writes();
        assert_eq!(after_second_start, 2);

        wait(INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(h.storage.writes(), after_second_start + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let h = harness("x");
        h.manager.start();
        h.manager.stop();
        h.manager.stop();
        assert!(!h.manager.is_running());

        wait(INTERVAL * 3).await;
        assert_eq!(h.storage.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_survives_write_failures() {
        let h = harness_with(MemoryStorage::with_quota(200), &"x".repeat(500));
        h.manager.set_file_name("big");

        h.manager.start();
        wait(INTERVAL + Duration::from_millis(1)).await;
        assert!(h.manager.is_running());
        assert_eq!(h.storage.writes(), 0);

        h.editor.set_value("small");
        wait(INTERVAL).await;
        assert_eq!(h.storage.writes(), 1);
        assert_eq!(h.store.get("big").unwrap().content, "small");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_timer() {
        let h = harness("x");
        h.manager.start();
        let storage = h.storage.clone();
        drop(h);

        wait(INTERVAL * 2).await;
        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_when_ready() {
        let h = harness("x");
        let manager = Arc::new(h.manager);
        let (tx, rx) = oneshot::channel();

        let waiter = manager.start_when_ready(rx);
        tokio::task::yield_now().await;
        assert!(!manager.is_running());

        tx.send(()).unwrap();
        waiter.await.unwrap();
        assert!(manager.is_running());
        assert_eq!(h.storage.writes(), 1);
        manager.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_ready_signal_leaves_manager_stopped() {
        let h = harness("x");
        let manager = Arc::new(h.manager);
        let (tx, rx) = oneshot::channel::<()>();

        let waiter = manager.start_when_ready(rx);
        drop(tx);
        waiter.await.unwrap();
        assert!(!manager.is_running());
        assert_eq!(h.storage.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_saves_once_without_timer() {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(KeyedRecordStore::new(storage.clone()));
        let editor = Arc::new(EditorBuffer::new("x"));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = AutoSaveManager::new(store, editor, clock, Duration::ZERO);

        manager.start();
        assert!(!manager.is_running());
        assert_eq!(storage.writes(), 1);
    }
}
