//! Durable slots for the store's persisted record.
//!
//! A slot holds one serialized [`PersistedState`](crate::types::PersistedState) document under a
//! fixed namespace.  The store reads it once when opened and rewrites it after every mutation.

use std::fs;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use utf8path::Path;

use crate::error::{Error, Result};

/// Namespace of the persisted record.
pub const STORAGE_NAMESPACE: &str = "confab-storage";

/// A process-wide persisted key-value slot.
pub trait StateSlot: Send {
    /// Read the record, `None` if nothing has been written yet.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the record.
    fn save(&mut self, contents: &str) -> Result<()>;

    /// Move an unreadable record out of the way so the next save cannot overwrite it.
    ///
    /// `stamp` (milliseconds since the epoch) distinguishes records set aside on different runs.
    fn set_aside(&mut self, stamp: i64) -> Result<()>;
}

/// A slot kept in memory.
///
/// Clones share the same cell, so a test can keep one clone to inspect what the store wrote, or
/// hand a clone to a second store to simulate a restart.
#[derive(Clone, Debug, Default)]
pub struct MemorySlot {
    cell: Arc<Mutex<Option<String>>>,
    aside: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot that already holds `contents`.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Some(contents.into()))),
            aside: Arc::default(),
        }
    }

    /// The last record written, if any.
    pub fn contents(&self) -> Option<String> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last record set aside, if any.
    pub fn set_aside_contents(&self) -> Option<String> {
        self.aside
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateSlot for MemorySlot {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.contents())
    }

    fn save(&mut self, contents: &str) -> Result<()> {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = Some(contents.to_string());
        Ok(())
    }

    fn set_aside(&mut self, _: i64) -> Result<()> {
        let record = self.cell.lock().unwrap_or_else(PoisonError::into_inner).take();
        *self.aside.lock().unwrap_or_else(PoisonError::into_inner) = record;
        Ok(())
    }
}

/// A slot backed by `<dir>/confab-storage.json`.
///
/// Writes go to a sibling temporary file that is then renamed over the record, so a crash never
/// leaves a half-written document behind.
#[derive(Clone, Debug)]
pub struct FileSlot {
    dir: Path<'static>,
    path: Path<'static>,
}

impl FileSlot {
    /// Create a slot inside `dir`.  The directory is created on first save.
    pub fn new(dir: impl Into<Path<'static>>) -> Self {
        let dir = dir.into();
        let name = format!("{STORAGE_NAMESPACE}.json");
        let path = dir.join(name.as_str()).into_owned();
        Self { dir, path }
    }

    /// Location of the record.
    pub fn path(&self) -> &Path<'static> {
        &self.path
    }

    /// Where [`set_aside`](StateSlot::set_aside) moves the record for `stamp`.
    pub fn set_aside_path(&self, stamp: i64) -> Path<'static> {
        let name = format!("{STORAGE_NAMESPACE}.json.corrupt-{stamp}");
        self.dir.join(name.as_str()).into_owned()
    }
}

impl StateSlot for FileSlot {
    fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(
                format!("failed to read {}", self.path.as_str()),
                err,
            )),
        }
    }

    fn save(&mut self, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            Error::io(format!("failed to create {}", self.dir.as_str()), err)
        })?;
        let name = format!(".{STORAGE_NAMESPACE}.json.tmp");
        let tmp = self.dir.join(name.as_str()).into_owned();
        fs::write(&tmp, contents)
            .map_err(|err| Error::io(format!("failed to write {}", tmp.as_str()), err))?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| Error::io(format!("failed to replace {}", self.path.as_str()), err))
    }

    fn set_aside(&mut self, stamp: i64) -> Result<()> {
        let target = self.set_aside_path(stamp);
        fs::rename(&self.path, &target).map_err(|err| {
            Error::io(
                format!("failed to move {} to {}", self.path.as_str(), target.as_str()),
                err,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> Path<'static> {
        let dir = std::env::temp_dir().join(format!(
            "confab-slot-{name}-{}",
            uuid::Uuid::new_v4().simple()
        ));
        Path::try_from(dir).unwrap().into_owned()
    }

    #[test]
    fn memory_slot_shares_cell() {
        let slot = MemorySlot::new();
        let mut writer = slot.clone();
        assert_eq!(slot.load().unwrap(), None);
        writer.save("{}").unwrap();
        assert_eq!(slot.contents().as_deref(), Some("{}"));
    }

    #[test]
    fn file_slot_round_trip() {
        let dir = scratch_dir("roundtrip");
        let mut slot = FileSlot::new(dir.clone());
        assert_eq!(slot.load().unwrap(), None);
        slot.save("{\"version\":0}").unwrap();
        assert_eq!(slot.load().unwrap().as_deref(), Some("{\"version\":0}"));
        slot.save("{\"version\":1}").unwrap();
        assert_eq!(slot.load().unwrap().as_deref(), Some("{\"version\":1}"));
        assert!(slot.path().as_str().ends_with("confab-storage.json"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn memory_slot_set_aside_empties_cell() {
        let mut slot = MemorySlot::with_contents("{{{");
        slot.set_aside(7).unwrap();
        assert_eq!(slot.contents(), None);
        assert_eq!(slot.set_aside_contents().as_deref(), Some("{{{"));
    }

    #[test]
    fn file_slot_set_aside_keeps_bytes() {
        let dir = scratch_dir("aside");
        let mut slot = FileSlot::new(dir.clone());
        slot.save("{\"state\":").unwrap();
        slot.set_aside(1_700_000_000_000).unwrap();
        assert_eq!(slot.load().unwrap(), None);
        let aside = slot.set_aside_path(1_700_000_000_000);
        assert!(aside.as_str().ends_with("confab-storage.json.corrupt-1700000000000"));
        assert_eq!(fs::read_to_string(&aside).unwrap(), "{\"state\":");
        // Nothing to move the second time.
        assert!(slot.set_aside(1_700_000_000_001).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
