use std::sync::{Arc, Mutex, PoisonError};

use crate::store::ConversationStore;

/// The single logical owner of a [`ConversationStore`].
///
/// Every read and write goes through one mutex, so streaming updates and user actions are
/// serialized no matter which task or thread issues them.  Closures run to completion under the
/// lock; never hold it across an `.await`.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ConversationStore>>,
}

impl SharedStore {
    /// Take ownership of `store`.
    pub fn new(store: ConversationStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Run `f` with shared access to the store.
    pub fn read<R>(&self, f: impl FnOnce(&ConversationStore) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Run `f` with exclusive access to the store.
    pub fn write<R>(&self, f: impl FnOnce(&mut ConversationStore) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl From<ConversationStore> for SharedStore {
    fn from(store: ConversationStore) -> Self {
        Self::new(store)
    }
}
