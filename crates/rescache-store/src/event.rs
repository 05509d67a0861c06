use std::borrow::Borrow;

/// A mutation of an [`ObservableStore`](crate::ObservableStore), as seen by its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent<K, V> {
    /// A previously absent `key` now maps to `value`.
    Inserted {
        /// The inserted key.
        key: K,
        /// The inserted value.
        value: V,
    },
    /// An existing `key` was overwritten with `value`.
    Updated {
        /// The updated key.
        key: K,
        /// The new value.
        value: V,
        /// The value that was replaced.
        previous: V,
    },
    /// `key` was removed from the store.
    Removed {
        /// The removed key.
        key: K,
        /// The value the key mapped to before removal.
        previous: V,
    },
    /// All entries were removed at once.
    Cleared,
}

impl<K, V> ChangeEvent<K, V> {
    /// The key this event is about, or `None` for [`Cleared`](Self::Cleared).
    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Inserted { key, .. } | Self::Updated { key, .. } | Self::Removed { key, .. } => {
                Some(key)
            }
            Self::Cleared => None,
        }
    }

    /// The value the key maps to after this event, if any.
    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Inserted { value, .. } | Self::Updated { value, .. } => Some(value),
            Self::Removed { .. } | Self::Cleared => None,
        }
    }

    /// The value the key mapped to before this event, if any.
    pub fn previous(&self) -> Option<&V> {
        match self {
            Self::Updated { previous, .. } | Self::Removed { previous, .. } => Some(previous),
            Self::Inserted { .. } | Self::Cleared => None,
        }
    }

    /// Returns `true` if this event affects `key`.
    ///
    /// [`Cleared`](Self::Cleared) affects every key.
    pub fn concerns<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.key() {
            Some(own) => Borrow::<Q>::borrow(own) == key,
            None => true,
        }
    }
}
