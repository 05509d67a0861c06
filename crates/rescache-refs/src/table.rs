use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::RefSlot;

/// Identifies a work cycle of a [`NamedRefs`] table.
///
/// Cycle identifiers increase monotonically over the lifetime of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(u64);

/// The outcome of [`NamedRefs::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The snapshot was applied, removing `removed` untouched slots.
    Applied {
        /// The number of removed slots.
        removed: usize,
    },
    /// The snapshot belonged to an older cycle and was discarded.
    Superseded {
        /// The cycle the discarded snapshot was taken in.
        snapshot: CycleId,
        /// The cycle that superseded it.
        current: CycleId,
    },
    /// No cycle has ended since the last reconciliation.
    NothingPending,
}

/// The names touched per kind.
type Touched = HashMap<String, HashSet<String>>;

#[derive(Debug)]
struct Snapshot {
    cycle: CycleId,
    touched: Touched,
}

/// A two-level `kind -> name -> slot` table with deferred, cycle-checked cleanup.
///
/// # Invariants
///
/// 1. [`get`](Self::get) returns the same slot for the same `(kind, name)` for as long as the
///    slot survives reconciliation.
/// 2. [`end_cycle`](Self::end_cycle) never removes anything.
/// 3. [`reconcile`](Self::reconcile) only removes slots that were known after the previous
///    applied reconciliation and not touched during the cycle its snapshot was taken in, and
///    only if no newer cycle has begun since.
/// 4. A slot created after the snapshot was taken survives reconciliation, as it was never
///    known.
pub struct NamedRefs<T> {
    slots: HashMap<String, HashMap<String, RefSlot<T>>>,
    cycle: CycleId,
    touched: Touched,
    known: Touched,
    pending: Option<Snapshot>,
}

impl<T> Default for NamedRefs<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            cycle: CycleId(0),
            touched: HashMap::new(),
            known: HashMap::new(),
            pending: None,
        }
    }
}

impl<T> fmt::Debug for NamedRefs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedRefs")
            .field("slots", &self.len())
            .field("cycle", &self.cycle)
            .field("touched", &self.touched.values().map(HashSet::len).sum::<usize>())
            .field("pending", &self.pending.as_ref().map(|s| s.cycle))
            .finish()
    }
}

impl<T> NamedRefs<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current cycle.
    pub fn current_cycle(&self) -> CycleId {
        self.cycle
    }

    /// Begins a new cycle and returns its identifier.
    ///
    /// Any snapshot taken in an earlier cycle that has not been reconciled yet is now
    /// superseded.
    pub fn begin_cycle(&mut self) -> CycleId {
        self.cycle = CycleId(self.cycle.0 + 1);
        self.touched.clear();
        self.cycle
    }

    /// Begins a new cycle that ends when the returned guard is dropped.
    pub fn cycle(&mut self) -> Cycle<'_, T> {
        let id = self.begin_cycle();
        Cycle { refs: self, id }
    }

    /// Returns the slot for `(kind, name)`, creating it on first access.
    ///
    /// The slot is marked as touched in the current cycle.
    pub fn get(&mut self, kind: &str, name: &str) -> RefSlot<T> {
        self.touched
            .entry(kind.to_owned())
            .or_default()
            .insert(name.to_owned());

        self.slots
            .entry(kind.to_owned())
            .or_default()
            .entry(name.to_owned())
            .or_insert_with(RefSlot::empty)
            .clone()
    }

    /// Captures the slots touched in the current cycle for a later
    /// [`reconcile`](Self::reconcile).
    pub fn end_cycle(&mut self) {
        self.pending = Some(Snapshot {
            cycle: self.cycle,
            touched: self.touched.clone(),
        });
    }

    /// Applies the snapshot captured by the last [`end_cycle`](Self::end_cycle).
    ///
    /// Every slot known from the previous applied reconciliation that was not touched in the
    /// snapshot's cycle is removed, and the touched slots become the known ones. Kinds without
    /// any remaining slot are dropped as well.
    ///
    /// Slots created only in superseded cycles are not known and therefore stay until a
    /// reconciled cycle touches them and a later one does not.
    pub fn reconcile(&mut self) -> Reconciliation {
        let Some(snapshot) = self.pending.take() else {
            return Reconciliation::NothingPending;
        };

        if snapshot.cycle != self.cycle {
            tracing::debug!(
                snapshot = snapshot.cycle.0,
                current = self.cycle.0,
                "Discarding superseded ref snapshot"
            );
            return Reconciliation::Superseded {
                snapshot: snapshot.cycle,
                current: self.cycle,
            };
        }

        let mut removed = 0;
        for (kind, names) in &self.known {
            let touched = snapshot.touched.get(kind);
            let Some(slots) = self.slots.get_mut(kind) else {
                continue;
            };
            for name in names {
                let stale = !touched.is_some_and(|touched| touched.contains(name));
                if stale && slots.remove(name).is_some() {
                    removed += 1;
                }
            }
            if slots.is_empty() {
                self.slots.remove(kind);
            }
        }
        self.known = snapshot.touched;

        if removed > 0 {
            tracing::trace!(removed, cycle = snapshot.cycle.0, "Removed untouched refs");
        }
        Reconciliation::Applied { removed }
    }

    /// Returns `true` if the table holds a slot for `(kind, name)`.
    ///
    /// This does not mark the slot as touched.
    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.slots
            .get(kind)
            .is_some_and(|names| names.contains_key(name))
    }

    /// The total number of slots across all kinds.
    pub fn len(&self) -> usize {
        self.slots.values().map(HashMap::len).sum()
    }

    /// Returns `true` if the table holds no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A cycle of a [`NamedRefs`] table, ended when dropped.
pub struct Cycle<'a, T> {
    refs: &'a mut NamedRefs<T>,
    id: CycleId,
}

impl<T> Cycle<'_, T> {
    /// The identifier of this cycle.
    pub fn id(&self) -> CycleId {
        self.id
    }

    /// See [`NamedRefs::get`].
    pub fn get(&mut self, kind: &str, name: &str) -> RefSlot<T> {
        self.refs.get(kind, name)
    }
}

impl<T> Drop for Cycle<'_, T> {
    fn drop(&mut self) {
        self.refs.end_cycle();
    }
}
