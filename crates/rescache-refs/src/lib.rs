//! Named, stable identity slots with deferred cleanup.
//!
//! A [`NamedRefs`] table hands out [`RefSlot`]s addressed by `(kind, name)`. The table is used in
//! work cycles: every slot accessed during a cycle is marked as touched, the end of the cycle
//! captures a snapshot of the touched slots, and a later [`reconcile`](NamedRefs::reconcile)
//! removes the slots known from the previous reconciliation that the cycle did not touch.
//!
//! Reconciliation is deferred so that it can run once the effects of the cycle are known to be
//! visible. A snapshot only applies if no newer cycle has begun in between. Otherwise it is
//! discarded, as the newer cycle will produce its own snapshot.
//!
//! ```
//! use rescache_refs::{NamedRefs, Reconciliation};
//!
//! let mut refs = NamedRefs::<u32>::new();
//!
//! let mut cycle = refs.cycle();
//! let input = cycle.get("input", "username");
//! cycle.get("button", "submit");
//! drop(cycle);
//! assert_eq!(refs.reconcile(), Reconciliation::Applied { removed: 0 });
//!
//! let mut cycle = refs.cycle();
//! assert!(cycle.get("input", "username").ptr_eq(&input));
//! drop(cycle);
//! assert_eq!(refs.reconcile(), Reconciliation::Applied { removed: 1 });
//! assert!(!refs.contains("button", "submit"));
//! ```

#![warn(missing_docs)]

mod slot;
mod table;

pub use slot::RefSlot;
pub use table::*;
