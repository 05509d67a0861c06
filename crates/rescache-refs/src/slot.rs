use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, initially empty cell with a stable identity.
///
/// Cloning a `RefSlot` creates a new handle to the **same** cell; use [`ptr_eq`](Self::ptr_eq)
/// to compare identities.
pub struct RefSlot<T> {
    cell: Rc<RefCell<Option<T>>>,
}

impl<T> RefSlot<T> {
    pub(crate) fn empty() -> Self {
        Self {
            cell: Rc::new(RefCell::new(None)),
        }
    }

    /// Stores `value`, returning the previous content.
    pub fn set(&self, value: T) -> Option<T> {
        self.cell.borrow_mut().replace(value)
    }

    /// Empties the slot, returning its content.
    pub fn take(&self) -> Option<T> {
        self.cell.borrow_mut().take()
    }

    /// Returns `true` if nothing is stored in the slot.
    pub fn is_empty(&self) -> bool {
        self.cell.borrow().is_none()
    }

    /// Calls `f` with a reference to the content of the slot.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.cell.borrow().as_ref())
    }

    /// Returns `true` if both handles refer to the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Clone> RefSlot<T> {
    /// Returns a clone of the content of the slot.
    pub fn get(&self) -> Option<T> {
        self.cell.borrow().clone()
    }
}

impl<T> Clone for RefSlot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RefSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(content) => f.debug_tuple("RefSlot").field(&*content).finish(),
            Err(_) => f.debug_tuple("RefSlot").field(&"<borrowed>").finish(),
        }
    }
}
