use std::{cell::RefCell, fmt, rc::Rc};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A typed value cell that can share its value with other cells.
///
/// Cells that are linked form one equivalence class backed by a single shared slot:
/// a write through any member is observed by all members without further calls.
/// Dropping a cell removes it from its class; the remaining members stay linked.
///
/// Cloning yields an independent cell holding the current value.
pub struct ImageVariable<T> {
    shared: Rc<RefCell<T>>,
}

impl<T: Clone> ImageVariable<T> {
    pub fn new(value: T) -> Self {
        Self {
            shared: Rc::new(RefCell::new(value)),
        }
    }

    pub fn value(&self) -> T {
        self.shared.borrow().clone()
    }

    /// Write the value for this cell and every cell linked to it.
    pub fn set_value(&mut self, value: T) {
        *self.shared.borrow_mut() = value;
    }

    /// Borrow the shared value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.borrow())
    }

    /// Modify the shared value in place.
    pub fn update(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.shared.borrow_mut());
    }

    /// Leave the current class and join the class of `other`, adopting its value.
    ///
    /// Linking to a cell already in the same class is a no-op.
    pub fn link_with(&mut self, other: &ImageVariable<T>) {
        if !Rc::ptr_eq(&self.shared, &other.shared) {
            self.shared = Rc::clone(&other.shared);
        }
    }

    /// Detach from the class, keeping the last value.
    pub fn unlink(&mut self) {
        if self.is_linked() {
            let value = self.value();
            self.shared = Rc::new(RefCell::new(value));
        }
    }

    pub fn is_linked(&self) -> bool {
        Rc::strong_count(&self.shared) > 1
    }

    pub fn is_linked_with(&self, other: &ImageVariable<T>) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of cells in this cell's class, including itself.
    pub fn class_size(&self) -> usize {
        Rc::strong_count(&self.shared)
    }
}

impl<T: Clone + Default> Default for ImageVariable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone> Clone for ImageVariable<T> {
    fn clone(&self) -> Self {
        Self::new(self.value())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for ImageVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageVariable")
            .field("value", &*self.shared.borrow())
            .field("linked", &self.is_linked())
            .finish()
    }
}

impl<T: Clone + Serialize> Serialize for ImageVariable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.shared.borrow().serialize(serializer)
    }
}

impl<'de, T: Clone + Deserialize<'de>> Deserialize<'de> for ImageVariable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_cells_share_writes() {
        let mut a = ImageVariable::new(1.0);
        let mut b = ImageVariable::new(2.0);
        b.link_with(&a);
        assert_eq!(b.value(), 1.0, "joining adopts the anchor value");
        a.set_value(5.0);
        assert_eq!(b.value(), 5.0);
        b.set_value(7.0);
        assert_eq!(a.value(), 7.0);
        assert!(a.is_linked_with(&b) && b.is_linked_with(&a));
    }

    #[test]
    fn unlink_keeps_value_and_detaches() {
        let mut a = ImageVariable::new(1.0);
        let mut b = ImageVariable::new(0.0);
        b.link_with(&a);
        b.unlink();
        assert_eq!(b.value(), 1.0);
        a.set_value(3.0);
        assert_eq!(b.value(), 1.0);
        assert!(!a.is_linked() && !b.is_linked());
    }

    #[test]
    fn relinking_leaves_old_class_intact() {
        let a = ImageVariable::new(1);
        let mut b = ImageVariable::new(0);
        let mut c = ImageVariable::new(0);
        let d = ImageVariable::new(9);
        b.link_with(&a);
        c.link_with(&a);
        c.link_with(&d);
        assert!(a.is_linked_with(&b));
        assert!(!a.is_linked_with(&c));
        assert!(c.is_linked_with(&d));
        assert_eq!(c.value(), 9);
        assert_eq!(a.class_size(), 2);
    }

    #[test]
    fn dropping_a_cell_shrinks_its_class() {
        let a = ImageVariable::new(String::from("x"));
        {
            let mut b = ImageVariable::new(String::new());
            b.link_with(&a);
            assert!(a.is_linked());
        }
        assert!(!a.is_linked());
    }

    #[test]
    fn clone_is_unlinked() {
        let a = ImageVariable::new(4u8);
        let mut b = ImageVariable::new(0u8);
        b.link_with(&a);
        let c = b.clone();
        assert_eq!(c.value(), 4);
        assert!(!c.is_linked_with(&a));
        assert_eq!(a.class_size(), 2);
    }
}
