//! Type-erased handle to a constructed value.
use std::any::{Any, type_name};
use std::fmt;
use std::rc::Rc;

use anyhow::anyhow;

use crate::descriptor::Mapped;

/// A value of some [`Mapped`] type, shared cheaply while a graph is being
/// constructed or decomposed.
#[derive(Clone)]
pub struct Object {
    value: Rc<dyn Any>,
    identity: Option<usize>,
    type_name: &'static str,
}

impl Object {
    pub fn new<T: Mapped>(value: T) -> Self {
        Self {
            identity: value.identity(),
            type_name: type_name::<T>(),
            value: Rc::new(value),
        }
    }

    pub fn identity(&self) -> Option<usize> {
        self.identity
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn as_any(&self) -> &dyn Any {
        &*self.value
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Extract the value, cloning it when the handle is shared.
    pub fn take<T: Mapped>(self) -> anyhow::Result<T> {
        let found = self.type_name;
        match self.value.downcast::<T>() {
            Ok(rc) => Ok(Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone())),
            Err(_) => Err(anyhow!("expected a value of `{}`, found `{found}`", type_name::<T>())),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object<{}>", self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn take_checks_the_type() {
        let object = Object::new(5u8);
        assert!(object.is::<u8>());
        assert_eq!(object.clone().take::<u8>().unwrap(), 5);
        let err = object.take::<String>().unwrap_err();
        assert!(err.to_string().contains("found `u8`"));
    }

    #[derive(Clone, Default)]
    struct Slot {
        value: u8,
    }

    impl Mapped for Slot {
        fn recipes() -> Vec<crate::recipe::Recipe> {
            Vec::new()
        }
    }

    #[test]
    fn shared_values_carry_identity() {
        let shared = Rc::new(RefCell::new(Slot::default()));
        let object = Object::new(shared.clone());
        assert_eq!(object.identity(), Some(Rc::as_ptr(&shared) as *const () as usize));
        shared.borrow_mut().value = 9;
        let back = object.take::<Rc<RefCell<Slot>>>().unwrap();
        assert!(Rc::ptr_eq(&back, &shared));
        assert_eq!(back.borrow().value, 9);
        assert!(Object::new(1u8).identity().is_none());
    }
}
