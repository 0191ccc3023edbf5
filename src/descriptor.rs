//! Runtime-inspectable type handles.
//!
//! Rust has no runtime reflection, so a type opts into mapping by
//! implementing [`Mapped`]: it names its structural kind and lists its
//! construction recipes. A [`TypeDescriptor`] is the erased form the matcher
//! and constructor work with; it carries the recipe builder of its type, so
//! component types can be resolved without generics.
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::element::{Element, ElementKind};
use crate::recipe::Recipe;

/// Shape a type expects its source element to have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Scalar,
    List,
    Node,
    /// Accepts any element (the dynamic [`Element`] type itself).
    Any,
}

/// A type the mapper can construct from, and decompose into, elements.
pub trait Mapped: Any + Clone {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Node)
    }

    /// Candidate recipes in preference order. Called once per catalog; the
    /// result is cached.
    fn recipes() -> Vec<Recipe>;

    /// Pointer identity for shared values. Values with an identity keep their
    /// sharing and cycles when decomposed.
    fn identity(&self) -> Option<usize> {
        None
    }
}

#[derive(Clone)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    kind: Kind,
    nullable: bool,
    params: Vec<TypeDescriptor>,
    builder: fn() -> Vec<Recipe>,
}

impl TypeDescriptor {
    pub fn of<T: Mapped>(kind: Kind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind,
            nullable: false,
            params: Vec::new(),
            builder: T::recipes,
        }
    }

    /// Generic parameters (item type of a list, value type of a map, …).
    pub fn with_params(mut self, params: Vec<TypeDescriptor>) -> Self {
        self.params = params;
        self
    }

    /// Also admits `Null` elements.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn id(&self) -> TypeId {
        self.id
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn kind(&self) -> Kind {
        self.kind
    }
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    /// Whether a recipe declared for `returned` may stand in for this type.
    pub fn accepts(&self, returned: &TypeDescriptor) -> bool {
        self.id == returned.id
    }

    /// Whether an element has a structural kind this type can be built from.
    pub fn admits(&self, element: &Element) -> bool {
        match (self.kind, element.kind()) {
            (Kind::Any, _) => true,
            (_, ElementKind::Null) => self.nullable,
            (Kind::Scalar, kind) => !matches!(kind, ElementKind::List | ElementKind::Node),
            (Kind::List, ElementKind::List) | (Kind::Node, ElementKind::Node) => true,
            _ => false,
        }
    }

    pub(crate) fn build_recipes(&self) -> Vec<Recipe> {
        (self.builder)()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Node;

    #[test]
    fn containers_describe_their_parameters() {
        let ty = <Vec<Option<u16>>>::descriptor();
        assert_eq!(ty.kind(), Kind::List);
        let item = &ty.params()[0];
        assert!(item.is_nullable());
        assert_eq!(item.kind(), Kind::Scalar);
        assert_eq!(item.params()[0], u16::descriptor());
    }

    #[test]
    fn admits_checks_structural_kind() {
        let node = Element::Node(Node::new());
        assert!(<indexmap::IndexMap<String, i32>>::descriptor().admits(&node));
        assert!(!<Vec<i32>>::descriptor().admits(&node));
        assert!(!i32::descriptor().admits(&Element::Null));
        assert!(<Option<i32>>::descriptor().admits(&Element::Null));
        assert!(Element::descriptor().admits(&node));
    }
}
