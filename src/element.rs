//! Canonical configuration value graph.
//!
//! An [`Element`] is either a scalar or a composite ([`List`], [`Node`]).
//! Composites are shared handles: cloning one clones the handle, not the
//! contents, so a graph may share substructure or contain itself. Every
//! traversal in this crate tracks composites by identity (`Rc` pointer), never
//! by structure.
pub mod display;
pub mod eq;
mod serde_impl;

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ElementError;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone)]
pub enum Element {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    List(List),
    Node(Node),
}

/// Numeric scalar. The variant records the width it was read with and is
/// preserved by every transformation; equality compares values.
#[derive(Clone, Copy, Debug)]
pub enum Number {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Null,
    Boolean,
    Number,
    String,
    List,
    Node,
}

/// Ordered, shared sequence of elements.
#[derive(Clone, Default)]
pub struct List(Rc<RefCell<Vec<Element>>>);

/// Ordered, shared mapping from unique string keys to elements.
#[derive(Clone, Default)]
pub struct Node(Rc<RefCell<IndexMap<String, Element>>>);

// ————————————————————————————————————————————————————————————————————————————
// ELEMENT
// ————————————————————————————————————————————————————————————————————————————

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Null => ElementKind::Null,
            Element::Boolean(_) => ElementKind::Boolean,
            Element::Number(_) => ElementKind::Number,
            Element::String(_) => ElementKind::String,
            Element::List(_) => ElementKind::List,
            Element::Node(_) => ElementKind::Node,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Element::Null)
    }
    pub fn is_boolean(&self) -> bool {
        matches!(self, Element::Boolean(_))
    }
    pub fn is_number(&self) -> bool {
        matches!(self, Element::Number(_))
    }
    pub fn is_string(&self) -> bool {
        matches!(self, Element::String(_))
    }
    pub fn is_composite(&self) -> bool {
        matches!(self, Element::List(_) | Element::Node(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Element::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Element::Number(n) => Some(*n),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Element::List(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Element::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Pointer identity of a composite; `None` for scalars.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Element::List(l) => Some(l.identity()),
            Element::Node(n) => Some(n.identity()),
            _ => None,
        }
    }

    /// True when both are the same composite object.
    pub fn same(&self, other: &Element) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Number of components this element offers a recipe: entries of a node,
    /// items of a list, nothing for null and one for any other scalar.
    pub fn arity(&self) -> usize {
        match self {
            Element::Null => 0,
            Element::List(l) => l.len(),
            Element::Node(n) => n.len(),
            _ => 1,
        }
    }

    /// Short description for diagnostics, e.g. `node{x, y}` or `list[3]`.
    pub fn shape(&self) -> String {
        const MAX_KEYS: usize = 8;
        match self {
            Element::Null => "null".into(),
            Element::Boolean(_) => "boolean".into(),
            Element::Number(n) => format!("number ({})", n.width()),
            Element::String(_) => "string".into(),
            Element::List(l) => format!("list[{}]", l.len()),
            Element::Node(n) => {
                let keys = n.keys();
                let mut shown = keys.iter().take(MAX_KEYS).cloned().collect::<Vec<_>>().join(", ");
                if keys.len() > MAX_KEYS {
                    shown.push_str(", …");
                }
                format!("node{{{shown}}}")
            }
        }
    }

    /// Convert a host scalar. Total for the scalar types this crate knows
    /// (`bool`, every integer width, `f32`, `f64`, `char`, `String`, `&str`,
    /// `()`); anything else is an `UnsupportedScalarKind` naming `T`.
    pub fn from_scalar<T: Any>(value: &T) -> Result<Element, ElementError> {
        let value: &dyn Any = value;
        macro_rules! try_scalar {
            ($($ty:ty),+ $(,)?) => {$(
                if let Some(v) = value.downcast_ref::<$ty>() {
                    return Ok(Element::from(v.clone()));
                }
            )+};
        }
        try_scalar!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, char, String, &'static str, ());
        if let Some(e) = value.downcast_ref::<Element>() {
            if !e.is_composite() {
                return Ok(e.clone());
            }
        }
        Err(ElementError::UnsupportedScalarKind {
            type_name: std::any::type_name::<T>().to_owned(),
        })
    }

    /// Tear the graph down without recursion, breaking any cycles it contains.
    ///
    /// `Rc` cycles are never reclaimed on their own; acyclic graphs are freed
    /// by a plain drop, which is iterative as well.
    pub fn dismantle(self) {
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            match element {
                Element::List(list) => {
                    let items = std::mem::take(&mut *list.0.borrow_mut());
                    stack.extend(items);
                }
                Element::Node(node) => {
                    let entries = std::mem::take(&mut *node.0.borrow_mut());
                    stack.extend(entries.into_values());
                }
                _ => {}
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// NUMBER
// ————————————————————————————————————————————————————————————————————————————

impl Number {
    pub fn is_integer(&self) -> bool {
        !matches!(self, Number::F32(_) | Number::F64(_))
    }

    /// Exact integer value; integral floats qualify too.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Number::I8(v) => Some(v.into()),
            Number::I16(v) => Some(v.into()),
            Number::I32(v) => Some(v.into()),
            Number::I64(v) => Some(v.into()),
            Number::U8(v) => Some(v.into()),
            Number::U16(v) => Some(v.into()),
            Number::U32(v) => Some(v.into()),
            Number::U64(v) => Some(v.into()),
            Number::F32(v) => integral_f64(v.into()),
            Number::F64(v) => integral_f64(v),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Number::I8(v) => v.into(),
            Number::I16(v) => v.into(),
            Number::I32(v) => v.into(),
            Number::I64(v) => v as f64,
            Number::U8(v) => v.into(),
            Number::U16(v) => v.into(),
            Number::U32(v) => v.into(),
            Number::U64(v) => v as f64,
            Number::F32(v) => v.into(),
            Number::F64(v) => v,
        }
    }

    pub fn width(&self) -> &'static str {
        match self {
            Number::I8(_) => "i8",
            Number::I16(_) => "i16",
            Number::I32(_) => "i32",
            Number::I64(_) => "i64",
            Number::U8(_) => "u8",
            Number::U16(_) => "u16",
            Number::U32(_) => "u32",
            Number::U64(_) => "u64",
            Number::F32(_) => "f32",
            Number::F64(_) => "f64",
        }
    }
}

fn integral_f64(v: f64) -> Option<i128> {
    // i128 covers every integral f64 below 2^127
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1.7e38 {
        Some(v as i128)
    } else {
        None
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I8(v) => write!(f, "{v}"),
            Number::I16(v) => write!(f, "{v}"),
            Number::I32(v) => write!(f, "{v}"),
            Number::I64(v) => write!(f, "{v}"),
            Number::U8(v) => write!(f, "{v}"),
            Number::U16(v) => write!(f, "{v}"),
            Number::U32(v) => write!(f, "{v}"),
            Number::U64(v) => write!(f, "{v}"),
            Number::F32(v) => write!(f, "{v:?}"),
            Number::F64(v) => write!(f, "{v:?}"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// COMPOSITES
// ————————————————————————————————————————————————————————————————————————————

impl List {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_vec(items: Vec<Element>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }
    pub fn push(&self, item: impl Into<Element>) {
        self.0.borrow_mut().push(item.into());
    }
    pub fn get(&self, index: usize) -> Option<Element> {
        self.0.borrow().get(index).cloned()
    }
    /// Replace the item at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: impl Into<Element>) -> Option<Element> {
        let mut items = self.0.borrow_mut();
        let slot = items.get_mut(index)?;
        Some(std::mem::replace(slot, item.into()))
    }
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
    /// Snapshot of the current items (shared handles for composites).
    pub fn items(&self) -> Vec<Element> {
        self.0.borrow().clone()
    }
    pub fn borrow(&self) -> Ref<'_, Vec<Element>> {
        self.0.borrow()
    }
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Element)>,
        K: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self(Rc::new(RefCell::new(map)))
    }
    /// Insert or replace; an existing key keeps its position.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Element>) -> Option<Element> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }
    pub fn get(&self, key: &str) -> Option<Element> {
        self.0.borrow().get(key).cloned()
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }
    /// Remove preserving the order of the remaining keys.
    pub fn remove(&self, key: &str) -> Option<Element> {
        self.0.borrow_mut().shift_remove(key)
    }
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }
    /// Snapshot of the current entries in insertion order.
    pub fn entries(&self) -> Vec<(String, Element)> {
        self.0.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
    pub fn borrow(&self) -> Ref<'_, IndexMap<String, Element>> {
        self.0.borrow()
    }
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ------------------------------ Teardown ---------------------------------- //

// A composite released by its last handle moves its children onto a work
// list instead of letting them drop in place, so nesting depth never reaches
// the call stack.

impl Drop for List {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let Ok(mut items) = self.0.try_borrow_mut() else {
            return;
        };
        if items.iter().any(Element::is_composite) {
            let taken = std::mem::take(&mut *items);
            drop(items);
            release(taken);
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let Ok(mut entries) = self.0.try_borrow_mut() else {
            return;
        };
        if entries.values().any(Element::is_composite) {
            let taken = std::mem::take(&mut *entries);
            drop(entries);
            release(taken.into_values().collect());
        }
    }
}

fn release(mut stack: Vec<Element>) {
    while let Some(element) = stack.pop() {
        match &element {
            Element::List(list) if Rc::strong_count(&list.0) == 1 => {
                if let Ok(mut items) = list.0.try_borrow_mut() {
                    stack.append(&mut *items);
                }
            }
            Element::Node(node) if Rc::strong_count(&node.0) == 1 => {
                if let Ok(mut entries) = node.0.try_borrow_mut() {
                    stack.extend(entries.drain(..).map(|(_, value)| value));
                }
            }
            _ => {}
        }
        // `element` is empty or still shared here; dropping it stays shallow
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONVERSIONS
// ————————————————————————————————————————————————————————————————————————————

macro_rules! number_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {$(
        impl From<$ty> for Number {
            fn from(v: $ty) -> Self { Number::$variant(v) }
        }
        impl From<$ty> for Element {
            fn from(v: $ty) -> Self { Element::Number(Number::$variant(v)) }
        }
    )+};
}

number_from!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
);

impl From<bool> for Element {
    fn from(v: bool) -> Self {
        Element::Boolean(v)
    }
}
impl From<char> for Element {
    fn from(v: char) -> Self {
        Element::String(v.to_string())
    }
}
impl From<&str> for Element {
    fn from(v: &str) -> Self {
        Element::String(v.to_owned())
    }
}
impl From<String> for Element {
    fn from(v: String) -> Self {
        Element::String(v)
    }
}
impl From<()> for Element {
    fn from(_: ()) -> Self {
        Element::Null
    }
}
impl From<Number> for Element {
    fn from(v: Number) -> Self {
        Element::Number(v)
    }
}
impl From<List> for Element {
    fn from(v: List) -> Self {
        Element::List(v)
    }
}
impl From<Node> for Element {
    fn from(v: Node) -> Self {
        Element::Node(v)
    }
}
impl<T: Into<Element>> From<Option<T>> for Element {
    fn from(v: Option<T>) -> Self {
        v.map_or(Element::Null, Into::into)
    }
}
impl<T: Into<Element>> From<Vec<T>> for Element {
    fn from(v: Vec<T>) -> Self {
        Element::List(List::from_vec(v.into_iter().map(Into::into).collect()))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
