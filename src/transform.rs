//! Cycle-safe, iterative graph transformation.
//!
//! One algorithm converts native graphs into element graphs and back. The
//! source side says what is a leaf and how to enumerate a composite's
//! children ([`GraphSource`]); the destination side supplies empty
//! composites and attaches children to them ([`GraphSink`]). Leaves go
//! through a caller supplied converter.
//!
//! Invariants:
//! - traversal uses an explicit work stack, so depth is bounded by memory only;
//! - every source composite maps to exactly one destination composite
//!   (identity keyed), recorded before its children are visited, so shared
//!   references stay shared and cycles close onto themselves;
//! - children are emitted in source order.
use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::element::{Element, List, Node, Number};
use crate::error::{ConversionError, ElementError, Path, Segment};
use crate::native::{Native, NativeMap, NativeSeq};

// ————————————————————————————————————————————————————————————————————————————
// SEAMS
// ————————————————————————————————————————————————————————————————————————————

pub enum Children<S> {
    /// Map-like: becomes a keyed destination composite.
    Keyed(Vec<(String, S)>),
    /// Sequence- or array-like: becomes a positional destination composite.
    Indexed(Vec<S>),
}

pub trait GraphSource: Sized + fmt::Debug {
    /// `None` for leaves.
    fn children(&self) -> Option<Children<Self>>;
    /// Pointer identity for composites.
    fn identity(&self) -> Option<usize>;
}

pub trait GraphSink: Clone {
    fn empty_map() -> Self;
    fn empty_list() -> Self;
    fn insert(&self, key: String, value: Self);
    fn push(&self, value: Self);
}

// ————————————————————————————————————————————————————————————————————————————
// ENGINE
// ————————————————————————————————————————————————————————————————————————————

struct Frame<S, D> {
    dest: D,
    pending: std::vec::IntoIter<(Segment, S)>,
}

impl<S, D: GraphSink> Frame<S, D> {
    fn open(children: Children<S>) -> Self {
        match children {
            Children::Keyed(entries) => Self {
                dest: D::empty_map(),
                pending: entries
                    .into_iter()
                    .map(|(k, v)| (Segment::Key(k), v))
                    .collect::<Vec<_>>()
                    .into_iter(),
            },
            Children::Indexed(items) => Self {
                dest: D::empty_list(),
                pending: items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Segment::Index(i), v))
                    .collect::<Vec<_>>()
                    .into_iter(),
            },
        }
    }
}

fn attach<D: GraphSink>(parent: &D, segment: Segment, value: D) {
    match segment {
        Segment::Key(key) => parent.insert(key, value),
        Segment::Index(_) => parent.push(value),
    }
}

/// Convert the graph rooted at `root`. Fails atomically on the first leaf the
/// converter rejects; nothing built so far is returned.
pub fn transform<S, D, F>(root: &S, mut convert_leaf: F) -> Result<D, ConversionError>
where
    S: GraphSource,
    D: GraphSink,
    F: FnMut(&S) -> Result<D, ElementError>,
{
    let mut path = Path::root();
    let fail = |leaf: &S, path: Path, source: ElementError| ConversionError {
        path,
        value: format!("{leaf:?}"),
        source,
    };

    let Some(children) = root.children() else {
        return convert_leaf(root).map_err(|source| fail(root, path, source));
    };

    let mut visited: HashMap<usize, D> = HashMap::new();
    let first: Frame<S, D> = Frame::open(children);
    let out = first.dest.clone();
    if let Some(id) = root.identity() {
        visited.insert(id, out.clone());
    }
    let mut stack: Vec<Frame<S, D>> = vec![first];

    while let Some(frame) = stack.last_mut() {
        let Some((segment, child)) = frame.pending.next() else {
            stack.pop();
            path.pop();
            continue;
        };
        let parent = frame.dest.clone();

        if let Some(existing) = child.identity().and_then(|id| visited.get(&id)) {
            trace!(at = %path.child(segment.clone()), "reusing already converted composite");
            attach(&parent, segment, existing.clone());
            continue;
        }

        match child.children() {
            None => {
                let value = convert_leaf(&child).map_err(|source| fail(&child, path.child(segment.clone()), source))?;
                attach(&parent, segment, value);
            }
            Some(grandchildren) => {
                let frame: Frame<S, D> = Frame::open(grandchildren);
                if let Some(id) = child.identity() {
                    visited.insert(id, frame.dest.clone());
                }
                // attach the (still empty) composite now so siblings keep their order
                attach(&parent, segment.clone(), frame.dest.clone());
                path.push(segment);
                stack.push(frame);
            }
        }
    }

    Ok(out)
}

// ————————————————————————————————————————————————————————————————————————————
// ELEMENT + NATIVE BINDINGS
// ————————————————————————————————————————————————————————————————————————————

impl GraphSource for Element {
    fn children(&self) -> Option<Children<Self>> {
        match self {
            Element::List(list) => Some(Children::Indexed(list.items())),
            Element::Node(node) => Some(Children::Keyed(node.entries())),
            _ => None,
        }
    }
    fn identity(&self) -> Option<usize> {
        Element::identity(self)
    }
}

impl GraphSink for Element {
    fn empty_map() -> Self {
        Element::Node(Node::new())
    }
    fn empty_list() -> Self {
        Element::List(List::new())
    }
    fn insert(&self, key: String, value: Self) {
        if let Element::Node(node) = self {
            node.insert(key, value);
        }
    }
    fn push(&self, value: Self) {
        if let Element::List(list) = self {
            list.push(value);
        }
    }
}

impl GraphSource for Native {
    fn children(&self) -> Option<Children<Self>> {
        match self {
            Native::Map(map) => Some(Children::Keyed(map.entries())),
            Native::Seq(seq) => Some(Children::Indexed(seq.items())),
            Native::Array(items) => Some(Children::Indexed(items.to_vec())),
            _ => None,
        }
    }
    fn identity(&self) -> Option<usize> {
        Native::identity(self)
    }
}

impl GraphSink for Native {
    fn empty_map() -> Self {
        Native::Map(NativeMap::new())
    }
    fn empty_list() -> Self {
        Native::Seq(NativeSeq::new())
    }
    fn insert(&self, key: String, value: Self) {
        if let Native::Map(map) = self {
            map.insert(key, value);
        }
    }
    fn push(&self, value: Self) {
        if let Native::Seq(seq) = self {
            seq.push(value);
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCALAR CONVERTERS
// ————————————————————————————————————————————————————————————————————————————

/// Default native → element leaf conversion.
pub fn native_scalar(value: &Native) -> Result<Element, ElementError> {
    Ok(match value {
        Native::Unit => Element::Null,
        Native::Bool(v) => Element::Boolean(*v),
        Native::I8(v) => Element::Number(Number::I8(*v)),
        Native::I16(v) => Element::Number(Number::I16(*v)),
        Native::I32(v) => Element::Number(Number::I32(*v)),
        Native::I64(v) => Element::Number(Number::I64(*v)),
        Native::U8(v) => Element::Number(Number::U8(*v)),
        Native::U16(v) => Element::Number(Number::U16(*v)),
        Native::U32(v) => Element::Number(Number::U32(*v)),
        Native::U64(v) => Element::Number(Number::U64(*v)),
        Native::F32(v) => Element::Number(Number::F32(*v)),
        Native::F64(v) => Element::Number(Number::F64(*v)),
        Native::Char(v) => Element::String(v.to_string()),
        Native::Str(v) => Element::String(v.clone()),
        other => {
            return Err(ElementError::UnsupportedScalarKind {
                type_name: other.kind_name().to_owned(),
            });
        }
    })
}

/// Default element → native leaf conversion.
pub fn element_scalar(value: &Element) -> Result<Native, ElementError> {
    Ok(match value {
        Element::Null => Native::Unit,
        Element::Boolean(v) => Native::Bool(*v),
        Element::String(v) => Native::Str(v.clone()),
        Element::Number(n) => match *n {
            Number::I8(v) => Native::I8(v),
            Number::I16(v) => Native::I16(v),
            Number::I32(v) => Native::I32(v),
            Number::I64(v) => Native::I64(v),
            Number::U8(v) => Native::U8(v),
            Number::U16(v) => Native::U16(v),
            Number::U32(v) => Native::U32(v),
            Number::U64(v) => Native::U64(v),
            Number::F32(v) => Native::F32(v),
            Number::F64(v) => Native::F64(v),
        },
        composite => {
            return Err(ElementError::UnsupportedScalarKind {
                type_name: composite.shape(),
            });
        }
    })
}

// ------------------------------- Front API -------------------------------- //

pub fn to_element(root: &Native) -> Result<Element, ConversionError> {
    transform(root, native_scalar)
}

pub fn to_element_with<F>(root: &Native, convert: F) -> Result<Element, ConversionError>
where
    F: FnMut(&Native) -> Result<Element, ElementError>,
{
    transform(root, convert)
}

pub fn from_element(root: &Element) -> Result<Native, ConversionError> {
    transform(root, element_scalar)
}

pub fn from_element_with<F>(root: &Element, convert: F) -> Result<Native, ConversionError>
where
    F: FnMut(&Element) -> Result<Native, ElementError>,
{
    transform(root, convert)
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Opaque;
    use serde_json::json;

    #[test]
    fn scenario_map_with_list() {
        let native = Native::from(&json!({"x": 1, "y": [1, 2, 3]}));
        let element = to_element(&native).unwrap();

        let expected = Node::new();
        expected.insert("x", Number::I64(1));
        expected.insert("y", List::from_vec(vec![1i64.into(), 2i64.into(), 3i64.into()]));
        assert_eq!(element, Element::Node(expected));

        let back = from_element(&element).unwrap();
        assert_eq!(back.to_json().unwrap(), json!({"x": 1, "y": [1, 2, 3]}));
    }

    #[test]
    fn self_reference_becomes_the_same_node() {
        let map = NativeMap::new();
        map.insert("name", "root".into());
        map.insert("self", Native::Map(map.clone()));

        let element = to_element(&Native::Map(map.clone())).unwrap();
        let node = element.as_node().unwrap();
        let inner = node.get("self").unwrap();
        assert!(inner.as_node().unwrap().ptr_eq(node));

        element.dismantle();
        Native::Map(map).dismantle();
    }

    #[test]
    fn shared_entries_stay_shared() {
        let x = NativeSeq::from_vec(vec![Native::I32(1)]);
        let outer = NativeSeq::from_vec(vec![Native::Seq(x.clone()), Native::Seq(x)]);
        let element = to_element(&Native::Seq(outer)).unwrap();
        let list = element.as_list().unwrap();
        assert!(list.get(0).unwrap().same(&list.get(1).unwrap()));
    }

    #[test]
    fn reverse_direction_preserves_cycles_and_order() {
        let node = Node::new();
        node.insert("b", 2u8);
        node.insert("a", List::new());
        node.insert("loop", node.clone());

        let native = from_element(&Element::Node(node.clone())).unwrap();
        let map = native.as_map().unwrap();
        assert_eq!(map.borrow().keys().cloned().collect::<Vec<_>>(), vec!["b", "a", "loop"]);
        assert!(matches!(map.get("b"), Some(Native::U8(2))));
        assert!(map.get("loop").unwrap().as_map().unwrap().ptr_eq(map));

        native.dismantle();
        Element::Node(node).dismantle();
    }

    #[test]
    fn arrays_become_lists() {
        let native = Native::array(vec![Native::F32(0.5), Native::Char('z')]);
        let element = to_element(&native).unwrap();
        assert_eq!(element, Element::from(vec![Element::from(0.5f32), Element::from("z")]));
    }

    #[test]
    fn unsupported_scalar_fails_with_its_path() {
        let map = NativeMap::new();
        map.insert("ok", Native::Bool(true));
        map.insert(
            "items",
            Native::Seq(NativeSeq::from_vec(vec![Native::Unit, Native::Opaque(Opaque::new(3u128))])),
        );
        let err = to_element(&Native::Map(map)).unwrap_err();
        assert_eq!(err.path.to_string(), "$.items[1]");
        assert!(matches!(err.source, ElementError::UnsupportedScalarKind { ref type_name } if type_name == "u128"));
    }

    #[test]
    fn custom_leaf_converter_is_used() {
        let native = Native::from(&json!({"port": 8080}));
        let element = to_element_with(&native, |leaf| match leaf {
            Native::I64(v) => Ok(Element::from(v.to_string())),
            other => native_scalar(other),
        })
        .unwrap();
        assert_eq!(element.as_node().unwrap().get("port"), Some(Element::from("8080")));
    }

    fn deep_chain(depth: usize, leaf: Native) -> NativeSeq {
        let root = NativeSeq::new();
        let mut cursor = root.clone();
        for _ in 0..depth {
            let next = NativeSeq::new();
            cursor.push(Native::Seq(next.clone()));
            cursor = next;
        }
        cursor.push(leaf);
        root
    }

    #[test]
    fn deep_nesting_does_not_overflow_the_stack() {
        const DEPTH: usize = 100_000;
        let root = deep_chain(DEPTH, Native::I8(7));

        let element = to_element(&Native::Seq(root)).unwrap();
        let mut depth = 0;
        let mut at = element.clone();
        while let Some(next) = at.as_list().and_then(|l| l.get(0)) {
            if !next.is_composite() {
                assert_eq!(next, Element::from(7i8));
                break;
            }
            at = next;
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        drop(at);
        drop(element);
    }

    #[test]
    fn deep_failure_reports_the_error_and_discards_partial_output() {
        const DEPTH: usize = 100_000;
        let root = deep_chain(DEPTH, Native::Opaque(Opaque::new(9u128)));
        let err = to_element(&Native::Seq(root)).unwrap_err();
        assert!(matches!(err.source, ElementError::UnsupportedScalarKind { ref type_name } if type_name == "u128"));
        assert!(err.path.to_string().ends_with("[0][0]"));
    }
}
