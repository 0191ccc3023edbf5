//! Host-native composite graph: what a format adapter hands to the core.
//!
//! Unlike [`Element`](crate::Element) this model keeps fixed-size arrays apart
//! from growable sequences and can carry arbitrary host values
//! ([`Opaque`]), which have no element representation.
use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

#[derive(Clone)]
pub enum Native {
    Unit,
    Bool(bool),
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
    Char(char),
    Str(String),
    Map(NativeMap),
    Seq(NativeSeq),
    /// Fixed-size array; identity-bearing like the other composites.
    Array(Rc<[Native]>),
    Opaque(Opaque),
}

#[derive(Clone, Default)]
pub struct NativeMap(Rc<RefCell<IndexMap<String, Native>>>);

#[derive(Clone, Default)]
pub struct NativeSeq(Rc<RefCell<Vec<Native>>>);

/// A host value the core has no scalar kind for.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    value: Rc<dyn Any>,
}

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Rc::new(value),
        }
    }
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl Native {
    pub fn is_composite(&self) -> bool {
        matches!(self, Native::Map(_) | Native::Seq(_) | Native::Array(_))
    }

    pub fn identity(&self) -> Option<usize> {
        match self {
            Native::Map(m) => Some(m.identity()),
            Native::Seq(s) => Some(s.identity()),
            Native::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&NativeMap> {
        match self {
            Native::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&NativeSeq> {
        match self {
            Native::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn array(items: Vec<Native>) -> Self {
        Native::Array(items.into())
    }

    /// Name of the host kind this value carries, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Native::Unit => "()",
            Native::Bool(_) => "bool",
            Native::I8(_) => "i8",
            Native::I16(_) => "i16",
            Native::I32(_) => "i32",
            Native::I64(_) => "i64",
            Native::U8(_) => "u8",
            Native::U16(_) => "u16",
            Native::U32(_) => "u32",
            Native::U64(_) => "u64",
            Native::F32(_) => "f32",
            Native::F64(_) => "f64",
            Native::Char(_) => "char",
            Native::Str(_) => "string",
            Native::Map(_) => "map",
            Native::Seq(_) => "sequence",
            Native::Array(_) => "array",
            Native::Opaque(o) => o.type_name,
        }
    }

    /// Non-recursive teardown that also breaks cycles, see
    /// [`Element::dismantle`](crate::Element::dismantle). Arrays are immutable
    /// and only released once unshared.
    pub fn dismantle(self) {
        let mut stack = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Native::Map(map) => {
                    let entries = std::mem::take(&mut *map.0.borrow_mut());
                    stack.extend(entries.into_values());
                }
                Native::Seq(seq) => {
                    let items = std::mem::take(&mut *seq.0.borrow_mut());
                    stack.extend(items);
                }
                Native::Array(items) => {
                    if Rc::strong_count(&items) == 1 {
                        // the clones keep children alive, so dropping the slice stays shallow
                        stack.extend(items.iter().cloned());
                    }
                }
                _ => {}
            }
        }
    }

    /// Acyclic bridge to `serde_json`, through the element graph.
    pub fn to_json(&self) -> anyhow::Result<serde_json::Value> {
        let element = crate::transform::to_element(self)?;
        Ok(serde_json::to_value(&element)?)
    }
}

impl NativeMap {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&self, key: impl Into<String>, value: Native) -> Option<Native> {
        self.0.borrow_mut().insert(key.into(), value)
    }
    pub fn get(&self, key: &str) -> Option<Native> {
        self.0.borrow().get(key).cloned()
    }
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
    pub fn entries(&self) -> Vec<(String, Native)> {
        self.0.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
    pub fn borrow(&self) -> Ref<'_, IndexMap<String, Native>> {
        self.0.borrow()
    }
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
    pub fn ptr_eq(&self, other: &NativeMap) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl NativeSeq {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_vec(items: Vec<Native>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }
    pub fn push(&self, value: Native) {
        self.0.borrow_mut().push(value);
    }
    pub fn get(&self, index: usize) -> Option<Native> {
        self.0.borrow().get(index).cloned()
    }
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
    pub fn items(&self) -> Vec<Native> {
        self.0.borrow().clone()
    }
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
    pub fn ptr_eq(&self, other: &NativeSeq) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// ------------------------------ Teardown ---------------------------------- //

// Same scheme as the element composites: the last handle hands its children
// to a work list. Arrays are immutable, so a uniquely held array lends clones
// of its items to the list, which keeps releasing the slice itself shallow.

impl Drop for NativeMap {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let Ok(mut entries) = self.0.try_borrow_mut() else {
            return;
        };
        if entries.values().any(Native::is_composite) {
            let taken = std::mem::take(&mut *entries);
            drop(entries);
            release(taken.into_values().collect());
        }
    }
}

impl Drop for NativeSeq {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let Ok(mut items) = self.0.try_borrow_mut() else {
            return;
        };
        if items.iter().any(Native::is_composite) {
            let taken = std::mem::take(&mut *items);
            drop(items);
            release(taken);
        }
    }
}

fn release(mut stack: Vec<Native>) {
    while let Some(value) = stack.pop() {
        match &value {
            Native::Map(map) if Rc::strong_count(&map.0) == 1 => {
                if let Ok(mut entries) = map.0.try_borrow_mut() {
                    stack.extend(entries.drain(..).map(|(_, v)| v));
                }
            }
            Native::Seq(seq) if Rc::strong_count(&seq.0) == 1 => {
                if let Ok(mut items) = seq.0.try_borrow_mut() {
                    stack.append(&mut *items);
                }
            }
            Native::Array(items) if Rc::strong_count(items) == 1 => {
                stack.extend(items.iter().filter(|item| item.is_composite()).cloned());
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // composites print a summary only; they may be cyclic
        match self {
            Native::Unit => f.write_str("()"),
            Native::Bool(v) => write!(f, "{v}"),
            Native::I8(v) => write!(f, "{v}i8"),
            Native::I16(v) => write!(f, "{v}i16"),
            Native::I32(v) => write!(f, "{v}i32"),
            Native::I64(v) => write!(f, "{v}i64"),
            Native::U8(v) => write!(f, "{v}u8"),
            Native::U16(v) => write!(f, "{v}u16"),
            Native::U32(v) => write!(f, "{v}u32"),
            Native::U64(v) => write!(f, "{v}u64"),
            Native::F32(v) => write!(f, "{v:?}f32"),
            Native::F64(v) => write!(f, "{v:?}f64"),
            Native::Char(v) => write!(f, "{v:?}"),
            Native::Str(v) => write!(f, "{v:?}"),
            Native::Map(m) => write!(f, "map{{{} entries}}", m.len()),
            Native::Seq(s) => write!(f, "sequence[{}]", s.len()),
            Native::Array(a) => write!(f, "array[{}]", a.len()),
            Native::Opaque(o) => write!(f, "<{}>", o.type_name),
        }
    }
}

impl From<&serde_json::Value> for Native {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Native::Unit,
            Value::Bool(b) => Native::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Native::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Native::U64(u)
                } else {
                    Native::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Native::Str(s.clone()),
            Value::Array(xs) => Native::Seq(NativeSeq::from_vec(xs.iter().map(Native::from).collect())),
            Value::Object(m) => {
                let map = NativeMap::new();
                for (k, v) in m {
                    map.insert(k.clone(), Native::from(v));
                }
                Native::Map(map)
            }
        }
    }
}

macro_rules! native_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {$(
        impl From<$ty> for Native {
            fn from(v: $ty) -> Self { Native::$variant(v) }
        }
    )+};
}

native_from!(
    bool => Bool, i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, f32 => F32, f64 => F64,
    char => Char, String => Str, NativeMap => Map, NativeSeq => Seq,
);

impl From<&str> for Native {
    fn from(v: &str) -> Self {
        Native::Str(v.to_owned())
    }
}
