//! serde bridge: any self-describing serde format can produce or consume
//! element graphs. Serialization refuses cycles; shared acyclic substructure
//! is written out once per reference.
use std::cell::RefCell;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};

use super::{Element, List, Node, Number};

struct Guarded<'a> {
    element: &'a Element,
    /// Composites on the current serialization stack.
    active: &'a RefCell<Vec<usize>>,
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let active = RefCell::new(Vec::new());
        Guarded { element: self, active: &active }.serialize(serializer)
    }
}

impl Serialize for Guarded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let element = self.element;
        if let Some(id) = element.identity() {
            if self.active.borrow().contains(&id) {
                return Err(ser::Error::custom(format!(
                    "cannot serialize a cyclic element ({} refers back to an enclosing composite)",
                    element.shape()
                )));
            }
            self.active.borrow_mut().push(id);
        }
        let out = match element {
            Element::Null => serializer.serialize_unit(),
            Element::Boolean(b) => serializer.serialize_bool(*b),
            Element::Number(n) => n.serialize(serializer),
            Element::String(s) => serializer.serialize_str(s),
            Element::List(list) => {
                let items = list.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(&Guarded { element: item, active: self.active })?;
                }
                seq.end()
            }
            Element::Node(node) => {
                let entries = node.borrow();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries.iter() {
                    map.serialize_entry(key, &Guarded { element: value, active: self.active })?;
                }
                map.end()
            }
        };
        if element.identity().is_some() {
            self.active.borrow_mut().pop();
        }
        out
    }
}

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Number::I8(v) => serializer.serialize_i8(v),
            Number::I16(v) => serializer.serialize_i16(v),
            Number::I32(v) => serializer.serialize_i32(v),
            Number::I64(v) => serializer.serialize_i64(v),
            Number::U8(v) => serializer.serialize_u8(v),
            Number::U16(v) => serializer.serialize_u16(v),
            Number::U32(v) => serializer.serialize_u32(v),
            Number::U64(v) => serializer.serialize_u64(v),
            Number::F32(v) => serializer.serialize_f32(v),
            Number::F64(v) => serializer.serialize_f64(v),
        }
    }
}

// ------------------------------ Deserialize ------------------------------- //

struct ElementVisitor;

impl<'de> Visitor<'de> for ElementVisitor {
    type Value = Element;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Element, E> {
        Ok(Element::Boolean(v))
    }
    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Element, E> {
        Ok(Element::Number(Number::I64(v)))
    }
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Element, E> {
        // non-negative values that fit keep the common signed width
        Ok(Element::Number(match i64::try_from(v) {
            Ok(i) => Number::I64(i),
            Err(_) => Number::U64(v),
        }))
    }
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Element, E> {
        Ok(Element::Number(Number::F64(v)))
    }
    fn visit_str<E: de::Error>(self, v: &str) -> Result<Element, E> {
        Ok(Element::String(v.to_owned()))
    }
    fn visit_string<E: de::Error>(self, v: String) -> Result<Element, E> {
        Ok(Element::String(v))
    }
    fn visit_unit<E: de::Error>(self) -> Result<Element, E> {
        Ok(Element::Null)
    }
    fn visit_none<E: de::Error>(self) -> Result<Element, E> {
        Ok(Element::Null)
    }
    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Element, D::Error> {
        Element::deserialize(deserializer)
    }
    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Element, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Element>()? {
            items.push(item);
        }
        Ok(Element::List(List::from_vec(items)))
    }
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Element, A::Error> {
        let node = Node::new();
        while let Some((key, value)) = map.next_entry::<String, Element>()? {
            node.insert(key, value);
        }
        Ok(Element::Node(node))
    }
}

impl<'de> Deserialize<'de> for Element {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ElementVisitor)
    }
}

impl From<serde_json::Value> for Element {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Element::Null,
            Value::Bool(b) => Element::Boolean(b),
            Value::Number(n) => Element::Number(if let Some(i) = n.as_i64() {
                Number::I64(i)
            } else if let Some(u) = n.as_u64() {
                Number::U64(u)
            } else {
                Number::F64(n.as_f64().unwrap_or(f64::NAN))
            }),
            Value::String(s) => Element::String(s),
            Value::Array(xs) => Element::List(List::from_vec(xs.into_iter().map(Element::from).collect())),
            Value::Object(m) => Element::Node(Node::from_entries(m.into_iter().map(|(k, v)| (k, Element::from(v))))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_text_round_trips_through_elements() {
        let src = r#"{"name":"api","port":8080,"ratio":0.5,"tags":["a","b"],"extra":null}"#;
        let element: Element = serde_json::from_str(src).unwrap();
        assert_eq!(element.shape(), "node{name, port, ratio, tags, extra}");
        assert_eq!(serde_json::to_string(&element).unwrap(), src);
    }

    #[test]
    fn json_values_convert_directly() {
        let element = Element::from(json!({"x": 1, "y": [1, 2, 3]}));
        let node = element.as_node().unwrap();
        assert_eq!(node.get("x"), Some(Element::from(1i64)));
        assert_eq!(node.get("y").unwrap().arity(), 3);
    }

    #[test]
    fn shared_substructure_serializes_and_cycles_fail() {
        let shared = Element::from(vec![1, 2]);
        let list = List::from_vec(vec![shared.clone(), shared]);
        assert_eq!(serde_json::to_string(&Element::List(list.clone())).unwrap(), "[[1,2],[1,2]]");

        list.push(list.clone());
        let err = serde_json::to_string(&Element::List(list.clone())).unwrap_err();
        assert!(err.to_string().contains("cyclic"));
        list.clear();
    }
}
