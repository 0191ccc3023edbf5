//! Cycle-safe structural equality and hashing.
//!
//! Equality is a bisimulation check: composite pairs are assumed equal the
//! first time they are compared and never descended into again, so cyclic
//! graphs compare in finite time and equal iff their cycles line up. Node key
//! order does not take part in equality.
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use ordered_float::OrderedFloat;

use super::{Element, Number};

/// How many composite levels contribute to a hash. Deeper structure is left
/// to equality; this keeps hashing finite on cycles and consistent with `==`.
const HASH_DEPTH: usize = 2;

pub fn structurally_equal(a: &Element, b: &Element) -> bool {
    let mut assumed: HashSet<(usize, usize)> = HashSet::new();
    let mut stack = vec![(a.clone(), b.clone())];

    while let Some((x, y)) = stack.pop() {
        match (&x, &y) {
            (Element::Null, Element::Null) => {}
            (Element::Boolean(p), Element::Boolean(q)) if p == q => {}
            (Element::Number(p), Element::Number(q)) if p == q => {}
            (Element::String(p), Element::String(q)) if p == q => {}
            (Element::List(p), Element::List(q)) => {
                if p.ptr_eq(q) || !assumed.insert((p.identity(), q.identity())) {
                    continue;
                }
                let (ps, qs) = (p.borrow(), q.borrow());
                if ps.len() != qs.len() {
                    return false;
                }
                stack.extend(ps.iter().cloned().zip(qs.iter().cloned()));
            }
            (Element::Node(p), Element::Node(q)) => {
                if p.ptr_eq(q) || !assumed.insert((p.identity(), q.identity())) {
                    continue;
                }
                let (ps, qs) = (p.borrow(), q.borrow());
                if ps.len() != qs.len() {
                    return false;
                }
                for (key, left) in ps.iter() {
                    match qs.get(key) {
                        Some(right) => stack.push((left.clone(), right.clone())),
                        None => return false,
                    }
                }
            }
            _ => return false,
        }
    }
    true
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        structurally_equal(self, other)
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_shallow(self, HASH_DEPTH, state);
    }
}

fn hash_shallow<H: Hasher>(element: &Element, depth: usize, state: &mut H) {
    std::mem::discriminant(element).hash(state);
    match element {
        Element::Null => {}
        Element::Boolean(b) => b.hash(state),
        Element::Number(n) => n.hash(state),
        Element::String(s) => s.hash(state),
        Element::List(list) => {
            let items = list.borrow();
            items.len().hash(state);
            if depth > 0 {
                for item in items.iter() {
                    hash_shallow(item, depth - 1, state);
                }
            }
        }
        Element::Node(node) => {
            let entries = node.borrow();
            entries.len().hash(state);
            // order-insensitive: combine per-entry digests commutatively
            let mut combined: u64 = 0;
            for (key, value) in entries.iter() {
                let mut h = DefaultHasher::new();
                key.hash(&mut h);
                if depth > 0 {
                    hash_shallow(value, depth - 1, &mut h);
                }
                combined = combined.wrapping_add(h.finish());
            }
            combined.hash(state);
        }
    }
}

// ------------------------------- Numbers ---------------------------------- //

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        // against an integer only an integral float can be equal, compared exactly
        if self.is_integer() || other.is_integer() {
            return self.as_i128() == other.as_i128();
        }
        OrderedFloat(self.as_f64()) == OrderedFloat(other.as_f64())
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // integral values hash alike whatever their width, so 2u8 and 2.0f64 agree
        match self.as_i128() {
            Some(i) => i.hash(state),
            None => OrderedFloat(self.as_f64()).hash(state),
        }
    }
}
