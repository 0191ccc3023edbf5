//! Picks the recipe that builds a desired type from a given element.
//!
//! Candidates arrive in catalog order (priority, then declaration). Each is
//! filtered by return type and by arity, then its components are bound to
//! sub-elements, by name or by position, and kind-checked. The first survivor
//! wins; at equal priority a name-bound survivor beats a positional one.
use thiserror::Error;
use tracing::trace;

use crate::descriptor::TypeDescriptor;
use crate::element::Element;
use crate::error::Segment;
use crate::options::Options;
use crate::recipe::{Component, Components, DefaultFn, Recipe};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no recipe for `{ty}` matches {shape}")]
pub struct Unresolved {
    pub ty: &'static str,
    pub shape: String,
}

/// Chosen recipe with each component bound to its source.
pub struct Selection<'r> {
    pub recipe: &'r Recipe,
    pub bindings: Vec<Binding>,
    pub by_name: bool,
}

pub struct Binding {
    pub name: Option<String>,
    pub ty: TypeDescriptor,
    /// Where the sub-element sits inside its parent; `None` for the element
    /// itself and for defaults.
    pub segment: Option<Segment>,
    pub source: Source,
}

pub enum Source {
    Element(Element),
    Default(DefaultFn),
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

pub fn select<'r>(
    element: &Element,
    desired: &TypeDescriptor,
    candidates: &'r [Recipe],
    options: &Options,
) -> Result<Selection<'r>, Unresolved> {
    let arity = element.arity();
    let mut best: Option<Selection<'r>> = None;
    for recipe in candidates {
        if let Some(current) = &best {
            if recipe.priority() < current.recipe.priority() {
                break;
            }
        }
        if !desired.accepts(recipe.returns()) {
            reject(recipe, "incompatible return type");
            continue;
        }
        if recipe.expected_len(element) != Some(arity) {
            reject(recipe, "component count");
            continue;
        }
        let Some(selection) = bind(recipe, element, options) else {
            continue;
        };
        match &best {
            None => best = Some(selection),
            Some(current) if selection.by_name && !current.by_name => best = Some(selection),
            Some(_) => {}
        }
    }
    best.ok_or_else(|| Unresolved {
        ty: desired.name(),
        shape: element.shape(),
    })
}

fn reject(recipe: &Recipe, reason: &str) {
    trace!(recipe = recipe.label(), ty = recipe.returns().name(), reason, "candidate rejected");
}

fn bind<'r>(recipe: &'r Recipe, element: &Element, options: &Options) -> Option<Selection<'r>> {
    let check_kinds = options.match_by_kind && recipe.matches_by_kind();
    let (bindings, by_name) = match recipe.components() {
        Components::Leaf => (Vec::new(), false),
        Components::Repeat { item, .. } => (bind_repeat(item, element)?, false),
        Components::Transparent(inner) => {
            if check_kinds && !inner.admits(element) {
                reject(recipe, "wrapped kind");
                return None;
            }
            let binding = Binding {
                name: None,
                ty: inner.clone(),
                segment: None,
                source: Source::Element(element.clone()),
            };
            (vec![binding], false)
        }
        Components::Fixed(components) => {
            let by_name = options.match_by_name && recipe.matches_by_name() && element.as_node().is_some();
            if !by_name && options.strict_names && element.as_node().is_some() {
                reject(recipe, "node needs name binding");
                return None;
            }
            let bound = if by_name {
                bind_by_name(components, element)
            } else {
                bind_by_position(components, element)
            };
            let Some(bound) = bound else {
                reject(recipe, "unbound component");
                return None;
            };
            if check_kinds && !kinds_admit(&bound) {
                reject(recipe, "component kind");
                return None;
            }
            (bound, by_name)
        }
    };
    Some(Selection {
        recipe,
        bindings,
        by_name,
    })
}

/// Containers take every item; their item type is checked as it is built.
fn bind_repeat(item: &TypeDescriptor, element: &Element) -> Option<Vec<Binding>> {
    let bindings = match element {
        Element::List(list) => list
            .items()
            .into_iter()
            .enumerate()
            .map(|(index, value)| Binding {
                name: None,
                ty: item.clone(),
                segment: Some(Segment::Index(index)),
                source: Source::Element(value),
            })
            .collect(),
        Element::Node(node) => node
            .entries()
            .into_iter()
            .map(|(key, value)| Binding {
                name: Some(key.clone()),
                ty: item.clone(),
                segment: Some(Segment::Key(key)),
                source: Source::Element(value),
            })
            .collect(),
        _ => return None,
    };
    Some(bindings)
}

fn bind_by_name(components: &[Component], element: &Element) -> Option<Vec<Binding>> {
    let node = element.as_node()?;
    components
        .iter()
        .map(|component| {
            let name = component.name.clone()?;
            let (segment, source) = match (node.get(&name), &component.default) {
                (Some(value), _) => (Some(Segment::Key(name.clone())), Source::Element(value)),
                (None, Some(default)) => (None, Source::Default(default.clone())),
                (None, None) => return None,
            };
            Some(Binding {
                name: Some(name),
                ty: component.ty.clone(),
                segment,
                source,
            })
        })
        .collect()
}

fn bind_by_position(components: &[Component], element: &Element) -> Option<Vec<Binding>> {
    let values: Vec<(Segment, Element)> = match element {
        Element::List(list) => list
            .items()
            .into_iter()
            .enumerate()
            .map(|(index, value)| (Segment::Index(index), value))
            .collect(),
        Element::Node(node) => node
            .entries()
            .into_iter()
            .map(|(key, value)| (Segment::Key(key), value))
            .collect(),
        _ => return None,
    };
    let mut values = values.into_iter();
    components
        .iter()
        .map(|component| {
            let (segment, source) = match (values.next(), &component.default) {
                (Some((segment, value)), _) => (Some(segment), Source::Element(value)),
                (None, Some(default)) => (None, Source::Default(default.clone())),
                (None, None) => return None,
            };
            Some(Binding {
                name: component.name.clone(),
                ty: component.ty.clone(),
                segment,
                source,
            })
        })
        .collect()
}

fn kinds_admit(bindings: &[Binding]) -> bool {
    bindings.iter().all(|binding| match &binding.source {
        Source::Element(value) => binding.ty.admits(value),
        Source::Default(_) => true,
    })
}
