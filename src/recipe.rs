//! Construction recipes: declared ways to build a value of a type from
//! components, and to take one apart again.
//!
//! A type usually has several candidate recipes (a field-by-field structural
//! recipe, one or more initializers, a custom leaf conversion, …); the
//! [`matcher`](crate::matcher) picks one per element. Recipes are immutable
//! once built and shared across threads through the
//! [`Catalog`](crate::Catalog).
pub mod containers;
pub mod scalars;
pub mod temporal;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;

use crate::descriptor::{Mapped, TypeDescriptor};
use crate::element::Element;
use crate::object::Object;

// ------------------------------- Policy ---------------------------------- //

/// Priority of recipes registered through `Recipe::custom`; above every
/// built-in recipe so registrations override introspected shapes.
pub const PRIORITY_CUSTOM: i32 = 100;
pub const PRIORITY_DEFAULT: i32 = 0;

// ------------------------------- Callbacks -------------------------------- //

pub type LengthFn = Arc<dyn Fn(&Element) -> Option<usize> + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn() -> Object + Send + Sync>;
pub type BuildFn = Arc<dyn Fn(Args) -> anyhow::Result<Object> + Send + Sync>;
pub type EmptyFn = Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>;
pub type PopulateFn = Arc<dyn Fn(&mut dyn Any, Args) -> anyhow::Result<()> + Send + Sync>;
pub type FinishFn = Arc<dyn Fn(Box<dyn Any>) -> anyhow::Result<Object> + Send + Sync>;
pub type CreateFn = Arc<dyn Fn() -> anyhow::Result<Object> + Send + Sync>;
pub type FillFn = Arc<dyn Fn(&Object, Args) -> anyhow::Result<()> + Send + Sync>;
pub type ReadFn = Arc<dyn Fn(&Element) -> anyhow::Result<Object> + Send + Sync>;
pub type PartsResult = anyhow::Result<Option<Vec<Part>>>;
/// `Ok(None)`: this recipe does not describe the given value.
pub type PartsFn = Arc<dyn Fn(&dyn Any) -> PartsResult + Send + Sync>;
/// `Ok(None)`: this recipe does not describe the given value.
pub type WriteFn = Arc<dyn Fn(&dyn Any) -> anyhow::Result<Option<Element>> + Send + Sync>;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecipeSource {
    /// Empty instance, then named members assigned.
    Structural,
    /// Multi-argument constructor.
    Initializer,
    /// Immutable declared component list (tuples, records).
    FixedShape,
    /// Built-in list/map/array recipes.
    Container,
    /// Explicitly registered build/decompose pair.
    Custom,
    /// Built-in scalar conversions.
    Scalar,
    /// `Option`, `Box`, `Rc<RefCell<_>>` around another type's recipes.
    Wrapper,
}

/// One declared component of a recipe.
#[derive(Clone)]
pub struct Component {
    pub(crate) name: Option<String>,
    pub(crate) ty: TypeDescriptor,
    pub(crate) default: Option<DefaultFn>,
}

#[derive(Clone)]
pub enum Components {
    /// Converts the element itself; no components.
    Leaf,
    /// Declared components, bound by name or by position.
    Fixed(Vec<Component>),
    /// One repeating component per list item (or node entry when `keyed`).
    Repeat { item: TypeDescriptor, keyed: bool },
    /// A single component built from the very same element.
    Transparent(TypeDescriptor),
}

#[derive(Clone)]
pub enum Assembly {
    Leaf(ReadFn),
    /// The value exists only once every component is resolved.
    Whole(BuildFn),
    /// Empty value first, populated once components are resolved; not
    /// shareable until finished.
    InPlace {
        empty: EmptyFn,
        populate: PopulateFn,
        finish: FinishFn,
    },
    /// Shareable empty value registered before its components resolve, so
    /// components may refer back to it.
    Placeholder { create: CreateFn, fill: FillFn },
}

#[derive(Clone)]
pub enum Decompose {
    Leaf(WriteFn),
    Parts(PartsFn),
}

#[derive(Clone)]
pub struct Recipe {
    pub(crate) label: String,
    pub(crate) returns: TypeDescriptor,
    pub(crate) source: RecipeSource,
    pub(crate) components: Components,
    pub(crate) length: LengthFn,
    pub(crate) match_by_name: bool,
    pub(crate) match_by_kind: bool,
    pub(crate) priority: i32,
    pub(crate) assembly: Assembly,
    pub(crate) decompose: Option<Decompose>,
}

/// A resolved component handed to a build callback.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub name: Option<String>,
    pub value: Object,
}

/// Resolved components, in declaration order.
#[derive(Debug, Default)]
pub struct Args {
    values: Vec<Resolved>,
}

/// One component of a value being decomposed.
#[derive(Clone, Debug)]
pub struct Part {
    pub(crate) name: Option<String>,
    pub(crate) ty: TypeDescriptor,
    pub(crate) value: Object,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Component {
    pub(crate) fn named<T: Mapped>(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ty: T::descriptor(),
            default: None,
        }
    }

    pub(crate) fn positional<T: Mapped>() -> Self {
        Self {
            name: None,
            ty: T::descriptor(),
            default: None,
        }
    }

    pub(crate) fn or_else<T: Mapped>(mut self, default: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(move || Object::new(default())));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {:?}", self.ty)?,
            None => write!(f, "{:?}", self.ty)?,
        }
        if self.default.is_some() {
            f.write_str(" = <default>")?;
        }
        Ok(())
    }
}

impl Args {
    pub(crate) fn new(values: Vec<Resolved>) -> Self {
        Self { values }
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn values(&self) -> &[Resolved] {
        &self.values
    }
    pub fn into_values(self) -> Vec<Resolved> {
        self.values
    }

    pub fn get<T: Mapped>(&self, index: usize) -> anyhow::Result<T> {
        let resolved = self
            .values
            .get(index)
            .ok_or_else(|| anyhow!("missing component #{index}"))?;
        resolved.value.clone().take()
    }

    pub fn named<T: Mapped>(&self, name: &str) -> anyhow::Result<T> {
        let resolved = self
            .values
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
            .ok_or_else(|| anyhow!("missing component `{name}`"))?;
        resolved.value.clone().take()
    }

    /// `name: type` list used in diagnostics.
    pub fn summary(&self) -> String {
        self.values
            .iter()
            .map(|r| match &r.name {
                Some(name) => format!("{name}: {}", r.value.type_name()),
                None => r.value.type_name().to_owned(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Part {
    pub fn named<T: Mapped>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: Some(name.into()),
            ty: T::descriptor(),
            value: Object::new(value),
        }
    }

    pub fn positional<T: Mapped>(value: T) -> Self {
        Self {
            name: None,
            ty: T::descriptor(),
            value: Object::new(value),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
    pub fn value(&self) -> &Object {
        &self.value
    }
}

impl Recipe {
    /// Field-by-field recipe: `T::default()`, then each declared member is
    /// assigned. Placeholder capable once shared through `Rc<RefCell<T>>`.
    pub fn structural<T: Mapped + Default>() -> StructuralBuilder<T> {
        StructuralBuilder {
            label: format!("{} fields", short_name::<T>()),
            fields: Vec::new(),
            allow_unknown: false,
            priority: PRIORITY_DEFAULT,
        }
    }

    /// Constructor-like recipe: the value is built once from all components.
    pub fn initializer<T: Mapped>(label: impl Into<String>) -> ComponentsBuilder<T> {
        ComponentsBuilder::new(label.into(), RecipeSource::Initializer, PRIORITY_DEFAULT)
    }

    /// Recipe for a type whose components are fixed at definition (records,
    /// tuples), in declaration order.
    pub fn fixed_shape<T: Mapped>(label: impl Into<String>) -> ComponentsBuilder<T> {
        ComponentsBuilder::new(label.into(), RecipeSource::FixedShape, PRIORITY_DEFAULT)
    }

    /// Explicit build/decompose pair that bypasses structural description.
    pub fn custom<T: Mapped>(label: impl Into<String>) -> ComponentsBuilder<T> {
        ComponentsBuilder::new(label.into(), RecipeSource::Custom, PRIORITY_CUSTOM)
    }

    pub(crate) fn scalar<T: Mapped>(label: impl Into<String>) -> ComponentsBuilder<T> {
        ComponentsBuilder::new(label.into(), RecipeSource::Scalar, PRIORITY_DEFAULT)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn returns(&self) -> &TypeDescriptor {
        &self.returns
    }
    pub fn source(&self) -> RecipeSource {
        self.source
    }
    pub fn components(&self) -> &Components {
        &self.components
    }
    pub fn priority(&self) -> i32 {
        self.priority
    }
    pub fn matches_by_name(&self) -> bool {
        self.match_by_name
    }
    pub fn matches_by_kind(&self) -> bool {
        self.match_by_kind
    }
    pub fn supports_placeholder(&self) -> bool {
        matches!(self.assembly, Assembly::Placeholder { .. })
    }
    pub fn can_decompose(&self) -> bool {
        self.decompose.is_some()
    }
    /// Components this recipe expects from `element`; `None` when it cannot
    /// apply to such an element at all.
    pub fn expected_len(&self, element: &Element) -> Option<usize> {
        (self.length)(element)
    }

    /// True when decomposition produces a node rather than a list.
    pub(crate) fn decomposes_to_node(&self) -> bool {
        match &self.components {
            Components::Repeat { keyed, .. } => *keyed,
            Components::Fixed(cs) if cs.is_empty() => self.returns.kind() == crate::descriptor::Kind::Node,
            Components::Fixed(cs) => cs.iter().all(|c| c.name.is_some()),
            Components::Leaf | Components::Transparent(_) => false,
        }
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("label", &self.label)
            .field("returns", &self.returns)
            .field("source", &self.source)
            .field("priority", &self.priority)
            .field("placeholder", &self.supports_placeholder())
            .finish()
    }
}

pub(crate) fn short_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

// ------------------------------- Lengths ---------------------------------- //

fn positional_len(available: usize, required: usize, total: usize) -> usize {
    // trailing defaulted components may be left out
    if (required..=total).contains(&available) { available } else { total }
}

/// Length of a recipe whose components carry names: on a node, every
/// required component plus each defaulted one that is present.
pub(crate) fn named_length(components: &[Component], allow_unknown: bool) -> LengthFn {
    let names = components
        .iter()
        .map(|c| (c.name.clone().unwrap_or_default(), c.default.is_some()))
        .collect::<Vec<_>>();
    let total = components.len();
    let required = names.iter().filter(|(_, defaulted)| !defaulted).count();
    Arc::new(move |element: &Element| match element {
        Element::Node(node) if allow_unknown => Some(node.len()),
        Element::Node(node) => Some(
            names
                .iter()
                .filter(|(name, defaulted)| !defaulted || node.contains_key(name))
                .count(),
        ),
        Element::List(list) => Some(positional_len(list.len(), required, total)),
        _ => None,
    })
}

pub(crate) fn positional_length(components: &[Component]) -> LengthFn {
    let total = components.len();
    let required = components.iter().filter(|c| c.default.is_none()).count();
    Arc::new(move |element: &Element| match element {
        Element::Node(_) | Element::List(_) => Some(positional_len(element.arity(), required, total)),
        _ => None,
    })
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDERS
// ————————————————————————————————————————————————————————————————————————————

type Getter<T> = Arc<dyn Fn(&T) -> Object + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Object) -> anyhow::Result<()> + Send + Sync>;

struct Field<T> {
    component: Component,
    get: Getter<T>,
    set: Setter<T>,
}

pub struct StructuralBuilder<T> {
    label: String,
    fields: Vec<Field<T>>,
    allow_unknown: bool,
    priority: i32,
}

impl<T: Mapped + Default> StructuralBuilder<T> {
    pub fn field<F: Mapped>(
        self,
        name: impl Into<String>,
        get: impl Fn(&T) -> F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self {
        self.push(Component::named::<F>(name), get, set)
    }

    /// Like [`field`](Self::field), falling back to `default` when the
    /// element has no such key.
    pub fn field_or<F: Mapped>(
        self,
        name: impl Into<String>,
        get: impl Fn(&T) -> F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
        default: impl Fn() -> F + Send + Sync + 'static,
    ) -> Self {
        self.push(Component::named::<F>(name).or_else(default), get, set)
    }

    /// Tolerate node keys that no field declares.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn push<F: Mapped>(
        mut self,
        component: Component,
        get: impl Fn(&T) -> F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(Field {
            component,
            get: Arc::new(move |t: &T| Object::new(get(t))),
            set: Arc::new(move |t: &mut T, value: Object| -> anyhow::Result<()> {
                set(t, value.take::<F>()?);
                Ok(())
            }),
        });
        self
    }

    pub fn build(self) -> Recipe {
        let components = self.fields.iter().map(|f| f.component.clone()).collect::<Vec<_>>();
        let setters = self.fields.iter().map(|f| f.set.clone()).collect::<Vec<_>>();
        let getters = self
            .fields
            .iter()
            .map(|f| (f.component.name.clone(), f.component.ty.clone(), f.get.clone()))
            .collect::<Vec<_>>();

        let populate: PopulateFn = Arc::new(move |target: &mut dyn Any, args: Args| {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(|| anyhow!("placeholder is not a `{}`", short_name::<T>()))?;
            for (set, resolved) in setters.iter().zip(args.into_values()) {
                set(target, resolved.value)?;
            }
            Ok(())
        });
        let parts: PartsFn = Arc::new(move |value: &dyn Any| -> PartsResult {
            let Some(value) = value.downcast_ref::<T>() else {
                return Ok(None);
            };
            Ok(Some(
                getters
                    .iter()
                    .map(|(name, ty, get)| Part {
                        name: name.clone(),
                        ty: ty.clone(),
                        value: get(value),
                    })
                    .collect(),
            ))
        });

        Recipe {
            label: self.label,
            returns: T::descriptor(),
            source: RecipeSource::Structural,
            length: named_length(&components, self.allow_unknown),
            components: Components::Fixed(components),
            match_by_name: true,
            match_by_kind: true,
            priority: self.priority,
            assembly: Assembly::InPlace {
                empty: Arc::new(|| Box::new(T::default()) as Box<dyn Any>),
                populate,
                finish: Arc::new(finish::<T>),
            },
            decompose: Some(Decompose::Parts(parts)),
        }
    }
}

pub(crate) fn finish<T: Mapped>(value: Box<dyn Any>) -> anyhow::Result<Object> {
    value
        .downcast::<T>()
        .map(|value| Object::new(*value))
        .map_err(|_| anyhow!("assembled value is not a `{}`", short_name::<T>()))
}

/// Builder shared by initializer, fixed-shape and custom recipes.
pub struct ComponentsBuilder<T> {
    label: String,
    source: RecipeSource,
    components: Vec<Component>,
    priority: i32,
    match_by_kind: bool,
    decompose: Option<Arc<dyn Fn(&T) -> Vec<Part> + Send + Sync>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Mapped> ComponentsBuilder<T> {
    fn new(label: String, source: RecipeSource, priority: i32) -> Self {
        Self {
            label,
            source,
            components: Vec::new(),
            priority,
            match_by_kind: true,
            decompose: None,
            _marker: PhantomData,
        }
    }

    pub fn param<F: Mapped>(mut self, name: impl Into<String>) -> Self {
        self.components.push(Component::named::<F>(name));
        self
    }

    pub fn param_or<F: Mapped>(mut self, name: impl Into<String>, default: impl Fn() -> F + Send + Sync + 'static) -> Self {
        self.components.push(Component::named::<F>(name).or_else(default));
        self
    }

    pub fn positional<F: Mapped>(mut self) -> Self {
        self.components.push(Component::positional::<F>());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Skip per-component kind checks when matching.
    pub fn lenient_kinds(mut self) -> Self {
        self.match_by_kind = false;
        self
    }

    pub fn decompose(mut self, parts: impl Fn(&T) -> Vec<Part> + Send + Sync + 'static) -> Self {
        self.decompose = Some(Arc::new(parts));
        self
    }

    /// Finish with a build callback receiving every component, resolved.
    pub fn build(self, build: impl Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static) -> Recipe {
        let names_declared = !self.components.is_empty() && self.components.iter().all(|c| c.name.is_some());
        let length = if names_declared {
            named_length(&self.components, false)
        } else {
            positional_length(&self.components)
        };
        let decompose = self.decompose.map(|parts| {
            Decompose::Parts(Arc::new(move |value: &dyn Any| -> PartsResult {
                Ok(value.downcast_ref::<T>().map(|v| parts(v)))
            }))
        });
        Recipe {
            label: self.label,
            returns: T::descriptor(),
            source: self.source,
            components: Components::Fixed(self.components),
            length,
            match_by_name: names_declared,
            match_by_kind: self.match_by_kind,
            priority: self.priority,
            assembly: Assembly::Whole(Arc::new(move |args: Args| -> anyhow::Result<Object> {
                Ok(Object::new(build(&args)?))
            })),
            decompose,
        }
    }

    /// Finish as a leaf conversion of the element itself. `accepts` decides
    /// which elements the recipe applies to; declared params are ignored.
    pub fn leaf(
        self,
        accepts: impl Fn(&Element) -> bool + Send + Sync + 'static,
        read: impl Fn(&Element) -> anyhow::Result<T> + Send + Sync + 'static,
        write: impl Fn(&T) -> anyhow::Result<Element> + Send + Sync + 'static,
    ) -> Recipe {
        Recipe {
            label: self.label,
            returns: T::descriptor(),
            source: self.source,
            components: Components::Leaf,
            length: Arc::new(move |element: &Element| accepts(element).then(|| element.arity())),
            match_by_name: false,
            match_by_kind: self.match_by_kind,
            priority: self.priority,
            assembly: Assembly::Leaf(Arc::new(move |element: &Element| -> anyhow::Result<Object> {
                Ok(Object::new(read(element)?))
            })),
            decompose: Some(Decompose::Leaf(Arc::new(move |value: &dyn Any| match value.downcast_ref::<T>() {
                Some(value) => write(value).map(Some),
                None => Ok(None),
            }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{List, Node};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    impl Mapped for Endpoint {
        fn recipes() -> Vec<Recipe> {
            vec![
                Recipe::structural::<Self>()
                    .field("host", |e: &Self| e.host.clone(), |e, v| e.host = v)
                    .field_or("port", |e: &Self| e.port, |e, v| e.port = v, || 80)
                    .build(),
            ]
        }
    }

    fn node(entries: &[(&str, Element)]) -> Element {
        Element::Node(Node::from_entries(entries.iter().cloned()))
    }

    #[test]
    fn structural_length_counts_defaults_only_when_present() {
        let recipe = Endpoint::recipes().remove(0);
        let bare = node(&[("host", "a".into())]);
        let full = node(&[("host", "a".into()), ("port", 1u16.into())]);
        let extra = node(&[("host", "a".into()), ("bogus", 1.into())]);
        assert_eq!(recipe.expected_len(&bare), Some(1));
        assert_eq!(recipe.expected_len(&full), Some(2));
        assert_eq!(recipe.expected_len(&extra), Some(1));
        assert_ne!(recipe.expected_len(&extra), Some(extra.arity()));
        assert_eq!(recipe.expected_len(&Element::from("x")), None);
    }

    #[test]
    fn positional_length_allows_trailing_defaults() {
        let recipe = Recipe::initializer::<Endpoint>("Endpoint::new")
            .positional::<String>()
            .build(|args| Ok(Endpoint { host: args.get(0)?, port: 1 }));
        let list = Element::List(List::from_vec(vec!["h".into()]));
        assert_eq!(recipe.expected_len(&list), Some(1));
        assert!(!recipe.matches_by_name());
        assert_eq!(recipe.source(), RecipeSource::Initializer);
    }

    #[test]
    fn structural_recipe_decomposes_in_declaration_order() {
        let recipe = Endpoint::recipes().remove(0);
        let Some(Decompose::Parts(parts)) = &recipe.decompose else {
            panic!("structural recipes decompose into parts");
        };
        let value = Endpoint { host: "db".into(), port: 5432 };
        let taken = parts(&value).unwrap().unwrap();
        assert_eq!(taken.iter().map(|p| p.name().unwrap()).collect::<Vec<_>>(), vec!["host", "port"]);
        assert_eq!(taken[1].value().downcast_ref::<u16>(), Some(&5432));
        assert!(parts(&5u8).unwrap().is_none());
        assert!(recipe.decomposes_to_node());
    }

    #[test]
    fn args_lookup_by_name_and_position() {
        let args = Args::new(vec![
            Resolved { name: Some("x".into()), value: Object::new(1i32) },
            Resolved { name: Some("y".into()), value: Object::new(2i32) },
        ]);
        assert_eq!(args.get::<i32>(1).unwrap(), 2);
        assert_eq!(args.named::<i32>("x").unwrap(), 1);
        assert!(args.named::<i32>("z").is_err());
        assert_eq!(args.summary(), "x: i32, y: i32");
    }
}
