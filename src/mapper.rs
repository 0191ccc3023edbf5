//! Typed construction from element graphs and decomposition back into them.
//!
//! Both directions keep an identity map for the duration of one call:
//!
//! - construction keys constructed objects by (element identity, target type),
//!   so an element reached twice for the same type yields the same object and
//!   a cycle resolves to the placeholder registered before its components;
//! - decomposition keys emitted composites by (object identity, type) and
//!   registers each composite before its children, mirroring sharing and
//!   cycles of `Rc<RefCell<_>>` graphs.
use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::descriptor::{Mapped, TypeDescriptor};
use crate::element::{Element, List, Node};
use crate::error::{MapError, Path, Segment};
use crate::matcher::{self, Binding, Source};
use crate::object::Object;
use crate::options::Options;
use crate::recipe::{Args, Assembly, Components, Decompose, Part, Recipe, Resolved};

type Key = (usize, TypeId);

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct Mapper<'c> {
    catalog: &'c Catalog,
    options: Options,
}

struct Construction<'m, 'c> {
    mapper: &'m Mapper<'c>,
    resolved: HashMap<Key, Object>,
    in_progress: HashSet<Key>,
    path: Path,
    depth: usize,
}

struct Decomposition<'m, 'c> {
    mapper: &'m Mapper<'c>,
    memo: HashMap<Key, Element>,
    active: HashSet<Key>,
    /// Keeps decomposed values alive so their addresses stay unique for the
    /// whole call.
    retained: Vec<Object>,
    path: Path,
    depth: usize,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl<'c> Mapper<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self::with_options(catalog, Options::default())
    }

    pub fn with_options(catalog: &'c Catalog, options: Options) -> Self {
        Self { catalog, options }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn construct<T: Mapped>(&self, element: &Element) -> Result<T, MapError> {
        let object = self.construct_dyn(element, &T::descriptor())?;
        let found = object.type_name();
        object.take::<T>().map_err(|_| MapError::TypeMismatch {
            expected: type_name::<T>(),
            found,
        })
    }

    pub fn construct_dyn(&self, element: &Element, ty: &TypeDescriptor) -> Result<Object, MapError> {
        Construction {
            mapper: self,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
            path: Path::root(),
            depth: 0,
        }
        .resolve(element, ty)
    }

    pub fn decompose<T: Mapped>(&self, value: &T) -> Result<Element, MapError> {
        self.decompose_dyn(&Object::new(value.clone()), &T::descriptor())
    }

    pub fn decompose_dyn(&self, value: &Object, ty: &TypeDescriptor) -> Result<Element, MapError> {
        Decomposition {
            mapper: self,
            memo: HashMap::new(),
            active: HashSet::new(),
            retained: Vec::new(),
            path: Path::root(),
            depth: 0,
        }
        .decompose(value, ty)
    }
}

// ------------------------------ Construction ------------------------------ //

impl Construction<'_, '_> {
    fn resolve(&mut self, element: &Element, ty: &TypeDescriptor) -> Result<Object, MapError> {
        self.depth += 1;
        let result = self.resolve_at_depth(element, ty);
        self.depth -= 1;
        result
    }

    fn resolve_at_depth(&mut self, element: &Element, ty: &TypeDescriptor) -> Result<Object, MapError> {
        let limit = self.mapper.options.max_depth;
        if self.depth > limit {
            return Err(MapError::DepthExceeded {
                limit,
                path: self.path.clone(),
            });
        }

        let key = element.identity().map(|id| (id, ty.id()));
        if let Some(key) = key {
            if let Some(done) = self.resolved.get(&key) {
                trace!(ty = ty.name(), path = %self.path, "reusing constructed object");
                return Ok(done.clone());
            }
            if self.in_progress.contains(&key) {
                debug!(ty = ty.name(), path = %self.path, "cycle through a non-placeholder recipe");
                return Err(MapError::CyclicConstructionUnsupported {
                    ty: ty.name(),
                    path: self.path.clone(),
                });
            }
        }

        let recipes = self.mapper.catalog.recipes(ty);
        let selection = matcher::select(element, ty, &recipes, &self.mapper.options).map_err(|unresolved| {
            MapError::Unresolved {
                ty: unresolved.ty,
                shape: unresolved.shape,
                path: self.path.clone(),
            }
        })?;
        let recipe = selection.recipe;
        trace!(ty = ty.name(), recipe = recipe.label(), path = %self.path, "recipe selected");

        match &recipe.assembly {
            Assembly::Leaf(read) => {
                let object = read(element).map_err(|err| self.failure(recipe, String::new(), err))?;
                Ok(self.register(key, object))
            }
            Assembly::Placeholder { create, fill } => {
                let placeholder = create().map_err(|err| self.failure(recipe, String::new(), err))?;
                if let Some(key) = key {
                    self.resolved.insert(key, placeholder.clone());
                }
                let args = self.resolve_bindings(selection.bindings)?;
                let summary = args.summary();
                fill(&placeholder, args).map_err(|err| self.failure(recipe, summary, err))?;
                Ok(placeholder)
            }
            Assembly::Whole(build) => {
                let args = self.resolve_guarded(key, selection.bindings)?;
                let summary = args.summary();
                let object = build(args).map_err(|err| self.failure(recipe, summary, err))?;
                Ok(self.register(key, object))
            }
            Assembly::InPlace { empty, populate, finish } => {
                let args = self.resolve_guarded(key, selection.bindings)?;
                let summary = args.summary();
                let mut target = empty();
                populate(&mut *target, args).map_err(|err| self.failure(recipe, summary.clone(), err))?;
                let object = finish(target).map_err(|err| self.failure(recipe, summary, err))?;
                Ok(self.register(key, object))
            }
        }
    }

    /// Components of a value that does not exist yet: reaching the same key
    /// again before it is built is a cycle this recipe cannot express.
    fn resolve_guarded(&mut self, key: Option<Key>, bindings: Vec<Binding>) -> Result<Args, MapError> {
        if let Some(key) = key {
            self.in_progress.insert(key);
        }
        let args = self.resolve_bindings(bindings);
        if let Some(key) = key {
            self.in_progress.remove(&key);
        }
        args
    }

    fn resolve_bindings(&mut self, bindings: Vec<Binding>) -> Result<Args, MapError> {
        let mut values = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let value = match binding.source {
                Source::Default(default) => default(),
                Source::Element(element) => {
                    let entered = binding.segment.is_some();
                    if let Some(segment) = binding.segment {
                        self.path.push(segment);
                    }
                    let value = self.resolve(&element, &binding.ty);
                    if entered {
                        self.path.pop();
                    }
                    value?
                }
            };
            values.push(Resolved {
                name: binding.name,
                value,
            });
        }
        Ok(Args::new(values))
    }

    fn register(&mut self, key: Option<Key>, object: Object) -> Object {
        if let Some(key) = key {
            self.resolved.insert(key, object.clone());
        }
        object
    }

    fn failure(&self, recipe: &Recipe, components: String, err: anyhow::Error) -> MapError {
        MapError::RecipeBuildFailure {
            ty: recipe.returns().name(),
            recipe: recipe.label().to_owned(),
            components,
            path: self.path.clone(),
            source: err.into(),
        }
    }
}

// ----------------------------- Decomposition ------------------------------ //

impl Decomposition<'_, '_> {
    fn decompose(&mut self, value: &Object, ty: &TypeDescriptor) -> Result<Element, MapError> {
        self.depth += 1;
        let result = self.decompose_at_depth(value, ty);
        self.depth -= 1;
        result
    }

    fn decompose_at_depth(&mut self, value: &Object, ty: &TypeDescriptor) -> Result<Element, MapError> {
        let limit = self.mapper.options.max_depth;
        if self.depth > limit {
            return Err(MapError::DepthExceeded {
                limit,
                path: self.path.clone(),
            });
        }

        let key = value.identity().map(|id| (id, ty.id()));
        if let Some(key) = key {
            if let Some(done) = self.memo.get(&key) {
                trace!(ty = ty.name(), path = %self.path, "reusing decomposed element");
                return Ok(done.clone());
            }
            if !self.active.insert(key) {
                debug!(ty = ty.name(), path = %self.path, "value contains itself without a composite form");
                return Err(MapError::CyclicDecompositionUnsupported {
                    ty: ty.name(),
                    path: self.path.clone(),
                });
            }
            self.retained.push(value.clone());
        }

        let result = self.decompose_with_recipes(value, ty, key);
        if let Some(key) = key {
            self.active.remove(&key);
        }
        result
    }

    fn decompose_with_recipes(&mut self, value: &Object, ty: &TypeDescriptor, key: Option<Key>) -> Result<Element, MapError> {
        let recipes = self.mapper.catalog.recipes(ty);
        for recipe in recipes.iter() {
            match &recipe.decompose {
                None => continue,
                Some(Decompose::Leaf(write)) => {
                    let written = write(value.as_any()).map_err(|err| self.failure(recipe, err))?;
                    if let Some(element) = written {
                        if let Some(key) = key {
                            self.memo.insert(key, element.clone());
                        }
                        return Ok(element);
                    }
                }
                Some(Decompose::Parts(parts)) => {
                    let taken = parts(value.as_any()).map_err(|err| self.failure(recipe, err))?;
                    if let Some(parts) = taken {
                        return self.assemble(recipe, parts, ty, key);
                    }
                }
            }
        }
        Err(MapError::Undecomposable {
            ty: ty.name(),
            path: self.path.clone(),
        })
    }

    fn assemble(&mut self, recipe: &Recipe, parts: Vec<Part>, ty: &TypeDescriptor, key: Option<Key>) -> Result<Element, MapError> {
        if let Components::Transparent(_) = recipe.components() {
            let Some(part) = parts.into_iter().next() else {
                return Err(MapError::Undecomposable {
                    ty: ty.name(),
                    path: self.path.clone(),
                });
            };
            let element = self.decompose(&part.value, &part.ty)?;
            if let Some(key) = key {
                self.memo.insert(key, element.clone());
            }
            return Ok(element);
        }

        let container = if recipe.decomposes_to_node() {
            Element::Node(Node::new())
        } else {
            Element::List(List::new())
        };
        // registered before the parts, so a part referring back finds it
        if let Some(key) = key {
            self.memo.insert(key, container.clone());
        }
        for (index, part) in parts.into_iter().enumerate() {
            let segment = match (&container, part.name) {
                (Element::Node(_), Some(name)) => Segment::Key(name),
                (Element::Node(_), None) => Segment::Key(index.to_string()),
                _ => Segment::Index(index),
            };
            self.path.push(segment);
            let child = self.decompose(&part.value, &part.ty);
            let segment = self.path.pop();
            let child = child?;
            match (&container, segment) {
                (Element::Node(node), Some(Segment::Key(name))) => {
                    node.insert(name, child);
                }
                (Element::List(list), _) => list.push(child),
                _ => {}
            }
        }
        Ok(container)
    }

    fn failure(&self, recipe: &Recipe, err: anyhow::Error) -> MapError {
        MapError::RecipeBuildFailure {
            ty: recipe.returns().name(),
            recipe: recipe.label().to_owned(),
            components: String::new(),
            path: self.path.clone(),
            source: err.into(),
        }
    }
}
