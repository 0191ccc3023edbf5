//! Recipes for growable containers, fixed arrays, tuples and the wrapper types
//! (`Option`, `Box`, `Rc<RefCell<_>>`).
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::anyhow;
use indexmap::IndexMap;
use tracing::trace;

use crate::descriptor::{Kind, Mapped, TypeDescriptor};
use crate::element::Element;
use crate::object::Object;
use crate::recipe::{
    finish, short_name, Args, Assembly, BuildFn, Components, Decompose, Part, PartsFn, PartsResult, Recipe, RecipeSource,
    PRIORITY_DEFAULT,
};

// ------------------------------- Policy ---------------------------------- //

/// `Option::None` is tried before the transparent `Some` recipe.
const PRIORITY_NONE: i32 = 1;

// ————————————————————————————————————————————————————————————————————————————
// SEQUENCES & MAPPINGS
// ————————————————————————————————————————————————————————————————————————————

fn sequence_recipe<C, T>(label: &str, push: fn(&mut C, T), items: fn(&C) -> Vec<T>) -> Recipe
where
    C: Mapped + Default,
    T: Mapped,
{
    Recipe {
        label: label.to_owned(),
        returns: C::descriptor(),
        source: RecipeSource::Container,
        components: Components::Repeat { item: T::descriptor(), keyed: false },
        length: Arc::new(|element: &Element| element.as_list().map(|list| list.len())),
        match_by_name: false,
        match_by_kind: true,
        priority: PRIORITY_DEFAULT,
        assembly: Assembly::InPlace {
            empty: Arc::new(|| Box::new(C::default()) as Box<dyn Any>),
            populate: Arc::new(move |target: &mut dyn Any, args: Args| -> anyhow::Result<()> {
                let target = downcast_target::<C>(target)?;
                for resolved in args.into_values() {
                    push(target, resolved.value.take::<T>()?);
                }
                Ok(())
            }),
            finish: Arc::new(finish::<C>),
        },
        decompose: Some(Decompose::Parts(Arc::new(move |value: &dyn Any| -> PartsResult {
            Ok(value
                .downcast_ref::<C>()
                .map(|c| items(c).into_iter().map(Part::positional).collect()))
        }))),
    }
}

fn mapping_recipe<C, V>(label: &str, insert: fn(&mut C, String, V), entries: fn(&C) -> Vec<(String, V)>) -> Recipe
where
    C: Mapped + Default,
    V: Mapped,
{
    Recipe {
        label: label.to_owned(),
        returns: C::descriptor(),
        source: RecipeSource::Container,
        components: Components::Repeat { item: V::descriptor(), keyed: true },
        length: Arc::new(|element: &Element| element.as_node().map(|node| node.len())),
        match_by_name: false,
        match_by_kind: true,
        priority: PRIORITY_DEFAULT,
        assembly: Assembly::InPlace {
            empty: Arc::new(|| Box::new(C::default()) as Box<dyn Any>),
            populate: Arc::new(move |target: &mut dyn Any, args: Args| -> anyhow::Result<()> {
                let target = downcast_target::<C>(target)?;
                for resolved in args.into_values() {
                    let key = resolved.name.ok_or_else(|| anyhow!("map entry without a key"))?;
                    insert(target, key, resolved.value.take::<V>()?);
                }
                Ok(())
            }),
            finish: Arc::new(finish::<C>),
        },
        decompose: Some(Decompose::Parts(Arc::new(move |value: &dyn Any| -> PartsResult {
            Ok(value.downcast_ref::<C>().map(|c| {
                entries(c)
                    .into_iter()
                    .map(|(key, value)| Part::named(key, value))
                    .collect()
            }))
        }))),
    }
}

fn downcast_target<C: Any>(target: &mut dyn Any) -> anyhow::Result<&mut C> {
    target
        .downcast_mut::<C>()
        .ok_or_else(|| anyhow!("placeholder is not a `{}`", short_name::<C>()))
}

fn list_of<C: Mapped, T: Mapped>() -> TypeDescriptor {
    TypeDescriptor::of::<C>(Kind::List).with_params(vec![T::descriptor()])
}

fn map_of<C: Mapped, V: Mapped>() -> TypeDescriptor {
    TypeDescriptor::of::<C>(Kind::Node).with_params(vec![String::descriptor(), V::descriptor()])
}

impl<T: Mapped> Mapped for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        list_of::<Self, T>()
    }

    fn recipes() -> Vec<Recipe> {
        vec![sequence_recipe::<Self, T>("Vec", Vec::push, |v| v.clone())]
    }
}

impl<T: Mapped> Mapped for VecDeque<T> {
    fn descriptor() -> TypeDescriptor {
        list_of::<Self, T>()
    }

    fn recipes() -> Vec<Recipe> {
        vec![sequence_recipe::<Self, T>("VecDeque", VecDeque::push_back, |v| {
            v.iter().cloned().collect()
        })]
    }
}

impl<V: Mapped> Mapped for IndexMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        map_of::<Self, V>()
    }

    fn recipes() -> Vec<Recipe> {
        vec![mapping_recipe::<Self, V>(
            "IndexMap",
            |m, k, v| {
                m.insert(k, v);
            },
            |m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )]
    }
}

impl<V: Mapped> Mapped for BTreeMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        map_of::<Self, V>()
    }

    fn recipes() -> Vec<Recipe> {
        vec![mapping_recipe::<Self, V>(
            "BTreeMap",
            |m, k, v| {
                m.insert(k, v);
            },
            |m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )]
    }
}

/// Decomposes in the map's iteration order, which is unspecified.
impl<V: Mapped> Mapped for HashMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        map_of::<Self, V>()
    }

    fn recipes() -> Vec<Recipe> {
        vec![mapping_recipe::<Self, V>(
            "HashMap",
            |m, k, v| {
                m.insert(k, v);
            },
            |m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )]
    }
}

/// Fixed arrays exist only once every item is known: whole-built, never a
/// placeholder.
impl<T: Mapped, const N: usize> Mapped for [T; N] {
    fn descriptor() -> TypeDescriptor {
        list_of::<Self, T>()
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe {
            label: format!("[_; {N}]"),
            returns: Self::descriptor(),
            source: RecipeSource::Container,
            components: Components::Repeat { item: T::descriptor(), keyed: false },
            length: Arc::new(|element: &Element| element.as_list().map(|_| N)),
            match_by_name: false,
            match_by_kind: true,
            priority: PRIORITY_DEFAULT,
            assembly: Assembly::Whole(Arc::new(|args: Args| -> anyhow::Result<Object> {
                let items = args
                    .into_values()
                    .into_iter()
                    .map(|resolved| resolved.value.take::<T>())
                    .collect::<anyhow::Result<Vec<T>>>()?;
                let found = items.len();
                let array: [T; N] = items
                    .try_into()
                    .map_err(|_| anyhow!("expected {N} items, found {found}"))?;
                Ok(Object::new(array))
            })),
            decompose: Some(Decompose::Parts(Arc::new(|value: &dyn Any| -> PartsResult {
                Ok(value
                    .downcast_ref::<Self>()
                    .map(|array| array.iter().cloned().map(Part::positional).collect()))
            }))),
        }]
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TUPLES
// ————————————————————————————————————————————————————————————————————————————

macro_rules! tuples {
    ($( ($($name:ident : $idx:tt),+) ),+ $(,)?) => {$(
        impl<$($name: Mapped),+> Mapped for ($($name,)+) {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::of::<Self>(Kind::List).with_params(vec![$($name::descriptor()),+])
            }

            fn recipes() -> Vec<Recipe> {
                vec![Recipe::fixed_shape::<Self>("tuple")
                    $(.positional::<$name>())+
                    .decompose(|t| vec![$(Part::positional(t.$idx.clone())),+])
                    .build(|args| Ok(($(args.get::<$name>($idx)?,)+)))]
            }
        }
    )+};
}

tuples!(
    (A: 0, B: 1),
    (A: 0, B: 1, C: 2),
    (A: 0, B: 1, C: 2, D: 3),
    (A: 0, B: 1, C: 2, D: 3, E: 4),
    (A: 0, B: 1, C: 2, D: 3, E: 4, F: 5),
);

// ————————————————————————————————————————————————————————————————————————————
// WRAPPERS
// ————————————————————————————————————————————————————————————————————————————

pub(crate) fn transparent(label: &str, returns: TypeDescriptor, inner: TypeDescriptor, build: BuildFn, parts: PartsFn) -> Recipe {
    Recipe {
        label: label.to_owned(),
        returns,
        source: RecipeSource::Wrapper,
        components: Components::Transparent(inner),
        length: Arc::new(|element: &Element| Some(element.arity())),
        match_by_name: false,
        match_by_kind: true,
        priority: PRIORITY_DEFAULT,
        assembly: Assembly::Whole(build),
        decompose: Some(Decompose::Parts(parts)),
    }
}

pub(crate) fn single(args: Args) -> anyhow::Result<Object> {
    args.into_values()
        .pop()
        .map(|resolved| resolved.value)
        .ok_or_else(|| anyhow!("missing wrapped value"))
}

impl<T: Mapped> Mapped for Option<T> {
    fn descriptor() -> TypeDescriptor {
        let inner = T::descriptor();
        TypeDescriptor::of::<Self>(inner.kind()).nullable().with_params(vec![inner])
    }

    fn recipes() -> Vec<Recipe> {
        let mut none = Recipe::scalar::<Self>("none")
            .priority(PRIORITY_NONE)
            .leaf(Element::is_null, |_| Ok(None), |_| Ok(Element::Null));
        none.source = RecipeSource::Wrapper;
        none.decompose = Some(Decompose::Leaf(Arc::new(|value: &dyn Any| -> anyhow::Result<Option<Element>> {
            Ok(match value.downcast_ref::<Self>() {
                Some(None) => Some(Element::Null),
                _ => None,
            })
        })));

        let some = transparent(
            "some",
            Self::descriptor(),
            T::descriptor(),
            Arc::new(|args: Args| -> anyhow::Result<Object> { Ok(Object::new(Some(single(args)?.take::<T>()?))) }),
            Arc::new(|value: &dyn Any| -> PartsResult {
                Ok(match value.downcast_ref::<Self>() {
                    Some(Some(inner)) => Some(vec![Part::positional(inner.clone())]),
                    _ => None,
                })
            }),
        );
        vec![none, some]
    }

    fn identity(&self) -> Option<usize> {
        self.as_ref().and_then(Mapped::identity)
    }
}

impl<T: Mapped> Mapped for Box<T> {
    fn descriptor() -> TypeDescriptor {
        let inner = T::descriptor();
        TypeDescriptor::of::<Self>(inner.kind()).with_params(vec![inner])
    }

    fn recipes() -> Vec<Recipe> {
        vec![transparent(
            "box",
            Self::descriptor(),
            T::descriptor(),
            Arc::new(|args: Args| -> anyhow::Result<Object> { Ok(Object::new(Box::new(single(args)?.take::<T>()?))) }),
            Arc::new(|value: &dyn Any| -> PartsResult {
                Ok(value
                    .downcast_ref::<Self>()
                    .map(|boxed| vec![Part::positional((**boxed).clone())]))
            }),
        )]
    }
}

/// Shared, mutable values: the identity-bearing object type. Every recipe of
/// `T` is lifted; in-place recipes become placeholders, so a graph of
/// `Rc<RefCell<T>>` may refer back to values still under construction.
///
/// Lifting uses `T::recipes()` directly; recipes registered on a catalog for
/// `T` need their own registration for `Rc<RefCell<T>>`.
impl<T: Mapped> Mapped for Rc<RefCell<T>> {
    fn descriptor() -> TypeDescriptor {
        let inner = T::descriptor();
        TypeDescriptor::of::<Self>(inner.kind()).with_params(vec![inner])
    }

    fn recipes() -> Vec<Recipe> {
        T::recipes().into_iter().filter_map(shared::<T>).collect()
    }

    fn identity(&self) -> Option<usize> {
        Some(Rc::as_ptr(self) as *const () as usize)
    }
}

fn wrap_shared<T: Mapped>(object: Object) -> anyhow::Result<Object> {
    Ok(Object::new(Rc::new(RefCell::new(object.take::<T>()?))))
}

fn shared_cell<T: Mapped>(value: &dyn Any) -> Option<&Rc<RefCell<T>>> {
    value.downcast_ref::<Rc<RefCell<T>>>()
}

/// Lift a recipe of `T` to `Rc<RefCell<T>>`.
pub fn shared<T: Mapped>(recipe: Recipe) -> Option<Recipe> {
    let assembly = match recipe.assembly {
        Assembly::InPlace { empty, populate, .. } => Assembly::Placeholder {
            create: Arc::new(move || -> anyhow::Result<Object> {
                let value = empty()
                    .downcast::<T>()
                    .map_err(|_| anyhow!("empty value is not a `{}`", short_name::<T>()))?;
                Ok(Object::new(Rc::new(RefCell::new(*value))))
            }),
            fill: Arc::new(move |object: &Object, args: Args| -> anyhow::Result<()> {
                let cell = shared_cell::<T>(object.as_any())
                    .ok_or_else(|| anyhow!("placeholder is not a shared `{}`", short_name::<T>()))?;
                let mut value = cell.try_borrow_mut()?;
                populate(&mut *value, args)
            }),
        },
        Assembly::Whole(build) => Assembly::Whole(Arc::new(move |args: Args| wrap_shared::<T>(build(args)?))),
        Assembly::Leaf(read) => Assembly::Leaf(Arc::new(move |element: &Element| wrap_shared::<T>(read(element)?))),
        Assembly::Placeholder { .. } => {
            trace!(recipe = %recipe.label, "placeholder recipes are not lifted twice");
            return None;
        }
    };
    let decompose = recipe.decompose.map(|decompose| match decompose {
        Decompose::Parts(parts) => Decompose::Parts(Arc::new(move |value: &dyn Any| -> PartsResult {
            match shared_cell::<T>(value) {
                Some(cell) => parts(&*cell.try_borrow()?),
                None => Ok(None),
            }
        })),
        Decompose::Leaf(write) => Decompose::Leaf(Arc::new(move |value: &dyn Any| -> anyhow::Result<Option<Element>> {
            match shared_cell::<T>(value) {
                Some(cell) => write(&*cell.try_borrow()?),
                None => Ok(None),
            }
        })),
    });
    Some(Recipe {
        label: format!("shared {}", recipe.label),
        returns: <Rc<RefCell<T>>>::descriptor(),
        source: recipe.source,
        components: recipe.components,
        length: recipe.length,
        match_by_name: recipe.match_by_name,
        match_by_kind: recipe.match_by_kind,
        priority: recipe.priority,
        assembly,
        decompose,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{List, Node};
    use crate::recipe::{Args, Resolved};

    #[test]
    fn sequence_recipe_populates_in_order() {
        let recipe = <Vec<u8>>::recipes().remove(0);
        let Assembly::InPlace { empty, populate, finish } = &recipe.assembly else {
            panic!("vectors are populated in place");
        };
        let mut target = empty();
        let args = Args::new(vec![
            Resolved { name: None, value: Object::new(1u8) },
            Resolved { name: None, value: Object::new(2u8) },
        ]);
        populate(&mut *target, args).unwrap();
        let built = finish(target).unwrap().take::<Vec<u8>>().unwrap();
        assert_eq!(built, vec![1, 2]);
    }

    #[test]
    fn array_length_is_fixed() {
        let recipe = <[u8; 3]>::recipes().remove(0);
        let list = Element::List(List::from_vec(vec![1u8.into(), 2u8.into()]));
        assert_eq!(recipe.expected_len(&list), Some(3));
        assert!(!recipe.supports_placeholder());
    }

    #[test]
    fn option_none_declines_some_values() {
        let recipes = <Option<u8>>::recipes();
        assert_eq!(recipes[0].label(), "none");
        let Some(Decompose::Leaf(write)) = &recipes[0].decompose else {
            panic!("none writes a leaf");
        };
        assert!(write(&Some(1u8)).unwrap().is_none());
        assert_eq!(write(&None::<u8>).unwrap(), Some(Element::Null));
    }

    #[derive(Clone, Debug, Default)]
    struct Cell {
        label: String,
    }

    impl Mapped for Cell {
        fn recipes() -> Vec<Recipe> {
            vec![
                Recipe::structural::<Self>()
                    .field("label", |c: &Self| c.label.clone(), |c, v| c.label = v)
                    .build(),
            ]
        }
    }

    #[test]
    fn shared_lifts_in_place_recipes_to_placeholders() {
        let recipe = <Rc<RefCell<Cell>>>::recipes().remove(0);
        assert!(recipe.supports_placeholder());
        assert_eq!(recipe.returns(), &<Rc<RefCell<Cell>>>::descriptor());
        let Assembly::Placeholder { create, fill } = &recipe.assembly else {
            unreachable!();
        };
        let placeholder = create().unwrap();
        let args = Args::new(vec![Resolved { name: Some("label".into()), value: Object::new(String::from("x")) }]);
        fill(&placeholder, args).unwrap();
        let cell = placeholder.take::<Rc<RefCell<Cell>>>().unwrap();
        assert_eq!(cell.borrow().label, "x");
    }

    #[test]
    fn map_kinds_follow_their_shape() {
        let node = Element::Node(Node::new());
        assert!(<BTreeMap<String, u8>>::descriptor().admits(&node));
        assert!(<(u8, String)>::descriptor().admits(&Element::List(List::new())));
        assert_eq!(<Box<Vec<u8>>>::descriptor().kind(), Kind::List);
    }
}
