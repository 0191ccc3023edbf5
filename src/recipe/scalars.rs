//! Leaf recipes for host scalars and for [`Element`] itself.
use anyhow::{anyhow, bail};

use crate::descriptor::{Kind, Mapped, TypeDescriptor};
use crate::element::Element;
use crate::recipe::Recipe;

fn number_of(element: &Element) -> anyhow::Result<crate::element::Number> {
    element
        .as_number()
        .ok_or_else(|| anyhow!("expected a number, found {}", element.shape()))
}

fn is_integral(element: &Element) -> bool {
    element.as_number().is_some_and(|n| n.as_i128().is_some())
}

macro_rules! integers {
    ($($ty:ty => $wide:ty),+ $(,)?) => {$(
        impl Mapped for $ty {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::of::<Self>(Kind::Scalar)
            }

            fn recipes() -> Vec<Recipe> {
                vec![Recipe::scalar::<Self>(stringify!($ty)).leaf(
                    is_integral,
                    |element| {
                        let n = number_of(element)?
                            .as_i128()
                            .ok_or_else(|| anyhow!("expected an integer, found {}", element.shape()))?;
                        <$ty>::try_from(n).map_err(|_| anyhow!("{n} is out of range for {}", stringify!($ty)))
                    },
                    |v| Ok(Element::from(<$wide>::try_from(*v)?)),
                )]
            }
        }
    )+};
}

integers!(
    i8 => i8, i16 => i16, i32 => i32, i64 => i64, isize => i64,
    u8 => u8, u16 => u16, u32 => u32, u64 => u64, usize => u64,
);

impl Mapped for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("f64").leaf(
            Element::is_number,
            |element| Ok(number_of(element)?.as_f64()),
            |v| Ok(Element::from(*v)),
        )]
    }
}

impl Mapped for f32 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("f32").leaf(
            Element::is_number,
            |element| Ok(number_of(element)?.as_f64() as f32),
            |v| Ok(Element::from(*v)),
        )]
    }
}

impl Mapped for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("bool").leaf(
            Element::is_boolean,
            |element| {
                element
                    .as_bool()
                    .ok_or_else(|| anyhow!("expected a boolean, found {}", element.shape()))
            },
            |v| Ok(Element::from(*v)),
        )]
    }
}

impl Mapped for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("string").leaf(
            Element::is_string,
            |element| Ok(expect_str(element)?.to_owned()),
            |v| Ok(Element::from(v.as_str())),
        )]
    }
}

impl Mapped for char {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("char").leaf(
            |element| element.as_str().is_some_and(|s| s.chars().count() == 1),
            |element| {
                let s = expect_str(element)?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => bail!("expected a single character, found {s:?}"),
                }
            },
            |v| Ok(Element::from(*v)),
        )]
    }
}

impl Mapped for () {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Scalar).nullable()
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("unit").leaf(Element::is_null, |_| Ok(()), |_| Ok(Element::Null))]
    }
}

/// The dynamic element type: any element, taken as is. Composites keep their
/// identity both ways.
impl Mapped for Element {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>(Kind::Any)
    }

    fn recipes() -> Vec<Recipe> {
        vec![Recipe::scalar::<Self>("element").leaf(|_| true, |element| Ok(element.clone()), |v| Ok(v.clone()))]
    }

    fn identity(&self) -> Option<usize> {
        Element::identity(self)
    }
}

pub(crate) fn expect_str(element: &Element) -> anyhow::Result<&str> {
    element
        .as_str()
        .ok_or_else(|| anyhow!("expected a string, found {}", element.shape()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Number;
    use crate::recipe::{Assembly, Decompose};

    fn read<T: Mapped>(element: Element) -> anyhow::Result<T> {
        let recipe = T::recipes().remove(0);
        let Assembly::Leaf(read) = &recipe.assembly else {
            panic!("scalar recipes are leaves");
        };
        read(&element)?.take::<T>()
    }

    fn write<T: Mapped>(value: T) -> Element {
        let recipe = T::recipes().remove(0);
        let Some(Decompose::Leaf(write)) = &recipe.decompose else {
            panic!("scalar recipes write leaves");
        };
        write(&value).unwrap().unwrap()
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(read::<u8>(Element::from(200i64)).unwrap(), 200);
        let err = read::<u8>(Element::from(300i64)).unwrap_err();
        assert!(err.to_string().contains("out of range for u8"));
        assert_eq!(read::<i64>(Element::from(3.0f64)).unwrap(), 3);
        assert!(read::<i64>(Element::from(3.5f64)).is_err());
    }

    #[test]
    fn leaves_write_their_natural_width() {
        assert!(matches!(write(7u16), Element::Number(Number::U16(7))));
        assert!(matches!(write(7usize), Element::Number(Number::U64(7))));
        assert_eq!(write('x'), Element::from("x"));
        assert_eq!(write(()), Element::Null);
    }

    #[test]
    fn char_needs_exactly_one_character() {
        assert_eq!(read::<char>(Element::from("é")).unwrap(), 'é');
        assert!(read::<char>(Element::from("ab")).is_err());
        let recipe = char::recipes().remove(0);
        assert_eq!(recipe.expected_len(&Element::from("ab")), None);
    }

    #[test]
    fn element_recipe_keeps_identity() {
        let list = Element::from(vec![1, 2]);
        let back = read::<Element>(list.clone()).unwrap();
        assert!(back.same(&list));
        assert_eq!(Mapped::identity(&back), list.identity());
    }
}
