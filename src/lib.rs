//! Format-agnostic configuration data layer.
//!
//! Host data flows through three representations:
//!
//! - [`Native`]: shared, possibly cyclic maps/sequences/arrays as a format
//!   adapter produces them;
//! - [`Element`]: the canonical value graph, reached through
//!   [`to_element`] / [`from_element`];
//! - typed values, built with [`construct`] and taken apart with
//!   [`decompose`] by recipes registered per type through [`Mapped`].
//!
//! Every traversal tracks composites by identity, so shared substructure stays
//! shared and cycles terminate.
pub mod catalog;
pub mod descriptor;
pub mod element;
pub mod error;
pub mod mapper;
pub mod matcher;
pub mod native;
pub mod object;
pub mod options;
pub mod recipe;
pub mod transform;

pub use catalog::Catalog;
pub use descriptor::{Kind, Mapped, TypeDescriptor};
pub use element::{Element, ElementKind, List, Node, Number};
pub use error::{ConversionError, ElementError, MapError, Path, Segment};
pub use mapper::Mapper;
pub use native::{Native, NativeMap, NativeSeq, Opaque};
pub use object::Object;
pub use options::Options;
pub use recipe::{Args, Part, Recipe, RecipeSource};
pub use transform::{from_element, from_element_with, to_element, to_element_with, transform};

/// Build a `T` from `element` with the global catalog and default options.
pub fn construct<T: Mapped>(element: &Element) -> Result<T, MapError> {
    Mapper::new(Catalog::global()).construct(element)
}

/// Take `value` apart into an element graph with the global catalog and
/// default options.
pub fn decompose<T: Mapped>(value: &T) -> Result<Element, MapError> {
    Mapper::new(Catalog::global()).decompose(value)
}
