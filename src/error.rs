//! Error taxonomy shared by the transformation and mapping layers.
use std::fmt;
use thiserror::Error;

/// Error type produced by user supplied recipe callbacks once it has been
/// wrapped for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ————————————————————————————————————————————————————————————————————————————
// PATHS
// ————————————————————————————————————————————————————————————————————————————

/// One step from a composite into one of its children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a value inside an element graph, rendered as `$.servers[0].host`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }
    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }
    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
    /// Copy of this path extended by one segment.
    pub fn child(&self, segment: Segment) -> Self {
        let mut out = self.clone();
        out.push(segment);
        out
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "[{i}]"),
            Segment::Key(k) if is_plain_key(k) => write!(f, ".{k}"),
            Segment::Key(k) => write!(f, "[{k:?}]"),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ————————————————————————————————————————————————————————————————————————————
// ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElementError {
    #[error("unsupported scalar kind `{type_name}`")]
    UnsupportedScalarKind { type_name: String },
}

/// A leaf conversion failed while transforming a graph.
#[derive(Debug, Error)]
#[error("cannot convert {value} at {path}")]
pub struct ConversionError {
    pub path: Path,
    /// Rendering of the offending leaf.
    pub value: String,
    #[source]
    pub source: ElementError,
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("no recipe for `{ty}` matches {shape} at {path}")]
    Unresolved {
        ty: &'static str,
        shape: String,
        path: Path,
    },
    #[error("`{ty}` at {path} refers back to itself through a recipe that cannot build a placeholder")]
    CyclicConstructionUnsupported { ty: &'static str, path: Path },
    #[error("`{ty}` at {path} contains itself and has no composite form to refer back to")]
    CyclicDecompositionUnsupported { ty: &'static str, path: Path },
    #[error("recipe `{recipe}` for `{ty}` failed at {path} (components: [{components}])")]
    RecipeBuildFailure {
        ty: &'static str,
        recipe: String,
        components: String,
        path: Path,
        source: BoxError,
    },
    #[error("no recipe can decompose a value of `{ty}` at {path}")]
    Undecomposable { ty: &'static str, path: Path },
    #[error("nesting deeper than {limit} levels at {path}")]
    DepthExceeded { limit: usize, path: Path },
    #[error("expected a value of `{expected}`, recipe produced `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl MapError {
    /// Location the error was raised at, when it has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            MapError::Unresolved { path, .. }
            | MapError::CyclicConstructionUnsupported { path, .. }
            | MapError::CyclicDecompositionUnsupported { path, .. }
            | MapError::RecipeBuildFailure { path, .. }
            | MapError::Undecomposable { path, .. }
            | MapError::DepthExceeded { path, .. } => Some(path),
            MapError::TypeMismatch { .. } => None,
        }
    }
}
