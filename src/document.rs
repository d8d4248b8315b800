//! The document value model.
//!
//! A [`Document`] is the value an operation transforms: an atomic scalar
//! (null, boolean, number), a linear sequence (string or array), or an
//! object. Objects are carried through untouched — the object-level
//! operation module lives outside this crate and only hands us sub-documents.
//!
//! Two cross-cutting concerns live here because every operation family needs
//! them:
//!
//! - the **total order** over documents ([`Ord`] on `Document`), used by the
//!   conflictless tie-breaking rules. It must be total, deterministic, and
//!   stable across sites, so it is defined structurally: by type rank first
//!   (`MISSING < null < bool < number < string < array < object`), then
//!   within the type.
//! - the **sequence primitives** (slice, splice, concat) shared by the
//!   sequence algebra, with strings handled as sequences of Unicode code
//!   points throughout.

use crate::errors::TypeError;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A document value.
///
/// Strings are operated on as sequences of Unicode code points; all offsets
/// and lengths in sequence operations count code points, not bytes.
///
/// Numbers keep their integer/float representation, but compare and test
/// equal *numerically*: `Document::Int(1) == Document::Float(1.0)`. Floats
/// order by [`f64::total_cmp`], which keeps equality a true equivalence
/// (`NaN == NaN`), so the total order stays total.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Document {
    /// The sentinel the object module uses for "key absent". The core never
    /// interprets it; it only passes it through (and refuses to transform
    /// it with anything but `NoOp` and `Set`).
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Document>),
    Object(BTreeMap<String, Document>),
}

impl Document {
    /// When ordering documents of different types, we order them according
    /// to this rank.
    const fn type_rank(&self) -> usize {
        // MISSING < null < bool < number < string < array < object
        match self {
            Document::Missing => 0,
            Document::Null => 1,
            Document::Bool(_) => 2,
            Document::Int(_) | Document::Float(_) => 3,
            Document::String(_) => 4,
            Document::Array(_) => 5,
            Document::Object(_) => 6,
        }
    }

    /// A short name for the document's type, for diagnostics and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Document::Missing => "missing",
            Document::Null => "null",
            Document::Bool(_) => "boolean",
            Document::Int(_) => "integer",
            Document::Float(_) => "float",
            Document::String(_) => "string",
            Document::Array(_) => "array",
            Document::Object(_) => "object",
        }
    }

    /// Whether this document is a linear sequence (string or array).
    pub fn is_sequence(&self) -> bool {
        matches!(self, Document::String(_) | Document::Array(_))
    }

    /// The element count of a sequence document, in code points for strings.
    pub fn sequence_len(&self) -> Option<usize> {
        match self {
            Document::String(s) => Some(s.chars().count()),
            Document::Array(a) => Some(a.len()),
            _ => None,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Missing => write!(f, "~missing~"),
            Document::Null => write!(f, "null"),
            Document::Bool(b) => b.fmt(f),
            Document::Int(n) => n.fmt(f),
            // {:?} prints at least one decimal, so integers and floats stay
            // distinguishable in test output.
            Document::Float(x) => write!(f, "{x:?}"),
            Document::String(s) => s.fmt(f),
            Document::Array(items) => f.debug_list().entries(items).finish(),
            Document::Object(map) => f.debug_map().entries(map.iter()).finish(),
        }
    }
}

impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        use Document::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Array(a), Array(b)) => a.cmp(b),
            (Object(a), Object(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Document {}

macro_rules! impl_from {
    (
        $(
            $source:ty => $target:ident $(with $conv:ident)?
        ),* $(,)?
    ) => {
        $(
            impl From<$source> for Document {
                fn from(value: $source) -> Self {
                    Self::$target(impl_from!(value$(, $conv)?))
                }
            }
        )*
    };

    ($value:ident, $conv:ident) => {
        $value.$conv()
    };

    ($value:ident) => {
        $value
    };
}

impl_from!(
    bool            => Bool,
    i8              => Int with into,
    i16             => Int with into,
    i32             => Int with into,
    i64             => Int,
    u8              => Int with into,
    u16             => Int with into,
    u32             => Int with into,
    f32             => Float with into,
    f64             => Float,
    String          => String,
    &str            => String with to_string,
    Vec<Document>   => Array,
);

impl From<BTreeMap<String, Document>> for Document {
    fn from(value: BTreeMap<String, Document>) -> Self {
        Self::Object(value)
    }
}

impl From<()> for Document {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

/// A sequence document unpacked into indexable elements.
///
/// Sequence operations never care whether they are editing a string or an
/// array, only that the elements line up; this is the one place the two
/// kinds meet. Strings unpack to code points.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Seq {
    Text(Vec<char>),
    Items(Vec<Document>),
}

impl Seq {
    /// Unpacks `doc`, or reports what `op` was misapplied to.
    pub(crate) fn unpack(doc: &Document, op: &'static str) -> Result<Seq, TypeError> {
        match doc {
            Document::String(s) => Ok(Seq::Text(s.chars().collect())),
            Document::Array(items) => Ok(Seq::Items(items.clone())),
            other => Err(TypeError::WrongType {
                op,
                kind: other.type_name(),
            }),
        }
    }

    /// An empty sequence of the same kind as `self`.
    pub(crate) fn empty_like(&self) -> Seq {
        match self {
            Seq::Text(_) => Seq::Text(Vec::new()),
            Seq::Items(_) => Seq::Items(Vec::new()),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Seq::Text(t) => t.len(),
            Seq::Items(i) => i.len(),
        }
    }

    /// The sub-sequence covering `start..end`, as a document.
    pub(crate) fn slice(&self, start: usize, end: usize) -> Document {
        match self {
            Seq::Text(t) => Document::String(t[start..end].iter().collect()),
            Seq::Items(i) => Document::Array(i[start..end].to_vec()),
        }
    }

    /// The single element at `index`, as a document. For strings this is a
    /// one-code-point string, so element-wise sub-operations see the same
    /// kind of value regardless of container.
    pub(crate) fn element(&self, index: usize) -> Document {
        match self {
            Seq::Text(t) => Document::String(t[index].to_string()),
            Seq::Items(i) => i[index].clone(),
        }
    }

    /// Appends the unpacked form of `doc`, rejecting kind mismatches.
    pub(crate) fn push_doc(&mut self, doc: &Document) -> Result<(), TypeError> {
        match (self, doc) {
            (Seq::Text(t), Document::String(s)) => {
                t.extend(s.chars());
                Ok(())
            }
            (Seq::Items(i), Document::Array(items)) => {
                i.extend(items.iter().cloned());
                Ok(())
            }
            (me, other) => Err(TypeError::KindMismatch {
                expected: match me {
                    Seq::Text(_) => "string",
                    Seq::Items(_) => "array",
                },
                found: other.type_name(),
            }),
        }
    }

    /// Appends a sub-range of another sequence of the same kind.
    pub(crate) fn push_range(&mut self, from: &Seq, start: usize, end: usize) {
        match (self, from) {
            (Seq::Text(t), Seq::Text(s)) => t.extend_from_slice(&s[start..end]),
            (Seq::Items(t), Seq::Items(s)) => t.extend_from_slice(&s[start..end]),
            _ => unreachable!("sequence kinds diverged mid-edit"),
        }
    }

    /// Appends a single element produced by an element-wise sub-operation.
    /// For text, the element must itself be a string (of any length).
    pub(crate) fn push_element(&mut self, doc: Document) -> Result<(), TypeError> {
        match (self, doc) {
            (Seq::Text(t), Document::String(s)) => {
                t.extend(s.chars());
                Ok(())
            }
            (Seq::Items(i), doc) => {
                i.push(doc);
                Ok(())
            }
            (Seq::Text(_), other) => Err(TypeError::KindMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    pub(crate) fn pack(self) -> Document {
        match self {
            Seq::Text(t) => Document::String(t.into_iter().collect()),
            Seq::Items(i) => Document::Array(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(v: impl Into<Document>) -> Document {
        v.into()
    }

    #[test]
    fn total_order_ranks_types() {
        let ordered = [
            Document::Missing,
            Document::Null,
            doc(false),
            doc(true),
            doc(-3),
            doc(2.5),
            doc(7),
            doc(""),
            doc("a"),
            Document::Array(vec![]),
            Document::Object(BTreeMap::new()),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn numbers_compare_numerically_across_representations() {
        assert_eq!(doc(1), doc(1.0));
        assert!(doc(1) < doc(1.5));
        assert!(doc(2.5) < doc(3));
        // total_cmp keeps NaN well-ordered and equal to itself
        assert_eq!(doc(f64::NAN), doc(f64::NAN));
        assert!(doc(1e18) < doc(f64::NAN));
    }

    #[test]
    fn arrays_order_lexicographically() {
        let a = Document::Array(vec![doc(1), doc(2)]);
        let b = Document::Array(vec![doc(1), doc(3)]);
        let c = Document::Array(vec![doc(1), doc(2), doc(0)]);
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn strings_unpack_to_code_points() {
        let seq = Seq::unpack(&doc("héllo"), "test").unwrap();
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.slice(1, 3), doc("él"));
        assert_eq!(seq.element(1), doc("é"));
    }

    #[test]
    fn unpack_rejects_scalars() {
        assert!(matches!(
            Seq::unpack(&doc(4), "splice"),
            Err(TypeError::WrongType { op: "splice", kind: "integer" })
        ));
    }
}
