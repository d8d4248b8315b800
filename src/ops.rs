//! # The operation algebra
//!
//! Every transformation of a document is an [`Op`]: an immutable value that
//! can be applied, simplified, inverted against a pre-state, fused with a
//! successor ([`Op::atomic_compose`]), and rebased over a concurrent
//! operation ([`Op::rebase`]). The variants split into two families:
//!
//! - **values** ([`ops::values`](crate::ops::values)): [`Op::NoOp`],
//!   [`Op::Set`], [`Op::Math`] — operations on the document as a whole.
//! - **sequences** ([`ops::sequences`](crate::ops::sequences)):
//!   [`Op::Patch`], [`Op::Move`], [`Op::Map`] — operations on strings and
//!   arrays. Splices and element-wise edits are the patch special cases
//!   built by [`Op::splice`], [`Op::apply_at`] and [`Op::apply_many`].
//!
//! ## The rebase harness
//!
//! Rebase is dispatched on the ordered pair of operation kinds. Each
//! unordered pair is implemented once, producing both legs of the diamond;
//! the converse ordering swaps the pair, which halves the table and keeps
//! the two directions structurally symmetric.
//!
//! Conflicts are values, not errors: a rebase or fusion that does not exist
//! is `None`. In *conflictless* mode ([`RebaseContext::conflictless`]) every
//! pair converges: the specific rules first (value ordering, insertion
//! tie-breaks, geometric splits), and where none exists, the fallback lifts
//! the winning side — by the canonical byte order of the encoded operations
//! — to a `Set` of its own post-state on the supplied pre-state document,
//! and dissolves the losing side. Both sites then agree on the winner's
//! outcome.
//!
//! ## Choices this module pins down
//!
//! - `Set` is defined to come "second" against `Math`: rebasing `Set` over
//!   `Math` leaves the `Set`, rebasing `Math` over `Set` dissolves it.
//! - The total order over operations is the byte order of their canonical
//!   encoded JSON; the total order over documents is
//!   [`Document`](crate::Document)'s `Ord`. Both are site-stable.

use crate::document::Document;
use crate::errors::TypeError;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

pub mod sequences;
pub mod values;

#[cfg(any(test, feature = "arbitrary"))]
pub mod test_util;

use sequences::{Hunk, Map, Move, Patch};
use values::{Math, MathOperator, Set};

/// An operation over a document.
///
/// Operations are immutable; every method returns fresh values. See the
/// [module docs](self) for the algebra.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Op {
    /// The identity operation.
    NoOp,
    Set(Set),
    Math(Math),
    Patch(Box<Patch>),
    Move(Move),
    Map(Map),
}

/// The kind tags the rebase and composition tables dispatch on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OpKind {
    NoOp,
    Set,
    Math,
    Patch,
    Move,
    Map,
}

impl OpKind {
    /// The operation family, as used in encoded and inspect forms.
    pub fn module(self) -> &'static str {
        match self {
            OpKind::NoOp | OpKind::Set | OpKind::Math => "values",
            OpKind::Patch | OpKind::Move | OpKind::Map => "sequences",
        }
    }

    /// The operation tag within its family.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::NoOp => "NOP",
            OpKind::Set => "SET",
            OpKind::Math => "MATH",
            OpKind::Patch => "PATCH",
            OpKind::Move => "MOVE",
            OpKind::Map => "MAP",
        }
    }
}

/// How a rebase is allowed to resolve disagreement.
///
/// The default is strict: semantic conflicts are reported as `None`. With
/// `conflictless` set, the deterministic tie-breaking rules kick in; pairs
/// whose resolution needs the shared pre-state (anything that falls through
/// to the `Set`-of-post-state policy) also require `document`. Callers that
/// need guaranteed convergence supply both.
#[derive(Clone, Copy, Default, Debug)]
pub struct RebaseContext<'a> {
    pub conflictless: bool,
    pub document: Option<&'a Document>,
}

impl<'a> RebaseContext<'a> {
    /// Strict mode: conflicts are conflicts.
    pub const STRICT: RebaseContext<'static> = RebaseContext {
        conflictless: false,
        document: None,
    };

    /// Conflictless mode with the shared pre-state, the full-convergence
    /// configuration.
    pub fn conflictless(document: &'a Document) -> Self {
        RebaseContext {
            conflictless: true,
            document: Some(document),
        }
    }
}

impl Op {
    // --- constructors -----------------------------------------------------

    /// Replace the whole document with `value`.
    pub fn set(value: impl Into<Document>) -> Op {
        Op::Set(Set::new(value))
    }

    /// A checked [`Math`] operation.
    pub fn math(operator: MathOperator, operand: impl Into<Document>) -> Result<Op, TypeError> {
        Math::new(operator, operand).map(Op::Math)
    }

    /// Remove `length` elements at `offset` and insert `value` in their
    /// place. This is the canonical single-`Set`-hunk patch.
    pub fn splice(offset: usize, length: usize, value: impl Into<Document>) -> Op {
        Op::Patch(Box::new(Patch::new([Hunk {
            offset,
            length,
            op: Op::set(value),
        }])))
    }

    /// Apply `op` to the single element at `index`. Normalizes to a patch
    /// with one unit-length hunk; the element operation is lifted through
    /// [`Op::Map`] so it sees the element rather than a one-element slice.
    pub fn apply_at(index: usize, op: Op) -> Op {
        Op::apply_many([(index, op)].into_iter().collect())
    }

    /// Apply each operation in `ops` to the element at its index.
    pub fn apply_many(ops: BTreeMap<usize, Op>) -> Op {
        if ops.is_empty() {
            return Op::NoOp;
        }
        let mut hunks = Vec::with_capacity(ops.len());
        let mut pos = 0;
        for (index, op) in ops {
            hunks.push(Hunk {
                offset: index - pos,
                length: 1,
                op: Op::map(op),
            });
            pos = index + 1;
        }
        Op::Patch(Box::new(Patch::new(hunks)))
    }

    /// Move `count` elements at `offset` so their leading element lands at
    /// `new_offset` (measured in the original indexing).
    pub fn move_range(offset: usize, count: usize, new_offset: usize) -> Op {
        Op::Move(Move {
            offset,
            count,
            new_offset,
        })
    }

    /// Broadcast `op` to every element of the sequence.
    pub fn map(op: Op) -> Op {
        Op::Map(Map { op: Box::new(op) })
    }

    /// A patch from explicit hunks, canonicalized.
    pub fn patch(hunks: impl IntoIterator<Item = Hunk>) -> Op {
        Op::Patch(Box::new(Patch::new(hunks)))
    }

    /// The dispatch tag of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Op::NoOp => OpKind::NoOp,
            Op::Set(_) => OpKind::Set,
            Op::Math(_) => OpKind::Math,
            Op::Patch(_) => OpKind::Patch,
            Op::Move(_) => OpKind::Move,
            Op::Map(_) => OpKind::Map,
        }
    }

    // --- the algebra --------------------------------------------------------

    /// Applies the operation to `doc`, producing the new document. Pure;
    /// fails only on ill-typed documents.
    pub fn apply(&self, doc: &Document) -> Result<Document, TypeError> {
        match self {
            Op::NoOp => Ok(doc.clone()),
            Op::Set(set) => set.apply(doc),
            Op::Math(math) => math.apply(doc),
            Op::Patch(patch) => patch.apply(doc),
            Op::Move(mv) => mv.apply(doc),
            Op::Map(map) => map.apply(doc),
        }
    }

    /// An observationally equivalent, canonically smaller operation.
    /// Degenerate operations collapse to [`Op::NoOp`].
    pub fn simplify(&self) -> Op {
        match self {
            Op::NoOp => Op::NoOp,
            Op::Set(set) => Op::Set(set.clone()),
            Op::Math(math) => math.simplify(),
            Op::Patch(patch) => patch.simplify(),
            Op::Move(mv) => mv.simplify(),
            Op::Map(map) => map.simplify(),
        }
    }

    /// The operation that undoes this one, given the document it was
    /// applied to.
    pub fn inverse(&self, doc: &Document) -> Result<Op, TypeError> {
        match self {
            Op::NoOp => Ok(Op::NoOp),
            Op::Set(set) => Ok(set.inverse(doc)),
            Op::Math(math) => math.inverse(doc),
            Op::Patch(patch) => patch.inverse(doc),
            Op::Move(mv) => Ok(mv.inverse()),
            Op::Map(map) => map.inverse(doc),
        }
    }

    /// Fuses `self` followed by `other` into one operation, where a single
    /// canonical operation can express the composite. `None` is not a
    /// failure — it only means the caller keeps the two as a list.
    pub fn atomic_compose(&self, other: &Op) -> Option<Op> {
        match (self, other) {
            (Op::NoOp, other) => Some(other.clone()),
            (op, Op::NoOp) => Some(op.clone()),
            // Set clobbers whatever came before it...
            (_, Op::Set(set)) => Some(Op::Set(set.clone())),
            // ...and absorbs whatever comes after it.
            (Op::Set(set), other) => other
                .apply(&set.value)
                .ok()
                .map(|value| Op::Set(Set { value })),
            (Op::Math(a), Op::Math(b)) => a.atomic_compose(b),
            (Op::Patch(a), Op::Patch(b)) => sequences::compose_patch_patch(a, b),
            (Op::Map(a), Op::Map(b)) => a
                .op
                .atomic_compose(&b.op)
                .map(|op| Op::map(op).simplify()),
            _ => None,
        }
    }

    /// "Self then other" as an operation list: the fused operation when one
    /// exists, otherwise both in order. This is the narrow interface the
    /// list combinator consumes.
    pub fn compose(&self, other: &Op) -> Vec<Op> {
        match self.atomic_compose(other) {
            Some(op) => vec![op],
            None => vec![self.clone(), other.clone()],
        }
    }

    /// Rebases `self` over the concurrently applied `other`: the returned
    /// operation applies *after* `other` and carries this operation's
    /// intent. `None` is a conflict; see [`RebaseContext`] for how
    /// conflictless mode eliminates those.
    pub fn rebase(&self, other: &Op, cx: RebaseContext<'_>) -> Option<Op> {
        rebase_pair(self, other, cx).0
    }
}

/// Both legs of the rebase diamond: `(a over b, b over a)`.
pub(crate) fn rebase_pair(a: &Op, b: &Op, cx: RebaseContext<'_>) -> (Option<Op>, Option<Op>) {
    let pair = dispatch(a, b, cx);
    if cx.conflictless && (pair.0.is_none() || pair.1.is_none()) {
        if let Some((fa, fb)) = conflictless_fallback(a, b, cx) {
            return (Some(fa), Some(fb));
        }
    }
    pair
}

fn dispatch(a: &Op, b: &Op, cx: RebaseContext<'_>) -> (Option<Op>, Option<Op>) {
    use Op::*;
    fn flip((x, y): (Option<Op>, Option<Op>)) -> (Option<Op>, Option<Op>) {
        (y, x)
    }
    match (a, b) {
        (NoOp, _) => (Some(Op::NoOp), Some(b.clone())),
        (_, NoOp) => (Some(a.clone()), Some(Op::NoOp)),
        (Set(x), Set(y)) => values::rebase_set_set(x, y, cx),
        // Set is defined to come second in the combined effect
        (Set(_), Math(_)) => (Some(a.clone()), Some(Op::NoOp)),
        (Math(_), Set(_)) => (Some(Op::NoOp), Some(b.clone())),
        (Math(x), Math(y)) => values::rebase_math_math(x, y, cx),
        (Set(x), Patch(_) | Move(_) | Map(_)) => values::rebase_set_sequence(x, cx),
        (Patch(_) | Move(_) | Map(_), Set(y)) => flip(values::rebase_set_sequence(y, cx)),
        (Patch(x), Patch(y)) => (
            sequences::transform_patch(x, y, cx),
            sequences::transform_patch(y, x, cx),
        ),
        (Patch(x), Move(y)) => (
            sequences::transform_patch_over_move(x, y),
            sequences::transform_move_over_patch(y, x),
        ),
        (Move(x), Patch(y)) => (
            sequences::transform_move_over_patch(x, y),
            sequences::transform_patch_over_move(y, x),
        ),
        (Move(x), Move(y)) => sequences::rebase_move_move(x, y),
        (Map(x), Map(y)) => sequences::rebase_map_map(x, y, cx),
        (Map(x), Patch(y)) => (
            sequences::transform_map_over_patch(x, y, cx),
            sequences::transform_patch_over_map(y, x, cx),
        ),
        (Patch(x), Map(y)) => (
            sequences::transform_patch_over_map(x, y, cx),
            sequences::transform_map_over_patch(y, x, cx),
        ),
        // a broadcast is indifferent to reordering
        (Map(_), Move(_)) | (Move(_), Map(_)) => (Some(a.clone()), Some(b.clone())),
        // a Math and a sequence operation can never target the same
        // well-typed document; any such pair is left to the fallback
        (Math(_), Patch(_) | Move(_) | Map(_)) | (Patch(_) | Move(_) | Map(_), Math(_)) => {
            (None, None)
        }
    }
}

/// The last-resort conflictless rule: order the two operations by the
/// canonical byte order of their encodings; the winner lifts itself to a
/// `Set` of its own post-state on the shared pre-state, the loser dissolves.
/// Both sites converge on the winner's outcome.
fn conflictless_fallback(a: &Op, b: &Op, cx: RebaseContext<'_>) -> Option<(Op, Op)> {
    let doc = cx.document?;
    match canonical_order(a, b) {
        Ordering::Equal => Some((Op::NoOp, Op::NoOp)),
        Ordering::Less => {
            let post = b.apply(doc).ok()?;
            Some((Op::NoOp, Op::Set(Set { value: post })))
        }
        Ordering::Greater => {
            let post = a.apply(doc).ok()?;
            Some((Op::Set(Set { value: post }), Op::NoOp))
        }
    }
}

/// The site-stable total order over operations: byte order of the canonical
/// encoded form.
pub(crate) fn canonical_order(a: &Op, b: &Op) -> Ordering {
    crate::json::encode(a)
        .to_string()
        .cmp(&crate::json::encode(b).to_string())
}

/// The operation interface the object module and the list combinator
/// consume. [`Op`] implements it; an external operation family that
/// satisfies the same laws can be slotted in wherever the algebra takes a
/// sub-operation.
pub trait BaseOperation: Sized + Clone {
    fn apply(&self, doc: &Document) -> Result<Document, TypeError>;
    fn simplify(&self) -> Self;
    fn inverse(&self, doc: &Document) -> Result<Self, TypeError>;
    fn atomic_compose(&self, other: &Self) -> Option<Self>;
    /// "Self then other", falling back to a list when no fusion exists.
    fn compose(&self, other: &Self) -> Vec<Self> {
        match self.atomic_compose(other) {
            Some(op) => vec![op],
            None => vec![self.clone(), other.clone()],
        }
    }
    fn rebase(&self, other: &Self, cx: RebaseContext<'_>) -> Option<Self>;
}

impl BaseOperation for Op {
    fn apply(&self, doc: &Document) -> Result<Document, TypeError> {
        Op::apply(self, doc)
    }
    fn simplify(&self) -> Self {
        Op::simplify(self)
    }
    fn inverse(&self, doc: &Document) -> Result<Self, TypeError> {
        Op::inverse(self, doc)
    }
    fn atomic_compose(&self, other: &Self) -> Option<Self> {
        Op::atomic_compose(self, other)
    }
    fn rebase(&self, other: &Self, cx: RebaseContext<'_>) -> Option<Self> {
        Op::rebase(self, other, cx)
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::NoOp => write!(f, "NOP"),
            Op::Set(set) => set.fmt(f),
            Op::Math(math) => math.fmt(f),
            Op::Patch(patch) => write!(f, "PATCH{patch:?}"),
            Op::Move(mv) => mv.fmt(f),
            Op::Map(map) => map.fmt(f),
        }
    }
}

/// The short, stable inspect form; diagnostic only, never parsed.
///
/// Examples: `<values.SET 2>`, `<values.MATH add:1>`,
/// `<sequences.PATCH +0x1 "4">`, `<sequences.MOVE @0x2 => @5>`.
impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::NoOp => write!(f, "<values.NOP>"),
            Op::Set(set) => write!(f, "<values.SET {:?}>", set.value),
            Op::Math(math) => write!(
                f,
                "<values.MATH {}:{:?}>",
                math.operator.tag(),
                math.operand
            ),
            Op::Patch(patch) => {
                write!(f, "<sequences.PATCH")?;
                let mut pos = 0;
                for hunk in patch.hunks() {
                    let start = pos + hunk.offset;
                    pos = start + hunk.length;
                    match &hunk.op {
                        Op::Set(set) => {
                            write!(f, " +{}x{} {:?}", start, hunk.length, set.value)?
                        }
                        op => write!(f, " +{}x{} {}", start, hunk.length, op)?,
                    }
                }
                write!(f, ">")
            }
            Op::Move(mv) => write!(
                f,
                "<sequences.MOVE @{}x{} => @{}>",
                mv.offset, mv.count, mv.new_offset
            ),
            Op::Map(map) => write!(f, "<sequences.MAP {}>", map.op),
        }
    }
}

#[cfg(test)]
mod laws {
    //! The universal laws, checked over generated well-typed pairs.

    use super::test_util::{ComposablePair, ConcurrentPair, DocumentedOp};
    use super::*;
    use quickcheck::TestResult;

    #[quickcheck]
    fn noop_is_the_identity(t: DocumentedOp) -> bool {
        let DocumentedOp { doc, op } = t;
        Op::NoOp.apply(&doc).unwrap() == doc
            && op.atomic_compose(&Op::NoOp) == Some(op.clone())
            && Op::NoOp.atomic_compose(&op) == Some(op.clone())
            && op.rebase(&Op::NoOp, RebaseContext::STRICT) == Some(op)
    }

    #[quickcheck]
    fn inverse_undoes(t: DocumentedOp) -> TestResult {
        let DocumentedOp { doc, op } = t;
        let Ok(applied) = op.apply(&doc) else {
            return TestResult::discard();
        };
        let inverse = op.inverse(&doc).expect("applicable ops are invertible");
        TestResult::from_bool(inverse.apply(&applied).unwrap() == doc)
    }

    #[quickcheck]
    fn simplify_preserves_semantics(t: DocumentedOp) -> TestResult {
        let DocumentedOp { doc, op } = t;
        let Ok(applied) = op.apply(&doc) else {
            return TestResult::discard();
        };
        TestResult::from_bool(op.simplify().apply(&doc).unwrap() == applied)
    }

    #[quickcheck]
    fn encoding_round_trips(t: DocumentedOp) -> bool {
        let encoded = crate::json::encode(&t.op);
        crate::json::decode(&encoded) == Ok(t.op)
    }

    #[quickcheck]
    fn fused_composition_agrees_with_sequencing(t: ComposablePair) -> TestResult {
        let ComposablePair { doc, first, second } = t;
        let Some(fused) = first.atomic_compose(&second) else {
            return TestResult::discard();
        };
        let sequenced = second.apply(&first.apply(&doc).unwrap()).unwrap();
        TestResult::from_bool(fused.apply(&doc).unwrap() == sequenced)
    }

    #[quickcheck]
    fn strict_rebase_closes_the_diamond(t: ConcurrentPair) -> TestResult {
        let ConcurrentPair { doc, a, b } = t;
        let (Some(a2), Some(b2)) = rebase_pair(&a, &b, RebaseContext::STRICT) else {
            return TestResult::discard();
        };
        let left = b2.apply(&a.apply(&doc).unwrap()).unwrap();
        let right = a2.apply(&b.apply(&doc).unwrap()).unwrap();
        TestResult::from_bool(left == right)
    }

    #[quickcheck]
    fn conflictless_rebase_always_converges(t: ConcurrentPair) -> bool {
        let ConcurrentPair { doc, a, b } = t;
        let cx = RebaseContext::conflictless(&doc);
        let (a2, b2) = rebase_pair(&a, &b, cx);
        let (a2, b2) = (
            a2.expect("conflictless rebase is total"),
            b2.expect("conflictless rebase is total"),
        );
        let left = b2.apply(&a.apply(&doc).unwrap()).unwrap();
        let right = a2.apply(&b.apply(&doc).unwrap()).unwrap();
        left == right
    }

    #[quickcheck]
    fn compose_list_has_at_most_two_entries(t: ComposablePair) -> bool {
        let n = t.first.compose(&t.second).len();
        n == 1 || n == 2
    }

    #[test]
    fn inspect_forms_are_stable() {
        assert_eq!(Op::splice(0, 1, "4").to_string(), r#"<sequences.PATCH +0x1 "4">"#);
        assert_eq!(Op::move_range(0, 2, 5).to_string(), "<sequences.MOVE @0x2 => @5>");
        assert_eq!(
            Op::math(MathOperator::Add, 1).unwrap().to_string(),
            "<values.MATH add:1>"
        );
        assert_eq!(Op::set(2).to_string(), "<values.SET 2>");
        assert_eq!(Op::NoOp.to_string(), "<values.NOP>");
        assert_eq!(
            Op::map(Op::set(1)).to_string(),
            "<sequences.MAP <values.SET 1>>"
        );
    }
}
