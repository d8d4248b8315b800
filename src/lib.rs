//! # OTSON: An Operational-Transformation Core for JSON-like Documents
//!
//! This crate provides the operation algebra at the heart of a collaborative
//! editing system: immutable, serializable [`Op`] values that transform
//! JSON-like [`Document`]s, together with the three laws that make
//! concurrent editing work — application, composition, and rebase.
//!
//! The algebra covers two value classes:
//!
//! - **atomic scalars** (numbers, booleans): [`Op::Set`] and the commutative
//!   arithmetic of [`Op::Math`];
//! - **linear sequences** (strings and arrays): [`Op::splice`] for
//!   insert/delete/replace, [`Op::Move`] for reordering, [`Op::apply_at`]
//!   for editing single elements in place, and [`Op::Map`] for broadcasting
//!   an edit to every element. Sequence operations share one canonical
//!   form, the hunk-based [`Patch`](ops::sequences::Patch).
//!
//! Objects are carried through as opaque values; the object-level operation
//! module is a separate concern that plugs into the same
//! [`BaseOperation`](ops::BaseOperation) interface.
//!
//! ## Rebase and convergence
//!
//! When two sites edit the same document concurrently, each rebases the
//! other's operation before applying it:
//!
//! ```rust
//! use otson::{Op, RebaseContext};
//!
//! let doc = otson::Document::from("the fox");
//! let a = Op::splice(4, 0, "quick ");     // site A inserts
//! let b = Op::splice(0, 3, "a");          // site B rewrites "the"
//!
//! let cx = RebaseContext::conflictless(&doc);
//! let a2 = a.rebase(&b, cx).unwrap();
//! let b2 = b.rebase(&a, cx).unwrap();
//!
//! // both orders converge ("TP1"):
//! let left = b2.apply(&a.apply(&doc).unwrap()).unwrap();
//! let right = a2.apply(&b.apply(&doc).unwrap()).unwrap();
//! assert_eq!(left, right);
//! assert_eq!(left, "a quick fox".into());
//! ```
//!
//! Rebase has two modes. In **strict** mode ([`RebaseContext::STRICT`]),
//! semantically conflicting pairs — two different replacements of the same
//! range, say — return `None` and the caller escalates. In **conflictless**
//! mode every pair resolves deterministically: ties break along a
//! site-stable total order over values, and pairs with no finer rule fall
//! back to forcing the winning side's post-state. Two sites that rebase
//! with the same pre-state converge, unconditionally.
//!
//! ## Undo, composition, serialization
//!
//! - [`Op::inverse`] produces the operation that undoes another, given the
//!   pre-state: `op.inverse(&d)?.apply(&op.apply(&d)?)? == d`.
//! - [`Op::atomic_compose`] fuses two sequential operations into one when a
//!   single canonical operation can express both; [`Op::compose`] falls
//!   back to a two-entry list otherwise.
//! - [`json::encode`] / [`json::decode`] round-trip every operation through
//!   a self-describing JSON form; [`Op`]'s `Display` renders a short
//!   diagnostic shape like `<sequences.MOVE @0x2 => @5>`.
//!
//! ## Scope of this crate
//!
//! This is the core algebra only: pure functions over immutable values, no
//! I/O, no sessions, no transport. Everything is `Send + Sync` by
//! construction and safe to share across threads. Document history,
//! operation logs, and the object-level operation module are built on top.
//!
//! ## Features
//!
//! - `serde`: serde `Serialize`/`Deserialize` derives for [`Document`] and
//!   the operation types (the canonical codec in [`json`] is always
//!   available and does not depend on this).
//! - `arbitrary`: `quickcheck::Arbitrary` impls for documents and
//!   operations, useful for property-based testing downstream.

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

mod document;
pub mod errors;
pub mod json;
pub mod macros;
pub mod ops;

pub use document::Document;
pub use errors::{DecodeError, TypeError};
pub use ops::sequences::{Hunk, Move, Patch};
pub use ops::values::{Math, MathOperator, Set};
pub use ops::{BaseOperation, Op, OpKind, RebaseContext};
