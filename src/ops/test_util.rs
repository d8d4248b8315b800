//! Implementation of the quickcheck::Arbitrary trait for documents and
//! operations.
//!
//! Operations are only meaningful against a document of the right shape, so
//! the generators here are document-directed: [`arbitrary_op_for`] builds an
//! operation that is valid for a given document, and the wrapper types
//! ([`DocumentedOp`], [`ConcurrentPair`], [`ComposablePair`]) package a
//! document together with operations generated against it. This keeps the
//! law suites exercising the algebra instead of discarding ill-typed pairs.
//!
//! Numeric operands are kept small and exact (integers, powers of two for
//! `mult`) so the arithmetic laws hold exactly instead of up to float
//! rounding. Element-wise operations on strings stick to one-code-point
//! replacements, matching the uniformity assumption the sequence geometry
//! is defined by.

use crate::document::Document;
use crate::ops::values::MathOperator;
use crate::ops::Op;
use quickcheck::{Arbitrary, Gen};

const ALPHABET: &[char] = &['a', 'b', 'c', 'x', 'y', 'z', '!', 'é'];

fn small_int(g: &mut Gen) -> i64 {
    *g.choose(&[-3, -2, -1, 0, 1, 2, 3, 5, 41]).unwrap()
}

fn short_string(g: &mut Gen) -> String {
    let len = usize::arbitrary(g) % 4;
    (0..len).map(|_| *g.choose(ALPHABET).unwrap()).collect()
}

fn scalar(g: &mut Gen) -> Document {
    match u8::arbitrary(g) % 5 {
        0 => Document::Null,
        1 => Document::Bool(bool::arbitrary(g)),
        2 => Document::Int(small_int(g)),
        3 => Document::Float(small_int(g) as f64 / 2.0),
        _ => Document::String(short_string(g)),
    }
}

impl Arbitrary for Document {
    fn arbitrary(g: &mut Gen) -> Self {
        match u8::arbitrary(g) % 8 {
            0 | 1 => Document::String(short_string(g)),
            2 | 3 => {
                // penalize nesting
                let mut inner = Gen::new(g.size() / 2);
                let len = usize::arbitrary(g) % 5;
                Document::Array((0..len).map(|_| scalar(&mut inner)).collect())
            }
            _ => scalar(g),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            Document::Int(n) => Box::new(n.shrink().map(Document::Int)),
            Document::String(s) => Box::new(s.shrink().map(Document::String)),
            Document::Array(items) => Box::new(items.shrink().map(Document::Array)),
            _ => Box::new(std::iter::empty()),
        }
    }
}

/// An operation that applies cleanly to `doc`.
pub fn arbitrary_op_for(doc: &Document, g: &mut Gen) -> Op {
    match doc {
        Document::Int(n) => {
            let n = *n;
            match u8::arbitrary(g) % 8 {
                0 => Op::NoOp,
                1 => Op::set(scalar(g)),
                2 => Op::math(MathOperator::Add, small_int(g)).unwrap(),
                3 => Op::math(MathOperator::Mult, *g.choose(&[1i64, 2, 4, -2]).unwrap()).unwrap(),
                4 if n >= 0 => {
                    // keep the document inside the rotation's residue range
                    let modulus = n + 1 + (u8::arbitrary(g) % 7) as i64;
                    let increment = (u8::arbitrary(g) % 9) as i64;
                    Op::math(
                        MathOperator::Rot,
                        vec![Document::Int(increment), Document::Int(modulus)],
                    )
                    .unwrap()
                }
                4 => Op::math(MathOperator::Not, ()).unwrap(),
                5 => Op::math(MathOperator::And, small_int(g)).unwrap(),
                6 => Op::math(MathOperator::Or, small_int(g)).unwrap(),
                _ => Op::math(MathOperator::Xor, small_int(g)).unwrap(),
            }
        }
        Document::Float(_) => match u8::arbitrary(g) % 4 {
            0 => Op::NoOp,
            1 => Op::set(scalar(g)),
            2 => Op::math(MathOperator::Add, small_int(g)).unwrap(),
            _ => Op::math(MathOperator::Mult, *g.choose(&[1i64, 2, 4, -2]).unwrap()).unwrap(),
        },
        Document::Bool(_) => match u8::arbitrary(g) % 6 {
            0 => Op::NoOp,
            1 => Op::set(scalar(g)),
            2 => Op::math(MathOperator::And, bool::arbitrary(g)).unwrap(),
            3 => Op::math(MathOperator::Or, bool::arbitrary(g)).unwrap(),
            4 => Op::math(MathOperator::Xor, bool::arbitrary(g)).unwrap(),
            _ => Op::math(MathOperator::Not, ()).unwrap(),
        },
        Document::String(s) => {
            let len = s.chars().count();
            match u8::arbitrary(g) % 6 {
                0 => Op::NoOp,
                1 => Op::set(Document::String(short_string(g))),
                2 => {
                    let offset = usize::arbitrary(g) % (len + 1);
                    let length = usize::arbitrary(g) % (len - offset + 1);
                    Op::splice(offset, length, short_string(g))
                }
                3 if len > 0 => arbitrary_move(len, g),
                4 if len > 0 => {
                    let index = usize::arbitrary(g) % len;
                    Op::apply_at(index, Op::set(g.choose(ALPHABET).unwrap().to_string()))
                }
                _ => Op::map(Op::set(g.choose(ALPHABET).unwrap().to_string())),
            }
        }
        Document::Array(items) => {
            let len = items.len();
            match u8::arbitrary(g) % 6 {
                0 => Op::NoOp,
                1 => {
                    let offset = usize::arbitrary(g) % (len + 1);
                    let length = usize::arbitrary(g) % (len - offset + 1);
                    let insert = usize::arbitrary(g) % 3;
                    let mut inner = Gen::new(g.size() / 2);
                    Op::splice(
                        offset,
                        length,
                        Document::Array((0..insert).map(|_| scalar(&mut inner)).collect()),
                    )
                }
                2 if len > 0 => arbitrary_move(len, g),
                3 if len > 0 => {
                    let index = usize::arbitrary(g) % len;
                    let mut inner = Gen::new(g.size() / 2);
                    Op::apply_at(index, arbitrary_op_for(&items[index], &mut inner))
                }
                4 => Op::map(Op::set(scalar(g))),
                _ => Op::set(scalar(g)),
            }
        }
        _ => {
            if bool::arbitrary(g) {
                Op::NoOp
            } else {
                Op::set(scalar(g))
            }
        }
    }
}

fn arbitrary_move(len: usize, g: &mut Gen) -> Op {
    let offset = usize::arbitrary(g) % len;
    let count = 1 + usize::arbitrary(g) % (len - offset);
    // land outside the lifted range
    let new_offset = if bool::arbitrary(g) {
        usize::arbitrary(g) % (offset + 1)
    } else {
        offset + count + usize::arbitrary(g) % (len - offset - count + 1)
    };
    Op::move_range(offset, count, new_offset)
}

/// A document together with an operation valid for it.
#[derive(Clone, Debug)]
pub struct DocumentedOp {
    pub doc: Document,
    pub op: Op,
}

impl Arbitrary for DocumentedOp {
    fn arbitrary(g: &mut Gen) -> Self {
        let doc = Document::arbitrary(g);
        let op = arbitrary_op_for(&doc, g);
        DocumentedOp { doc, op }
    }
}

/// Two operations generated against the same pre-state, as concurrent sites
/// would produce them.
#[derive(Clone, Debug)]
pub struct ConcurrentPair {
    pub doc: Document,
    pub a: Op,
    pub b: Op,
}

impl Arbitrary for ConcurrentPair {
    fn arbitrary(g: &mut Gen) -> Self {
        let doc = Document::arbitrary(g);
        let a = arbitrary_op_for(&doc, g);
        let b = arbitrary_op_for(&doc, g);
        ConcurrentPair { doc, a, b }
    }
}

/// Two operations in sequence: `second` is generated against `first`'s
/// output, so `first.compose(second)` is well-typed.
#[derive(Clone, Debug)]
pub struct ComposablePair {
    pub doc: Document,
    pub first: Op,
    pub second: Op,
}

impl Arbitrary for ComposablePair {
    fn arbitrary(g: &mut Gen) -> Self {
        let doc = Document::arbitrary(g);
        let first = arbitrary_op_for(&doc, g);
        let second = match first.apply(&doc) {
            Ok(mid) => arbitrary_op_for(&mid, g),
            Err(_) => Op::NoOp,
        };
        ComposablePair { doc, first, second }
    }
}
