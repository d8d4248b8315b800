//! The atomic-value algebra: `Set` and `Math`.
//!
//! These operations treat the document as a single opaque or numeric value.
//! `Set` replaces the whole document; `Math` applies a commutative
//! arithmetic or bitwise function to a number or boolean. `NoOp` lives on
//! the [`Op`](crate::Op) enum itself since every family shares it.
//!
//! The rebase rules here are the simple end of the conflictless discipline:
//! equal `Set`s cancel, differing `Set`s are ordered by the document total
//! order, and `Set` always comes "second" relative to `Math` in the combined
//! effect (see the module-level notes in [`crate::ops`]).

use crate::document::Document;
use crate::errors::TypeError;
use crate::ops::{Op, RebaseContext};
use std::fmt;

/// Replaces the entire document with a new value.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Set {
    /// The value the document becomes.
    pub value: Document,
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SET({:?})", self.value)
    }
}

impl Set {
    pub fn new(value: impl Into<Document>) -> Self {
        Set {
            value: value.into(),
        }
    }

    pub(crate) fn apply(&self, _doc: &Document) -> Result<Document, TypeError> {
        Ok(self.value.clone())
    }

    pub(crate) fn inverse(&self, doc: &Document) -> Op {
        Op::Set(Set {
            value: doc.clone(),
        })
    }
}

/// The commutative arithmetic and bitwise operators of [`Math`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MathOperator {
    /// Numeric addition.
    Add,
    /// Numeric multiplication.
    Mult,
    /// `(d + increment) mod modulus` over non-negative integers; the operand
    /// is the pair `[increment, modulus]`.
    Rot,
    /// Bitwise AND over integers, logical AND over booleans.
    And,
    /// Bitwise OR over integers, logical OR over booleans.
    Or,
    /// Bitwise XOR over integers, logical XOR over booleans.
    Xor,
    /// Bitwise/logical negation; the operand is ignored.
    Not,
}

impl MathOperator {
    pub fn tag(self) -> &'static str {
        match self {
            MathOperator::Add => "add",
            MathOperator::Mult => "mult",
            MathOperator::Rot => "rot",
            MathOperator::And => "and",
            MathOperator::Or => "or",
            MathOperator::Xor => "xor",
            MathOperator::Not => "not",
        }
    }

    pub fn from_tag(tag: &str) -> Option<MathOperator> {
        Some(match tag {
            "add" => MathOperator::Add,
            "mult" => MathOperator::Mult,
            "rot" => MathOperator::Rot,
            "and" => MathOperator::And,
            "or" => MathOperator::Or,
            "xor" => MathOperator::Xor,
            "not" => MathOperator::Not,
            _ => return None,
        })
    }
}

/// Applies a commutative arithmetic/bitwise function to the document.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Math {
    pub operator: MathOperator,
    pub operand: Document,
}

impl fmt::Debug for Math {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MATH({}:{:?})", self.operator.tag(), self.operand)
    }
}

impl Math {
    /// Builds a `Math` operation, validating the operand against the
    /// operator. Malformed operands (a `rot` pair that is not two
    /// non-negative integers with a positive modulus, a non-numeric `add`
    /// operand, ...) are rejected eagerly.
    pub fn new(operator: MathOperator, operand: impl Into<Document>) -> Result<Math, TypeError> {
        let operand = operand.into();
        let bad = || TypeError::BadOperand {
            op: operator.tag(),
            operand: format!("{operand:?}"),
        };
        match operator {
            MathOperator::Add | MathOperator::Mult => match operand {
                Document::Int(_) | Document::Float(_) => {}
                _ => return Err(bad()),
            },
            MathOperator::Rot => match rot_parts(&operand) {
                Some((inc, modulus)) if inc >= 0 && modulus > 0 => {}
                _ => return Err(bad()),
            },
            MathOperator::And | MathOperator::Or | MathOperator::Xor => match operand {
                Document::Int(_) | Document::Bool(_) => {}
                _ => return Err(bad()),
            },
            // `not` ignores its operand; normalize so equal operations
            // compare equal.
            MathOperator::Not => {
                return Ok(Math {
                    operator,
                    operand: Document::Null,
                });
            }
        }
        Ok(Math { operator, operand })
    }

    fn rot(&self) -> (i64, i64) {
        rot_parts(&self.operand).expect("validated at construction")
    }

    pub(crate) fn apply(&self, doc: &Document) -> Result<Document, TypeError> {
        let op = self.operator.tag();
        let wrong = || TypeError::WrongType {
            op,
            kind: doc.type_name(),
        };
        match self.operator {
            MathOperator::Add => num_binop(doc, &self.operand, op, i64::checked_add, |a, b| a + b),
            MathOperator::Mult => num_binop(doc, &self.operand, op, i64::checked_mul, |a, b| a * b),
            MathOperator::Rot => {
                let (inc, modulus) = self.rot();
                match doc {
                    Document::Int(n) if *n >= 0 => {
                        let sum = n.checked_add(inc).ok_or(TypeError::Overflow { op })?;
                        Ok(Document::Int(sum.rem_euclid(modulus)))
                    }
                    _ => Err(wrong()),
                }
            }
            MathOperator::And => bit_binop(doc, &self.operand, op, |a, b| a & b, |a, b| a && b),
            MathOperator::Or => bit_binop(doc, &self.operand, op, |a, b| a | b, |a, b| a || b),
            MathOperator::Xor => bit_binop(doc, &self.operand, op, |a, b| a ^ b, |a, b| a ^ b),
            MathOperator::Not => match doc {
                Document::Int(n) => Ok(Document::Int(!n)),
                Document::Bool(b) => Ok(Document::Bool(!b)),
                _ => Err(wrong()),
            },
        }
    }

    pub(crate) fn simplify(&self) -> Op {
        match (self.operator, &self.operand) {
            (MathOperator::Add, Document::Int(0)) => Op::NoOp,
            (MathOperator::Add, Document::Float(x)) if *x == 0.0 => Op::NoOp,
            (MathOperator::Mult, Document::Int(1)) => Op::NoOp,
            (MathOperator::Mult, Document::Float(x)) if *x == 1.0 => Op::NoOp,
            (MathOperator::Rot, _) => {
                let (inc, modulus) = self.rot();
                if inc % modulus == 0 {
                    Op::NoOp
                } else if inc >= modulus {
                    Op::Math(Math {
                        operator: MathOperator::Rot,
                        operand: Document::Array(vec![
                            Document::Int(inc % modulus),
                            Document::Int(modulus),
                        ]),
                    })
                } else {
                    Op::Math(self.clone())
                }
            }
            (MathOperator::Or, Document::Int(0)) | (MathOperator::Or, Document::Bool(false)) => {
                Op::NoOp
            }
            (MathOperator::Xor, Document::Int(0)) | (MathOperator::Xor, Document::Bool(false)) => {
                Op::NoOp
            }
            (MathOperator::And, Document::Int(0)) => Op::Set(Set::new(0)),
            (MathOperator::And, Document::Bool(false)) => Op::Set(Set::new(false)),
            _ => Op::Math(self.clone()),
        }
    }

    pub(crate) fn inverse(&self, doc: &Document) -> Result<Op, TypeError> {
        let op = self.operator.tag();
        let not_invertible = || TypeError::NotInvertible {
            op,
            operand: format!("{:?}", self.operand),
        };
        let wrong = || TypeError::WrongType {
            op,
            kind: doc.type_name(),
        };
        let math = |operator, operand| Op::Math(Math { operator, operand });
        Ok(match self.operator {
            MathOperator::Add => match &self.operand {
                Document::Int(k) => {
                    let neg = k.checked_neg().ok_or(TypeError::Overflow { op })?;
                    math(MathOperator::Add, Document::Int(neg))
                }
                Document::Float(x) => math(MathOperator::Add, Document::Float(-x)),
                _ => unreachable!("validated at construction"),
            },
            MathOperator::Mult => match &self.operand {
                Document::Int(0) => return Err(not_invertible()),
                Document::Int(k @ (1 | -1)) => math(MathOperator::Mult, Document::Int(*k)),
                Document::Int(k) => math(MathOperator::Mult, Document::Float(1.0 / *k as f64)),
                Document::Float(x) if *x == 0.0 => return Err(not_invertible()),
                Document::Float(x) => math(MathOperator::Mult, Document::Float(1.0 / x)),
                _ => unreachable!("validated at construction"),
            },
            MathOperator::Rot => {
                let (inc, modulus) = self.rot();
                math(
                    MathOperator::Rot,
                    Document::Array(vec![
                        Document::Int((modulus - inc % modulus) % modulus),
                        Document::Int(modulus),
                    ]),
                )
            }
            // `and k` clears bits; the inverse restores the ones that were set.
            MathOperator::And => match (doc, &self.operand) {
                (Document::Int(d), Document::Int(k)) => {
                    math(MathOperator::Or, Document::Int(d & !k))
                }
                (Document::Bool(d), Document::Bool(k)) => {
                    math(MathOperator::Or, Document::Bool(*d && !*k))
                }
                _ => return Err(wrong()),
            },
            // `or k` sets bits; the inverse clears the ones that were unset.
            MathOperator::Or => match (doc, &self.operand) {
                (Document::Int(d), Document::Int(k)) => {
                    math(MathOperator::Xor, Document::Int(!d & k))
                }
                (Document::Bool(d), Document::Bool(k)) => {
                    math(MathOperator::Xor, Document::Bool(!*d && *k))
                }
                _ => return Err(wrong()),
            },
            MathOperator::Xor | MathOperator::Not => Op::Math(self.clone()),
        })
    }

    /// Fuses `self` followed by `other` into a single `Math` (or its
    /// simplification) when the operator monoid allows it.
    pub(crate) fn atomic_compose(&self, other: &Math) -> Option<Op> {
        if self.operator == other.operator {
            let fused = match self.operator {
                MathOperator::Add => num_binop(
                    &self.operand,
                    &other.operand,
                    "add",
                    i64::checked_add,
                    |a, b| a + b,
                )
                .ok()?,
                MathOperator::Mult => num_binop(
                    &self.operand,
                    &other.operand,
                    "mult",
                    i64::checked_mul,
                    |a, b| a * b,
                )
                .ok()?,
                MathOperator::Rot => {
                    let (i1, m1) = self.rot();
                    let (i2, m2) = rot_parts(&other.operand)?;
                    if m1 != m2 {
                        return None;
                    }
                    Document::Array(vec![
                        Document::Int((i1.checked_add(i2)?) % m1),
                        Document::Int(m1),
                    ])
                }
                MathOperator::And => {
                    bit_binop(&self.operand, &other.operand, "and", |a, b| a & b, |a, b| {
                        a && b
                    })
                    .ok()?
                }
                MathOperator::Or => {
                    bit_binop(&self.operand, &other.operand, "or", |a, b| a | b, |a, b| {
                        a || b
                    })
                    .ok()?
                }
                MathOperator::Xor => {
                    bit_binop(&self.operand, &other.operand, "xor", |a, b| a ^ b, |a, b| {
                        a ^ b
                    })
                    .ok()?
                }
                MathOperator::Not => return Some(Op::NoOp),
            };
            return Some(
                Math {
                    operator: self.operator,
                    operand: fused,
                }
                .simplify(),
            );
        }
        // the two cross-operator fusions that stay a single operation
        match (self.operator, other.operator) {
            (MathOperator::And, MathOperator::Or) if self.operand == other.operand => {
                Some(Op::Set(Set {
                    value: self.operand.clone(),
                }))
            }
            (MathOperator::Or, MathOperator::Xor) if self.operand == other.operand => {
                let masked = match &self.operand {
                    Document::Int(k) => Document::Int(!k),
                    Document::Bool(b) => Document::Bool(!b),
                    _ => return None,
                };
                Some(Op::Math(Math {
                    operator: MathOperator::And,
                    operand: masked,
                }))
            }
            _ => None,
        }
    }
}

fn rot_parts(operand: &Document) -> Option<(i64, i64)> {
    match operand {
        Document::Array(pair) => match pair.as_slice() {
            [Document::Int(inc), Document::Int(modulus)] => Some((*inc, *modulus)),
            _ => None,
        },
        _ => None,
    }
}

fn num_binop(
    doc: &Document,
    operand: &Document,
    op: &'static str,
    int_f: fn(i64, i64) -> Option<i64>,
    float_f: fn(f64, f64) -> f64,
) -> Result<Document, TypeError> {
    match (doc, operand) {
        (Document::Int(a), Document::Int(b)) => int_f(*a, *b)
            .map(Document::Int)
            .ok_or(TypeError::Overflow { op }),
        (Document::Int(a), Document::Float(b)) => Ok(Document::Float(float_f(*a as f64, *b))),
        (Document::Float(a), Document::Int(b)) => Ok(Document::Float(float_f(*a, *b as f64))),
        (Document::Float(a), Document::Float(b)) => Ok(Document::Float(float_f(*a, *b))),
        _ => Err(TypeError::WrongType {
            op,
            kind: doc.type_name(),
        }),
    }
}

fn bit_binop(
    doc: &Document,
    operand: &Document,
    op: &'static str,
    int_f: fn(i64, i64) -> i64,
    bool_f: fn(bool, bool) -> bool,
) -> Result<Document, TypeError> {
    match (doc, operand) {
        (Document::Int(a), Document::Int(b)) => Ok(Document::Int(int_f(*a, *b))),
        (Document::Bool(a), Document::Bool(b)) => Ok(Document::Bool(bool_f(*a, *b))),
        _ => Err(TypeError::WrongType {
            op,
            kind: doc.type_name(),
        }),
    }
}

// --- rebase handlers ------------------------------------------------------
//
// Each handler returns both legs of the diamond: (a rebased over b, b
// rebased over a). A `None` leg is a conflict for that side.

pub(crate) fn rebase_set_set(
    a: &Set,
    b: &Set,
    cx: RebaseContext<'_>,
) -> (Option<Op>, Option<Op>) {
    if a.value == b.value {
        return (Some(Op::NoOp), Some(Op::NoOp));
    }
    if !cx.conflictless {
        return (None, None);
    }
    // the higher value survives; the lower side yields
    if a.value < b.value {
        (Some(Op::NoOp), Some(Op::Set(b.clone())))
    } else {
        (Some(Op::Set(a.clone())), Some(Op::NoOp))
    }
}

pub(crate) fn rebase_math_math(
    a: &Math,
    b: &Math,
    cx: RebaseContext<'_>,
) -> (Option<Op>, Option<Op>) {
    let commutes = a.operator == b.operator
        && (a.operator != MathOperator::Rot || rot_parts(&a.operand).map(|r| r.1)
            == rot_parts(&b.operand).map(|r| r.1));
    if commutes {
        return (Some(Op::Math(a.clone())), Some(Op::Math(b.clone())));
    }
    let Some(doc) = cx.document.filter(|_| cx.conflictless) else {
        return (None, None);
    };
    // Order the pair; the lower operation lifts itself to a Set of the
    // combined post-state so both sites converge on "lower then higher".
    let a_is_lower = (a.operator.tag(), &a.operand) < (b.operator.tag(), &b.operand);
    let (lower, higher) = if a_is_lower { (a, b) } else { (b, a) };
    let combined = lower
        .apply(doc)
        .and_then(|mid| higher.apply(&mid));
    let Ok(post) = combined else {
        return (None, None);
    };
    let lifted = Op::Set(Set { value: post });
    if a_is_lower {
        (Some(lifted), Some(Op::Math(b.clone())))
    } else {
        (Some(Op::Math(a.clone())), Some(lifted))
    }
}

/// `Set` against any sequence operation. Strictly this is a conflict; in
/// conflictless mode the `Set` passes through unchanged and the sequence
/// operation lifts to a `Set` of the post-state under the other side, which
/// is the `Set`'s own value.
pub(crate) fn rebase_set_sequence(s: &Set, cx: RebaseContext<'_>) -> (Option<Op>, Option<Op>) {
    if !cx.conflictless {
        return (None, None);
    }
    let forced = Op::Set(s.clone());
    (Some(forced.clone()), Some(forced))
}
