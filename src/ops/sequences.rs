//! The sequence algebra: `Patch` (with `Splice` and element-wise application
//! as special cases), `Move`, and `Map`.
//!
//! All sequence operations are expressed against a single canonical form,
//! [`Patch`]: an ordered list of [`Hunk`]s, each covering a slice of the
//! document and carrying a sub-operation that rewrites that slice. A splice
//! is a one-hunk patch whose sub-operation is `Set`; an element-wise edit is
//! a unit-length hunk whose sub-operation is `Map` (so the inner operation
//! sees the element, not a one-element slice). Keeping one canonical form
//! means the composition and rebase case analysis is written once, against
//! hunk geometry, instead of once per surface operation.
//!
//! Hunk offsets are *gaps*: each `offset` is measured from the end of the
//! previous hunk. Hunks are kept in strictly left-to-right order and never
//! touch the same slice.
//!
//! [`Move`] stays its own operation because its rebase is about remapping
//! boundaries, not slices, and [`Map`] stays distinct because its rebase
//! against structural edits relies on its uniformity across elements.

use crate::document::{Document, Seq};
use crate::errors::TypeError;
use crate::ops::values::Set;
use crate::ops::{rebase_pair, Op, RebaseContext};
use smallvec::SmallVec;
use std::fmt;

/// A contiguous slice of a sequence paired with the sub-operation that
/// rewrites it.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Hunk {
    /// Gap from the end of the previous hunk (or from position 0 for the
    /// first hunk).
    pub offset: usize,
    /// Number of elements the sub-operation reads.
    pub length: usize,
    /// The operation applied to the covered slice.
    pub op: Op,
}

impl fmt::Debug for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}x{} {:?}", self.offset, self.length, self.op)
    }
}

/// The canonical sequence operation: an ordered list of non-overlapping
/// hunks.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Patch {
    hunks: SmallVec<[Hunk; 1]>,
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.hunks.iter()).finish()
    }
}

impl Patch {
    /// Builds a patch, canonicalizing as it goes: abutting `Set` hunks of
    /// the same sequence kind merge into a single hunk, so e.g. two adjacent
    /// splices normalize to one.
    pub fn new(hunks: impl IntoIterator<Item = Hunk>) -> Patch {
        let mut out: SmallVec<[Hunk; 1]> = SmallVec::new();
        for hunk in hunks {
            if hunk.offset == 0 {
                if let Some(prev) = out.last_mut() {
                    if let (Op::Set(pv), Op::Set(hv)) = (&prev.op, &hunk.op) {
                        if let Some(merged) = concat_values(&pv.value, &hv.value) {
                            prev.length += hunk.length;
                            prev.op = Op::Set(Set { value: merged });
                            continue;
                        }
                    }
                }
            }
            out.push(hunk);
        }
        Patch { hunks: out }
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// When the patch is the canonical form of a single splice, its
    /// `(offset, length, replacement)` triple.
    pub fn as_splice(&self) -> Option<(usize, usize, &Document)> {
        match self.hunks.as_slice() {
            [Hunk {
                offset,
                length,
                op: Op::Set(set),
            }] => Some((*offset, *length, &set.value)),
            _ => None,
        }
    }

    pub(crate) fn apply(&self, doc: &Document) -> Result<Document, TypeError> {
        let seq = Seq::unpack(doc, "patch")?;
        let mut out = seq.empty_like();
        let mut pos = 0;
        for hunk in &self.hunks {
            let start = pos + hunk.offset;
            let end = start + hunk.length;
            if end > seq.len() {
                return Err(TypeError::OutOfRange {
                    op: "patch",
                    start,
                    end,
                    len: seq.len(),
                });
            }
            out.push_range(&seq, pos, start);
            let replaced = hunk.op.apply(&seq.slice(start, end))?;
            out.push_doc(&replaced)?;
            pos = end;
        }
        out.push_range(&seq, pos, seq.len());
        Ok(out.pack())
    }

    pub(crate) fn simplify(&self) -> Op {
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut pending_gap = 0;
        for hunk in &self.hunks {
            let op = hunk.op.simplify();
            let identity = matches!(op, Op::NoOp)
                || (hunk.length == 0
                    && matches!(&op, Op::Set(s) if s.value.sequence_len() == Some(0)));
            if identity {
                pending_gap += hunk.offset + hunk.length;
                continue;
            }
            // a nested patch that stays within its slice can be spliced
            // into the outer hunk list
            if let Op::Patch(inner) = &op {
                let span: usize = inner.hunks().iter().map(|h| h.offset + h.length).sum();
                if span <= hunk.length {
                    for (i, ih) in inner.hunks().iter().enumerate() {
                        let mut flat = ih.clone();
                        if i == 0 {
                            flat.offset += hunk.offset + pending_gap;
                        }
                        hunks.push(flat);
                    }
                    pending_gap = hunk.length - span;
                    continue;
                }
            }
            hunks.push(Hunk {
                offset: hunk.offset + pending_gap,
                length: hunk.length,
                op,
            });
            pending_gap = 0;
        }
        if hunks.is_empty() {
            Op::NoOp
        } else {
            Op::Patch(Box::new(Patch::new(hunks)))
        }
    }

    pub(crate) fn inverse(&self, doc: &Document) -> Result<Op, TypeError> {
        let seq = Seq::unpack(doc, "patch")?;
        let mut pos = 0;
        let mut hunks = Vec::with_capacity(self.hunks.len());
        for hunk in &self.hunks {
            let start = pos + hunk.offset;
            let end = start + hunk.length;
            if end > seq.len() {
                return Err(TypeError::OutOfRange {
                    op: "patch",
                    start,
                    end,
                    len: seq.len(),
                });
            }
            let slice = seq.slice(start, end);
            let applied = hunk.op.apply(&slice)?;
            let post_len = applied.sequence_len().ok_or(TypeError::KindMismatch {
                expected: slice.type_name(),
                found: applied.type_name(),
            })?;
            // gaps are untouched regions, so they are the same width in the
            // post-image; only lengths change
            hunks.push(Hunk {
                offset: hunk.offset,
                length: post_len,
                op: hunk.op.inverse(&slice)?,
            });
            pos = end;
        }
        Ok(Op::Patch(Box::new(Patch::new(hunks))))
    }
}

/// Moves `count` elements starting at `offset` so that their leading element
/// ends up at `new_offset`, with `new_offset` measured in the *pre-removal*
/// indexing.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Move {
    pub offset: usize,
    pub count: usize,
    pub new_offset: usize,
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MOVE(@{}x{} => @{})", self.offset, self.count, self.new_offset)
    }
}

impl Move {
    /// The insertion index into the post-removal remainder.
    fn landing(&self) -> usize {
        if self.new_offset <= self.offset {
            self.new_offset
        } else {
            self.new_offset - self.count
        }
    }

    pub(crate) fn apply(&self, doc: &Document) -> Result<Document, TypeError> {
        let seq = Seq::unpack(doc, "move")?;
        let len = seq.len();
        let end = self.offset + self.count;
        if end > len || self.new_offset > len {
            return Err(TypeError::OutOfRange {
                op: "move",
                start: self.offset,
                end: end.max(self.new_offset),
                len,
            });
        }
        if self.new_offset > self.offset && self.new_offset < end {
            return Err(TypeError::BadOperand {
                op: "move",
                operand: format!("{self:?}"),
            });
        }
        let ins = self.landing();
        let mut out = seq.empty_like();
        let mut rest = seq.empty_like();
        rest.push_range(&seq, 0, self.offset);
        rest.push_range(&seq, end, len);
        out.push_range(&rest, 0, ins);
        out.push_range(&seq, self.offset, end);
        out.push_range(&rest, ins, rest.len());
        Ok(out.pack())
    }

    pub(crate) fn is_identity(&self) -> bool {
        self.count == 0
            || self.new_offset == self.offset
            || self.new_offset == self.offset + self.count
    }

    pub(crate) fn simplify(&self) -> Op {
        if self.is_identity() {
            Op::NoOp
        } else {
            Op::Move(*self)
        }
    }

    pub(crate) fn inverse(&self) -> Op {
        if self.new_offset > self.offset {
            Op::Move(Move {
                offset: self.new_offset - self.count,
                count: self.count,
                new_offset: self.offset,
            })
        } else {
            Op::Move(Move {
                offset: self.new_offset,
                count: self.count,
                new_offset: self.offset + self.count,
            })
        }
    }
}

/// Broadcasts a sub-operation to every element of the sequence.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Map {
    pub op: Box<Op>,
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MAP({:?})", self.op)
    }
}

impl Map {
    pub(crate) fn apply(&self, doc: &Document) -> Result<Document, TypeError> {
        let seq = Seq::unpack(doc, "map")?;
        let mut out = seq.empty_like();
        for i in 0..seq.len() {
            out.push_element(self.op.apply(&seq.element(i))?)?;
        }
        Ok(out.pack())
    }

    pub(crate) fn simplify(&self) -> Op {
        match self.op.simplify() {
            Op::NoOp => Op::NoOp,
            op => Op::Map(Map { op: Box::new(op) }),
        }
    }

    /// Inverts element by element. The per-element inverses usually differ
    /// (a `Set` undoes to each element's old value), so the general inverse
    /// is a patch of unit hunks; when every element inverts the same way it
    /// collapses back to a single `Map`.
    pub(crate) fn inverse(&self, doc: &Document) -> Result<Op, TypeError> {
        let seq = Seq::unpack(doc, "map")?;
        if seq.len() == 0 {
            return Ok(Op::NoOp);
        }
        let mut inverses = Vec::with_capacity(seq.len());
        for i in 0..seq.len() {
            inverses.push(self.op.inverse(&seq.element(i))?);
        }
        if inverses.iter().all(|inv| *inv == inverses[0]) {
            return Ok(Op::Map(Map {
                op: Box::new(inverses.remove(0)),
            }));
        }
        Ok(Op::Patch(Box::new(Patch::new(inverses.into_iter().map(
            |inv| Hunk {
                offset: 0,
                length: 1,
                op: Op::Map(Map { op: Box::new(inv) }),
            },
        )))))
    }
}

fn concat_values(a: &Document, b: &Document) -> Option<Document> {
    match (a, b) {
        (Document::String(x), Document::String(y)) => {
            let mut merged = x.clone();
            merged.push_str(y);
            Some(Document::String(merged))
        }
        (Document::Array(x), Document::Array(y)) => {
            let mut merged = x.clone();
            merged.extend(y.iter().cloned());
            Some(Document::Array(merged))
        }
        _ => None,
    }
}

fn empty_like(value: &Document) -> Option<Document> {
    match value {
        Document::String(_) => Some(Document::String(String::new())),
        Document::Array(_) => Some(Document::Array(Vec::new())),
        _ => None,
    }
}

/// How many elements a hunk's output covers, where that is statically
/// known. Element-wise hunks are treated as length-preserving; that is
/// exact for arrays, and is the uniformity assumption `Map` is defined by.
fn hunk_post_len(hunk: &Hunk) -> Option<usize> {
    match &hunk.op {
        Op::Set(s) => s.value.sequence_len(),
        Op::NoOp | Op::Map(_) | Op::Move(_) => Some(hunk.length),
        Op::Patch(inner) => {
            let mut len = hunk.length as isize;
            for ih in inner.hunks() {
                len += hunk_post_len(ih)? as isize - ih.length as isize;
            }
            usize::try_from(len).ok()
        }
        Op::Math(_) => None,
    }
}

fn rebuild_patch(mut hunks: Vec<(usize, usize, Op)>) -> Option<Op> {
    hunks.sort_by_key(|(start, length, _)| (*start, *length > 0));
    let mut out = Vec::with_capacity(hunks.len());
    let mut pos = 0;
    for (start, length, op) in hunks {
        if start < pos {
            return None;
        }
        out.push(Hunk {
            offset: start - pos,
            length,
            op,
        });
        pos = start + length;
    }
    if out.is_empty() {
        Some(Op::NoOp)
    } else {
        Some(Op::Patch(Box::new(Patch::new(out))).simplify())
    }
}

// --- composition ----------------------------------------------------------

/// Fuses `a` followed by `b` into a single patch where the hunk geometry
/// allows it. `b`'s offsets are measured against `a`'s post-image; a `b`
/// hunk can land wholly inside a `Set` hunk's replacement (it is folded into
/// the value), exactly cover a hunk (the sub-operations compose), or fall in
/// a gap (it becomes a hunk of its own). Anything else — in particular a
/// partial overlap — is not fused, and the caller falls back to a list.
pub(crate) fn compose_patch_patch(a: &Patch, b: &Patch) -> Option<Op> {
    struct Slot {
        pre_start: usize,
        pre_len: usize,
        post_start: usize,
        post_len: usize,
        op: Op,
        // unpacked Set replacement, mutated by folds
        value: Option<Seq>,
        inner_delta: isize,
    }

    let mut slots: Vec<Slot> = Vec::new();
    {
        let mut pre = 0;
        let mut post = 0;
        for hunk in a.hunks() {
            pre += hunk.offset;
            post += hunk.offset;
            let post_len = hunk_post_len(hunk)?;
            let value = match &hunk.op {
                Op::Set(s) => Some(Seq::unpack(&s.value, "patch").ok()?),
                _ => None,
            };
            slots.push(Slot {
                pre_start: pre,
                pre_len: hunk.length,
                post_start: post,
                post_len,
                op: hunk.op.clone(),
                value,
                inner_delta: 0,
            });
            pre += hunk.length;
            post += post_len;
        }
    }

    let mut extras: Vec<(usize, usize, Op)> = Vec::new();
    let mut bpos = 0;
    'next_b: for bh in b.hunks() {
        let bs = bpos + bh.offset;
        let be = bs + bh.length;
        bpos = be;
        for slot in slots.iter_mut() {
            let ps = slot.post_start;
            let pe = slot.post_start + slot.post_len;
            if slot.value.is_some() && ps <= bs && be <= pe {
                // fold into the Set replacement
                let v = slot.value.as_mut().expect("checked");
                let s0 = usize::try_from((bs - ps) as isize + slot.inner_delta).ok()?;
                let s1 = s0 + (be - bs);
                if s1 > v.len() {
                    return None;
                }
                let replaced = bh.op.apply(&v.slice(s0, s1)).ok()?;
                let mut folded = v.empty_like();
                folded.push_range(v, 0, s0);
                folded.push_doc(&replaced).ok()?;
                folded.push_range(v, s1, v.len());
                slot.inner_delta += folded.len() as isize - v.len() as isize;
                *v = folded;
                continue 'next_b;
            }
            if ps == bs && pe == be {
                // exact cover: compose the sub-operations
                slot.op = slot.op.atomic_compose(&bh.op)?;
                continue 'next_b;
            }
        }
        // otherwise the hunk must sit wholly in a gap of a's post-image
        if slots
            .iter()
            .any(|s| !(be <= s.post_start || bs >= s.post_start + s.post_len))
        {
            return None;
        }
        let delta: isize = slots
            .iter()
            .filter(|s| s.post_start + s.post_len <= bs)
            .map(|s| s.post_len as isize - s.pre_len as isize)
            .sum();
        extras.push((
            usize::try_from(bs as isize - delta).ok()?,
            bh.length,
            bh.op.clone(),
        ));
    }

    let mut merged: Vec<(usize, usize, Op, u8)> = Vec::new();
    for slot in slots {
        let op = match slot.value {
            Some(v) => Op::Set(Set { value: v.pack() }),
            None => slot.op,
        };
        merged.push((slot.pre_start, slot.pre_len, op, 1));
    }
    for (start, length, op) in extras {
        merged.push((start, length, op, 0));
    }
    merged.sort_by_key(|(start, _, _, rank)| (*start, *rank));
    rebuild_patch(
        merged
            .into_iter()
            .map(|(start, length, op, _)| (start, length, op))
            .collect(),
    )
}

// --- rebase ---------------------------------------------------------------

/// Rebases patch `a` over concurrent patch `b`; both address the same
/// pre-image. Disjoint hunks shift by `b`'s length deltas; overlapping
/// geometry follows the conflictless discipline when `cx` allows it and
/// conflicts otherwise.
pub(crate) fn transform_patch(a: &Patch, b: &Patch, cx: RebaseContext<'_>) -> Option<Op> {
    // b's hunks in absolute pre-image coordinates, with their output widths
    let mut b_hunks: Vec<(usize, usize, &Hunk, usize)> = Vec::new();
    {
        let mut pos = 0;
        for bh in b.hunks() {
            let bs = pos + bh.offset;
            let be = bs + bh.length;
            pos = be;
            b_hunks.push((bs, be, bh, hunk_post_len(bh)?));
        }
    }

    let mut out: Vec<(usize, usize, Op)> = Vec::new();
    let mut apos = 0;
    for ah in a.hunks() {
        let a_start = apos + ah.offset;
        let a_end = a_start + ah.length;
        apos = a_end;
        let a_is_set = matches!(ah.op, Op::Set(_));

        let mut shift = 0isize;
        // b hunks contained in a's range: (bs, be, bpost, splits); a Set
        // hunk splits us apart (its own side survives in place), anything
        // element-wise is swallowed (its own side dissolves)
        let mut inside: Vec<(usize, usize, usize, bool)> = Vec::new();
        // at most one interaction that rewrites the hunk wholesale
        enum Special {
            Identical { bs: usize, bpost: usize, bop: Op },
            ContainedInB { bs: usize, bpost: usize },
            OverlapLeft { bs: usize },
            OverlapRight { bs: usize, be: usize, bpost: usize },
        }
        let mut special: Option<Special> = None;
        let mut dropped = false;
        let put_special = |slot: &mut Option<Special>, s: Special| -> Option<()> {
            if slot.is_some() {
                return None;
            }
            *slot = Some(s);
            Some(())
        };

        for (bs, be, bh, bpost) in &b_hunks {
            let (bs, be, bpost) = (*bs, *be, *bpost);
            let delta = bpost as isize - (be - bs) as isize;
            if bs == be {
                // b is a pure insertion at point bs
                if bs < a_start {
                    shift += delta;
                } else if bs == a_start {
                    if ah.length == 0 {
                        // two insertions at the same point
                        match tie_break(&ah.op, &bh.op, cx)? {
                            Tie::Drop => dropped = true,
                            Tie::Right => shift += delta,
                            Tie::Left => {}
                        }
                    } else {
                        shift += delta;
                    }
                } else if bs < a_end {
                    if !a_is_set {
                        return None;
                    }
                    inside.push((bs, be, bpost, matches!(bh.op, Op::Set(_))));
                }
                // bs >= a_end: no effect
            } else if be <= a_start {
                shift += delta;
            } else if bs >= a_end {
                // no effect
            } else if bs == a_start && be == a_end {
                put_special(
                    &mut special,
                    Special::Identical {
                        bs,
                        bpost,
                        bop: bh.op.clone(),
                    },
                )?;
            } else if bs <= a_start && a_end <= be {
                put_special(&mut special, Special::ContainedInB { bs, bpost })?;
            } else if a_start <= bs && be <= a_end {
                if !a_is_set {
                    return None;
                }
                inside.push((bs, be, bpost, matches!(bh.op, Op::Set(_))));
            } else {
                if bs < a_start {
                    put_special(&mut special, Special::OverlapRight { bs, be, bpost })?;
                } else {
                    put_special(&mut special, Special::OverlapLeft { bs })?;
                }
            }
        }

        if dropped {
            continue;
        }
        if special.is_some() && !inside.is_empty() {
            // a hunk both partially overlapped and rewritten inside has no
            // exact transform; the caller's fallback takes over
            return None;
        }
        let at = |pos: usize| usize::try_from(pos as isize + shift).ok();
        match special {
            None if inside.is_empty() => {
                out.push((at(a_start)?, ah.length, ah.op.clone()));
            }
            None => {
                let av = match &ah.op {
                    Op::Set(s) => &s.value,
                    _ => return None,
                };
                if !cx.conflictless {
                    // the hunk expands over b's rewrites of its interior
                    let delta: isize = inside
                        .iter()
                        .map(|(bs, be, bpost, _)| *bpost as isize - (be - bs) as isize)
                        .sum();
                    let length = usize::try_from(ah.length as isize + delta).ok()?;
                    out.push((at(a_start)?, length, ah.op.clone()));
                } else {
                    // Split around the output of b's replacement hunks so a
                    // concurrent splice into this range survives (it will
                    // rebase to sit just past our replacement). Element-wise
                    // hunks inside the range dissolve on their own side, so
                    // here they are swallowed by the current segment.
                    let empty = empty_like(av)?;
                    let mut seg_start = a_start;
                    let mut start_acc = shift;
                    let mut seg_delta = 0isize;
                    let mut first = true;
                    for (bs, be, bpost, splits) in &inside {
                        let delta = *bpost as isize - (be - bs) as isize;
                        if !splits {
                            seg_delta += delta;
                            continue;
                        }
                        let start = usize::try_from(seg_start as isize + start_acc).ok()?;
                        let length =
                            usize::try_from((bs - seg_start) as isize + seg_delta).ok()?;
                        let value = if first { av.clone() } else { empty.clone() };
                        out.push((start, length, Op::Set(Set { value })));
                        first = false;
                        start_acc += seg_delta + delta;
                        seg_delta = 0;
                        seg_start = *be;
                    }
                    let start = usize::try_from(seg_start as isize + start_acc).ok()?;
                    let length = usize::try_from((a_end - seg_start) as isize + seg_delta).ok()?;
                    let value = if first { av.clone() } else { empty };
                    out.push((start, length, Op::Set(Set { value })));
                }
            }
            Some(Special::Identical { bs: _, bpost, bop }) => {
                let slice = cx.document.and_then(|doc| {
                    let seq = Seq::unpack(doc, "patch").ok()?;
                    (a_end <= seq.len()).then(|| seq.slice(a_start, a_end))
                });
                let sub_cx = RebaseContext {
                    conflictless: cx.conflictless,
                    document: slice.as_ref(),
                };
                match rebase_pair(&ah.op, &bop, sub_cx).0? {
                    Op::NoOp => {}
                    op => out.push((at(a_start)?, bpost, op)),
                }
            }
            Some(Special::ContainedInB { bs, bpost }) => {
                if !cx.conflictless {
                    return None;
                }
                if a_is_set {
                    // survive as an insertion just after b's replacement
                    out.push((
                        usize::try_from(bs as isize + shift).ok()? + bpost,
                        0,
                        ah.op.clone(),
                    ));
                }
                // an element-wise hunk loses its target entirely
            }
            Some(Special::OverlapLeft { bs }) => {
                if !cx.conflictless || !a_is_set {
                    return None;
                }
                out.push((at(a_start)?, bs - a_start, ah.op.clone()));
            }
            Some(Special::OverlapRight { bs, be, bpost }) => {
                if !cx.conflictless || !a_is_set {
                    return None;
                }
                out.push((
                    usize::try_from(bs as isize + shift).ok()? + bpost,
                    a_end - be,
                    ah.op.clone(),
                ));
            }
        }
    }
    rebuild_patch(out)
}

enum Tie {
    /// Identical insertions deduplicate: this side dissolves.
    Drop,
    /// This side stays put; the other ends up to its right.
    Left,
    /// This side shifts past the other's insertion.
    Right,
}

fn tie_break(a: &Op, b: &Op, cx: RebaseContext<'_>) -> Option<Tie> {
    let order = match (a, b) {
        (Op::Set(x), Op::Set(y)) => x.value.cmp(&y.value),
        _ => crate::ops::canonical_order(a, b),
    };
    match order {
        std::cmp::Ordering::Equal => Some(Tie::Drop),
        _ if !cx.conflictless => None,
        std::cmp::Ordering::Less => Some(Tie::Left),
        std::cmp::Ordering::Greater => Some(Tie::Right),
    }
}

/// Rebases a patch over a concurrent move by pushing every hunk through the
/// move's index mapping. A hunk that the move tears apart (it straddles the
/// lifted range, or the landing point falls inside it) is a conflict.
pub(crate) fn transform_patch_over_move(p: &Patch, m: &Move) -> Option<Op> {
    if m.is_identity() {
        return Some(Op::Patch(Box::new(p.clone())));
    }
    let o = m.offset;
    let c = m.count;
    let ins = m.landing();
    let mut out = Vec::with_capacity(p.hunks().len());
    let mut pos = 0;
    for hunk in p.hunks() {
        let s = pos + hunk.offset;
        let e = s + hunk.length;
        pos = e;
        let mapped = if s == e {
            // a point travels with the block only when strictly inside it;
            // at the landing point it stays to the block's left
            if s > o && s < o + c {
                Some(ins + (s - o))
            } else {
                let q = if s <= o { s } else { s - c };
                Some(if q <= ins { q } else { q + c })
            }
        } else if s >= o && e <= o + c {
            Some(ins + (s - o))
        } else if e <= o || s >= o + c {
            let qs = if s >= o + c { s - c } else { s };
            let qe = qs + (e - s);
            if qs < ins && ins < qe {
                None
            } else if qe <= ins {
                Some(qs)
            } else {
                Some(qs + c)
            }
        } else {
            None
        };
        out.push((mapped?, hunk.length, hunk.op.clone()));
    }
    rebuild_patch(out)
}

/// Rebases a move over a concurrent patch by remapping its three boundaries
/// independently. A boundary inside a replaced slice has no image, which is
/// a conflict.
pub(crate) fn transform_move_over_patch(m: &Move, p: &Patch) -> Option<Op> {
    if m.is_identity() {
        return Some(Op::NoOp);
    }
    let remap = |pos: usize, insert_shifts_at_equal: bool| -> Option<usize> {
        let mut shift = 0isize;
        let mut hpos = 0;
        for hunk in p.hunks() {
            let s = hpos + hunk.offset;
            let e = s + hunk.length;
            hpos = e;
            let delta = hunk_post_len(hunk)? as isize - hunk.length as isize;
            if hunk.length == 0 {
                if s < pos || (s == pos && insert_shifts_at_equal) {
                    shift += delta;
                }
            } else if e <= pos {
                shift += delta;
            } else if s < pos {
                return None;
            }
        }
        usize::try_from(pos as isize + shift).ok()
    };
    // an insertion at the lifted range's start or at the destination stays
    // outside-left of the block, so those cuts land after it; an insertion
    // at the range's end stays outside-right, so that cut lands before it
    let offset = remap(m.offset, true)?;
    let end = remap(m.offset + m.count, false)?;
    let new_offset = remap(m.new_offset, true)?;
    Some(
        Move {
            offset,
            count: end.checked_sub(offset)?,
            new_offset,
        }
        .simplify(),
    )
}

pub(crate) fn rebase_move_move(a: &Move, b: &Move) -> (Option<Op>, Option<Op>) {
    if a == b {
        // the second identical move is redundant
        return (Some(Op::NoOp), Some(Op::NoOp));
    }
    if a.is_identity() || b.is_identity() {
        return (Some(a.simplify()), Some(b.simplify()));
    }
    (None, None)
}

fn wrap_map(op: Op) -> Op {
    match op {
        Op::NoOp => Op::NoOp,
        op => Op::Map(Map { op: Box::new(op) }),
    }
}

/// `Map` against `Map` delegates to the element level. The pre-state is not
/// forwarded: elements differ, so an element-level rule that needs one is a
/// conflict here and resolves through the caller's whole-document fallback.
pub(crate) fn rebase_map_map(a: &Map, b: &Map, cx: RebaseContext<'_>) -> (Option<Op>, Option<Op>) {
    let sub_cx = RebaseContext {
        conflictless: cx.conflictless,
        document: None,
    };
    let (l, r) = rebase_pair(&a.op, &b.op, sub_cx);
    (l.map(wrap_map), r.map(wrap_map))
}

/// A `Map` is uniform across elements, so it survives a concurrent patch
/// only when it stays uniform: splices leave it alone (the converse
/// direction folds it into their replacements), and an element-wise hunk is
/// tolerable only when the element-level rebase leaves the broadcast
/// operation unchanged — a broadcast that must change at one element can no
/// longer be expressed as a broadcast, which is a conflict.
pub(crate) fn transform_map_over_patch(m: &Map, p: &Patch, cx: RebaseContext<'_>) -> Option<Op> {
    let sub_cx = RebaseContext {
        conflictless: cx.conflictless,
        document: None,
    };
    for hunk in p.hunks() {
        match &hunk.op {
            Op::Set(_) => {}
            Op::Map(element) => {
                if rebase_pair(&m.op, &element.op, sub_cx).0? != *m.op {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(Op::Map(m.clone()))
}

/// The converse: the patch keeps its geometry. Replacement values absorb
/// the broadcast (the concurrent `Map` has already run over everything
/// else, so the spliced-in text must catch up), and element-wise hunks
/// rebase their inner operation over the broadcast one.
pub(crate) fn transform_patch_over_map(p: &Patch, m: &Map, cx: RebaseContext<'_>) -> Option<Op> {
    let sub_cx = RebaseContext {
        conflictless: cx.conflictless,
        document: None,
    };
    let mut hunks = Vec::with_capacity(p.hunks().len());
    let mut pending_gap = 0;
    for hunk in p.hunks() {
        let op = match &hunk.op {
            Op::Set(set) => {
                let value = m.apply(&set.value).ok()?;
                Op::Set(Set { value })
            }
            Op::Map(element) => match rebase_pair(&element.op, &m.op, sub_cx).0? {
                Op::NoOp => {
                    pending_gap += hunk.offset + hunk.length;
                    continue;
                }
                op => wrap_map(op),
            },
            _ => return None,
        };
        hunks.push(Hunk {
            offset: hunk.offset + pending_gap,
            length: hunk.length,
            op,
        });
        pending_gap = 0;
    }
    if hunks.is_empty() {
        Some(Op::NoOp)
    } else {
        Some(Op::Patch(Box::new(Patch::new(hunks))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::values::{Math, MathOperator};

    fn strict() -> RebaseContext<'static> {
        RebaseContext::default()
    }

    fn conflictless() -> RebaseContext<'static> {
        RebaseContext {
            conflictless: true,
            document: None,
        }
    }

    #[test]
    fn splice_applies_to_strings() {
        assert_eq!(
            Op::splice(0, 1, "4").apply(&"123".into()).unwrap(),
            "423".into()
        );
        assert_eq!(
            Op::splice(3, 0, "44").apply(&"123".into()).unwrap(),
            "12344".into()
        );
        assert_eq!(
            Op::splice(1, 2, "").apply(&"123".into()).unwrap(),
            "1".into()
        );
    }

    #[test]
    fn splice_applies_to_arrays() {
        let doc = Document::Array(vec![1.into(), 2.into(), 3.into()]);
        let repl = Document::Array(vec!["x".into()]);
        assert_eq!(
            Op::splice(1, 1, repl).apply(&doc).unwrap(),
            Document::Array(vec![1.into(), "x".into(), 3.into()])
        );
    }

    #[test]
    fn splice_rejects_kind_mixing_and_overruns() {
        assert!(Op::splice(0, 1, Document::Array(vec![]))
            .apply(&"123".into())
            .is_err());
        assert!(Op::splice(2, 5, "x").apply(&"123".into()).is_err());
        assert!(Op::splice(0, 1, "x").apply(&7.into()).is_err());
    }

    #[test]
    fn move_applies_in_original_indexing() {
        assert_eq!(
            Op::move_range(0, 1, 3).apply(&"123".into()).unwrap(),
            "231".into()
        );
        assert_eq!(
            Op::move_range(2, 1, 0).apply(&"123".into()).unwrap(),
            "312".into()
        );
    }

    #[test]
    fn move_inverse_retraces() {
        for (mv, doc) in [
            (Move { offset: 0, count: 1, new_offset: 3 }, "123"),
            (Move { offset: 2, count: 1, new_offset: 0 }, "123"),
            (Move { offset: 1, count: 2, new_offset: 5 }, "abcde"),
            (Move { offset: 3, count: 2, new_offset: 1 }, "abcde"),
        ] {
            let doc: Document = doc.into();
            let moved = mv.apply(&doc).unwrap();
            assert_eq!(mv.inverse().apply(&moved).unwrap(), doc, "{mv:?}");
        }
    }

    #[test]
    fn degenerate_moves_simplify_away() {
        assert_eq!(Op::move_range(2, 3, 2).simplify(), Op::NoOp);
        assert_eq!(Op::move_range(2, 3, 5).simplify(), Op::NoOp);
        assert_eq!(Op::move_range(2, 0, 7).simplify(), Op::NoOp);
    }

    #[test]
    fn element_edits_apply_at_indices() {
        let op = Op::apply_many(
            [(0, Op::set("d")), (1, Op::set("e"))].into_iter().collect(),
        );
        assert_eq!(op.apply(&"abc".into()).unwrap(), "dec".into());

        let add = Op::Math(Math::new(MathOperator::Add, 10).unwrap());
        let doc = Document::Array(vec![1.into(), 2.into()]);
        assert_eq!(
            Op::apply_at(1, add).apply(&doc).unwrap(),
            Document::Array(vec![1.into(), 12.into()])
        );
    }

    #[test]
    fn map_broadcasts() {
        let not = Op::Math(Math::new(MathOperator::Not, ()).unwrap());
        let doc = Document::Array(vec![true.into(), false.into()]);
        assert_eq!(
            Op::map(not).apply(&doc).unwrap(),
            Document::Array(vec![false.into(), true.into()])
        );
        assert_eq!(Op::map(Op::set("q")).apply(&"abc".into()).unwrap(), "qqq".into());
    }

    #[test]
    fn map_inverse_is_per_element() {
        let doc = Document::Array(vec![1.into(), 2.into()]);
        let op = Op::map(Op::set(0));
        let inv = op.inverse(&doc).unwrap();
        assert_eq!(inv.apply(&op.apply(&doc).unwrap()).unwrap(), doc);

        // uniform inverses collapse back to a single Map
        let not = Op::Math(Math::new(MathOperator::Not, ()).unwrap());
        let bools = Document::Array(vec![true.into(), false.into()]);
        assert_eq!(Op::map(not.clone()).inverse(&bools).unwrap(), Op::map(not));
    }

    #[test]
    fn patch_inverse_restores_slices() {
        for doc in ["1234567", "ab", "xyzzy"] {
            let doc: Document = doc.into();
            for op in [
                Op::splice(1, 1, "QQ"),
                Op::splice(0, 2, ""),
                Op::splice(2, 0, "!"),
                Op::apply_at(1, Op::set("z")),
            ] {
                let applied = op.apply(&doc).unwrap();
                let inv = op.inverse(&doc).unwrap();
                assert_eq!(inv.apply(&applied).unwrap(), doc, "{op} on {doc:?}");
            }
        }
    }

    #[test]
    fn abutting_splices_fuse() {
        assert_eq!(
            Op::splice(0, 4, "1234").atomic_compose(&Op::splice(4, 4, "EFGH")),
            Some(Op::splice(0, 8, "1234EFGH"))
        );
    }

    #[test]
    fn partially_overlapping_splices_do_not_fuse() {
        assert_eq!(
            Op::splice(0, 4, "1234").atomic_compose(&Op::splice(2, 4, "CDEF")),
            None
        );
    }

    #[test]
    fn nested_splice_folds_into_replacement() {
        assert_eq!(
            Op::splice(1, 2, "WXYZ").atomic_compose(&Op::splice(2, 2, "q")),
            Some(Op::splice(1, 2, "WqZ"))
        );
    }

    #[test]
    fn disjoint_splices_fuse_into_two_hunks() {
        let fused = Op::splice(0, 1, "A")
            .atomic_compose(&Op::splice(3, 1, "B"))
            .unwrap();
        assert_eq!(fused.apply(&"wxyz".into()).unwrap(), "AxyB".into());
        match &fused {
            Op::Patch(p) => assert_eq!(p.hunks().len(), 2),
            other => panic!("expected a patch, got {other}"),
        }
    }

    #[test]
    fn element_edit_composes_into_covering_splice() {
        // the edited element sits inside the spliced-in text, so it can be
        // evaluated against the replacement directly
        let spliced = Op::splice(1, 2, "ab");
        let edit = Op::apply_at(2, Op::set("B"));
        assert_eq!(
            spliced.atomic_compose(&edit),
            Some(Op::splice(1, 2, "aB"))
        );
    }

    #[test]
    fn element_edits_compose_at_matching_indices() {
        let first = Op::apply_at(2, Op::set("x"));
        let second = Op::apply_at(2, Op::set("y"));
        assert_eq!(
            first.atomic_compose(&second),
            Some(Op::apply_at(2, Op::set("y")))
        );
        let disjoint = Op::apply_at(5, Op::set("z"));
        let fused = first.atomic_compose(&disjoint).unwrap();
        assert_eq!(fused.apply(&"abcdefg".into()).unwrap(), "abxdezg".into());
    }

    #[test]
    fn moves_do_not_fuse() {
        assert_eq!(
            Op::move_range(0, 1, 3).atomic_compose(&Op::move_range(1, 1, 0)),
            None
        );
        assert_eq!(
            Op::move_range(0, 1, 3).atomic_compose(&Op::splice(0, 1, "x")),
            None
        );
    }

    #[test]
    fn identical_splices_rebase_to_noop() {
        let a = Op::splice(0, 3, "456");
        assert_eq!(a.rebase(&a.clone(), strict()), Some(Op::NoOp));
    }

    #[test]
    fn earlier_splice_shifts_later_one() {
        // a length-delta of -1 before the hunk pulls its offset left
        assert_eq!(
            Op::splice(3, 3, "456").rebase(&Op::splice(0, 3, "AC"), strict()),
            Some(Op::splice(2, 3, "456"))
        );
    }

    #[test]
    fn same_point_insertions_tie_break_by_value() {
        let lo = Op::splice(0, 0, "123");
        let hi = Op::splice(0, 0, "456");
        assert_eq!(lo.rebase(&hi, strict()), None);
        assert_eq!(lo.rebase(&hi, conflictless()), Some(Op::splice(0, 0, "123")));
        assert_eq!(hi.rebase(&lo, conflictless()), Some(Op::splice(3, 0, "456")));
        // and the diamond closes
        let doc: Document = "".into();
        let left = hi
            .rebase(&lo, conflictless())
            .unwrap()
            .apply(&lo.apply(&doc).unwrap())
            .unwrap();
        let right = lo
            .rebase(&hi, conflictless())
            .unwrap()
            .apply(&hi.apply(&doc).unwrap())
            .unwrap();
        assert_eq!(left, right);
        assert_eq!(left, "123456".into());
    }

    #[test]
    fn identical_insertions_deduplicate() {
        let ins = Op::splice(2, 0, "!!");
        assert_eq!(ins.rebase(&ins.clone(), strict()), Some(Op::NoOp));
    }

    #[test]
    fn same_range_replacements_pick_the_higher_value() {
        let lo = Op::splice(1, 2, "aa");
        let hi = Op::splice(1, 2, "zz");
        assert_eq!(lo.rebase(&hi, strict()), None);
        assert_eq!(lo.rebase(&hi, conflictless()), Some(Op::NoOp));
        assert_eq!(hi.rebase(&lo, conflictless()), Some(Op::splice(1, 2, "zz")));
    }

    #[test]
    fn element_edit_shifts_past_insertion() {
        let add3 = Op::Math(Math::new(MathOperator::Add, 3).unwrap());
        let edit = Op::apply_at(555, add3.clone());
        let insert = Op::splice(555, 0, Document::Array(vec![5.into()]));
        assert_eq!(
            edit.rebase(&insert, strict()),
            Some(Op::apply_at(556, add3))
        );
    }

    #[test]
    fn element_edits_at_one_index_tie_break_in_conflictless_mode() {
        let lo = Op::apply_at(555, Op::set("y"));
        let hi = Op::apply_at(555, Op::set("z"));
        assert_eq!(lo.rebase(&hi, conflictless()), Some(Op::NoOp));
        assert_eq!(hi.rebase(&lo, conflictless()), Some(hi.clone()));
        assert_eq!(lo.rebase(&hi, strict()), None);
    }

    #[test]
    fn element_edit_dissolves_when_its_slice_is_replaced() {
        let edit = Op::apply_at(1, Op::set("y"));
        let covering = Op::splice(0, 3, "NEW");
        assert_eq!(edit.rebase(&covering, conflictless()), Some(Op::NoOp));
    }

    #[test]
    fn insertion_survives_inside_replaced_range() {
        let doc: Document = "abc".into();
        let ins = Op::splice(1, 0, "x");
        let replace = Op::splice(0, 3, "ABCD");
        let ins2 = ins.rebase(&replace, conflictless()).unwrap();
        let replace2 = replace.rebase(&ins, conflictless()).unwrap();
        let left = replace2.apply(&ins.apply(&doc).unwrap()).unwrap();
        let right = ins2.apply(&replace.apply(&doc).unwrap()).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, "ABCDx".into());
    }

    #[test]
    fn partial_overlap_keeps_the_disjoint_part() {
        let doc: Document = "abcdef".into();
        let a = Op::splice(0, 4, "WXYZ");
        let b = Op::splice(2, 4, "PQ");
        assert_eq!(a.rebase(&b, strict()), None);
        let a2 = a.rebase(&b, conflictless()).unwrap();
        let b2 = b.rebase(&a, conflictless()).unwrap();
        let left = b2.apply(&a.apply(&doc).unwrap()).unwrap();
        let right = a2.apply(&b.apply(&doc).unwrap()).unwrap();
        assert_eq!(left, right);
        assert_eq!(left, "WXYZPQ".into());
    }

    #[test]
    fn containing_splice_expands_over_inner_edit() {
        // strict mode: the wider replacement absorbs the narrower one
        let outer = Op::splice(0, 4, "Z");
        let inner = Op::splice(1, 2, "xyz");
        assert_eq!(
            outer.rebase(&inner, strict()),
            Some(Op::splice(0, 5, "Z"))
        );
        // the narrower side has no strict-mode answer
        assert_eq!(inner.rebase(&outer, strict()), None);
    }

    #[test]
    fn patch_rebases_over_move() {
        let edit = Op::splice(4, 1, "X");
        let mv = Op::move_range(0, 2, 6); // "abcdef" -> "cdefab"
        let doc: Document = "abcdef".into();
        let edit2 = edit.rebase(&mv, strict()).unwrap();
        let mv2 = mv.rebase(&edit, strict()).unwrap();
        let left = mv2.apply(&edit.apply(&doc).unwrap()).unwrap();
        let right = edit2.apply(&mv.apply(&doc).unwrap()).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn move_conflicts_when_its_block_is_torn() {
        // the splice rewrites across the block boundary
        let mv = Op::move_range(2, 2, 0);
        let tear = Op::splice(1, 2, "Q");
        assert_eq!(mv.rebase(&tear, strict()), None);
    }

    #[test]
    fn identical_moves_deduplicate() {
        let mv = Op::move_range(1, 2, 5);
        assert_eq!(mv.rebase(&mv.clone(), strict()), Some(Op::NoOp));
    }

    #[test]
    fn map_ignores_structural_edits_and_splices_catch_up() {
        let bump = Op::map(Op::Math(Math::new(MathOperator::Add, 1).unwrap()));
        let splice = Op::splice(0, 1, Document::Array(vec![9.into()]));
        assert_eq!(bump.rebase(&splice, strict()), Some(bump.clone()));
        // the spliced-in value absorbs the broadcast it missed
        assert_eq!(
            splice.rebase(&bump, strict()),
            Some(Op::splice(0, 1, Document::Array(vec![10.into()])))
        );
        let doc = Document::Array(vec![5.into(), 6.into()]);
        let left = splice
            .rebase(&bump, strict())
            .unwrap()
            .apply(&bump.apply(&doc).unwrap())
            .unwrap();
        let right = bump
            .rebase(&splice, strict())
            .unwrap()
            .apply(&splice.apply(&doc).unwrap())
            .unwrap();
        assert_eq!(left, right);
        assert_eq!(left, Document::Array(vec![10.into(), 7.into()]));
    }

    #[test]
    fn map_commutes_with_element_edits_of_the_same_operator() {
        let broadcast = Op::map(Op::Math(Math::new(MathOperator::Add, 1).unwrap()));
        let pointwise = Op::apply_at(1, Op::Math(Math::new(MathOperator::Add, 5).unwrap()));
        assert_eq!(broadcast.rebase(&pointwise, strict()), Some(broadcast.clone()));
        assert_eq!(pointwise.rebase(&broadcast, strict()), Some(pointwise.clone()));
    }

    #[test]
    fn map_conflicts_with_overriding_element_edits() {
        // a broadcast that would have to change at one element can no
        // longer be expressed as a broadcast
        let broadcast = Op::map(Op::set("a"));
        let pointwise = Op::apply_at(1, Op::set("b"));
        assert_eq!(broadcast.rebase(&pointwise, strict()), None);

        // with a pre-state, conflictless mode still converges via the
        // forced-post-state fallback
        let doc: Document = "xyz".into();
        let cx = RebaseContext::conflictless(&doc);
        let b2 = broadcast.rebase(&pointwise, cx).unwrap();
        let p2 = pointwise.rebase(&broadcast, cx).unwrap();
        let left = p2.apply(&broadcast.apply(&doc).unwrap()).unwrap();
        let right = b2.apply(&pointwise.apply(&doc).unwrap()).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn simplify_drops_identity_hunks() {
        assert_eq!(Op::splice(3, 0, "").simplify(), Op::NoOp);
        assert_eq!(Op::apply_at(2, Op::NoOp).simplify(), Op::NoOp);
        let op = Op::splice(1, 1, "z");
        assert_eq!(op.simplify(), op);
        // a patch of nothing but identities is the identity
        let patch = Op::apply_many(
            [(1, Op::NoOp), (4, Op::NoOp)].into_iter().collect(),
        );
        assert_eq!(patch.simplify(), Op::NoOp);
    }

    #[test]
    fn simplify_flattens_nested_patches() {
        let nested = Op::Patch(Box::new(Patch::new([Hunk {
            offset: 1,
            length: 3,
            op: Op::splice(1, 1, "Q"),
        }])));
        let flat = nested.simplify();
        assert_eq!(flat, Op::splice(2, 1, "Q"));
        assert_eq!(flat.apply(&"abcde".into()).unwrap(), "abQde".into());
    }
}
