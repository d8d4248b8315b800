//! This demo shows single-operation undo: every operation can produce its
//! inverse against the document it was applied to, and composing the two
//! yields the identity.
use otson::{doc, Op, RebaseContext};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let before = doc!(["draft", "notes", "todo"]);
    println!("1. Document: {before:?}");

    // An edit and its inverse.
    let edit = Op::splice(1, 1, doc!(["NOTES", "extra"]));
    let after = edit.apply(&before)?;
    println!("2. After {edit}: {after:?}");

    let undo = edit.inverse(&before)?;
    assert_eq!(undo.apply(&after)?, before);
    println!("3. Inverse {undo} restores the original.");

    // Undo still works after a concurrent edit lands, by rebasing the
    // inverse over the operation that arrived in between.
    let concurrent = Op::splice(0, 1, doc!(["published"]));
    let cx = RebaseContext::STRICT;
    let merged = {
        let rebased = concurrent.rebase(&edit, cx).expect("disjoint");
        rebased.apply(&after)?
    };
    println!("4. A concurrent edit lands: {merged:?}");

    let undo_rebased = undo
        .rebase(&concurrent.rebase(&edit, cx).expect("disjoint"), cx)
        .expect("disjoint");
    let unwound = undo_rebased.apply(&merged)?;
    assert_eq!(unwound, concurrent.apply(&before)?);
    println!("5. Rebased undo unwinds only the local edit: {unwound:?}");

    Ok(())
}
