//! This demo walks through how two sites editing the same document converge.
//! We simulate two replicas of a short text, make concurrent edits — some
//! merely disjoint, some genuinely conflicting — and rebase each site's view
//! of the other's operation to reach the same final state.
use otson::{Op, RebaseContext};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // SETUP
    // Both sites start from the same document.
    let base = otson::Document::from("the quick brown fox");
    println!("1. Both sites start from: {base:?}");

    // CONCURRENT EDITS
    // Site A rewrites a word, site B appends to the end. Neither has seen
    // the other's operation.
    let a = Op::splice(4, 5, "nimble");
    let b = Op::splice(19, 0, " jumps");
    println!("2. Site A edits: {a}");
    println!("   Site B edits: {b}");

    // EXCHANGE & REBASE
    // Each site applies its own edit, then rebases the remote edit over its
    // local one before applying it.
    let cx = RebaseContext::STRICT;
    let a_state = {
        let mine = a.apply(&base)?;
        let remote = b.rebase(&a, cx).expect("disjoint edits cannot conflict");
        remote.apply(&mine)?
    };
    let b_state = {
        let mine = b.apply(&base)?;
        let remote = a.rebase(&b, cx).expect("disjoint edits cannot conflict");
        remote.apply(&mine)?
    };
    assert_eq!(a_state, b_state);
    println!("3. Both sites converge on: {a_state:?}");

    // A REAL CONFLICT
    // Now both sites replace the same word with different text. In strict
    // mode this is a conflict: rebase reports no result and the caller
    // must escalate.
    let a = Op::splice(4, 5, "sly");
    let b = Op::splice(4, 5, "wily");
    assert_eq!(a.rebase(&b, cx), None);
    println!("4. Same-range edits conflict in strict mode.");

    // CONFLICTLESS MODE
    // With conflictless mode and the shared pre-state, the tie breaks
    // deterministically: both sites keep the replacement that orders
    // higher, and the other side dissolves.
    let cx = RebaseContext::conflictless(&base);
    let a_state = {
        let mine = a.apply(&base)?;
        let remote = b.rebase(&a, cx).expect("conflictless rebase is total");
        remote.apply(&mine)?
    };
    let b_state = {
        let mine = b.apply(&base)?;
        let remote = a.rebase(&b, cx).expect("conflictless rebase is total");
        remote.apply(&mine)?
    };
    assert_eq!(a_state, b_state);
    println!("5. Conflictless mode converges on: {a_state:?}");

    Ok(())
}
