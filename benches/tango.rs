use otson::{Document, Op, RebaseContext};
use std::hint::black_box;
use tango_bench::{benchmark_fn, tango_benchmarks, tango_main, IntoBenchmarks};

fn wide_text() -> Document {
    Document::String("lorem ipsum dolor sit amet ".repeat(40))
}

fn wide_array() -> Document {
    Document::Array((0..512).map(Document::Int).collect())
}

fn apply_benchmarks() -> impl IntoBenchmarks {
    let text = wide_text();
    let array = wide_array();
    let splice = Op::splice(100, 50, "-- replaced --");
    let mv = Op::move_range(16, 64, 400);
    let map = Op::map(Op::set(0));
    [
        benchmark_fn("apply::splice_text", move |b| {
            let text = text.clone();
            let splice = splice.clone();
            b.iter(move || black_box(&splice).apply(black_box(&text)))
        }),
        benchmark_fn("apply::move_array", {
            let array = array.clone();
            move |b| {
                let array = array.clone();
                let mv = mv.clone();
                b.iter(move || black_box(&mv).apply(black_box(&array)))
            }
        }),
        benchmark_fn("apply::map_array", move |b| {
            let array = array.clone();
            let map = map.clone();
            b.iter(move || black_box(&map).apply(black_box(&array)))
        }),
    ]
}

fn algebra_benchmarks() -> impl IntoBenchmarks {
    let text = wide_text();
    let left = Op::splice(0, 40, "the edited head of the document ");
    let right = Op::splice(600, 20, "and its edited tail");
    let near = Op::splice(10, 10, "collision");
    [
        benchmark_fn("algebra::compose_disjoint", {
            let (left, right) = (left.clone(), right.clone());
            move |b| {
                let (left, right) = (left.clone(), right.clone());
                b.iter(move || black_box(&left).atomic_compose(black_box(&right)))
            }
        }),
        benchmark_fn("algebra::rebase_disjoint", {
            let (left, right) = (left.clone(), right.clone());
            move |b| {
                let (left, right) = (left.clone(), right.clone());
                b.iter(move || black_box(&left).rebase(black_box(&right), RebaseContext::STRICT))
            }
        }),
        benchmark_fn("algebra::rebase_conflictless_overlap", move |b| {
            let (left, near, text) = (left.clone(), near.clone(), text.clone());
            b.iter(move || {
                let cx = RebaseContext::conflictless(black_box(&text));
                black_box(&left).rebase(black_box(&near), cx)
            })
        }),
        benchmark_fn("algebra::inverse_splice", {
            let text = wide_text();
            move |b| {
                let text = text.clone();
                let op = Op::splice(100, 50, "-- replaced --");
                b.iter(move || black_box(&op).inverse(black_box(&text)))
            }
        }),
    ]
}

fn codec_benchmarks() -> impl IntoBenchmarks {
    let op = Op::apply_many(
        (0..32usize)
            .map(|i| (i * 3, Op::set(i as i64)))
            .collect(),
    );
    let encoded = otson::json::encode(&op);
    [
        benchmark_fn("codec::encode_patch", {
            let op = op.clone();
            move |b| {
                let op = op.clone();
                b.iter(move || otson::json::encode(black_box(&op)))
            }
        }),
        benchmark_fn("codec::decode_patch", move |b| {
            let encoded = encoded.clone();
            b.iter(move || otson::json::decode(black_box(&encoded)))
        }),
    ]
}

tango_benchmarks!(
    apply_benchmarks(),
    algebra_benchmarks(),
    codec_benchmarks()
);
tango_main!();
