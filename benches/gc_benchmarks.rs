use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vmheap::escape::{EscapeAnalyzer, EscapeMode};
use vmheap::gc::{Collector, HeapObject, Path};
use vmheap::syntax::parse_body;
use vmheap::{Context, Value};

/// One root at the head of a chain of `len` objects, plus as many garbage objects
fn chain_heap(len: usize) -> Collector {
    let mut gc = Collector::new();
    let mut next = None;
    for i in 0..len {
        let mut obj = HeapObject::new(Value::int(i as i64));
        if let Some(id) = next {
            obj = obj.with_reference(id);
        }
        next = Some(gc.register(obj));
        gc.register(HeapObject::new(Value::nil()));
    }
    let mut root = HeapObject::with_path(Value::nil(), Path::local(0, 0));
    if let Some(id) = next {
        root = root.with_reference(id);
    }
    gc.add_root(root);
    gc
}

fn bench_collect_chain(c: &mut Criterion) {
    c.bench_function("collect chain 10k", |b| {
        b.iter_batched(
            || chain_heap(10_000),
            |mut gc| black_box(gc.collect()),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_collect_wide(c: &mut Criterion) {
    c.bench_function("collect wide roots 1k", |b| {
        b.iter_batched(
            || {
                let mut gc = Collector::new();
                for slot in 0..1_000 {
                    let id = gc.register(HeapObject::new(Value::int(slot as i64)));
                    gc.add_root(
                        HeapObject::with_path(Value::nil(), Path::local(0, slot)).with_reference(id),
                    );
                }
                for slot in (0..1_000).step_by(2) {
                    gc.remove_root(&Path::local(0, slot));
                }
                gc
            },
            |mut gc| black_box(gc.collect()),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn generated_body(stmts: usize) -> String {
    let mut source = String::from("{\n");
    for i in 0..stmts {
        source.push_str(&format!("    v{} := {}\n", i, i));
        if i % 3 == 0 {
            source.push_str(&format!("    p{} := &v{}\n", i, i));
        }
        if i % 5 == 0 {
            source.push_str(&format!("    go worker(v{})\n", i));
        }
        if i % 7 == 0 {
            source.push_str(&format!("    f{} := func() {{ use(v{}) }}\n", i, i));
        }
    }
    source.push_str("}\n");
    source
}

fn bench_analyze(c: &mut Criterion) {
    let func = parse_body(&generated_body(500)).unwrap();
    let legacy = EscapeAnalyzer::new(EscapeMode::Legacy);
    let scoped = EscapeAnalyzer::new(EscapeMode::Scoped);

    c.bench_function("analyze legacy 500", |b| {
        b.iter(|| black_box(legacy.analyze(&func)))
    });
    c.bench_function("analyze scoped 500", |b| {
        b.iter(|| black_box(scoped.analyze(&func)))
    });
}

fn bench_frames(c: &mut Criterion) {
    let mut ctx = Context::new();
    ctx.prepare("func f() *int { var a int; var b int; b = 1; return &a }")
        .unwrap();

    c.bench_function("frame push/declare/pop 100", |b| {
        b.iter(|| {
            for _ in 0..100 {
                ctx.push_frame("f");
                ctx.declare_local("a", Value::int(1)).unwrap();
                ctx.declare_local("b", Value::int(2)).unwrap();
                ctx.pop_frame().unwrap();
            }
            black_box(ctx.gc())
        })
    });
}

criterion_group!(
    benches,
    bench_collect_chain,
    bench_collect_wide,
    bench_analyze,
    bench_frames
);
criterion_main!(benches);
