//! Criterion benchmarks for schema compilation and record consolidation.
//!
//! Groups:
//! - `compile`: building a registry with many beans and tables.
//! - `consolidate`: MAP merges with patches and LIST tables with union indexes.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tabula_core::consolidate::consolidate;
use tabula_core::context::BuildOptions;
use tabula_core::raw::{RawBean, RawTable};
use tabula_core::record::Record;
use tabula_core::registry::RegistryBuilder;
use tabula_core::table::{TableDef, TableMode};
use tabula_core::test_utils::*;

fn rows(table: &TableDef, n: usize, offset: i32, prefix: &str) -> Vec<Record> {
    (0..n as i32)
        .map(|i| int_record(table, &[i + offset, i, i % 7], &[], &format!("{prefix}[{i}]")))
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("registry_200_beans", |b| {
        b.iter(|| {
            let mut builder = RegistryBuilder::new();
            for i in 0..200 {
                let module = format!("mod{}", i % 10);
                let name = format!("Bean{i}");
                builder
                    .add_bean(
                        RawBean::new(&module, &name)
                            .field("id", "int")
                            .field("tags", "list<string>[,]")
                            .field("links", "map<int,string>[;]")
                            .field("grid", "int[,][;]"),
                    )
                    .unwrap();
                builder
                    .add_table(RawTable::new(&module, &format!("Tb{i}"), &name, TableMode::Map))
                    .unwrap();
            }
            black_box(builder.build(&BuildOptions::default()).unwrap());
        });
    });

    group.finish();
}

fn bench_consolidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate");

    let (reg, id) = single_table(
        triple_bean(),
        RawTable::new("", "TbMap", "Triple", TableMode::Map).index("a"),
    );
    let map = reg.table_def(id).unwrap();
    let main = rows(map, 10_000, 0, "main");
    let patch = rows(map, 1_000, 9_500, "patch");
    group.bench_function("map_10000_with_1000_patches", |b| {
        b.iter_batched(
            || (main.clone(), patch.clone()),
            |(m, p)| black_box(consolidate(map, m, p).unwrap()),
            BatchSize::LargeInput,
        );
    });

    let (reg, id) = list_table("a,b+c");
    let list = reg.table_def(id).unwrap();
    let records = rows(list, 10_000, 0, "row");
    group.bench_function("list_10000_two_indexes", |b| {
        b.iter_batched(
            || records.clone(),
            |r| black_box(consolidate(list, r, Vec::new()).unwrap()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_consolidate);
criterion_main!(benches);
