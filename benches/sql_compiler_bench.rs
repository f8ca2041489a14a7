use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use segment_compiler::{
    DimensionFilter, FilterTree, MembershipCondition, SqlCompiler, TimelineCondition,
};
use std::hint::black_box;

fn simple_tree() -> FilterTree {
    FilterTree::contacts(vec![
        DimensionFilter::new("email", "contains").with_strings(["acme"])
    ])
}

fn medium_tree() -> FilterTree {
    FilterTree::and(vec![
        FilterTree::contacts(vec![
            DimensionFilter::new("country", "equals").with_strings(["FR"]),
            DimensionFilter::new("lifetime_value", "gte").with_numbers([100.0]),
        ]),
        FilterTree::membership(MembershipCondition {
            list_id: "newsletter".to_string(),
            status: Some("active".to_string()),
            operator: None,
        }),
    ])
}

fn complex_tree() -> FilterTree {
    FilterTree::or(vec![
        medium_tree(),
        FilterTree::and(vec![
            FilterTree::timeline(TimelineCondition {
                kind: "purchase".to_string(),
                count_operator: "at_least".to_string(),
                count_value: 3,
                timeframe_operator: Some("in_the_last_days".to_string()),
                timeframe_values: vec!["30".to_string()],
                filters: vec![DimensionFilter::new("lifetime_value", "gt")
                    .with_type("number")
                    .with_numbers([20.0])],
            }),
            FilterTree::contacts(vec![DimensionFilter::new("created_at", "in_date_range")
                .with_strings(["2024-01-01", "2024-12-31"])]),
        ]),
    ])
}

// 深度嵌套的分支, 用于观察递归开销
fn deep_tree(depth: usize) -> FilterTree {
    let mut tree = simple_tree();
    for i in 0..depth {
        tree = if i % 2 == 0 {
            FilterTree::and(vec![tree, simple_tree()])
        } else {
            FilterTree::or(vec![tree, simple_tree()])
        };
    }
    tree
}

// 基准测试：SQL编译性能
fn benchmark_sql_compiler(c: &mut Criterion) {
    let compiler = SqlCompiler::new();
    let test_cases = vec![
        ("simple", simple_tree()),
        ("medium", medium_tree()),
        ("complex", complex_tree()),
        ("deep_16", deep_tree(16)),
    ];

    let mut group = c.benchmark_group("sql_compiler_performance");

    for (name, tree) in &test_cases {
        group.bench_with_input(BenchmarkId::new("compile", name), tree, |b, tree| {
            b.iter(|| match compiler.compile(black_box(tree)) {
                Ok(result) => black_box(result),
                Err(e) => panic!("编译失败: {}", e),
            })
        });
    }

    group.finish();
}

// 基准测试：从JSON解码到SQL的完整流程
fn benchmark_end_to_end(c: &mut Criterion) {
    let compiler = SqlCompiler::new();
    let test_cases = vec![
        ("simple", simple_tree()),
        ("complex", complex_tree()),
    ];

    let mut group = c.benchmark_group("end_to_end_performance");

    for (name, tree) in test_cases {
        let json = serde_json::to_string(&tree).expect("过滤树应该可以序列化");
        group.bench_with_input(BenchmarkId::new("compile_json", name), &json, |b, json| {
            b.iter(|| {
                let result = compiler.compile_json(black_box(json)).expect("编译应该成功");
                black_box(result)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_sql_compiler, benchmark_end_to_end);
criterion_main!(benches);
