#![allow(dead_code)]

use arrow_schema::DataType;
use flowq_client::{
    count, init_tracing, max, mul, pos, render_tuples, scalar, typed_schema, DataFrame, Engine,
    OutputResult,
};
use flowq_client::{col, div};
use flowq_common::EngineConfig;

/// Three rows shared by most scalar scripts.
pub const A_ROWS: &str = "1\t5\n2\t10\n3\t20\n";

pub fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> Engine {
    init_tracing();
    Engine::new(config).expect("engine")
}

pub fn tuples(result: &OutputResult) -> Vec<String> {
    render_tuples(&result.batches).expect("render rows")
}

/// `A = LOAD 'source' AS (a0: long, a1: double);`
pub fn define_typed_a(engine: &Engine, source: &str, rows: &str) {
    engine.register_delimited(source, rows).expect("register");
    engine
        .define(
            "A",
            DataFrame::load(
                source,
                Some(typed_schema(&[("a0", DataType::Int64), ("a1", DataType::Float64)])),
            ),
        )
        .expect("define A");
}

/// `B = GROUP A ALL; C = FOREACH B GENERATE COUNT(A) AS count, MAX(A.$1) AS max;`
pub fn define_count_max(engine: &Engine, alias: &str) {
    engine
        .define(
            alias,
            DataFrame::relation("A")
                .group_all(vec![(count(pos(0)), "count"), (max(pos(1)), "max")]),
        )
        .expect("define scalar");
}

/// `Y = FOREACH A GENERATE (a0 * C.count), (a1 / C.max);`
pub fn define_scaled(engine: &Engine, alias: &str, scalar_alias: &str) {
    engine
        .define(
            alias,
            DataFrame::relation("A").project(vec![
                (mul(col("a0"), scalar(scalar_alias, "count")), "x"),
                (div(col("a1"), scalar(scalar_alias, "max")), "y"),
            ]),
        )
        .expect("define consumer");
}

/// Load a stored table back with a declared schema and return its rows.
pub async fn reload(engine: &Engine, stored: &str, fields: &[(&str, DataType)]) -> Vec<String> {
    let alias = format!("reload_{stored}");
    engine
        .define(&alias, DataFrame::load(stored, Some(typed_schema(fields))))
        .expect("define reload");
    let out = engine.open(&alias).await.expect("reload");
    tuples(&out)
}

/// Times the side input registered under `alias` was materialized, over all executions.
pub fn materializations(engine: &Engine, alias: &str) -> u64 {
    counter_total(engine, "flowq_scalar_materializations_total", &[("alias", alias)])
}

/// Failures of the side input `alias` recorded under `reason`, over all executions.
pub fn scalar_failures(engine: &Engine, alias: &str, reason: &str) -> u64 {
    counter_total(
        engine,
        "flowq_scalar_failures_total",
        &[("alias", alias), ("reason", reason)],
    )
}

fn counter_total(engine: &Engine, name: &str, labels: &[(&str, &str)]) -> u64 {
    let prefix = format!("{name}{{");
    let labels = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>();
    engine
        .prometheus_metrics()
        .lines()
        .filter(|l| l.starts_with(&prefix) && labels.iter().all(|label| l.contains(label)))
        .filter_map(|l| l.rsplit(' ').next())
        .filter_map(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .sum()
}
