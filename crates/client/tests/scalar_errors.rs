use flowq_client::{col, count, gt, mul, pos, relation, scalar, scalar_pos, DataFrame};
use flowq_common::{EngineConfig, ErrorCode, FlowqError};

#[path = "support/mod.rs"]
mod support;

#[tokio::test]
async fn whole_relation_as_value_is_rejected() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_grammar", support::A_ROWS);
    support::define_count_max(&engine, "C");
    // Y = FOREACH A GENERATE C;
    engine
        .define(
            "Y",
            DataFrame::relation("A").project(vec![(relation("C"), "c")]),
        )
        .expect("define Y");

    let err = engine.open("Y").await.expect_err("relation used as a value");
    assert_eq!(err.code(), Some(ErrorCode::ScalarProjectionOnly));
    assert!(
        err.to_string()
            .contains("scalars may only be used via field projection"),
        "{err}"
    );
}

#[tokio::test]
async fn mutually_dependent_scalars_report_the_cycle() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_cycle", support::A_ROWS);
    engine
        .define(
            "C",
            DataFrame::relation("A").project(vec![(scalar_pos("D", 0), "d")]),
        )
        .expect("define C");
    engine
        .define(
            "D",
            DataFrame::relation("A").filter(gt(col("a0"), scalar_pos("C", 0))),
        )
        .expect("define D");

    let err = engine.open("C").await.expect_err("cycle");
    assert_eq!(err.code(), Some(ErrorCode::CyclicScalarDependency));
    match err {
        FlowqError::Cycle { chain, .. } => assert_eq!(chain, vec!["C", "D", "C"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(support::materializations(&engine, "C"), 0);
}

#[tokio::test]
async fn direct_self_reference_reports_the_cycle() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_self_cycle", support::A_ROWS);
    // C = FOREACH A GENERATE a0 * C.$0;
    engine
        .define(
            "C",
            DataFrame::relation("A").project(vec![(mul(col("a0"), scalar_pos("C", 0)), "x")]),
        )
        .expect("define C");

    let err = engine.open("C").await.expect_err("self reference");
    assert_eq!(err.code().map(ErrorCode::as_u32), Some(1201));
    match err {
        FlowqError::Cycle { chain, .. } => assert_eq!(chain, vec!["C", "C"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_scalar_subtree_cancels_its_consumers() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_subtree_failure", support::A_ROWS);
    engine
        .define(
            "S",
            DataFrame::load("missing_table", None).group_all(vec![(count(pos(0)), "count")]),
        )
        .expect("define S");
    engine
        .define(
            "Y",
            DataFrame::relation("A").project(vec![(mul(col("a0"), scalar("S", "count")), "x")]),
        )
        .expect("define Y");

    let err = engine.open("Y").await.expect_err("scalar subtree fails");
    assert_eq!(err.code(), Some(ErrorCode::ScalarCancelled));
    assert!(err.to_string().contains("missing_table"), "{err}");
    assert_eq!(support::scalar_failures(&engine, "S", "subtree"), 1);
    assert_eq!(support::materializations(&engine, "S"), 1);
}

#[tokio::test]
async fn oversized_row_is_counted_under_its_own_reason() {
    let engine = support::engine_with(EngineConfig {
        max_scalar_row_bytes: 4,
        ..EngineConfig::default()
    });
    support::define_typed_a(&engine, "table_oversized_reason", support::A_ROWS);
    support::define_count_max(&engine, "C");
    support::define_scaled(&engine, "Y", "C");

    engine.open("Y").await.expect_err("row too large");
    assert_eq!(support::scalar_failures(&engine, "C", "row_size"), 1);
    assert_eq!(support::scalar_failures(&engine, "C", "freeze"), 0);
}

#[tokio::test]
async fn multi_row_scalar_is_a_cardinality_error() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_cardinality", support::A_ROWS);
    engine
        .define(
            "Y",
            DataFrame::relation("A").project(vec![(mul(col("a0"), scalar("A", "a0")), "x")]),
        )
        .expect("define Y");

    let err = engine.store("Y", "out_cardinality").await.expect_err("3 rows");
    assert_eq!(err.code(), Some(ErrorCode::ScalarCardinality));
    assert_eq!(err.code().map(ErrorCode::as_u32), Some(2100));
    assert!(!engine
        .list_tables()
        .expect("tables")
        .contains(&"out_cardinality".to_string()));
}

#[tokio::test]
async fn failing_output_does_not_stop_independent_outputs() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_independent", support::A_ROWS);
    support::define_count_max(&engine, "C");
    support::define_scaled(&engine, "Y", "C");
    engine
        .define(
            "Bad",
            DataFrame::relation("A").project(vec![(mul(col("a0"), scalar("A", "a1")), "x")]),
        )
        .expect("define Bad");

    engine.set_batch_mode(true);
    engine.store("Y", "out_good").await.expect("queue Y");
    engine.store("Bad", "out_bad").await.expect("queue Bad");
    let err = engine.execute_batch().await.expect_err("Bad fails");
    assert_eq!(err.code(), Some(ErrorCode::ScalarCardinality));
    assert_eq!(engine.pending_statements().expect("pending"), 0);

    let tables = engine.list_tables().expect("tables");
    assert!(tables.contains(&"out_good".to_string()), "{tables:?}");
    assert!(!tables.contains(&"out_bad".to_string()), "{tables:?}");
    assert_eq!(
        engine.read_table("out_good").expect("good rows"),
        "3\t0.25\n6\t0.5\n9\t1.0\n"
    );
}

#[tokio::test]
async fn oversized_scalar_row_cancels_consumers() {
    let engine = support::engine_with(EngineConfig {
        max_scalar_row_bytes: 4,
        ..EngineConfig::default()
    });
    support::define_typed_a(&engine, "table_oversized", support::A_ROWS);
    support::define_count_max(&engine, "C");
    support::define_scaled(&engine, "Y", "C");

    let err = engine.open("Y").await.expect_err("row too large");
    assert_eq!(err.code(), Some(ErrorCode::ScalarCancelled));
}

#[tokio::test]
async fn unknown_scalar_alias_is_a_planning_error() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_unknown", support::A_ROWS);
    support::define_scaled(&engine, "Y", "Missing");

    let err = engine.open("Y").await.expect_err("no such alias");
    assert!(err.code().is_none(), "{err}");
    assert!(err.to_string().contains("Missing"), "{err}");
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let err = flowq_client::Engine::new(EngineConfig {
        task_parallelism: 0,
        ..EngineConfig::default()
    })
    .err()
    .expect("invalid config");
    assert!(matches!(err, FlowqError::InvalidConfig(_)), "{err}");
}
