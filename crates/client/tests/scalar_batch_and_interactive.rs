use arrow_schema::DataType;
use flowq_client::{add, col, mul, scalar, DataFrame};

#[path = "support/mod.rs"]
mod support;

const Y_ROWS: [&str; 3] = ["(3,0.25)", "(6,0.5)", "(9,1.0)"];
const Z_ROWS: [&str; 3] = ["(8.0,20.0)", "(13.0,40.0)", "(23.0,60.0)"];

fn define_second_consumer(engine: &flowq_client::Engine) {
    // Z = foreach A generate (a1 + C.count), (a0 * C.max);
    engine
        .define(
            "Z",
            DataFrame::relation("A").project(vec![
                (add(col("a1"), scalar("C", "count")), "p"),
                (mul(col("a0"), scalar("C", "max")), "q"),
            ]),
        )
        .expect("define Z");
}

#[tokio::test]
async fn stored_scalar_output_reloads_in_batch_and_interactive_mode() {
    for batch in [true, false] {
        let engine = support::engine();
        support::define_typed_a(&engine, "table_batch_nobatch", support::A_ROWS);
        support::define_count_max(&engine, "C");
        support::define_scaled(&engine, "Y", "C");

        engine.set_batch_mode(batch);
        let stored = engine.store("Y", "y_out").await.expect("store");
        if batch {
            assert!(stored.is_none());
            assert_eq!(engine.pending_statements().expect("pending"), 1);
            let results = engine.execute_batch().await.expect("batch");
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].rows, 3);
        } else {
            assert_eq!(stored.expect("interactive store runs").rows, 3);
        }

        let rows = support::reload(
            &engine,
            "y_out",
            &[("a0", DataType::Int32), ("a1", DataType::Float64)],
        )
        .await;
        assert_eq!(rows, Y_ROWS, "batch_mode={batch}");
    }
}

#[tokio::test]
async fn two_stores_share_one_scalar_in_a_batch() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_multiple", support::A_ROWS);
    support::define_count_max(&engine, "C");
    support::define_scaled(&engine, "Y", "C");
    define_second_consumer(&engine);

    engine.set_batch_mode(true);
    engine.store("Y", "out_y").await.expect("queue Y");
    engine.store("Z", "out_z").await.expect("queue Z");
    let plan = engine.explain_batch().expect("explain");
    assert_eq!(plan.matches("SideInput ").count(), 1, "{plan}");

    let results = engine.execute_batch().await.expect("batch");
    assert_eq!(results.len(), 2);
    assert_eq!(engine.pending_statements().expect("pending"), 0);
    assert_eq!(support::materializations(&engine, "C"), 1);

    let y = support::reload(
        &engine,
        "out_y",
        &[("a0", DataType::Int32), ("a1", DataType::Float64)],
    )
    .await;
    assert_eq!(y, Y_ROWS);
    let z = support::reload(
        &engine,
        "out_z",
        &[("a0", DataType::Float64), ("a1", DataType::Float64)],
    )
    .await;
    assert_eq!(z, Z_ROWS);
}

#[tokio::test]
async fn batching_changes_materializations_but_not_results() {
    let batched = support::engine();
    let interactive = support::engine();
    for engine in [&batched, &interactive] {
        support::define_typed_a(engine, "table_equivalence", support::A_ROWS);
        support::define_count_max(engine, "C");
        support::define_scaled(engine, "Y", "C");
        define_second_consumer(engine);
    }

    batched.set_batch_mode(true);
    batched.store("Y", "out_y").await.expect("queue");
    batched.store("Z", "out_z").await.expect("queue");
    batched.execute_batch().await.expect("batch");

    interactive.store("Y", "out_y").await.expect("store Y");
    interactive.store("Z", "out_z").await.expect("store Z");

    for table in ["out_y", "out_z"] {
        assert_eq!(
            batched.read_table(table).expect("batched rows"),
            interactive.read_table(table).expect("interactive rows"),
            "{table}"
        );
    }
    assert_eq!(support::materializations(&batched, "C"), 1);
    assert_eq!(support::materializations(&interactive, "C"), 2);
}

#[tokio::test]
async fn identical_scalar_definitions_share_one_side_input() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_dedup", support::A_ROWS);
    support::define_count_max(&engine, "C");
    support::define_count_max(&engine, "C2");
    support::define_scaled(&engine, "Y", "C");
    support::define_scaled(&engine, "W", "C2");

    engine.set_batch_mode(true);
    engine.store("Y", "out_y").await.expect("queue");
    engine.store("W", "out_w").await.expect("queue");
    let plan = engine.explain_batch().expect("explain");
    assert_eq!(plan.matches("SideInput ").count(), 1, "{plan}");
    assert!(plan.contains("consumers=[\"Y\", \"W\"]"), "{plan}");
    assert!(plan.contains("== Stages ==\nroots [0]\n"), "{plan}");
    assert!(plan.contains("stage 1 output Y after [0]"), "{plan}");
    assert!(plan.contains("stage 2 output W after [0]"), "{plan}");

    engine.execute_batch().await.expect("batch");
    assert_eq!(
        engine.read_table("out_y").expect("Y"),
        engine.read_table("out_w").expect("W")
    );
}

#[tokio::test]
async fn interactive_statements_reevaluate_scalars() {
    let engine = support::engine();
    support::define_typed_a(&engine, "table_reeval", support::A_ROWS);
    support::define_count_max(&engine, "C");
    support::define_scaled(&engine, "Y", "C");

    let first = engine.open("Y").await.expect("first open");
    assert_eq!(support::tuples(&first), Y_ROWS);

    engine
        .register_delimited("table_reeval", "1\t5\n2\t10\n3\t20\n4\t40\n")
        .expect("replace data");
    let second = engine.open("Y").await.expect("second open");
    assert_eq!(
        support::tuples(&second),
        vec!["(4,0.125)", "(8,0.25)", "(12,0.5)", "(16,1.0)"]
    );
    assert_eq!(support::materializations(&engine, "C"), 2);
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let engine = support::engine();
    engine.set_batch_mode(true);
    assert!(engine.config().batch_mode);
    assert!(engine.execute_batch().await.expect("empty batch").is_empty());
}
