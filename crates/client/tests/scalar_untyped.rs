use arrow_schema::DataType;
use flowq_client::{cast, div, lit_i64, scalar, scalar_pos, untyped_schema, DataFrame, Engine};
use flowq_common::ErrorCode;

#[path = "support/mod.rs"]
mod support;

/// `A = LOAD 'table_noschema';` plus a one-row `scalar` relation.
fn setup(engine: &Engine, scalar_schema: bool) {
    engine
        .register_delimited("table_noschema", support::A_ROWS)
        .expect("register A");
    engine
        .register_delimited("table_noschema_scalar", "1\t5\n")
        .expect("register scalar");
    engine
        .define("A", DataFrame::load("table_noschema", None))
        .expect("define A");
    let schema = scalar_schema.then(|| untyped_schema(&["count", "total"]));
    engine
        .define("scalar", DataFrame::load("table_noschema_scalar", schema))
        .expect("define scalar");
}

fn define_ratio(engine: &Engine, divisor: flowq_planner::Expr) {
    engine
        .define(
            "Y",
            DataFrame::relation("A").project(vec![(div(lit_i64(5), divisor), "ratio")]),
        )
        .expect("define Y");
}

#[tokio::test]
async fn untyped_named_scalar_field_needs_a_cast() {
    let engine = support::engine();
    setup(&engine, true);
    define_ratio(&engine, scalar("scalar", "total"));

    let err = engine.open("Y").await.expect_err("untyped operand");
    assert_eq!(err.code(), Some(ErrorCode::IncompatibleScalarOperand));
    assert_eq!(ErrorCode::IncompatibleScalarOperand.as_u32(), 1039);
    assert!(engine.explain("Y").is_err());
}

#[tokio::test]
async fn cast_named_scalar_field_divides() {
    let engine = support::engine();
    setup(&engine, true);
    define_ratio(&engine, cast(scalar("scalar", "total"), DataType::Int32));

    let out = engine.open("Y").await.expect("open");
    assert_eq!(support::tuples(&out), vec!["(1)", "(1)", "(1)"]);
}

#[tokio::test]
async fn untyped_positional_scalar_field_needs_a_cast() {
    let engine = support::engine();
    setup(&engine, false);
    define_ratio(&engine, scalar_pos("scalar", 1));

    let err = engine.open("Y").await.expect_err("untyped operand");
    assert_eq!(err.code(), Some(ErrorCode::IncompatibleScalarOperand));
}

#[tokio::test]
async fn cast_positional_scalar_field_divides() {
    let engine = support::engine();
    setup(&engine, false);
    define_ratio(&engine, cast(scalar_pos("scalar", 1), DataType::Int32));

    let out = engine.open("Y").await.expect("open");
    assert_eq!(support::tuples(&out), vec!["(1)", "(1)", "(1)"]);
}

#[tokio::test]
async fn named_field_of_schemaless_scalar_is_unresolved() {
    let engine = support::engine();
    setup(&engine, false);
    define_ratio(&engine, cast(scalar("scalar", "total"), DataType::Int32));

    let err = engine.open("Y").await.expect_err("no schema to resolve against");
    assert_eq!(err.code(), Some(ErrorCode::UnresolvedScalarField));
}

#[tokio::test]
async fn position_past_raw_row_width_binds_null() {
    let engine = support::engine();
    setup(&engine, false);
    define_ratio(&engine, cast(scalar_pos("scalar", 7), DataType::Int32));

    let out = engine.open("Y").await.expect("open");
    assert_eq!(support::tuples(&out), vec!["()", "()", "()"]);
}

#[tokio::test]
async fn untyped_scalar_stays_untyped_when_projected_alone() {
    let engine = support::engine();
    setup(&engine, true);
    engine
        .define(
            "Y",
            DataFrame::relation("A").project(vec![(scalar("scalar", "total"), "total")]),
        )
        .expect("define Y");

    let out = engine.open("Y").await.expect("open");
    assert_eq!(out.schema.field(0).data_type(), &DataType::Binary);
    assert_eq!(support::tuples(&out), vec!["(5)", "(5)", "(5)"]);
}
