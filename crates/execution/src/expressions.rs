//! Expression compilation and evaluation for execution operators.
//!
//! Input contract:
//! - analyzer has resolved and typed expressions (columns are `ColumnRef`,
//!   implicit casts are explicit);
//! - scalar placeholders are compiled against the bindings of the enclosing
//!   `ScalarBroadcast`.
//!
//! Output contract:
//! - each evaluation returns an `ArrayRef` aligned to the input batch row count.

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Builder, Int64Array,
    Int64Builder, Scalar, StringArray, StringBuilder, UInt32Array,
};
use arrow::compute::kernels::{
    boolean::{and_kleene, not, or_kleene},
    cast::cast,
    cmp::{eq, gt, gt_eq, lt, lt_eq, neq},
    concat_elements::concat_elements_utf8,
    nullif::nullif,
    numeric::{add, div, mul, sub},
    take::take,
};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, SchemaRef};
use flowq_common::{FlowqError, Result};
use flowq_planner::{is_untyped, BinaryOp, Expr, LiteralValue, PlaceholderBinding};

use crate::scalar_broadcast::{ScalarBinding, ScalarBindings};

/// Executable expression for the execution engine.
///
/// - planner/analyzer produces `Expr` trees
/// - execution compiles `Expr` -> `PhysicalExpr` against the runtime input schema
/// - evaluation returns an Arrow `ArrayRef` aligned with the input RecordBatch length
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression for every row in `batch`.
    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef>;
}

/// Compile an analyzed `Expr` into a runnable expression.
///
/// Positions past the end of a schema-less input evaluate to null `bytearray`
/// values. Placeholders must have a binding in `bindings`.
pub fn compile_expr(
    expr: &Expr,
    input_schema: &SchemaRef,
    bindings: &ScalarBindings,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::ColumnRef { index, .. } | Expr::Position(index) => Ok(column(*index, input_schema)),
        Expr::Column(name) => {
            let idx = input_schema
                .fields()
                .iter()
                .position(|f| f.name() == name)
                .ok_or_else(|| {
                    FlowqError::Planning(format!("unknown column in execution: {name}"))
                })?;
            Ok(column(idx, input_schema))
        }

        Expr::Literal(v) => Ok(Arc::new(LiteralExpr {
            v: v.clone(),
            dt: literal_type(v),
        })),

        Expr::Cast { expr, to_type } => {
            let inner = compile_expr(expr, input_schema, bindings)?;
            Ok(Arc::new(CastExpr {
                inner,
                to_type: to_type.clone(),
            }))
        }

        Expr::Not(e) => {
            let inner = compile_expr(e, input_schema, bindings)?;
            Ok(Arc::new(NotExpr { inner }))
        }

        Expr::And(a, b) | Expr::Or(a, b) => {
            let left = compile_expr(a, input_schema, bindings)?;
            let right = compile_expr(b, input_schema, bindings)?;
            let op = if matches!(expr, Expr::And(..)) {
                BoolOp::And
            } else {
                BoolOp::Or
            };
            Ok(Arc::new(BoolBinaryExpr { left, right, op }))
        }

        Expr::BinaryOp { left, op, right } => {
            let l = compile_expr(left, input_schema, bindings)?;
            let r = compile_expr(right, input_schema, bindings)?;
            let out = binary_out_type(*op, l.data_type(), r.data_type())?;
            Ok(Arc::new(BinaryExpr {
                left: l,
                right: r,
                op: *op,
                out,
            }))
        }

        Expr::Placeholder(p) => {
            let binding = bindings.get(p.side_input).ok_or_else(|| {
                FlowqError::Execution(format!(
                    "scalar {}.${} read outside a broadcast of {}",
                    p.alias, p.index, p.side_input
                ))
            })?;
            Ok(Arc::new(PlaceholderExpr::new(p, binding)?))
        }

        Expr::ScalarRef { alias, field } => Err(FlowqError::Planning(format!(
            "scalar reference {alias}.{field} reached execution without being rewritten"
        ))),
        Expr::RelationRef(alias) => Err(FlowqError::scalar_projection_only(alias)),
    }
}

fn column(index: usize, schema: &SchemaRef) -> Arc<dyn PhysicalExpr> {
    match schema.fields().get(index) {
        Some(f) => Arc::new(ColumnExpr {
            index,
            dt: f.data_type().clone(),
        }),
        None => Arc::new(NullExpr {
            dt: DataType::Binary,
        }),
    }
}

// =====================
// Standard expressions
// =====================

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        if self.index >= batch.num_columns() {
            return Ok(new_null_array(&self.dt, batch.num_rows()));
        }
        Ok(batch.column(self.index).clone())
    }
}

struct NullExpr {
    dt: DataType,
}

impl PhysicalExpr for NullExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        Ok(new_null_array(&self.dt, batch.num_rows()))
    }
}

struct LiteralExpr {
    v: LiteralValue,
    dt: DataType,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        scalar_to_array(&self.v, batch.num_rows())
    }
}

struct CastExpr {
    inner: Arc<dyn PhysicalExpr>,
    to_type: DataType,
}

impl PhysicalExpr for CastExpr {
    fn data_type(&self) -> DataType {
        self.to_type.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        cast_value(&arr, &self.to_type)
    }
}

/// Cast with untyped bytes read as text first; unparsable values become null.
pub fn cast_value(arr: &ArrayRef, to_type: &DataType) -> Result<ArrayRef> {
    if arr.data_type() == to_type {
        return Ok(arr.clone());
    }
    let source = if is_untyped(arr.data_type()) && !is_untyped(to_type) {
        cast(arr, &DataType::Utf8)
            .map_err(|e| FlowqError::Execution(format!("bytearray is not valid text: {e}")))?
    } else {
        arr.clone()
    };
    cast(&source, to_type).map_err(|e| FlowqError::Execution(format!("cast failed: {e}")))
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let b = arr
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| FlowqError::Execution("NOT expects boolean".to_string()))?;

        let out = not(b).map_err(|e| FlowqError::Execution(format!("not failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;

        let lb = l
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| FlowqError::Execution("AND/OR expects boolean".to_string()))?;
        let rb = r
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| FlowqError::Execution("AND/OR expects boolean".to_string()))?;

        let out = match self.op {
            BoolOp::And => and_kleene(lb, rb),
            BoolOp::Or => or_kleene(lb, rb),
        }
        .map_err(|e| FlowqError::Execution(format!("boolean kernel failed: {e}")))?;

        Ok(Arc::new(out))
    }
}

struct BinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
    out: DataType,
}

impl PhysicalExpr for BinaryExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;

        match self.op {
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                eval_arith(self.op, &l, &r)
            }
            BinaryOp::Concat => eval_concat(&l, &r),
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => eval_cmp(self.op, &l, &r),
        }
    }
}

/// Reads one field of a frozen scalar row; every input row sees the same value.
struct PlaceholderExpr {
    /// One-element array, or `None` when the scalar relation was empty.
    value: Option<ArrayRef>,
    dt: DataType,
}

impl PlaceholderExpr {
    fn new(p: &PlaceholderBinding, binding: &ScalarBinding) -> Result<Self> {
        let value = match binding {
            ScalarBinding::Empty => None,
            ScalarBinding::Row(row) if p.index < row.num_columns() => {
                Some(cast_value(row.column(p.index), &p.data_type)?)
            }
            // Raw scalar rows may be shorter than the referenced position.
            ScalarBinding::Row(_) => None,
        };
        Ok(Self {
            value,
            dt: p.data_type.clone(),
        })
    }
}

impl PhysicalExpr for PlaceholderExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let len = batch.num_rows();
        let Some(value) = &self.value else {
            return Ok(new_null_array(&self.dt, len));
        };
        let indices = UInt32Array::from(vec![0_u32; len]);
        take(value.as_ref(), &indices, None)
            .map_err(|e| FlowqError::Execution(format!("scalar broadcast failed: {e}")))
    }
}

// ------------------ helpers ------------------

fn literal_type(v: &LiteralValue) -> DataType {
    match v {
        LiteralValue::Int64(_) => DataType::Int64,
        LiteralValue::Float64(_) => DataType::Float64,
        LiteralValue::Utf8(_) => DataType::Utf8,
        LiteralValue::Boolean(_) => DataType::Boolean,
        LiteralValue::Null => DataType::Null,
    }
}

fn scalar_to_array(v: &LiteralValue, len: usize) -> Result<ArrayRef> {
    match v {
        LiteralValue::Int64(x) => {
            let mut b = Int64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Float64(x) => {
            let mut b = Float64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Boolean(x) => {
            let mut b = BooleanBuilder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Utf8(s) => {
            let mut b = StringBuilder::with_capacity(len, s.len() * len);
            for _ in 0..len {
                b.append_value(s);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Null => Ok(new_null_array(&DataType::Null, len)),
    }
}

fn binary_out_type(op: BinaryOp, l: DataType, r: DataType) -> Result<DataType> {
    if op.is_comparison() {
        return Ok(DataType::Boolean);
    }
    if op == BinaryOp::Concat {
        return Ok(DataType::Utf8);
    }
    if l != r {
        return Err(FlowqError::Planning(format!(
            "execution expects casts inserted by analyzer; got {l:?} vs {r:?}"
        )));
    }
    Ok(l)
}

fn eval_arith(op: BinaryOp, l: &ArrayRef, r: &ArrayRef) -> Result<ArrayRef> {
    let res = match op {
        BinaryOp::Plus => add(l, r),
        BinaryOp::Minus => sub(l, r),
        BinaryOp::Multiply => mul(l, r),
        BinaryOp::Divide => {
            // Division by zero yields null, for integers and floats alike.
            let divisor = null_zero_divisors(r)?;
            div(l, &divisor)
        }
        other => {
            return Err(FlowqError::Execution(format!(
                "{} is not arithmetic",
                other.display_name()
            )))
        }
    }
    .map_err(|e| FlowqError::Execution(format!("arith kernel failed: {e}")))?;
    Ok(res)
}

fn null_zero_divisors(r: &ArrayRef) -> Result<ArrayRef> {
    let zero = cast(&(Arc::new(Int64Array::from(vec![0_i64])) as ArrayRef), r.data_type())
        .map_err(|e| FlowqError::Execution(format!("zero divisor literal failed: {e}")))?;
    let is_zero = eq(r, &Scalar::new(zero))
        .map_err(|e| FlowqError::Execution(format!("cmp kernel failed: {e}")))?;
    nullif(r.as_ref(), &is_zero)
        .map_err(|e| FlowqError::Execution(format!("nullif kernel failed: {e}")))
}

fn eval_concat(l: &ArrayRef, r: &ArrayRef) -> Result<ArrayRef> {
    let la = l
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| FlowqError::Execution("CONCAT expects chararray".to_string()))?;
    let ra = r
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| FlowqError::Execution("CONCAT expects chararray".to_string()))?;
    let out = concat_elements_utf8(la, ra)
        .map_err(|e| FlowqError::Execution(format!("concat kernel failed: {e}")))?;
    Ok(Arc::new(out))
}

fn eval_cmp(op: BinaryOp, l: &ArrayRef, r: &ArrayRef) -> Result<ArrayRef> {
    if l.data_type() != r.data_type() {
        return Err(FlowqError::Execution(format!(
            "comparison operands differ: {:?} vs {:?}",
            l.data_type(),
            r.data_type()
        )));
    }
    let res = match op {
        BinaryOp::Eq => eq(l, r),
        BinaryOp::NotEq => neq(l, r),
        BinaryOp::Lt => lt(l, r),
        BinaryOp::LtEq => lt_eq(l, r),
        BinaryOp::Gt => gt(l, r),
        BinaryOp::GtEq => gt_eq(l, r),
        other => {
            return Err(FlowqError::Execution(format!(
                "{} is not a comparison",
                other.display_name()
            )))
        }
    }
    .map_err(|e| FlowqError::Execution(format!("cmp kernel failed: {e}")))?;
    Ok(Arc::new(res))
}
