use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-checkable diagnostic codes.
///
/// Numeric values are part of the public contract: tests and callers match on
/// them instead of on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Field name could not be resolved on a scalar relation.
    UnresolvedScalarField,
    /// Untyped scalar field combined with a typed operand.
    IncompatibleScalarOperand,
    /// Ordinary operand/type mismatch that does not involve a scalar.
    TypeMismatch,
    /// A relation alias was used as a whole tuple instead of a field projection.
    ScalarProjectionOnly,
    /// A relation (transitively) uses itself as a scalar.
    CyclicScalarDependency,
    /// Scalar relation produced more than one row.
    ScalarCardinality,
    /// Scalar side-input failed or was cancelled before binding.
    ScalarCancelled,
}

impl ErrorCode {
    /// Numeric code reported through the diagnostics channel.
    pub fn as_u32(self) -> u32 {
        match self {
            ErrorCode::UnresolvedScalarField => 1025,
            ErrorCode::IncompatibleScalarOperand => 1039,
            ErrorCode::TypeMismatch => 1059,
            ErrorCode::ScalarProjectionOnly => 1200,
            ErrorCode::CyclicScalarDependency => 1201,
            ErrorCode::ScalarCardinality => 2100,
            ErrorCode::ScalarCancelled => 2101,
        }
    }

    /// Symbolic name, handy in logs.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::UnresolvedScalarField => "E_SCALAR_UNRESOLVED_FIELD",
            ErrorCode::IncompatibleScalarOperand => "E_SCALAR_INCOMPATIBLE_OPERAND",
            ErrorCode::TypeMismatch => "E_TYPE_MISMATCH",
            ErrorCode::ScalarProjectionOnly => "E_SCALAR_PROJECTION_ONLY",
            ErrorCode::CyclicScalarDependency => "E_SCALAR_CYCLE",
            ErrorCode::ScalarCardinality => "E_SCALAR_ROW_VIOLATION",
            ErrorCode::ScalarCancelled => "E_SCALAR_CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u32(), self.name())
    }
}

/// Canonical flowq error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FlowqError::Resolution`], [`FlowqError::TypeCheck`], [`FlowqError::Cycle`]:
///   compile-time failures; they abort the whole compiled unit
/// - [`FlowqError::Cardinality`], [`FlowqError::Cancelled`]: runtime failures of a
///   scalar side-input; every consumer of that side-input fails with them
/// - [`FlowqError::Planning`]: other query shape/name issues found before execution
/// - [`FlowqError::Execution`]: runtime operator evaluation failures
/// - [`FlowqError::InvalidConfig`]: configuration/catalog contract violations
/// - [`FlowqError::Unsupported`]: valid but intentionally unimplemented shapes
/// - [`FlowqError::Io`]: raw std IO failures
#[derive(Debug, Error)]
pub enum FlowqError {
    /// Invalid or inconsistent configuration/catalog state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Planning failures outside the scalar taxonomy.
    ///
    /// Examples:
    /// - unknown column or alias
    /// - non-boolean filter predicate
    #[error("planning error: {0}")]
    Planning(String),

    /// Runtime execution failures after planning succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid request for a feature/shape not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Scalar reference could not be resolved to a field.
    ///
    /// Examples:
    /// - `scalar.total` where `scalar` has no schema
    /// - `C` used as a whole tuple
    #[error("resolution error [{code}]: {message}")]
    Resolution {
        /// Stable diagnostic code.
        code: ErrorCode,
        /// Human readable message.
        message: String,
    },

    /// Expression type checking failed.
    ///
    /// Scalar misuse ([`ErrorCode::IncompatibleScalarOperand`]) and generic
    /// mismatches ([`ErrorCode::TypeMismatch`]) share this channel and differ by code.
    #[error("type check error [{code}]: {message}")]
    TypeCheck {
        /// Stable diagnostic code.
        code: ErrorCode,
        /// Human readable message.
        message: String,
    },

    /// A relation transitively uses itself as a scalar.
    #[error("cyclic scalar dependency [{code}]: {}", chain.join(" -> "))]
    Cycle {
        /// Stable diagnostic code.
        code: ErrorCode,
        /// Alias chain, first and last entries name the same alias.
        chain: Vec<String>,
    },

    /// Scalar relation materialized more than one row.
    #[error("scalar cardinality error [{code}]: {message}")]
    Cardinality {
        /// Stable diagnostic code.
        code: ErrorCode,
        /// Scalar relation alias.
        alias: String,
        /// Number of rows observed.
        rows: usize,
        /// Human readable message.
        message: String,
    },

    /// Scalar side-input failed upstream or was cancelled before binding.
    #[error("scalar side-input cancelled [{code}]: {message}")]
    Cancelled {
        /// Stable diagnostic code.
        code: ErrorCode,
        /// Human readable message.
        message: String,
    },
}

impl FlowqError {
    /// Diagnostic code for taxonomy errors, `None` for generic ones.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            FlowqError::Resolution { code, .. }
            | FlowqError::TypeCheck { code, .. }
            | FlowqError::Cycle { code, .. }
            | FlowqError::Cardinality { code, .. }
            | FlowqError::Cancelled { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// `true` for failures detected before any execution started.
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            FlowqError::Resolution { .. }
                | FlowqError::TypeCheck { .. }
                | FlowqError::Cycle { .. }
                | FlowqError::Planning(_)
        )
    }

    pub fn unresolved_scalar_field(message: impl Into<String>) -> Self {
        FlowqError::Resolution {
            code: ErrorCode::UnresolvedScalarField,
            message: message.into(),
        }
    }

    pub fn scalar_projection_only(alias: &str) -> Self {
        FlowqError::Resolution {
            code: ErrorCode::ScalarProjectionOnly,
            message: format!(
                "scalars may only be used via field projection (relation '{alias}' used as a whole tuple)"
            ),
        }
    }

    pub fn incompatible_scalar_operand(operator: &str, left: &str, right: &str) -> Self {
        FlowqError::TypeCheck {
            code: ErrorCode::IncompatibleScalarOperand,
            message: format!(
                "incompatible types in {operator} operator: left hand side {left}, right hand side {right}; cast the scalar field explicitly"
            ),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        FlowqError::TypeCheck {
            code: ErrorCode::TypeMismatch,
            message: message.into(),
        }
    }

    pub fn scalar_cycle(chain: Vec<String>) -> Self {
        FlowqError::Cycle {
            code: ErrorCode::CyclicScalarDependency,
            chain,
        }
    }

    pub fn scalar_cardinality(alias: &str, rows: usize) -> Self {
        FlowqError::Cardinality {
            code: ErrorCode::ScalarCardinality,
            alias: alias.to_string(),
            rows,
            message: format!(
                "scalar relation '{alias}' produced {rows} rows; a scalar must produce at most one row"
            ),
        }
    }

    pub fn scalar_cancelled(message: impl Into<String>) -> Self {
        FlowqError::Cancelled {
            code: ErrorCode::ScalarCancelled,
            message: message.into(),
        }
    }
}

/// Standard flowq result alias.
pub type Result<T> = std::result::Result<T, FlowqError>;

#[cfg(test)]
mod tests {
    use super::{ErrorCode, FlowqError};

    #[test]
    fn scalar_operand_and_generic_mismatch_share_channel_but_not_code() {
        let scalar = FlowqError::incompatible_scalar_operand("Division", "Int64", "bytearray");
        let generic = FlowqError::type_mismatch("cannot add Utf8 and Int64");
        assert!(matches!(scalar, FlowqError::TypeCheck { .. }));
        assert!(matches!(generic, FlowqError::TypeCheck { .. }));
        assert_eq!(scalar.code(), Some(ErrorCode::IncompatibleScalarOperand));
        assert_eq!(generic.code(), Some(ErrorCode::TypeMismatch));
        assert_eq!(scalar.code().map(|c| c.as_u32()), Some(1039));
    }

    #[test]
    fn cycle_message_lists_chain() {
        let err = FlowqError::scalar_cycle(vec!["C".into(), "D".into(), "C".into()]);
        assert!(err.to_string().contains("C -> D -> C"), "err={err}");
        assert!(err.is_compile_time());
    }

    #[test]
    fn generic_errors_have_no_code() {
        assert_eq!(FlowqError::Execution("boom".into()).code(), None);
    }
}
