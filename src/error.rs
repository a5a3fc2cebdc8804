use thiserror::Error;

/// Errors raised by the gridder's public boundary.
///
/// Every variant is detected and returned at the start of the operation that
/// triggers it (`grid`, `set_kernel`, or construction); the accumulation loop
/// itself has no failure modes beyond programmer error.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("dtype mismatch: {0}")]
    DtypeMismatch(String),

    #[error("invalid dtype: {0}")]
    InvalidDtype(String),

    #[error("grid() called before set_kernel()")]
    KernelNotSet,

    #[error("unknown kernel kind: {0}")]
    UnknownKernel(String),

    #[error("kernel parameter arity mismatch: {kind} expects {expected} parameters, got {got}")]
    ArityMismatch {
        kind: String,
        expected: usize,
        got: usize,
    },

    #[error("geometry error: {0}")]
    GeometryError(String),
}

pub type GridResult<T> = Result<T, GridError>;
