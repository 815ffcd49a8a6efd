//! Error types.
//!
//! Domain errors are `thiserror` enums, one per failure family. The binary only
//! ever sees [`AppError`], which carries a process exit code:
//!
//! - `2`: configuration or input files
//! - `3`: model setup (topology, bounds, cycles)
//! - `4`: runtime and output

use std::path::PathBuf;

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(2, err.to_string())
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(3, format!("Model setup failed: {err}"))
    }
}

impl From<DistributionError> for AppError {
    fn from(err: DistributionError) -> Self {
        AppError::new(4, format!("Pixel distribution failed: {err}"))
    }
}

/// Malformed or invalid topology expression.
///
/// Positions are byte offsets into the expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty topology expression")]
    Empty,
    #[error("unknown atmosphere '{name}' at position {position}")]
    UnknownAtmosphere { name: String, position: usize },
    #[error("atmosphere '{name}' referenced twice (again at position {position})")]
    DuplicateReference { name: String, position: usize },
    #[error("unbalanced parenthesis '{token}' at position {position}")]
    UnbalancedParenthesis { token: char, position: usize },
    #[error("operator '{operator}' at position {position} is missing an operand")]
    DanglingOperator { operator: String, position: usize },
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },
}

impl ParseError {
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Empty => None,
            ParseError::UnknownAtmosphere { position, .. }
            | ParseError::DuplicateReference { position, .. }
            | ParseError::UnbalancedParenthesis { position, .. }
            | ParseError::DanglingOperator { position, .. }
            | ParseError::UnexpectedToken { position, .. } => Some(*position),
        }
    }
}

/// Failure of the synthesis oracle for one atmosphere.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("atmosphere '{atmosphere}': non-physical {parameter} = {value} (parameters {values:?})")]
    NonPhysical {
        atmosphere: String,
        parameter: String,
        value: f64,
        values: Vec<f64>,
    },
    #[error("atmosphere '{atmosphere}': numerical divergence ({detail}) with parameters {values:?}")]
    NumericalDivergence {
        atmosphere: String,
        detail: String,
        values: Vec<f64>,
    },
    #[error("atmosphere '{atmosphere}': oracle returned {got} samples, expected {expected}")]
    GridMismatch {
        atmosphere: String,
        expected: usize,
        got: usize,
    },
}

impl SynthesisError {
    pub fn atmosphere(&self) -> &str {
        match self {
            SynthesisError::NonPhysical { atmosphere, .. }
            | SynthesisError::NumericalDivergence { atmosphere, .. }
            | SynthesisError::GridMismatch { atmosphere, .. } => atmosphere,
        }
    }
}

/// Per-pixel inversion failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InversionError {
    /// The forward model fails at the accepted point of a cycle.
    #[error("cycle {cycle} diverged: {source}")]
    Diverged { cycle: usize, source: SynthesisError },
    #[error("no observed Stokes data for region '{0}'")]
    MissingObservation(String),
    #[error("region '{region}': observed {got} samples, model grid has {expected}")]
    ShapeMismatch {
        region: String,
        expected: usize,
        got: usize,
    },
    #[error("region '{region}': sigma must be finite and > 0 (sample {sample})")]
    InvalidSigma { region: String, sample: usize },
    #[error("invalid pixel task: {0}")]
    InvalidTask(String),
}

/// Model setup failure. Always fatal, raised before any pixel is processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model has no spectral regions")]
    NoRegions,
    #[error("duplicate region name '{0}'")]
    DuplicateRegion(String),
    #[error("duplicate atmosphere name '{0}'")]
    DuplicateAtmosphere(String),
    #[error("atmosphere '{atmosphere}' is scoped to unknown region '{region}'")]
    UnknownRegionScope { atmosphere: String, region: String },
    #[error("region '{region}': {source}")]
    Topology { region: String, source: ParseError },
    #[error("region '{region}': atmosphere '{atmosphere}' is not scoped to this region")]
    OutOfScope { region: String, atmosphere: String },
    #[error("region '{region}': {detail}")]
    InvalidGrid { region: String, detail: String },
    #[error("parameter {param}: {detail}")]
    InvalidParameter { param: String, detail: String },
    #[error("inversion mode needs at least one cycle")]
    NoCycles,
    #[error("cycle {cycle}: unknown parameter '{param}'")]
    UnknownCycleParameter { cycle: usize, param: String },
    #[error("cycle {0} has no active parameters")]
    EmptyCycle(usize),
    #[error("invalid inversion setting {field}: {detail}")]
    InvalidSetting { field: String, detail: String },
}

/// Configuration / input file failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in '{}': {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {field}: {detail}")]
    Invalid { field: String, detail: String },
}

/// Malformed task/result exchange between coordinator and workers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributionError {
    #[error("at least one worker is required")]
    NoWorkers,
    #[error("pixel index {0} appears more than once in the input")]
    DuplicatePixel(usize),
    #[error("worker {worker} returned pixel {got} while pixel {expected:?} was in flight")]
    UnexpectedResult {
        worker: usize,
        expected: Option<usize>,
        got: usize,
    },
    #[error("failed to start worker {worker}: {detail}")]
    Spawn { worker: usize, detail: String },
}
