use std::fmt::Display;

#[derive(Debug)]
pub enum FeatureFindingError {
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
    PreconditionViolated(PreconditionError),
    DataReading(String),
    ThreadPool(String),
}

impl Display for FeatureFindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter {
                name,
                value,
                reason,
            } => write!(f, "Invalid parameter {} = {}: {}", name, value, reason),
            Self::PreconditionViolated(e) => write!(f, "Precondition violated: {}", e),
            Self::DataReading(msg) => write!(f, "Error reading data: {}", msg),
            Self::ThreadPool(msg) => write!(f, "Unable to build the worker pool: {}", msg),
        }
    }
}

impl std::error::Error for FeatureFindingError {}

impl FeatureFindingError {
    pub fn invalid_parameter(name: &'static str, value: impl Display, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Wraps an error coming from an instrument reader.
    pub fn data_reading(msg: impl Display) -> Self {
        Self::DataReading(msg.to_string())
    }
}

/// Input that breaks one of the documented assumptions of the
/// grid builders (shape or ordering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    ExpectedNonEmptyData,
    RaggedRows {
        row: usize,
        expected: usize,
        real: usize,
    },
    ExpectedVectorLength {
        real: usize,
        expected: usize,
    },
    /// The sample at `index` does not sort strictly after the previous one
    /// by (scan_lc, scan_ims).
    UnsortedSamples {
        index: usize,
    },
}

impl Display for PreconditionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedNonEmptyData => write!(f, "expected non-empty data"),
            Self::RaggedRows {
                row,
                expected,
                real,
            } => write!(
                f,
                "row {} has {} values but the first row has {}",
                row, real, expected
            ),
            Self::ExpectedVectorLength { real, expected } => {
                write!(f, "expected {} values, got {}", expected, real)
            }
            Self::UnsortedSamples { index } => write!(
                f,
                "sample {} is not strictly ascending by (scan_lc, scan_ims)",
                index
            ),
        }
    }
}

impl From<PreconditionError> for FeatureFindingError {
    fn from(e: PreconditionError) -> Self {
        FeatureFindingError::PreconditionViolated(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for FeatureFindingError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        FeatureFindingError::ThreadPool(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeatureFindingError>;
