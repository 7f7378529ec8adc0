use std::fmt;

/// Result type for training engine operations
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Main error type for the training engine
#[derive(Debug, Clone)]
pub enum TrainerError {
    /// Vector lengths that must agree do not
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (model and sidecar files)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// The environment failed to reset or step
    Environment(String),

    /// The policy failed to predict, evaluate or update
    Policy(String),

    /// A worker thread could not be spawned
    ThreadSpawn(String),

    /// A worker thread panicked before it could be joined cleanly
    WorkerPanicked(usize),
}

impl fmt::Display for TrainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            TrainerError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            TrainerError::IoError(msg) => write!(f, "IO error: {}", msg),
            TrainerError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            TrainerError::Environment(msg) => write!(f, "Environment error: {}", msg),
            TrainerError::Policy(msg) => write!(f, "Policy error: {}", msg),
            TrainerError::ThreadSpawn(msg) => write!(f, "Failed to spawn worker thread: {}", msg),
            TrainerError::WorkerPanicked(id) => write!(f, "Worker {} panicked", id),
        }
    }
}

impl std::error::Error for TrainerError {}

// Conversion from std::io::Error
impl From<std::io::Error> for TrainerError {
    fn from(err: std::io::Error) -> Self {
        TrainerError::IoError(err.to_string())
    }
}

// Conversion from bincode::Error
impl From<bincode::Error> for TrainerError {
    fn from(err: bincode::Error) -> Self {
        TrainerError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for TrainerError {
    fn from(err: serde_json::Error) -> Self {
        TrainerError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl TrainerError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        TrainerError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        TrainerError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
