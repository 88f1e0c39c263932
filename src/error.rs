//! Error types shared by every stage of the extraction pipeline

use thiserror::Error;

/// Result type for pipeline operations
pub type KarstResult<T> = Result<T, KarstError>;

/// Failure categories of the extraction pipeline.
///
/// None of these are retried. `Bounds` and `DeviceCapability` mean the caller
/// or the machine configuration is wrong; `Build` and `RuntimeCompute` are
/// faults of the environment or the compute runtime.
#[derive(Debug, Error)]
pub enum KarstError {
    #[error("Kernel build failed for {path}")]
    Build { path: String, log: String },

    #[error("No device capable of running {component}: requires {requirement}")]
    DeviceCapability {
        component: String,
        requirement: String,
    },

    #[error("{operation}: {reason}")]
    Bounds { operation: String, reason: String },

    #[error("Compute runtime error in {operation}: {error}")]
    RuntimeCompute { operation: String, error: String },
}

impl KarstError {
    /// True for errors caused by configuration or caller mistakes rather than
    /// by the runtime
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, Self::Bounds { .. } | Self::DeviceCapability { .. })
    }

    /// Compile log attached to a build failure
    pub fn build_log(&self) -> Option<&str> {
        match self {
            Self::Build { log, .. } => Some(log),
            _ => None,
        }
    }
}

/// Attach an operation name to a runtime failure
pub trait ComputeErrorContext<T> {
    fn compute_context(self, operation: &str) -> KarstResult<T>;
}

impl<T> ComputeErrorContext<T> for Option<T> {
    fn compute_context(self, operation: &str) -> KarstResult<T> {
        self.ok_or_else(|| KarstError::RuntimeCompute {
            operation: operation.to_string(),
            error: "required resource is missing".to_string(),
        })
    }
}

impl<T, E> ComputeErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn compute_context(self, operation: &str) -> KarstResult<T> {
        self.map_err(|e| KarstError::RuntimeCompute {
            operation: operation.to_string(),
            error: e.to_string(),
        })
    }
}

/// Create a bounds error for a rejected argument
pub fn bounds_error(operation: &str, reason: impl std::fmt::Display) -> KarstError {
    KarstError::Bounds {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

/// Create a runtime error for a failed device operation
pub fn runtime_error(operation: &str, error: impl std::fmt::Display) -> KarstError {
    KarstError::RuntimeCompute {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}
