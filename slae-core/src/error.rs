use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlaeError {
    #[error("WGPU initialization failed: {0}")]
    WgpuInitError(String),

    #[error("WGPU error: {0}")]
    WgpuError(String),

    #[error("Invalid matrix dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Invalid matrix structure: {0}")]
    InvalidStructure(String),

    #[error("Size mismatch in {operation}: expected {expected}, found {found}")]
    SizeMismatch {
        operation: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{solver} breakdown at iteration {iteration}: {value_name} ({value}) is near zero.")]
    Breakdown {
        solver: &'static str,
        iteration: usize,
        value_name: &'static str, // e.g. "rho", "omega"
        value: f64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = SlaeError> = std::result::Result<T, E>;

/// Fails with [`SlaeError::SizeMismatch`] unless `found == expected`.
pub(crate) fn check_len(operation: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(SlaeError::SizeMismatch {
            operation,
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len() {
        assert!(check_len("axpy", 4, 4).is_ok());
        let err = check_len("axpy", 4, 3).unwrap_err();
        match err {
            SlaeError::SizeMismatch {
                operation,
                expected,
                found,
            } => {
                assert_eq!(operation, "axpy");
                assert_eq!(expected, 4);
                assert_eq!(found, 3);
            }
            other => panic!("Unexpected error type: {:?}", other),
        }
        assert_eq!(
            check_len("dot", 2, 5).unwrap_err().to_string(),
            "Size mismatch in dot: expected 2, found 5"
        );
    }
}
