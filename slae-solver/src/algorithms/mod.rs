// --- Algorithm Trait Definition ---

use serde::{Deserialize, Serialize};
use slae_core::{Device, HalfOperator, Operator, Result, SlaeError, Vector};

pub mod bicgstab;
pub mod cg;
mod report;
pub mod split_cg;

pub use bicgstab::BiCgStab;
pub use cg::JacobiCg;
pub use report::{
    ensure_temps, residual, SolveMonitor, SolveReport, SolverState, StoppingCriterion, Temps,
    BREAKDOWN_THRESHOLD,
};
pub use split_cg::SplitCg;

/// Trait representing a specific linear system solving algorithm.
/// Generic over the Device (CPU/GPU) and the operator type it supports.
pub trait SolveAlgorithm<D: Device, M: Operator<D>> {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Solves `A x = b`, starting from the guess held in `x`.
    ///
    /// # Errors
    /// `SizeMismatch` if `b` or `x` does not match the operator,
    /// `Breakdown` if a recurrence denominator vanishes.
    fn solve(
        &mut self,
        device: &D,
        a: &M,
        b: &D::Vector,
        x: &mut D::Vector,
    ) -> Result<SolveReport>;

    // Helper for input validation, called by implementations.
    fn validate_inputs(&self, a: &M, b: &D::Vector, x: &D::Vector) -> Result<()> {
        let n = a.dim();
        if n == 0 {
            return Err(SlaeError::InvalidDimensions(
                "Cannot solve an empty system".to_string(),
            ));
        }
        for (operation, found) in [("solve (rhs)", b.len()), ("solve (solution)", x.len())] {
            if found != n {
                return Err(SlaeError::SizeMismatch {
                    operation,
                    expected: n,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// Iteration cap and tolerance `ε` of the relative stopping predicate
/// `‖r‖² / ‖b‖² < ε²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

impl SolverParams {
    pub fn new(max_iterations: usize, tolerance: f64) -> Result<Self> {
        let params = Self {
            max_iterations,
            tolerance,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SlaeError::InvalidConfig(format!(
                "Solver tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Jacobi-preconditioned conjugate gradient.
    Cg,
    /// Conjugate gradient with the symmetric SSOR split, Eisenstat form.
    SplitCg,
    #[serde(rename = "bicgstab")]
    BiCgStab,
}

impl SolverKind {
    pub const ALL: [SolverKind; 3] = [SolverKind::Cg, SolverKind::SplitCg, SolverKind::BiCgStab];
}

/// Closed set of solvers, selected at run time from a [`SolverKind`].
#[derive(Debug)]
pub enum Solver<D: Device> {
    Cg(JacobiCg<D>),
    SplitCg(SplitCg<D>),
    BiCgStab(BiCgStab<D>),
}

impl<D: Device> Solver<D> {
    pub fn new(kind: SolverKind, params: SolverParams) -> Self {
        match kind {
            SolverKind::Cg => Solver::Cg(JacobiCg::new(params)),
            SolverKind::SplitCg => Solver::SplitCg(SplitCg::new(params)),
            SolverKind::BiCgStab => Solver::BiCgStab(BiCgStab::new(params)),
        }
    }

    pub fn kind(&self) -> SolverKind {
        match self {
            Solver::Cg(_) => SolverKind::Cg,
            Solver::SplitCg(_) => SolverKind::SplitCg,
            Solver::BiCgStab(_) => SolverKind::BiCgStab,
        }
    }

    pub fn params(&self) -> &SolverParams {
        match self {
            Solver::Cg(s) => s.params(),
            Solver::SplitCg(s) => s.params(),
            Solver::BiCgStab(s) => s.params(),
        }
    }
}

impl<D: Device, M: HalfOperator<D>> SolveAlgorithm<D, M> for Solver<D> {
    fn name(&self) -> &'static str {
        match self {
            Solver::Cg(s) => SolveAlgorithm::<D, M>::name(s),
            Solver::SplitCg(s) => SolveAlgorithm::<D, M>::name(s),
            Solver::BiCgStab(s) => SolveAlgorithm::<D, M>::name(s),
        }
    }

    fn solve(
        &mut self,
        device: &D,
        a: &M,
        b: &D::Vector,
        x: &mut D::Vector,
    ) -> Result<SolveReport> {
        match self {
            Solver::Cg(s) => s.solve(device, a, b, x),
            Solver::SplitCg(s) => s.solve(device, a, b, x),
            Solver::BiCgStab(s) => s.solve(device, a, b, x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slae_core::CpuDevice;

    #[test]
    fn test_params_config() {
        let params: SolverParams = serde_json::from_str(r#"{"tolerance": 1e-8}"#).unwrap();
        assert_eq!(params.max_iterations, 1000);
        assert_eq!(params.tolerance, 1e-8);
        assert!(matches!(
            SolverParams::new(10, -1.0),
            Err(SlaeError::InvalidConfig(_))
        ));
        assert!(SolverParams::new(10, f64::NAN).is_err());
    }

    #[test]
    fn test_kind_names() {
        let kinds: Vec<SolverKind> =
            serde_json::from_str(r#"["cg", "split_cg", "bicgstab"]"#).unwrap();
        assert_eq!(kinds, SolverKind::ALL.to_vec());
        for kind in SolverKind::ALL {
            let solver = Solver::<CpuDevice>::new(kind, SolverParams::default());
            assert_eq!(solver.kind(), kind);
            assert_eq!(solver.params(), &SolverParams::default());
        }
    }
}
