//! Shared solver bookkeeping: the iteration state machine, the stopping
//! criterion and the report returned by every solve.

use log::{debug, info, warn};
use serde::Serialize;
use slae_core::{Device, Operator, Result, SlaeError};
use std::time::{Duration, Instant};

use super::SolverParams;

/// Recurrence scalars below this magnitude are treated as a breakdown.
pub const BREAKDOWN_THRESHOLD: f64 = 1e-30;

/// `Init -> Iterating -> {Converged | MaxIterExceeded}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolverState {
    Init,
    Iterating,
    Converged,
    MaxIterExceeded,
}

impl SolverState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SolverState::Converged | SolverState::MaxIterExceeded)
    }
}

/// Outcome of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolveReport {
    pub status: SolverState,
    pub iterations: usize,
    /// `‖b - Ax‖²` of the returned solution.
    pub residual_norm_sq: f64,
    /// `‖b - Ax‖² / ‖b‖²`, or the absolute value when `b = 0`.
    pub relative_residual: f64,
    pub elapsed: Duration,
}

impl SolveReport {
    pub fn is_converged(&self) -> bool {
        self.status == SolverState::Converged
    }
}

/// Relative squared-residual predicate `‖r‖² / ‖b‖² < ε²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingCriterion {
    tolerance_sq: f64,
    rhs_norm_sq: f64,
}

impl StoppingCriterion {
    pub fn new(tolerance: f64, rhs_norm_sq: f64) -> Self {
        Self {
            tolerance_sq: tolerance * tolerance,
            rhs_norm_sq,
        }
    }

    pub fn relative(&self, residual_norm_sq: f64) -> f64 {
        if self.rhs_norm_sq > 0.0 {
            residual_norm_sq / self.rhs_norm_sq
        } else {
            residual_norm_sq
        }
    }

    pub fn is_met(&self, residual_norm_sq: f64) -> bool {
        self.relative(residual_norm_sq) < self.tolerance_sq
    }
}

/// Drives the state machine of one solve and produces its report.
#[derive(Debug)]
pub struct SolveMonitor {
    solver: &'static str,
    state: SolverState,
    criterion: StoppingCriterion,
    max_iterations: usize,
    iterations: usize,
    started: Instant,
}

impl SolveMonitor {
    pub fn start(solver: &'static str, params: &SolverParams, rhs_norm_sq: f64, n: usize) -> Self {
        info!(
            "{} started: n = {}, tolerance = {:e}, max iterations = {}",
            solver, n, params.tolerance, params.max_iterations
        );
        Self {
            solver,
            state: SolverState::Init,
            criterion: StoppingCriterion::new(params.tolerance, rhs_norm_sq),
            max_iterations: params.max_iterations,
            iterations: 0,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn criterion(&self) -> &StoppingCriterion {
        &self.criterion
    }

    /// Leaves `Init` once the initial residual is known. Returns `true` when
    /// the solve is already finished.
    pub fn begin(&mut self, residual_norm_sq: f64) -> bool {
        debug!(
            "{}: initial relative residual {:e}",
            self.solver,
            self.criterion.relative(residual_norm_sq)
        );
        self.state = SolverState::Iterating;
        self.settle(residual_norm_sq)
    }

    /// Records one completed iteration. Returns `true` on a terminal state.
    pub fn step(&mut self, residual_norm_sq: f64) -> bool {
        self.iterations += 1;
        debug!(
            "{} iteration {}: relative residual {:e}",
            self.solver,
            self.iterations,
            self.criterion.relative(residual_norm_sq)
        );
        self.settle(residual_norm_sq)
    }

    fn settle(&mut self, residual_norm_sq: f64) -> bool {
        if self.criterion.is_met(residual_norm_sq) {
            self.state = SolverState::Converged;
        } else if self.iterations >= self.max_iterations {
            self.state = SolverState::MaxIterExceeded;
        }
        self.state.is_terminal()
    }

    /// Fails with [`SlaeError::Breakdown`] when a recurrence denominator vanishes.
    pub fn guard(&self, value_name: &'static str, value: f64) -> Result<f64> {
        if value.abs() < BREAKDOWN_THRESHOLD || !value.is_finite() {
            warn!(
                "{} breakdown: {} ({}) at iteration {}",
                self.solver,
                value_name,
                value,
                self.iterations + 1
            );
            return Err(SlaeError::Breakdown {
                solver: self.solver,
                iteration: self.iterations + 1,
                value_name,
                value,
            });
        }
        Ok(value)
    }

    /// Report for a zero right-hand side: the solution is zero and exact.
    pub fn trivial(mut self) -> SolveReport {
        info!("{}: zero right-hand side, solution is zero", self.solver);
        self.state = SolverState::Converged;
        self.finish(0.0)
    }

    /// Closes the solve with the true residual of the returned solution.
    pub fn finish(self, residual_norm_sq: f64) -> SolveReport {
        let report = SolveReport {
            status: self.state,
            iterations: self.iterations,
            residual_norm_sq,
            relative_residual: self.criterion.relative(residual_norm_sq),
            elapsed: self.started.elapsed(),
        };
        match report.status {
            SolverState::Converged => info!(
                "{} converged in {} iterations, relative residual {:e} ({:?})",
                self.solver, report.iterations, report.relative_residual, report.elapsed
            ),
            _ => warn!(
                "{} stopped after {} iterations without converging, relative residual {:e}",
                self.solver, report.iterations, report.relative_residual
            ),
        }
        report
    }
}

/// Scratch vectors of a solver, sized to one system dimension.
pub trait Temps<D: Device>: Sized {
    fn allocate(device: &D, n: usize) -> Result<Self>;
    fn size(&self) -> usize;
}

/// Returns the temporaries in `slot`, reallocating them only when the
/// dimension changed.
pub fn ensure_temps<'a, D: Device, T: Temps<D>>(
    slot: &'a mut Option<T>,
    device: &D,
    n: usize,
) -> Result<&'a mut T> {
    let temps = match slot.take() {
        Some(temps) if temps.size() == n => temps,
        _ => {
            debug!("Allocating solver temporaries for n = {}", n);
            T::allocate(device, n)?
        }
    };
    Ok(slot.insert(temps))
}

/// `r = b - A x`, returns `‖r‖²`. `ax` is scratch.
pub fn residual<D: Device, M: Operator<D>>(
    device: &D,
    a: &M,
    b: &D::Vector,
    x: &D::Vector,
    ax: &mut D::Vector,
    r: &mut D::Vector,
) -> Result<f64> {
    a.apply(device, x, ax)?;
    device.copy(b, r)?;
    device.axpy(-1.0, ax, r)?;
    device.dot(r, r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_iterations: usize) -> SolverParams {
        SolverParams {
            max_iterations,
            tolerance: 1e-3,
        }
    }

    #[test]
    fn test_criterion() {
        let criterion = StoppingCriterion::new(1e-3, 4.0);
        assert_eq!(criterion.relative(2.0), 0.5);
        assert!(criterion.is_met(3.9e-6));
        assert!(!criterion.is_met(4.0e-6));

        let zero_rhs = StoppingCriterion::new(1e-3, 0.0);
        assert_eq!(zero_rhs.relative(2.0), 2.0);
    }

    #[test]
    fn test_state_machine() {
        let mut monitor = SolveMonitor::start("test", &params(2), 1.0, 3);
        assert_eq!(monitor.state(), SolverState::Init);
        assert!(!monitor.begin(1.0));
        assert_eq!(monitor.state(), SolverState::Iterating);
        assert!(!monitor.step(0.5));
        assert!(monitor.step(0.25));
        assert_eq!(monitor.state(), SolverState::MaxIterExceeded);
        let report = monitor.finish(0.25);
        assert_eq!(report.iterations, 2);
        assert!(!report.is_converged());

        let mut monitor = SolveMonitor::start("test", &params(10), 1.0, 3);
        assert!(!monitor.begin(1.0));
        assert!(monitor.step(1e-8));
        assert_eq!(monitor.finish(1e-8).status, SolverState::Converged);
    }

    #[test]
    fn test_zero_iterations_allowed() {
        let mut monitor = SolveMonitor::start("test", &params(0), 1.0, 3);
        assert!(monitor.begin(1.0));
        assert_eq!(monitor.state(), SolverState::MaxIterExceeded);

        let mut monitor = SolveMonitor::start("test", &params(0), 1.0, 3);
        assert!(monitor.begin(0.0));
        assert_eq!(monitor.state(), SolverState::Converged);
    }

    #[test]
    fn test_guard() {
        let monitor = SolveMonitor::start("test", &params(5), 1.0, 3);
        assert_eq!(monitor.guard("rho", 0.5).unwrap(), 0.5);
        match monitor.guard("rho", 0.0).unwrap_err() {
            SlaeError::Breakdown {
                solver,
                iteration,
                value_name,
                ..
            } => {
                assert_eq!(solver, "test");
                assert_eq!(iteration, 1);
                assert_eq!(value_name, "rho");
            }
            other => panic!("Unexpected error type: {:?}", other),
        }
        assert!(monitor.guard("alpha", f64::NAN).is_err());
    }

    #[test]
    fn test_trivial_report() {
        let report = SolveMonitor::start("test", &params(5), 0.0, 3).trivial();
        assert!(report.is_converged());
        assert_eq!(report.iterations, 0);
        assert_eq!(report.residual_norm_sq, 0.0);
    }
}
