use log::info;
use slae_core::{Device, Operator, Result};

use super::{ensure_temps, residual, SolveAlgorithm, SolveMonitor, SolveReport, SolverParams, Temps};

/// BiConjugate Gradient Stabilized, for non-symmetric operators, optionally
/// with right Jacobi preconditioning (`D⁻¹`). Two matrix products per iteration.
#[derive(Debug)]
pub struct BiCgStab<D: Device> {
    params: SolverParams,
    use_preconditioner: bool,
    temps: Option<BiCgStabTemps<D::Vector>>,
}

#[derive(Debug)]
struct BiCgStabTemps<V> {
    n: usize,
    r: V,
    r_hat_0: V,
    p: V,
    v: V,
    s: V,
    t: V,
    p_hat: V,
    s_hat: V,
    inv_diag: V,
}

impl<D: Device> Temps<D> for BiCgStabTemps<D::Vector> {
    fn allocate(device: &D, n: usize) -> Result<Self> {
        Ok(Self {
            n,
            r: device.create_empty_vector("bicgstab r", n)?,
            r_hat_0: device.create_empty_vector("bicgstab r_hat_0", n)?,
            p: device.create_empty_vector("bicgstab p", n)?,
            v: device.create_empty_vector("bicgstab v", n)?,
            s: device.create_empty_vector("bicgstab s", n)?,
            t: device.create_empty_vector("bicgstab t", n)?,
            p_hat: device.create_empty_vector("bicgstab p_hat", n)?,
            s_hat: device.create_empty_vector("bicgstab s_hat", n)?,
            inv_diag: device.create_empty_vector("bicgstab inv_diag", n)?,
        })
    }

    fn size(&self) -> usize {
        self.n
    }
}

impl<D: Device> BiCgStab<D> {
    pub fn new(params: SolverParams) -> Self {
        Self {
            params,
            use_preconditioner: false,
            temps: None,
        }
    }

    /// Enables right Jacobi preconditioning. The diagonal must be non-zero.
    pub fn with_preconditioner(mut self, use_preconditioner: bool) -> Self {
        self.use_preconditioner = use_preconditioner;
        self
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn allocated_size(&self) -> Option<usize> {
        self.temps.as_ref().map(|t| t.n)
    }
}

impl<D: Device> Default for BiCgStab<D> {
    fn default() -> Self {
        Self::new(SolverParams::default())
    }
}

impl<D: Device, M: Operator<D>> SolveAlgorithm<D, M> for BiCgStab<D> {
    fn name(&self) -> &'static str {
        "BiCGStab"
    }

    fn solve(
        &mut self,
        device: &D,
        a: &M,
        b: &D::Vector,
        x: &mut D::Vector,
    ) -> Result<SolveReport> {
        self.validate_inputs(a, b, x)?;
        let n = a.dim();
        let name = SolveAlgorithm::<D, M>::name(self);
        let use_preconditioner = self.use_preconditioner;

        let bb = device.dot(b, b)?;
        let mut monitor = SolveMonitor::start(name, &self.params, bb, n);
        if bb == 0.0 {
            device.zero(x)?;
            return Ok(monitor.trivial());
        }

        let BiCgStabTemps {
            r,
            r_hat_0,
            p,
            v,
            s,
            t,
            p_hat,
            s_hat,
            inv_diag,
            ..
        } = ensure_temps(&mut self.temps, device, n)?;

        // --- Preconditioner Setup ---
        if use_preconditioner {
            info!("{}: using right Jacobi preconditioner", name);
            a.load_diagonal(device, inv_diag)?;
            device.recip(inv_diag)?;
        }

        let mut rr = residual(device, a, b, x, v, r)?;
        device.copy(r, r_hat_0)?;
        device.zero(p)?;
        device.zero(v)?;

        let mut rho_prev = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;

        let mut done = monitor.begin(rr);
        while !done {
            let rho = monitor.guard("rho", device.dot(r_hat_0, r)?)?;
            let beta = (rho / rho_prev) * (alpha / omega);

            // p = r + β (p - ω v)
            device.axpy(-omega, v, p)?;
            device.scale(beta, p)?;
            device.axpy(1.0, r, p)?;

            device.copy(p, p_hat)?;
            if use_preconditioner {
                device.vmul(p_hat, inv_diag)?;
            }
            a.apply(device, p_hat, v)?;

            alpha = rho / monitor.guard("r_hat_0·v", device.dot(r_hat_0, v)?)?;

            // s = r - α v
            device.copy(r, s)?;
            device.axpy(-alpha, v, s)?;
            let ss = device.dot(s, s)?;
            if monitor.criterion().is_met(ss) {
                device.axpy(alpha, p_hat, x)?;
                device.copy(s, r)?;
                rr = ss;
                monitor.step(rr);
                break;
            }

            device.copy(s, s_hat)?;
            if use_preconditioner {
                device.vmul(s_hat, inv_diag)?;
            }
            a.apply(device, s_hat, t)?;

            let tt = monitor.guard("t·t", device.dot(t, t)?)?;
            omega = device.dot(t, s)? / tt;

            // x += α p̂ + ω ŝ
            device.axpy(alpha, p_hat, x)?;
            device.axpy(omega, s_hat, x)?;

            // r = s - ω t
            device.copy(s, r)?;
            device.axpy(-omega, t, r)?;

            rr = device.dot(r, r)?;
            done = monitor.step(rr);
            if !done {
                monitor.guard("omega", omega)?;
            }
            rho_prev = rho;
        }

        let true_rr = residual(device, a, b, x, v, r)?;
        log::debug!("{}: recurrence ‖r‖² = {:e}, true ‖r‖² = {:e}", name, rr, true_rr);
        Ok(monitor.finish(true_rr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::algorithms::SolverState;
    use slae_core::{CpuDevice, Matrix, MsrMatrix, SlaeError};

    /// Lower-triangular, strongly non-symmetric.
    fn unsymmetric() -> MsrMatrix<f64> {
        MsrMatrix::from_triplets(
            3,
            &[
                (0, 0, 1.0),
                (1, 0, -237.0),
                (1, 1, 1.0),
                (2, 1, -2.5),
                (2, 2, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_solves_unsymmetric_system() -> Result<()> {
        let device = CpuDevice::<f64>::new();
        let a = MsrMatrix::from_triplets(
            4,
            &[
                (0, 0, 4.0),
                (0, 1, -0.5),
                (1, 0, -2.0),
                (1, 1, 5.0),
                (1, 2, -0.5),
                (2, 1, -2.0),
                (2, 2, 6.0),
                (2, 3, -1.0),
                (3, 2, -0.5),
                (3, 3, 3.0),
            ],
        )?;
        let expected = [1.0, -2.0, 0.5, 3.0];
        let mut b = vec![0.0; 4];
        a.multiply(&expected, &mut b)?;

        for preconditioned in [false, true] {
            let mut x = vec![0.0; 4];
            let mut solver = BiCgStab::<CpuDevice>::new(SolverParams::new(100, 1e-10)?)
                .with_preconditioner(preconditioned);
            let report = solver.solve(&device, &a, &b, &mut x)?;
            assert!(report.is_converged(), "preconditioned = {}", preconditioned);
            for (x, e) in x.iter().zip(expected) {
                assert_abs_diff_eq!(*x, e, epsilon = 1e-8);
            }
        }
        Ok(())
    }

    #[test]
    fn test_preconditioner_with_negative_diagonal() -> Result<()> {
        let device = CpuDevice::<f64>::new();
        let a = MsrMatrix::from_triplets(
            3,
            &[
                (0, 0, -4.0),
                (0, 1, 1.0),
                (1, 0, 2.0),
                (1, 1, -5.0),
                (1, 2, 1.0),
                (2, 1, 0.5),
                (2, 2, -3.0),
            ],
        )?;
        let expected = [1.0, 2.0, 3.0];
        let mut b = vec![0.0; 3];
        a.multiply(&expected, &mut b)?;

        let mut x = vec![0.0; 3];
        let report = BiCgStab::<CpuDevice>::new(SolverParams::new(50, 1e-10)?)
            .with_preconditioner(true)
            .solve(&device, &a, &b, &mut x)?;
        assert!(report.is_converged());
        for (x, e) in x.iter().zip(expected) {
            assert_abs_diff_eq!(*x, e, epsilon = 1e-8);
        }
        Ok(())
    }

    #[test]
    fn test_iteration_cap_is_a_status() -> Result<()> {
        let device = CpuDevice::<f64>::new();
        let a = unsymmetric();
        let b = vec![1.0, 0.0, 0.0];
        let mut x = vec![0.0; 3];
        let report = BiCgStab::<CpuDevice>::new(SolverParams::new(1, 1e-12)?)
            .solve(&device, &a, &b, &mut x)?;
        assert_eq!(report.status, SolverState::MaxIterExceeded);
        assert_eq!(report.iterations, 1);
        assert!(report.residual_norm_sq > 0.0);
        Ok(())
    }

    #[test]
    fn test_breakdown_is_an_error() {
        // r̂·A r vanishes for a skew-symmetric operator
        let device = CpuDevice::<f64>::new();
        let a = MsrMatrix::from_triplets(2, &[(0, 0, 0.0), (0, 1, 1.0), (1, 0, -1.0), (1, 1, 0.0)])
            .unwrap();
        let mut x = vec![0.0; 2];
        let err = BiCgStab::<CpuDevice>::default()
            .solve(&device, &a, &vec![1.0, 1.0], &mut x)
            .unwrap_err();
        assert!(matches!(
            err,
            SlaeError::Breakdown {
                solver: "BiCGStab",
                value_name: "r_hat_0·v",
                ..
            }
        ));
    }
}
