use slae_core::{Device, Operator, Result};

use super::{ensure_temps, residual, SolveAlgorithm, SolveMonitor, SolveReport, SolverParams, Temps};

/// Conjugate gradient with the element-wise preconditioner
/// `M⁻¹ = diag(1 / sqrt(dᵢ))`. One matrix product per iteration.
///
/// Requires a symmetric positive definite operator with a positive diagonal.
#[derive(Debug)]
pub struct JacobiCg<D: Device> {
    params: SolverParams,
    temps: Option<CgTemps<D::Vector>>,
}

#[derive(Debug)]
struct CgTemps<V> {
    n: usize,
    r: V,
    m_inv: V,
    mr: V,
    z: V,
    az: V,
}

impl<D: Device> Temps<D> for CgTemps<D::Vector> {
    fn allocate(device: &D, n: usize) -> Result<Self> {
        Ok(Self {
            n,
            r: device.create_empty_vector("cg r", n)?,
            m_inv: device.create_empty_vector("cg m_inv", n)?,
            mr: device.create_empty_vector("cg mr", n)?,
            z: device.create_empty_vector("cg z", n)?,
            az: device.create_empty_vector("cg az", n)?,
        })
    }

    fn size(&self) -> usize {
        self.n
    }
}

impl<D: Device> JacobiCg<D> {
    pub fn new(params: SolverParams) -> Self {
        Self {
            params,
            temps: None,
        }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Dimension the scratch vectors are currently sized for.
    pub fn allocated_size(&self) -> Option<usize> {
        self.temps.as_ref().map(|t| t.n)
    }
}

impl<D: Device> Default for JacobiCg<D> {
    fn default() -> Self {
        Self::new(SolverParams::default())
    }
}

impl<D: Device, M: Operator<D>> SolveAlgorithm<D, M> for JacobiCg<D> {
    fn name(&self) -> &'static str {
        "CG"
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

        let bb = device.dot(b, b)?;
        let mut monitor = SolveMonitor::start(name, &self.params, bb, n);
        if bb == 0.0 {
            device.zero(x)?;
            return Ok(monitor.trivial());
        }

        let CgTemps {
            r,
            m_inv,
            mr,
            z,
            az,
            ..
        } = ensure_temps(&mut self.temps, device, n)?;

        a.load_diagonal(device, m_inv)?;
        device.rsqrt(m_inv)?;

        let mut rr = residual(device, a, b, x, az, r)?;
        device.copy(r, mr)?;
        device.vmul(mr, m_inv)?;
        device.copy(mr, z)?;
        let mut mrr = device.dot(mr, r)?;

        let mut done = monitor.begin(rr);
        while !done {
            a.apply(device, z, az)?;
            let azz = monitor.guard("Az·z", device.dot(az, z)?)?;
            let alpha = mrr / azz;

            device.axpy(alpha, z, x)?;
            device.axpy(-alpha, az, r)?;

            rr = device.dot(r, r)?;
            done = monitor.step(rr);
            if done {
                break;
            }

            device.copy(r, mr)?;
            device.vmul(mr, m_inv)?;
            let mrr_new = device.dot(mr, r)?;
            let beta = mrr_new / monitor.guard("M⁻¹r·r", mrr)?;
            mrr = mrr_new;

            // z = M⁻¹r + βz
            device.scale(beta, z)?;
            device.axpy(1.0, mr, z)?;
        }

        // recurrence residual drifts from b - Ax, report the true one
        let true_rr = residual(device, a, b, x, az, r)?;
        log::debug!("{}: recurrence ‖r‖² = {:e}, true ‖r‖² = {:e}", name, rr, true_rr);
        Ok(monitor.finish(true_rr))
    }
}
