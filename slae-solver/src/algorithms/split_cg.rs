//! Conjugate gradient preconditioned with the symmetric SSOR split of the
//! matrix itself.
//!
//! With `A = L + U - D` (`L`, `U` include the diagonal) and `C = L D^{-1/2}`,
//! CG runs on `Â = C⁻¹ A C⁻ᵀ = D^{1/2} L⁻¹ A U⁻¹ D^{1/2}`. The Eisenstat
//! identity
//!
//! ```text
//! L⁻¹ A U⁻¹ w = t + L⁻¹ (w - D t),   t = U⁻¹ w
//! ```
//!
//! replaces the product with `A` and both preconditioner solves by one
//! backward and one forward half-solve. The iterate is kept in the unscaled
//! variables (`x += α t`), and the true residual `b - Ax` is carried along with
//! one full product per iteration so the stopping predicate matches plain CG.

use slae_core::{Device, HalfOperator, Result};

use super::{ensure_temps, residual, SolveAlgorithm, SolveMonitor, SolveReport, SolverParams, Temps};

/// Split (Eisenstat) conjugate gradient. The operator must be symmetric
/// (`U = Lᵀ`) and positive definite.
#[derive(Debug)]
pub struct SplitCg<D: Device> {
    params: SolverParams,
    temps: Option<SplitCgTemps<D::Vector>>,
}

#[derive(Debug)]
struct SplitCgTemps<V> {
    n: usize,
    d: V,
    sd: V,
    r: V,
    rh: V,
    p: V,
    w: V,
    t: V,
    s: V,
    at: V,
}

impl<D: Device> Temps<D> for SplitCgTemps<D::Vector> {
    fn allocate(device: &D, n: usize) -> Result<Self> {
        Ok(Self {
            n,
            d: device.create_empty_vector("split cg d", n)?,
            sd: device.create_empty_vector("split cg sqrt d", n)?,
            r: device.create_empty_vector("split cg r", n)?,
            rh: device.create_empty_vector("split cg r_hat", n)?,
            p: device.create_empty_vector("split cg p", n)?,
            w: device.create_empty_vector("split cg w", n)?,
            t: device.create_empty_vector("split cg t", n)?,
            s: device.create_empty_vector("split cg s", n)?,
            at: device.create_empty_vector("split cg at", n)?,
        })
    }

    fn size(&self) -> usize {
        self.n
    }
}

impl<D: Device> SplitCg<D> {
    pub fn new(params: SolverParams) -> Self {
        Self {
            params,
            temps: None,
        }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    pub fn allocated_size(&self) -> Option<usize> {
        self.temps.as_ref().map(|t| t.n)
    }
}

impl<D: Device> Default for SplitCg<D> {
    fn default() -> Self {
        Self::new(SolverParams::default())
    }
}

impl<D: Device, M: HalfOperator<D>> SolveAlgorithm<D, M> for SplitCg<D> {
    fn name(&self) -> &'static str {
        "Split CG"
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

        let SplitCgTemps {
            d,
            sd,
            r,
            rh,
            p,
            w,
            t,
            s,
            at,
            ..
        } = ensure_temps(&mut self.temps, device, n)?;

        // sd = d / sqrt(d)
        a.load_diagonal(device, d)?;
        device.copy(d, sd)?;
        device.rsqrt(sd)?;
        device.vmul(sd, d)?;

        let mut rr = residual(device, a, b, x, at, r)?;
        // r̂ = C⁻¹ r = D^{1/2} L⁻¹ r
        device.copy(r, rh)?;
        a.solve_l(device, rh)?;
        device.vmul(rh, sd)?;
        device.copy(rh, p)?;
        let mut rhrh = device.dot(rh, rh)?;

        let mut done = monitor.begin(rr);
        while !done {
            // w = D^{1/2} p, t = U⁻¹ w
            device.copy(p, w)?;
            device.vmul(w, sd)?;
            device.copy(w, t)?;
            a.solve_u(device, t)?;

            // s = L⁻¹ (w - D t)
            device.copy(t, at)?;
            device.vmul(at, d)?;
            device.copy(w, s)?;
            device.axpy(-1.0, at, s)?;
            a.solve_l(device, s)?;

            // s = Â p = D^{1/2} (t + s)
            device.axpy(1.0, t, s)?;
            device.vmul(s, sd)?;

            let pq = monitor.guard("p·Âp", device.dot(p, s)?)?;
            let alpha = rhrh / pq;

            // x += α C⁻ᵀ p
            device.axpy(alpha, t, x)?;
            device.axpy(-alpha, s, rh)?;

            a.apply(device, t, at)?;
            device.axpy(-alpha, at, r)?;
            rr = device.dot(r, r)?;
            done = monitor.step(rr);
            if done {
                break;
            }

            let rhrh_new = device.dot(rh, rh)?;
            let beta = rhrh_new / monitor.guard("r̂·r̂", rhrh)?;
            rhrh = rhrh_new;

            device.scale(beta, p)?;
            device.axpy(1.0, rh, p)?;
        }

        let true_rr = residual(device, a, b, x, at, r)?;
        log::debug!("{}: recurrence ‖r‖² = {:e}, true ‖r‖² = {:e}", name, rr, true_rr);
        Ok(monitor.finish(true_rr))
    }
}
