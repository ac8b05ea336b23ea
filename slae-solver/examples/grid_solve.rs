use serde::Deserialize;
use slae_solver::{
    CpuDevice, Device, GpuDevice, HostMatrix, Matrix, RectGrid, SolveAlgorithm, SolveReport,
    Solver, SolverKind, SolverParams, TransferStats,
};

/// Optional JSON configuration, passed as the first argument:
///
/// ```json
/// { "grid": { "nx": 64, "ny": 64, "hx": 0.01, "hy": 0.01, "gamma": 10.0 },
///   "params": { "max_iterations": 2000, "tolerance": 1e-8 },
///   "solvers": ["cg", "split_cg", "bicgstab"] }
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExampleConfig {
    grid: RectGrid,
    params: SolverParams,
    solvers: Vec<SolverKind>,
}

impl Default for ExampleConfig {
    fn default() -> Self {
        Self {
            grid: RectGrid {
                nx: 100,
                ny: 80,
                hx: 0.01,
                hy: 0.01,
                lambda: 1.0,
                gamma: 10.0,
            },
            params: SolverParams::default(),
            solvers: SolverKind::ALL.to_vec(),
        }
    }
}

fn load_config() -> ExampleConfig {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).expect("Failed to read config file");
            serde_json::from_str(&text).expect("Failed to parse config file")
        }
        None => ExampleConfig::default(),
    }
}

/// Largest deviation from the exact solution (all ones).
fn max_error(x: &[f64]) -> f64 {
    x.iter().fold(0.0, |acc, v| acc.max((v - 1.0).abs()))
}

fn log_report(backend: &str, format: &str, kind: SolverKind, report: &SolveReport, error: f64) {
    log::info!(
        "{} {} {:?}: {:?} after {} iterations, relative residual {:.3e}, max error {:.3e}, {:?}",
        backend,
        format,
        kind,
        report.status,
        report.iterations,
        report.relative_residual,
        error,
        report.elapsed
    );
}

fn main() {
    // Initialize logging based on RUST_LOG environment variable
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .filter_module("naga", log::LevelFilter::Off)
        .init();

    let config = load_config();
    config.grid.validate().expect("Invalid grid");
    config.params.validate().expect("Invalid solver parameters");

    let grid = config.grid;
    let n = grid.node_count();
    log::info!(
        "Assembling {}x{} grid ({} unknowns), lambda = {}, gamma = {}",
        grid.nx,
        grid.ny,
        n,
        grid.lambda,
        grid.gamma
    );
    // constant source equal to gamma: the exact solution is 1 everywhere
    let b = grid.load_vector(|_, _| grid.gamma);
    let formats: Vec<(&str, HostMatrix<f64>)> = vec![
        ("msr", grid.assemble_msr::<f64>().expect("MSR assembly failed").into()),
        ("diag9", grid.assemble_diag9::<f64>().expect("Diag9 assembly failed").into()),
    ];

    // 1. Host
    let host = CpuDevice::<f64>::new();
    for (format, a) in &formats {
        for &kind in &config.solvers {
            let mut x = vec![0.0; n];
            match Solver::<CpuDevice>::new(kind, config.params).solve(&host, a, &b, &mut x) {
                Ok(report) => log_report("cpu", format, kind, &report, max_error(&x)),
                Err(e) => log::error!("cpu {} {:?} failed: {}", format, kind, e),
            }
        }
    }

    // 2. GPU, when an adapter is available
    let gpu = match GpuDevice::new_blocking() {
        Ok(device) => device,
        Err(e) => {
            log::warn!("Skipping GPU runs: {}", e);
            return;
        }
    };
    let b_gpu = gpu.create_vector("b", &b).expect("Failed to upload rhs");
    for (format, a) in &formats {
        let a_gpu = a.to_device(&gpu).expect("Failed to upload matrix");
        for &kind in &config.solvers {
            let mut x = gpu
                .create_empty_vector("x", n)
                .expect("Failed to allocate solution");

            log::info!("Resetting GPU transfer counters...");
            gpu.reset_transfer_stats();
            let result = Solver::<GpuDevice>::new(kind, config.params)
                .solve(&gpu, &a_gpu, &b_gpu, &mut x);
            let TransferStats {
                bytes_to_gpu,
                bytes_from_gpu,
            } = gpu.get_transfer_stats();

            match result {
                Ok(report) => {
                    let x = gpu.read_vector(&x).expect("Failed to read solution");
                    log_report("gpu", format, kind, &report, max_error(&x));
                    log::info!(
                        "  Bytes CPU -> GPU: {}, GPU -> CPU: {}",
                        bytes_to_gpu,
                        bytes_from_gpu
                    );
                }
                Err(e) => log::error!("gpu {} {:?} failed: {}", format, kind, e),
            }
        }
    }
}
