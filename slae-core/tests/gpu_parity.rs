use approx::assert_relative_eq;
use slae_core::{
    CpuDevice, Device, Diag9Matrix, GpuDevice, HalfOperator, HostMatrix, Matrix, Operator,
    RectGrid, Result, SlaeError,
};

fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_module("wgpu", log::LevelFilter::Off)
        .filter_module("naga", log::LevelFilter::Off)
        .try_init();
}

fn gpu_or_skip(test: &str) -> Option<GpuDevice> {
    init_logger();
    match GpuDevice::new_blocking() {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("Skipping {}: no GPU adapter available ({})", test, err);
            None
        }
    }
}

fn assert_close(gpu: &[f64], host: &[f64], tolerance: f64) {
    assert_eq!(gpu.len(), host.len(), "Vector lengths differ");
    for (i, (g, h)) in gpu.iter().zip(host).enumerate() {
        assert!(
            (g - h).abs() <= tolerance * h.abs().max(1.0),
            "Mismatch at index {}: host {}, gpu {}",
            i,
            h,
            g
        );
    }
}

fn random_vector(rng: &mut fastrand::Rng, n: usize) -> Vec<f64> {
    (0..n).map(|_| rng.f64() - 0.5).collect()
}

fn grid_formats() -> Result<Vec<HostMatrix<f32>>> {
    let grid = RectGrid::new(9, 7, 0.25, 0.5)?.with_coefficients(1.5, 4.0)?;
    Ok(vec![
        grid.assemble_msr::<f32>()?.into(),
        grid.assemble_diag9::<f32>()?.into(),
    ])
}

#[test]
fn test_vector_ops_match_host() -> Result<()> {
    let Some(gpu) = gpu_or_skip("test_vector_ops_match_host") else {
        return Ok(());
    };
    let host = CpuDevice::<f32>::new();
    let mut rng = fastrand::Rng::with_seed(7);
    // spans several workgroups
    let n = 1000;
    let xs = random_vector(&mut rng, n);
    let ys: Vec<f64> = random_vector(&mut rng, n).iter().map(|v| v + 1.0).collect();

    let (x_h, mut y_h) = (host.create_vector("x", &xs)?, host.create_vector("y", &ys)?);
    let (x_g, mut y_g) = (gpu.create_vector("x", &xs)?, gpu.create_vector("y", &ys)?);

    assert_relative_eq!(
        gpu.dot(&x_g, &y_g)?,
        host.dot(&x_h, &y_h)?,
        epsilon = 1e-4,
        max_relative = 1e-4
    );

    host.axpy(-0.75, &x_h, &mut y_h)?;
    gpu.axpy(-0.75, &x_g, &mut y_g)?;
    assert_close(&gpu.read_vector(&y_g)?, &host.read_vector(&y_h)?, 1e-6);

    host.scale(3.0, &mut y_h)?;
    gpu.scale(3.0, &mut y_g)?;
    assert_close(&gpu.read_vector(&y_g)?, &host.read_vector(&y_h)?, 1e-6);

    host.vmul(&mut y_h, &x_h)?;
    gpu.vmul(&mut y_g, &x_g)?;
    assert_close(&gpu.read_vector(&y_g)?, &host.read_vector(&y_h)?, 1e-6);

    let positive: Vec<f64> = ys.iter().map(|v| v * v + 0.5).collect();
    let mut p_h = host.create_vector("p", &positive)?;
    let mut p_g = gpu.create_vector("p", &positive)?;
    host.rsqrt(&mut p_h)?;
    gpu.rsqrt(&mut p_g)?;
    assert_close(&gpu.read_vector(&p_g)?, &host.read_vector(&p_h)?, 1e-5);

    // mixed signs, bounded away from zero
    let signed: Vec<f64> = xs.iter().map(|v| v + v.signum() * 0.5).collect();
    let mut d_h = host.create_vector("d", &signed)?;
    let mut d_g = gpu.create_vector("d", &signed)?;
    host.recip(&mut d_h)?;
    gpu.recip(&mut d_g)?;
    assert_close(&gpu.read_vector(&d_g)?, &host.read_vector(&d_h)?, 1e-5);

    gpu.copy(&x_g, &mut y_g)?;
    assert_close(&gpu.read_vector(&y_g)?, &host.read_vector(&x_h)?, 0.0);
    gpu.zero(&mut y_g)?;
    let max = pollster::block_on(y_g.with_mapped(|data| {
        data.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
    }))?;
    assert_eq!(max, 0.0);

    gpu.write_vector(&mut y_g, &ys)?;
    let read = pollster::block_on(y_g.read_contents())?;
    assert_eq!(read.len(), n);
    assert_eq!(read[17], ys[17] as f32);
    Ok(())
}

#[test]
fn test_size_mismatch_fails_fast_on_gpu() -> Result<()> {
    let Some(gpu) = gpu_or_skip("test_size_mismatch_fails_fast_on_gpu") else {
        return Ok(());
    };
    let x = gpu.create_vector("x", &[1.0, 2.0, 3.0])?;
    let mut y = gpu.create_vector("y", &[1.0, 2.0])?;
    assert!(matches!(
        gpu.axpy(1.0, &x, &mut y),
        Err(SlaeError::SizeMismatch { operation: "axpy", .. })
    ));
    assert!(gpu.dot(&x, &y).is_err());
    assert!(gpu.write_vector(&mut y, &[1.0, 2.0, 3.0]).is_err());
    assert_eq!(gpu.read_vector(&y)?, vec![1.0, 2.0]);

    let matrix = grid_formats()?.remove(0).to_device(&gpu)?;
    assert!(matrix.apply(&gpu, &x, &mut y).is_err());
    assert!(gpu.create_empty_vector("empty", 0).is_err());
    Ok(())
}

#[test]
fn test_matrix_ops_match_host() -> Result<()> {
    let Some(gpu) = gpu_or_skip("test_matrix_ops_match_host") else {
        return Ok(());
    };
    let host = CpuDevice::<f32>::new();
    let mut rng = fastrand::Rng::with_seed(42);

    for a in grid_formats()? {
        let n = a.size();
        let a_gpu = a.to_device(&gpu)?;
        let v = random_vector(&mut rng, n);
        let v_h = host.create_vector("v", &v)?;
        let v_g = gpu.create_vector("v", &v)?;
        let mut res_h = host.create_empty_vector("res", n)?;
        let mut res_g = gpu.create_empty_vector("res", n)?;

        a.apply(&host, &v_h, &mut res_h)?;
        a_gpu.apply(&gpu, &v_g, &mut res_g)?;
        assert_close(&gpu.read_vector(&res_g)?, &host.read_vector(&res_h)?, 1e-5);

        a.apply_l(&host, &v_h, &mut res_h)?;
        a_gpu.apply_l(&gpu, &v_g, &mut res_g)?;
        assert_close(&gpu.read_vector(&res_g)?, &host.read_vector(&res_h)?, 1e-5);

        a.apply_u(&host, &v_h, &mut res_h)?;
        a_gpu.apply_u(&gpu, &v_g, &mut res_g)?;
        assert_close(&gpu.read_vector(&res_g)?, &host.read_vector(&res_h)?, 1e-5);

        host.copy(&v_h, &mut res_h)?;
        gpu.copy(&v_g, &mut res_g)?;
        a.solve_l(&host, &mut res_h)?;
        a_gpu.solve_l(&gpu, &mut res_g)?;
        assert_close(&gpu.read_vector(&res_g)?, &host.read_vector(&res_h)?, 1e-5);

        host.copy(&v_h, &mut res_h)?;
        gpu.copy(&v_g, &mut res_g)?;
        a.solve_u(&host, &mut res_h)?;
        a_gpu.solve_u(&gpu, &mut res_g)?;
        assert_close(&gpu.read_vector(&res_g)?, &host.read_vector(&res_h)?, 1e-5);

        a.load_diagonal(&host, &mut res_h)?;
        a_gpu.load_diagonal(&gpu, &mut res_g)?;
        assert_close(&gpu.read_vector(&res_g)?, &host.read_vector(&res_h)?, 0.0);
    }
    Ok(())
}

#[test]
fn test_half_round_trip_on_gpu() -> Result<()> {
    let Some(gpu) = gpu_or_skip("test_half_round_trip_on_gpu") else {
        return Ok(());
    };
    let mut a = Diag9Matrix::<f64>::zeros(5, 1);
    a.diagonal_mut().fill(1.0);
    a.left_mut(0)[0] = 0.5;
    a.right_mut(0)[0] = 0.5;
    let a_gpu = a.to_device(&gpu)?;

    let v = [0.05, 0.1, 0.15, 0.2, 0.35];
    let v_g = gpu.create_vector("v", &v)?;
    let mut w = gpu.create_empty_vector("w", 5)?;
    let mut back = gpu.create_empty_vector("back", 5)?;

    // L (L⁻¹ v) = v
    gpu.copy(&v_g, &mut w)?;
    a_gpu.solve_l(&gpu, &mut w)?;
    a_gpu.apply_l(&gpu, &w, &mut back)?;
    for (b, v) in gpu.read_vector(&back)?.iter().zip(v) {
        assert!((b - v).abs() <= 1e-6);
    }

    // U (U⁻¹ v) = v
    gpu.copy(&v_g, &mut w)?;
    a_gpu.solve_u(&gpu, &mut w)?;
    a_gpu.apply_u(&gpu, &w, &mut back)?;
    for (b, v) in gpu.read_vector(&back)?.iter().zip(v) {
        assert!((b - v).abs() <= 1e-6);
    }
    Ok(())
}

#[test]
fn test_transfer_stats() -> Result<()> {
    let Some(gpu) = gpu_or_skip("test_transfer_stats") else {
        return Ok(());
    };
    gpu.reset_transfer_stats();
    let x = gpu.create_vector("x", &[1.0; 64])?;
    let uploaded = gpu.get_transfer_stats().bytes_to_gpu;
    assert!(uploaded >= 64 * 4);

    gpu.read_vector(&x)?;
    assert!(gpu.get_transfer_stats().bytes_from_gpu >= 64 * 4);

    gpu.reset_transfer_stats();
    assert_eq!(gpu.get_transfer_stats(), Default::default());
    Ok(())
}
