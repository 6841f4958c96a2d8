use std::f64::consts::TAU;

use anyhow::{anyhow, ensure, Result};
use log::trace;

/// Number of taps for a given sigma: `1 + 2 * ceil(2.5 * sigma)`.
pub fn window_size(sigma: f32) -> Result<usize> {
    ensure!(
        sigma.is_finite() && sigma > 0.0,
        "gaussian sigma must be a positive finite number, got {sigma}"
    );
    let half = (2.5 * f64::from(sigma)).ceil();
    ensure!(
        half < usize::MAX as f64,
        "sigma {sigma} is too large for a kernel window"
    );
    (half as usize)
        .checked_mul(2)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| anyhow!("sigma {sigma} is too large for a kernel window"))
}

/// Normalized 1-D Gaussian of length [`window_size`], centered at
/// `len / 2`.
pub fn gaussian_kernel(sigma: f32) -> Result<Vec<f32>> {
    let n = window_size(sigma)?;
    let center = (n / 2) as f64;
    let s = f64::from(sigma);
    let mut kernel = Vec::new();
    kernel
        .try_reserve_exact(n)
        .map_err(|e| anyhow!("failed to allocate a {n}-tap kernel: {e}"))?;
    for i in 0..n {
        let x = i as f64 - center;
        kernel.push(((-0.5 * x * x / (s * s)).exp() / (s * TAU.sqrt())) as f32);
    }
    let sum: f32 = kernel.iter().sum();
    ensure!(sum > 0.0, "gaussian kernel for sigma {sigma} underflowed");
    for v in &mut kernel {
        *v /= sum;
    }
    trace!("gaussian kernel ({n} taps): {kernel:?}");
    Ok(kernel)
}
