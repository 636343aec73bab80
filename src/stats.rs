//! Statistical utility functions shared across modules
//!
//! Quantiles, average ranks, polygamma helpers used by the empirical Bayes
//! prior estimation, and the lowess smoother used by the voom trend.

use std::cmp::Ordering;

/// Quantile of already-sorted data using linear interpolation
/// (Hyndman-Fan type 7, the default of most statistics packages).
pub fn quantile_type7(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }

    let h = (n as f64 - 1.0) * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;

    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Quantile of unsorted data (finite values only)
pub fn quantile(values: &[f64], p: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    quantile_type7(&sorted, p)
}

/// Median of the finite values
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Geometric mean of strictly positive values
pub fn geometric_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    (log_sum / values.len() as f64).exp()
}

/// Ranks starting at 1, ties receive the average of the ranks they span
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j share ranks i+1..=j+1
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Sizes of the tie groups in `values` (groups of size 1 included)
pub fn tie_group_sizes(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mut sizes = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        sizes.push(j - i + 1);
        i = j + 1;
    }
    sizes
}

/// Trigamma function ψ'(x) for x > 0
pub fn trigamma(x: f64) -> f64 {
    if !(x > 0.0) {
        return f64::NAN;
    }
    let mut x = x;
    let mut acc = 0.0;
    // recurrence ψ'(x) = ψ'(x + 1) + 1/x² until the asymptotic series is accurate
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let t = 1.0 / x;
    let t2 = t * t;
    acc + t + t2 / 2.0 + t * t2 * (1.0 / 6.0 - t2 * (1.0 / 30.0 - t2 * (1.0 / 42.0 - t2 / 30.0)))
}

/// Tetragamma function ψ''(x) for x > 0
pub fn tetragamma(x: f64) -> f64 {
    if !(x > 0.0) {
        return f64::NAN;
    }
    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc -= 2.0 / (x * x * x);
        x += 1.0;
    }
    let t = 1.0 / x;
    let t2 = t * t;
    acc - t2 - t2 * t - t2 * t2 / 2.0
        + t2 * t2 * t2 * (1.0 / 6.0 - t2 * (1.0 / 6.0 - t2 * 3.0 / 10.0))
}

/// Solve trigamma(y) = x for y by Newton iteration
pub fn trigamma_inverse(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    if x > 1e7 {
        return 1.0 / x.sqrt();
    }
    if x < 1e-6 {
        return 1.0 / x;
    }

    let mut y = 0.5 + 1.0 / x;
    for _ in 0..50 {
        let tri = trigamma(y);
        let dif = tri * (1.0 - tri / x) / tetragamma(y);
        y += dif;
        if -dif / y < 1e-8 {
            break;
        }
    }
    y
}

/// Piecewise-linear interpolation on sorted `xs`; values outside the range
/// take the nearest end point.
pub fn interpolate(xs: &[f64], ys: &[f64], xout: f64) -> f64 {
    let n = xs.len();
    if n == 0 {
        return f64::NAN;
    }
    if xout <= xs[0] {
        return ys[0];
    }
    if xout >= xs[n - 1] {
        return ys[n - 1];
    }

    // first index with xs[i] >= xout
    let hi = xs.partition_point(|&x| x < xout);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    if span <= 0.0 {
        return ys[hi];
    }
    ys[lo] + (xout - xs[lo]) / span * (ys[hi] - ys[lo])
}

/// Locally weighted scatterplot smoothing (Cleveland 1979).
///
/// Returns the fitted curve as `(sorted x, fitted y)` pairs. `f` is the span,
/// `robust_iter` the number of bisquare robustness iterations, and points
/// closer than `delta` to the last fitted point are linearly interpolated.
pub fn lowess(x: &[f64], y: &[f64], f: f64, robust_iter: usize, delta: f64) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(Ordering::Equal));
    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

    if n < 2 {
        return (xs, ys);
    }

    let ns = ((f * n as f64).round() as usize).clamp(2, n);
    let mut fitted = vec![0.0; n];
    let mut robustness = vec![1.0; n];
    let mut residuals = vec![0.0; n];

    for iteration in 0..=robust_iter {
        let mut nleft = 0usize;
        let mut nright = ns - 1;
        let mut last: Option<usize> = None;
        let mut i = 0usize;

        loop {
            // slide the window while it gets more centred on x[i]
            while nright < n - 1 {
                let d1 = xs[i] - xs[nleft];
                let d2 = xs[nright + 1] - xs[i];
                if d1 <= d2 {
                    break;
                }
                nleft += 1;
                nright += 1;
            }

            fitted[i] = local_fit(&xs, &ys, &robustness, xs[i], nleft, nright, iteration > 0)
                .unwrap_or(ys[i]);

            if let Some(l) = last {
                if l + 1 < i {
                    let denom = xs[i] - xs[l];
                    for j in (l + 1)..i {
                        let alpha = (xs[j] - xs[l]) / denom;
                        fitted[j] = alpha * fitted[i] + (1.0 - alpha) * fitted[l];
                    }
                }
            }
            last = Some(i);

            let l = i;
            let cut = xs[l] + delta;
            let mut next = l + 1;
            let mut last_equal = l;
            while next < n {
                if xs[next] > cut {
                    break;
                }
                if xs[next] == xs[l] {
                    fitted[next] = fitted[l];
                    last_equal = next;
                }
                next += 1;
            }
            last = Some(last_equal);
            i = (last_equal + 1).max(next.saturating_sub(1));
            if last_equal >= n - 1 {
                break;
            }
        }

        for k in 0..n {
            residuals[k] = ys[k] - fitted[k];
        }

        if iteration == robust_iter {
            break;
        }

        let abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let cmad = 6.0 * median(&abs_res);
        let mean_abs: f64 = abs_res.iter().sum::<f64>() / n as f64;
        if cmad < 1e-7 * mean_abs || cmad == 0.0 {
            break;
        }
        let c9 = 0.999 * cmad;
        let c1 = 0.001 * cmad;
        for k in 0..n {
            let r = abs_res[k];
            robustness[k] = if r <= c1 {
                1.0
            } else if r <= c9 {
                let u = r / cmad;
                (1.0 - u * u).powi(2)
            } else {
                0.0
            };
        }
    }

    (xs, fitted)
}

/// Weighted local linear fit at `xi` over the window `nleft..=nright`
fn local_fit(
    xs: &[f64],
    ys: &[f64],
    robustness: &[f64],
    xi: f64,
    nleft: usize,
    nright: usize,
    use_robustness: bool,
) -> Option<f64> {
    let n = xs.len();
    let range = xs[n - 1] - xs[0];
    let h = (xi - xs[nleft]).max(xs[nright] - xi);
    let h9 = 0.999 * h;
    let h1 = 0.001 * h;

    let mut weights = vec![0.0; n];
    let mut total = 0.0;
    let mut j = nleft;
    while j < n {
        let r = (xs[j] - xi).abs();
        if r <= h9 {
            let mut w = if r <= h1 { 1.0 } else { (1.0 - (r / h).powi(3)).powi(3) };
            if use_robustness {
                w *= robustness[j];
            }
            weights[j] = w;
            total += w;
        } else if xs[j] > xi {
            break;
        }
        j += 1;
    }
    let nrt = j;

    if total <= 0.0 {
        return None;
    }
    for w in weights[nleft..nrt].iter_mut() {
        *w /= total;
    }

    if h > 0.0 {
        let a: f64 = (nleft..nrt).map(|k| weights[k] * xs[k]).sum();
        let c: f64 = (nleft..nrt).map(|k| weights[k] * (xs[k] - a).powi(2)).sum();
        if c.sqrt() > 0.001 * range {
            let b = (xi - a) / c;
            for k in nleft..nrt {
                weights[k] *= b * (xs[k] - a) + 1.0;
            }
        }
    }

    Some((nleft..nrt).map(|k| weights[k] * ys[k]).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_type7() {
        let x = vec![1.0, 2.0, 3.0, 4.0];
        assert!((quantile_type7(&x, 0.75) - 3.25).abs() < 1e-12);
        assert!((quantile_type7(&x, 0.5) - 2.5).abs() < 1e-12);
        assert!((median(&[5.0, 1.0, 3.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_ranks_ties() {
        let ranks = average_ranks(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
        assert_eq!(tie_group_sizes(&[10.0, 20.0, 10.0, 30.0]), vec![2, 1, 1]);
    }

    #[test]
    fn test_trigamma_known_values() {
        // ψ'(1) = π²/6, ψ'(0.5) = π²/2
        let pi2 = std::f64::consts::PI.powi(2);
        assert!((trigamma(1.0) - pi2 / 6.0).abs() < 1e-8);
        assert!((trigamma(0.5) - pi2 / 2.0).abs() < 1e-8);
        // ψ''(1) = -2ζ(3)
        assert!((tetragamma(1.0) + 2.0 * 1.202056903159594).abs() < 1e-8);
    }

    #[test]
    fn test_trigamma_inverse_roundtrip() {
        for &y in &[0.3, 1.0, 2.5, 10.0, 40.0] {
            let x = trigamma(y);
            assert!((trigamma_inverse(x) - y).abs() / y < 1e-6);
        }
    }

    #[test]
    fn test_interpolate_clamps() {
        let xs = vec![0.0, 1.0, 2.0];
        let ys = vec![0.0, 10.0, 20.0];
        assert_eq!(interpolate(&xs, &ys, -1.0), 0.0);
        assert!((interpolate(&xs, &ys, 1.5) - 15.0).abs() < 1e-12);
        assert_eq!(interpolate(&xs, &ys, 5.0), 20.0);
    }

    #[test]
    fn test_lowess_linear_data() {
        // lowess reproduces a straight line exactly
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let (xs, fit) = lowess(&x, &y, 0.5, 3, 0.0);
        for (xi, fi) in xs.iter().zip(fit.iter()) {
            assert!((fi - (2.0 * xi + 1.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lowess_with_delta_is_smooth() {
        let x: Vec<f64> = (0..200).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = x.iter().map(|v| (v / 4.0).sin()).collect();
        let delta = 0.01 * 19.9;
        let (_, fit) = lowess(&x, &y, 0.2, 0, delta);
        assert_eq!(fit.len(), 200);
        for (yi, fi) in y.iter().zip(fit.iter()) {
            assert!((yi - fi).abs() < 0.1);
        }
    }
}
