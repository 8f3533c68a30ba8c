//! Small numeric helpers shared by the analytics services.

/// Arithmetic mean, or `None` for an empty slice.
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population variance.
#[allow(clippy::cast_precision_loss)]
pub fn variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator), or `None` below two values.
#[allow(clippy::cast_precision_loss)]
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64)
}

pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Percentile `p` in `[0, 1]` with linear interpolation between ranks.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Ordinary least squares fit of `values` against their index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// sqrt(SSR / (n - 2)); zero when n <= 2.
    pub residual_std_error: f64,
    pub n: usize,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit `y = intercept + slope * x` with `x = 0..n`. Needs two points.
#[allow(clippy::cast_precision_loss)]
pub fn linear_fit(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = mean(&xs)?;
    let y_mean = mean(values)?;

    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(values)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let ssr: f64 = xs
        .iter()
        .zip(values)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let residual_std_error = if n > 2 { (ssr / (n - 2) as f64).sqrt() } else { 0.0 };

    Some(LinearFit {
        slope,
        intercept,
        residual_std_error,
        n,
    })
}

// ---------------------------------------------------------------------------
// Student-t distribution
// ---------------------------------------------------------------------------

/// Natural log of the gamma function (Lanczos approximation).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.001_208_650_973_866_179,
        -0.000_005_395_239_384_953,
    ];
    let mut y = x;
    let tmp = x + 5.5 - (x + 0.5) * (x + 5.5).ln();
    let mut series = 1.000_000_000_190_015;
    for c in COEFFICIENTS {
        y += 1.0;
        series += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Continued fraction for the regularized incomplete beta function.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: u32 = 200;
    const EPS: f64 = 3.0e-14;
    const TINY: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = f64::from(m);
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function I_x(a, b).
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Two-sided p-value of a t statistic with `df` degrees of freedom.
pub fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    if df <= 0.0 || !df.is_finite() {
        return 1.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Two-sided critical value for `alpha`, found by bisection on the CDF.
pub fn student_t_critical(alpha: f64, df: f64) -> f64 {
    let (mut lo, mut hi) = (0.0_f64, 1000.0_f64);
    for _ in 0..100 {
        let mid = (lo + hi) / 2.0;
        if student_t_two_sided_p(mid, df) > alpha {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Welch's unequal-variance t-test of `b` against `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchTest {
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
    /// mean(b) - mean(a)
    pub mean_difference: f64,
    pub standard_error: f64,
    /// Cohen's d with pooled standard deviation.
    pub effect_size: f64,
}

impl WelchTest {
    /// Confidence interval of the mean difference at level `1 - alpha`.
    pub fn confidence_interval(&self, alpha: f64) -> (f64, f64) {
        let margin = student_t_critical(alpha, self.df) * self.standard_error;
        (self.mean_difference - margin, self.mean_difference + margin)
    }
}

/// Run Welch's test. Needs at least two samples on each side.
#[allow(clippy::cast_precision_loss)]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<WelchTest> {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (var_a, var_b) = (sample_variance(a)?, sample_variance(b)?);
    let mean_difference = mean(b)? - mean(a)?;

    let se_sq = var_a / na + var_b / nb;
    let standard_error = se_sq.sqrt();

    let pooled_sd = (((na - 1.0) * var_a + (nb - 1.0) * var_b) / (na + nb - 2.0)).sqrt();
    let effect_size = if pooled_sd > 0.0 {
        mean_difference / pooled_sd
    } else {
        0.0
    };

    if standard_error == 0.0 {
        // Identical constant samples: no evidence of a difference; distinct
        // constants differ with certainty.
        let p_value = if mean_difference == 0.0 { 1.0 } else { 0.0 };
        return Some(WelchTest {
            t: if mean_difference == 0.0 { 0.0 } else { f64::INFINITY.copysign(mean_difference) },
            df: na + nb - 2.0,
            p_value,
            mean_difference,
            standard_error,
            effect_size,
        });
    }

    let t = mean_difference / standard_error;
    let df = se_sq.powi(2)
        / ((var_a / na).powi(2) / (na - 1.0) + (var_b / nb).powi(2) / (nb - 1.0));

    Some(WelchTest {
        t,
        df,
        p_value: student_t_two_sided_p(t, df),
        mean_difference,
        standard_error,
        effect_size,
    })
}
