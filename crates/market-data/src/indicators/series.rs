//! Indicator series over plain `f64` inputs.
//!
//! Every function returns a vector the same length as its input. Positions
//! before the lookback is satisfied are `NaN`, and a `NaN` input poisons the
//! rest of a smoothed series.

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = sum / period as f64;
    }
    result
}

/// Exponential moving average seeded with the SMA of the first `period` values.
///
/// Leading `NaN`s in the input are skipped, so this can smooth another
/// indicator's output (e.g. the MACD line).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let start = match values.iter().position(|v| !v.is_nan()) {
        Some(start) => start,
        None => return result,
    };
    if n - start < period {
        return result;
    }

    let seed_end = start + period;
    let mut prev: f64 = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 2.0 / (period as f64 + 1.0);
    for i in seed_end..n {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// RSI = 100 - 100 / (1 + avg_gain / avg_loss). The first value appears at
/// index `period` (it needs `period` changes).
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change.is_nan() {
            return result;
        }
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let change = closes[i] - closes[i - 1];
        if change.is_nan() {
            return result;
        }
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = rsi_value(avg_gain, avg_loss);
    }
    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // no movement
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD line, signal line and histogram.
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| l - s)
        .collect();

    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Average True Range with Wilder smoothing, seeded with the mean of the
/// first `period` true ranges.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len().min(highs.len()).min(lows.len());
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let true_range = |i: usize| {
        let range = highs[i] - lows[i];
        if i == 0 {
            range
        } else {
            range
                .max((highs[i] - closes[i - 1]).abs())
                .max((lows[i] - closes[i - 1]).abs())
        }
    };

    let mut prev: f64 = (0..period).map(true_range).sum::<f64>() / period as f64;
    result[period - 1] = prev;
    for i in period..n {
        prev = (prev * (period as f64 - 1.0) + true_range(i)) / period as f64;
        result[i] = prev;
    }
    result
}

/// On-Balance Volume, starting from zero at the first bar.
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(volumes.len());
    let mut result = vec![f64::NAN; n];
    if n == 0 {
        return result;
    }

    let mut total = 0.0;
    result[0] = total;
    for i in 1..n {
        if closes[i] > closes[i - 1] {
            total += volumes[i];
        } else if closes[i] < closes[i - 1] {
            total -= volumes[i];
        }
        result[i] = total;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn sma_basic() {
        let result = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(result[0].is_nan() && result[1].is_nan());
        assert_approx(result[2], 2.0);
        assert_approx(result[3], 3.0);
        assert_approx(result[4], 4.0);
    }

    #[test]
    fn sma_too_short() {
        assert!(sma(&[1.0, 2.0], 3).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ema_seeded_with_sma() {
        let result = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_approx(result[2], 4.0);
        // alpha = 0.5: 0.5 * 8 + 0.5 * 4
        assert_approx(result[3], 6.0);
    }

    #[test]
    fn ema_skips_leading_nan() {
        let result = ema(&[f64::NAN, f64::NAN, 1.0, 1.0, 1.0], 3);
        assert!(result[3].is_nan());
        assert_approx(result[4], 1.0);
    }

    #[test]
    fn rsi_all_gains() {
        let result = rsi(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0], 3);
        assert_approx(result[3], 100.0);
        assert_approx(result[5], 100.0);
    }

    #[test]
    fn rsi_all_losses() {
        let result = rsi(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0], 3);
        assert_approx(result[3], 0.0);
    }

    #[test]
    fn rsi_bounds() {
        let closes = [100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0];
        for v in rsi(&closes, 3).into_iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn macd_of_flat_series_is_zero() {
        let closes = vec![50.0; 40];
        let series = macd(&closes, 12, 26, 9);
        assert_approx(series.line[39], 0.0);
        assert_approx(series.signal[39], 0.0);
        assert_approx(series.histogram[39], 0.0);
        // Signal needs slow + signal - 1 bars
        assert!(series.signal[32].is_nan());
        assert!(!series.signal[33].is_nan());
    }

    #[test]
    fn atr_constant_range() {
        let highs = vec![11.0; 5];
        let lows = vec![9.0; 5];
        let closes = vec![10.0; 5];
        let result = atr(&highs, &lows, &closes, 3);
        assert!(result[1].is_nan());
        assert_approx(result[2], 2.0);
        assert_approx(result[4], 2.0);
    }

    #[test]
    fn obv_accumulates_by_direction() {
        let closes = [10.0, 11.0, 10.5, 10.5, 12.0];
        let volumes = [100.0, 200.0, 50.0, 70.0, 10.0];
        let result = obv(&closes, &volumes);
        assert_eq!(result, vec![0.0, 200.0, 150.0, 150.0, 160.0]);
    }
}
