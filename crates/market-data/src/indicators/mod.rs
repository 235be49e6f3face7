//! Technical indicators computed from a daily price series.
//!
//! [`compute_indicators`] is pure: the same bars always give the same
//! [`IndicatorSet`]. Values that the history is too short for are reported as
//! [`IndicatorValue::Unavailable`] rather than guessed.

pub mod series;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::PricePoint;

/// Below this many bars no indicator is reported at all.
pub const MIN_HISTORY: usize = 14;

pub const RSI_PERIOD: usize = 14;
pub const ATR_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// Latest value of one indicator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndicatorValue {
    Available { value: f64 },
    /// Not enough bars: `required` were needed, `actual` were supplied.
    Unavailable { required: usize, actual: usize },
}

impl IndicatorValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Available { value } => Some(*value),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Last point of a series, or unavailable when it is `NaN` or missing.
    fn latest(series: &[f64], required: usize, actual: usize) -> Self {
        match series.last() {
            Some(v) if v.is_finite() && actual >= MIN_HISTORY => Self::Available { value: *v },
            _ => Self::Unavailable { required, actual },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Momentum {
    Overbought,
    Oversold,
    Neutral,
    Unknown,
}

/// Summary reading of the latest indicator values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalSignals {
    /// Close against the 200-day SMA
    pub trend: Trend,
    /// RSI against the 70/30 bands
    pub momentum: Momentum,
    /// MACD line against its signal line
    pub macd: Trend,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    /// Date of the last bar the values refer to
    pub as_of: Option<NaiveDate>,
    pub bars: usize,
    pub last_close: Option<f64>,
    pub sma_20: IndicatorValue,
    pub sma_50: IndicatorValue,
    pub sma_200: IndicatorValue,
    pub ema_12: IndicatorValue,
    pub ema_26: IndicatorValue,
    pub rsi_14: IndicatorValue,
    pub macd: IndicatorValue,
    pub macd_signal: IndicatorValue,
    pub macd_histogram: IndicatorValue,
    pub atr_14: IndicatorValue,
    pub obv: IndicatorValue,
    pub signals: TechnicalSignals,
}

impl IndicatorSet {
    /// Number of indicator values that could be computed.
    pub fn available_count(&self) -> usize {
        [
            &self.sma_20,
            &self.sma_50,
            &self.sma_200,
            &self.ema_12,
            &self.ema_26,
            &self.rsi_14,
            &self.macd,
            &self.macd_signal,
            &self.macd_histogram,
            &self.atr_14,
            &self.obv,
        ]
        .iter()
        .filter(|v| v.is_available())
        .count()
    }
}

/// Compute the indicator set for bars sorted ascending by date.
pub fn compute_indicators(prices: &[PricePoint]) -> IndicatorSet {
    let n = prices.len();
    let closes: Vec<f64> = prices.iter().map(PricePoint::close_f64).collect();
    let highs: Vec<f64> = prices.iter().map(PricePoint::high_f64).collect();
    let lows: Vec<f64> = prices.iter().map(PricePoint::low_f64).collect();

    let sma_20 = IndicatorValue::latest(&series::sma(&closes, 20), 20, n);
    let sma_50 = IndicatorValue::latest(&series::sma(&closes, 50), 50, n);
    let sma_200 = IndicatorValue::latest(&series::sma(&closes, 200), 200, n);
    let ema_12 = IndicatorValue::latest(&series::ema(&closes, 12), 12, n);
    let ema_26 = IndicatorValue::latest(&series::ema(&closes, 26), 26, n);
    let rsi_14 = IndicatorValue::latest(
        &series::rsi(&closes, RSI_PERIOD),
        RSI_PERIOD + 1,
        n,
    );

    let macd_series = series::macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let signal_required = MACD_SLOW + MACD_SIGNAL - 1;
    let macd = IndicatorValue::latest(&macd_series.line, MACD_SLOW, n);
    let macd_signal = IndicatorValue::latest(&macd_series.signal, signal_required, n);
    let macd_histogram = IndicatorValue::latest(&macd_series.histogram, signal_required, n);

    let atr_14 = IndicatorValue::latest(
        &series::atr(&highs, &lows, &closes, ATR_PERIOD),
        ATR_PERIOD,
        n,
    );

    // OBV is only meaningful when every bar carries a volume
    let volumes: Option<Vec<f64>> = prices.iter().map(|p| p.volume.map(|v| v as f64)).collect();
    let obv = match volumes {
        Some(volumes) => IndicatorValue::latest(&series::obv(&closes, &volumes), MIN_HISTORY, n),
        None => IndicatorValue::Unavailable {
            required: n,
            actual: prices.iter().filter(|p| p.volume.is_some()).count(),
        },
    };

    let last_close = closes.last().copied();
    let signals = TechnicalSignals {
        trend: match (last_close, sma_200.value()) {
            (Some(close), Some(sma)) if close > sma => Trend::Bullish,
            (Some(_), Some(_)) => Trend::Bearish,
            _ => Trend::Unknown,
        },
        momentum: match rsi_14.value() {
            Some(rsi) if rsi > RSI_OVERBOUGHT => Momentum::Overbought,
            Some(rsi) if rsi < RSI_OVERSOLD => Momentum::Oversold,
            Some(_) => Momentum::Neutral,
            None => Momentum::Unknown,
        },
        macd: match (macd.value(), macd_signal.value()) {
            (Some(line), Some(signal)) if line > signal => Trend::Bullish,
            (Some(_), Some(_)) => Trend::Bearish,
            _ => Trend::Unknown,
        },
    };

    IndicatorSet {
        as_of: prices.last().map(|p| p.date),
        bars: n,
        last_close,
        sma_20,
        sma_50,
        sma_200,
        ema_12,
        ema_26,
        rsi_14,
        macd,
        macd_signal,
        macd_histogram,
        atr_14,
        obv,
        signals,
    }
}
