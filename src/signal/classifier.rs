use serde::{Deserialize, Serialize};
use simple_moving_average::{SMA, SingleSumSMA};

use super::{SignalHistory, SignalSample};

/// Accuracy at or below this is a good fix
const GOOD_ACCURACY_M: f64 = 10.;
/// Accuracy at or below this is a fair fix
const FAIR_ACCURACY_M: f64 = 30.;
/// Samples below this accuracy count towards `percent_good`
const PERCENT_GOOD_ACCURACY_M: f64 = 20.;
/// Number of most recent samples considered for the trend
pub const TREND_WINDOW: usize = 5;
/// Halves must differ by more than this before the trend moves off stable
const TREND_HYSTERESIS_M: f64 = 5.;
/// Indoor confidence above this is treated as indoor
const INDOOR_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalQuality {
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalQuality::Good => write!(f, "Good"),
            SignalQuality::Fair => write!(f, "Fair"),
            SignalQuality::Poor => write!(f, "Poor"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalTrend {
    Improving,
    Declining,
    Stable,
}

/// Indoor positioning estimate supplied by the venue/beacon subsystem.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndoorReading {
    pub is_indoor: bool,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

/// Summary of signal health for display next to the finder arrow.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct SignalReport {
    pub quality: SignalQuality,
    pub trend: SignalTrend,
    /// Fraction of stored samples with good accuracy, in `[0, 1]`
    pub percent_good: f64,
    pub recent_mean_accuracy_m: Option<f64>,
    pub indoor: bool,
}

pub fn classify(accuracy_m: f64) -> SignalQuality {
    if accuracy_m <= GOOD_ACCURACY_M {
        SignalQuality::Good
    } else if accuracy_m <= FAIR_ACCURACY_M {
        SignalQuality::Fair
    } else {
        // NaN lands here too
        SignalQuality::Poor
    }
}

/// Compares the older and newer halves of the last few samples.
///
/// Lower accuracy radius is better, so a shrinking mean is `Improving`.
pub fn trend(history: &SignalHistory) -> SignalTrend {
    let recent: Vec<&SignalSample> = history.recent(TREND_WINDOW).collect();
    if recent.len() < 2 {
        return SignalTrend::Stable;
    }

    let (older, newer) = recent.split_at(recent.len() / 2);
    let (Some(older_mean), Some(newer_mean)) = (
        mean_accuracy(older.iter().copied()),
        mean_accuracy(newer.iter().copied()),
    ) else {
        return SignalTrend::Stable;
    };

    let delta = newer_mean - older_mean;
    if delta < -TREND_HYSTERESIS_M {
        SignalTrend::Improving
    } else if delta > TREND_HYSTERESIS_M {
        SignalTrend::Declining
    } else {
        SignalTrend::Stable
    }
}

pub fn percent_good(history: &SignalHistory) -> f64 {
    if history.is_empty() {
        return 0.;
    }
    let good = history
        .iter()
        .filter(|s| s.accuracy_m < PERCENT_GOOD_ACCURACY_M)
        .count();
    good as f64 / history.len() as f64
}

/// Missing readings are treated as outdoor.
pub fn is_indoor(reading: Option<&IndoorReading>) -> bool {
    reading.is_some_and(|r| r.confidence > INDOOR_CONFIDENCE_THRESHOLD)
}

pub fn report(
    history: &SignalHistory,
    current_accuracy_m: Option<f64>,
    indoor: Option<&IndoorReading>,
) -> SignalReport {
    let recent_mean_accuracy_m = mean_accuracy(history.recent(TREND_WINDOW));
    let quality = current_accuracy_m
        .or(history.latest().map(|s| s.accuracy_m))
        .map(classify)
        .unwrap_or(SignalQuality::Poor);

    SignalReport {
        quality,
        trend: trend(history),
        percent_good: percent_good(history),
        recent_mean_accuracy_m,
        indoor: is_indoor(indoor),
    }
}

fn mean_accuracy<'a>(samples: impl Iterator<Item = &'a SignalSample>) -> Option<f64> {
    let mut sma = SingleSumSMA::<f64, f64, TREND_WINDOW>::new();
    for sample in samples {
        sma.add_sample(sample.accuracy_m);
    }
    if sma.get_num_samples() == 0 {
        None
    } else {
        Some(sma.get_average())
    }
}
