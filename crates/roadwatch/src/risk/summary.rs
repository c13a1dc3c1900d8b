//! Human-readable summary of a set of risk weights.

use serde::{Deserialize, Serialize};

use crate::weather::WeatherFeatures;

/// Severity at or above which a point counts as high risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

const FOG_VISIBILITY_MI: f64 = 2.0;
const LOW_VISIBILITY_MI: f64 = 5.0;
const HIGH_WIND_MPH: f64 = 30.0;

/// How urgently the driver should be alerted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Capitalised label used for the summary `level`.
    pub fn level(self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
        }
    }
}

/// Aggregate view over one corridor or batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub level: String,
    pub avg_risk: f64,
    pub max_risk: f64,
    pub high_risk_count: usize,
    pub high_risk_threshold: f64,
    pub message: String,
    pub urgency: Urgency,
}

/// Weather hazards present anywhere in the sampled conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeatherFlags {
    pub rain: bool,
    pub snow: bool,
    pub fog: bool,
    pub storm: bool,
    pub high_wind: bool,
    pub low_visibility: bool,
}

impl WeatherFlags {
    pub fn from_conditions<'a, I>(conditions: I) -> Self
    where
        I: IntoIterator<Item = &'a WeatherFeatures>,
    {
        let mut flags = Self::default();
        for w in conditions {
            let label = w.condition_label.to_lowercase();
            flags.rain |= label.contains("rain");
            flags.snow |= label.contains("snow");
            flags.storm |= label.contains("storm") || label.contains("thunder");
            flags.fog |= w.visibility_mi < FOG_VISIBILITY_MI;
            flags.low_visibility |= w.visibility_mi < LOW_VISIBILITY_MI;
            flags.high_wind |= w.wind_speed_mph > HIGH_WIND_MPH;
        }
        flags
    }
}

/// Summarize per-point severities against the observed weather.
pub fn summarize(weights: &[f64], flags: WeatherFlags) -> RiskSummary {
    if weights.is_empty() {
        return RiskSummary {
            level: Urgency::Low.level().to_string(),
            avg_risk: 0.0,
            max_risk: 0.0,
            high_risk_count: 0,
            high_risk_threshold: HIGH_RISK_THRESHOLD,
            message: "No data available".to_string(),
            urgency: Urgency::Low,
        };
    }

    let avg = weights.iter().sum::<f64>() / weights.len() as f64;
    let max = weights.iter().copied().fold(f64::MIN, f64::max);
    let high_count = weights.iter().filter(|w| **w >= HIGH_RISK_THRESHOLD).count();

    let urgency = urgency(avg, max, high_count, flags);
    RiskSummary {
        level: urgency.level().to_string(),
        avg_risk: round2(avg),
        max_risk: round2(max),
        high_risk_count: high_count,
        high_risk_threshold: HIGH_RISK_THRESHOLD,
        message: message(max, high_count, flags),
        urgency,
    }
}

fn urgency(avg: f64, max: f64, high_count: usize, flags: WeatherFlags) -> Urgency {
    let severe_weather = flags.snow || flags.storm || flags.fog;
    if max >= 0.8 || (max >= 0.6 && severe_weather) {
        return Urgency::High;
    }

    if max >= 0.7
        || (max >= 0.5 && high_count >= 2)
        || (max >= 0.4 && (flags.rain || flags.high_wind))
        || max >= 0.4
        || avg >= 0.3
    {
        return Urgency::Medium;
    }

    Urgency::Low
}

fn message(max: f64, high_count: usize, flags: WeatherFlags) -> String {
    if max >= 0.8 {
        let text = if flags.storm {
            "Storm ahead - Reduce speed immediately"
        } else if flags.snow {
            "Heavy snow ahead - Very dangerous"
        } else if flags.fog {
            "Dense fog ahead - Low visibility"
        } else {
            "Very high risk ahead - Slow down and drive carefully"
        };
        return text.to_string();
    }

    if max >= 0.7 {
        return if flags.rain {
            format!("{high_count} wet road sections ahead - Slow down")
        } else if flags.snow {
            format!("{high_count} snowy sections ahead - Keep safe distance")
        } else if flags.low_visibility {
            "Low visibility ahead - Use headlights".to_string()
        } else if flags.high_wind {
            "Strong winds ahead - Grip steering firmly".to_string()
        } else {
            format!("{high_count} high-risk sections ahead - Drive carefully")
        };
    }

    let text = if max >= 0.5 {
        if flags.rain {
            "Wet road ahead - Maintain safe speed"
        } else if flags.high_wind {
            "Windy conditions ahead - Control vehicle"
        } else {
            "Medium risk ahead - Drive safely"
        }
    } else if max >= 0.3 {
        "Road is relatively safe - Stay alert"
    } else {
        "Road is safe"
    };
    text.to_string()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
