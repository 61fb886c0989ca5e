//! Digital-twin analytics
//!
//! Both scores read the shared state; neither feeds back into telemetry.

use crate::types::{round_to, ModeSnapshot, OperatingMode};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Average assumed when no heart rates have been recorded yet (bpm)
pub const DEFAULT_AVERAGE_HR: f64 = 75.0;

/// Heart rate corresponding to 100% spike risk (bpm)
pub const SPIKE_REFERENCE_HR: f64 = 115.0;

/// Risk percentage above which the dashboard shows a visual warning
pub const VISUAL_WARNING_RISK_PCT: f64 = 80.0;

/// One forecast horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForecastPoint {
    Spike {
        time: String,
        spike_probability: String,
    },
    Stability {
        time: String,
        stability: i32,
    },
}

/// Response for the digital-twin prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinForecast {
    pub forecast: Vec<ForecastPoint>,
    pub risk_level: String,
    pub visual_alert: bool,
    pub recommendation: String,
}

/// Spike risk percentage for a heart-rate average, one decimal, capped at 99
pub fn spike_risk_pct(average_hr: Option<f64>) -> f64 {
    let avg = average_hr.unwrap_or(DEFAULT_AVERAGE_HR);
    round_to((avg / SPIKE_REFERENCE_HR * 100.0).min(99.0), 1)
}

/// Build the three-horizon forecast from the history average and mode
pub fn predict<R: Rng + ?Sized>(
    average_hr: Option<f64>,
    mode: ModeSnapshot,
    rng: &mut R,
) -> TwinForecast {
    let risk = spike_risk_pct(average_hr);
    let visual_warning = risk > VISUAL_WARNING_RISK_PCT || mode.alert_active;

    let forecast = vec![
        ForecastPoint::Spike {
            time: "+30m".to_string(),
            spike_probability: format!("{risk:.1}%"),
        },
        ForecastPoint::Stability {
            time: "+1h".to_string(),
            stability: rng.gen_range(85..=95),
        },
        ForecastPoint::Stability {
            time: "+2h".to_string(),
            stability: rng.gen_range(80..=90),
        },
    ];

    let (risk_level, recommendation) = if visual_warning {
        ("CRITICAL", "IMMEDIATE REVIEW REQUIRED")
    } else {
        ("Moderate", "Maintain settings.")
    };

    TwinForecast {
        forecast,
        risk_level: risk_level.to_string(),
        visual_alert: visual_warning,
        recommendation: recommendation.to_string(),
    }
}

/// Stability score for the neural-sync panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityScore {
    pub score: i32,
    pub mode: OperatingMode,
}

/// Score reported vitals: 65 under tachycardia, 88 otherwise
pub fn stability_score(heart_rate: i32, mode: ModeSnapshot) -> StabilityScore {
    StabilityScore {
        score: if heart_rate > 100 { 65 } else { 88 },
        mode: mode.mode(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CALM: ModeSnapshot = ModeSnapshot {
        alert_active: false,
        stabilizing: false,
    };

    #[test]
    fn test_spike_risk() {
        // Empty history assumes 75 bpm: 75 / 115 = 65.2%
        assert_eq!(spike_risk_pct(None), 65.2);
        assert_eq!(spike_risk_pct(Some(92.0)), 80.0);
        assert_eq!(spike_risk_pct(Some(200.0)), 99.0);
    }

    #[test]
    fn test_predict_calm() {
        let mut rng = StdRng::seed_from_u64(7);
        let twin = predict(None, CALM, &mut rng);

        assert_eq!(twin.risk_level, "Moderate");
        assert!(!twin.visual_alert);
        assert_eq!(twin.recommendation, "Maintain settings.");
        assert_eq!(
            twin.forecast[0],
            ForecastPoint::Spike {
                time: "+30m".to_string(),
                spike_probability: "65.2%".to_string()
            }
        );
        match &twin.forecast[1] {
            ForecastPoint::Stability { time, stability } => {
                assert_eq!(time, "+1h");
                assert!((85..=95).contains(stability));
            }
            other => panic!("unexpected point {other:?}"),
        }
    }

    #[test]
    fn test_predict_warns_on_risk_or_alert() {
        let mut rng = StdRng::seed_from_u64(8);

        let twin = predict(Some(130.0), CALM, &mut rng);
        assert_eq!(twin.risk_level, "CRITICAL");
        assert!(twin.visual_alert);

        let alert = ModeSnapshot {
            alert_active: true,
            stabilizing: false,
        };
        let twin = predict(Some(70.0), alert, &mut rng);
        assert!(twin.visual_alert);
        assert_eq!(twin.recommendation, "IMMEDIATE REVIEW REQUIRED");
    }

    #[test]
    fn test_forecast_wire_shape() {
        let mut rng = StdRng::seed_from_u64(9);
        let value = serde_json::to_value(predict(None, CALM, &mut rng)).unwrap();
        assert_eq!(value["forecast"][0]["spike_probability"], "65.2%");
        assert!(value["forecast"][2]["stability"].is_i64());
    }

    #[test]
    fn test_stability_score() {
        assert_eq!(stability_score(101, CALM).score, 65);
        assert_eq!(stability_score(100, CALM).score, 88);
        assert_eq!(stability_score(80, CALM).mode, OperatingMode::Normal);
    }
}
