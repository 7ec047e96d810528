// Scoring helpers shared by the fairness tracker and the selector

use chrono::{DateTime, Utc};

/// Exponential decay with the given half-life; 1.0 at age zero, 0.5 after one half-life
pub fn exponential_decay(age: f64, half_life: f64) -> f64 {
    if half_life <= 0.0 {
        return 0.0;
    }
    0.5_f64.powf(age.max(0.0) / half_life)
}

/// Age in fractional days, clamped at zero for timestamps in the future
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = (now - created_at).num_seconds().max(0) as f64;
    seconds / 86_400.0
}

/// Clamp into the 0-100 score range, mapping NaN to 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}
