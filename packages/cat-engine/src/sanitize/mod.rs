use crate::error::ParamError;
use crate::types::{IrtParams, PROBABILITY_FLOOR};

/// Validate a raw parameter bundle read from the corpus
///
/// Missing or NaN difficulty marks an unnormed item; every other failure is a
/// malformed row.
pub fn validate_params(
    difficulty: Option<f64>,
    discrimination: f64,
    guessing: f64,
    upper_asymptote: f64,
) -> Result<IrtParams, ParamError> {
    let difficulty = match difficulty {
        None => return Err(ParamError::MissingDifficulty),
        Some(b) if b.is_nan() => return Err(ParamError::MissingDifficulty),
        Some(b) if b.is_infinite() => return Err(ParamError::NonFinite { field: "difficulty" }),
        Some(b) => b,
    };

    if !discrimination.is_finite() {
        return Err(ParamError::NonFinite {
            field: "discrimination",
        });
    }
    if discrimination <= 0.0 {
        return Err(ParamError::NonPositiveDiscrimination(discrimination));
    }

    if !guessing.is_finite() {
        return Err(ParamError::NonFinite { field: "guessing" });
    }
    if !(0.0..1.0).contains(&guessing) {
        return Err(ParamError::GuessingOutOfRange(guessing));
    }

    if !upper_asymptote.is_finite() {
        return Err(ParamError::NonFinite {
            field: "upper_asymptote",
        });
    }
    if upper_asymptote <= guessing || upper_asymptote > 1.0 {
        return Err(ParamError::UpperAsymptoteOutOfRange(upper_asymptote));
    }

    Ok(IrtParams {
        discrimination,
        difficulty,
        guessing,
        upper_asymptote,
    })
}

/// Keep a probability away from 0 and 1 so log-likelihood terms stay finite
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR)
}

/// Clamp theta into [min, max], mapping NaN to the middle of the range
pub fn clamp_theta(theta: f64, min: f64, max: f64) -> f64 {
    if theta.is_nan() {
        return ((min + max) / 2.0).clamp(min, max);
    }
    theta.clamp(min, max)
}

/// Standard error from accumulated test information, capped at `max_se`
pub fn standard_error_from_information(information: f64, max_se: f64) -> f64 {
    if !information.is_finite() || information <= 0.0 {
        return max_se;
    }
    (1.0 / information.sqrt()).min(max_se)
}
