use thiserror::Error;

#[derive(Debug, Error)]
pub enum RationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid diet: {0}")]
    InvalidDiet(String),
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RationError>;

/// Divide, returning `default` when the denominator is effectively zero.
pub fn safe_divide(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator.abs() < 1e-12 {
        default
    } else {
        numerator / denominator
    }
}

/// Sum treating non-finite entries as zero.
pub fn safe_sum(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .map(|v| if v.is_finite() { v } else { 0.0 })
        .sum()
}

/// Weighted sum of amounts against a per-feed attribute.
pub fn dot(amounts: &[f64], attribute: impl Iterator<Item = f64>) -> f64 {
    amounts
        .iter()
        .zip(attribute)
        .map(|(a, b)| {
            let v = a * b;
            if v.is_finite() {
                v
            } else {
                0.0
            }
        })
        .sum()
}

/// Replace non-finite values with zero; outputs never carry NaN/∞.
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Clamp a derived value into the non-negative range, mapping NaN to zero.
pub fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

pub fn validate_body_weight(bw: f64) -> Result<()> {
    if !bw.is_finite() || bw <= 0.0 {
        return Err(RationError::InvalidInput(format!(
            "body weight must be positive, got {bw}"
        )));
    }
    if bw > 1500.0 {
        return Err(RationError::InvalidInput(format!(
            "body weight seems unusually high ({bw} kg)"
        )));
    }
    Ok(())
}

pub fn validate_body_condition(bcs: f64) -> Result<()> {
    if !(1.0..=5.0).contains(&bcs) {
        return Err(RationError::InvalidInput(format!(
            "body condition score must be within 1-5, got {bcs}"
        )));
    }
    Ok(())
}

pub fn validate_feed_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RationError::InvalidInput(
            "feed name cannot be empty".to_string(),
        ));
    }
    if name.len() > 200 {
        return Err(RationError::InvalidInput(
            "feed name too long (max 200 characters)".to_string(),
        ));
    }
    Ok(())
}
