//! Temperature-scaled softmax over classifier logits.
//!
//! Dividing logits by a temperature above 1 flattens the distribution toward
//! uniform: relative ranking is unchanged, absolute confidence is softened.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Index of the "hate" class in the classifier output.
pub const HATE_CLASS: usize = 1;

/// Positive, finite softmax temperature.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "f32")]
pub struct Temperature(f32);

impl Temperature {
    pub const DEFAULT: Self = Self(4.0);

    /// Returns `None` unless `value` is finite and strictly positive.
    #[must_use]
    pub fn new(value: f32) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    #[must_use]
    pub const fn get(self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f32> for Temperature {
    type Error = String;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("temperature must be a positive number, got {value}"))
    }
}

impl FromStr for Temperature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s.trim().parse().map_err(|e| format!("{e}"))?;
        Self::try_from(value)
    }
}

/// Softmax of `logits / temperature`. Empty input yields an empty vector.
#[must_use]
pub fn temperature_softmax(logits: &[f32], temperature: Temperature) -> Vec<f32> {
    let t = temperature.get();
    let max = logits
        .iter()
        .map(|&l| l / t)
        .fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l / t - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Calibrated probability of the hate class, or `None` if the row has fewer
/// than two classes.
#[must_use]
pub fn hate_probability(logits: &[f32], temperature: Temperature) -> Option<f32> {
    if logits.len() <= HATE_CLASS {
        return None;
    }
    temperature_softmax(logits, temperature)
        .get(HATE_CLASS)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn pair_sums_to_one() {
        for logits in [[2.0, 1.0], [-3.5, 7.25], [0.0, 0.0], [80.0, -80.0], [1e-4, 1e-4]] {
            for t in [0.5, 1.0, 4.0, 10.0] {
                let probs = temperature_softmax(&logits, Temperature::new(t).unwrap());
                assert!((probs[0] + probs[1] - 1.0).abs() < EPS, "{logits:?} t={t}");
            }
        }
    }

    #[test]
    fn higher_temperature_softens() {
        let logits = [-2.0, 6.0];
        let sharp = hate_probability(&logits, Temperature::new(1.0).unwrap()).unwrap();
        let soft = hate_probability(&logits, Temperature::DEFAULT).unwrap();
        assert!(sharp > soft);
        assert!(soft > 0.5);
    }

    #[test]
    fn ranking_is_preserved() {
        let t = Temperature::DEFAULT;
        let low = hate_probability(&[1.0, 0.5], t).unwrap();
        let high = hate_probability(&[1.0, 3.0], t).unwrap();
        assert!(low < 0.5);
        assert!(high > low);
    }

    #[test]
    fn default_temperature_value() {
        // exp(2)/(1+exp(2)) for logits [0, 8] at t=4
        let p = hate_probability(&[0.0, 8.0], Temperature::default()).unwrap();
        assert!((p - 0.880_797).abs() < 1e-5);
    }

    #[test]
    fn extreme_logits_stay_finite() {
        let p = hate_probability(&[-1e30, 1e30], Temperature::new(1.0).unwrap()).unwrap();
        assert!(p.is_finite());
        assert!((p - 1.0).abs() < EPS);
    }

    #[test]
    fn single_class_has_no_hate_probability() {
        assert!(hate_probability(&[3.0], Temperature::DEFAULT).is_none());
        assert!(hate_probability(&[], Temperature::DEFAULT).is_none());
    }

    #[test]
    fn temperature_rejects_non_positive() {
        assert!(Temperature::new(0.0).is_none());
        assert!(Temperature::new(-1.0).is_none());
        assert!(Temperature::new(f32::NAN).is_none());
        assert!(Temperature::new(f32::INFINITY).is_none());
        assert!("abc".parse::<Temperature>().is_err());
        assert_eq!("2.5".parse::<Temperature>().unwrap().get(), 2.5);
    }
}
