//! Velocity profiles.

use serde::{Deserialize, Serialize};

/// Scales commit frequency only; sizes, splits and review behaviour are
/// unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Velocity {
    Low,
    #[default]
    Medium,
    High,
}

impl Velocity {
    pub fn all() -> Vec<Velocity> {
        vec![Velocity::Low, Velocity::Medium, Velocity::High]
    }

    /// Commit-rate multiplier.
    pub fn multiplier(&self) -> f64 {
        match self {
            Velocity::Low => 0.5,
            Velocity::Medium => 1.0,
            Velocity::High => 2.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Velocity::Low => "low",
            Velocity::Medium => "medium",
            Velocity::High => "high",
        }
    }
}

impl std::fmt::Display for Velocity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Velocity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "slow" => Ok(Velocity::Low),
            "medium" | "normal" => Ok(Velocity::Medium),
            "high" | "fast" => Ok(Velocity::High),
            _ => Err(format!("Unknown velocity: {} (expected low, medium or high)", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_multiplier() {
        assert_eq!("HIGH".parse::<Velocity>().unwrap(), Velocity::High);
        assert_eq!("medium".parse::<Velocity>().unwrap().multiplier(), 1.0);
        assert!("warp".parse::<Velocity>().is_err());
    }

    #[test]
    fn test_multipliers_increase() {
        let m: Vec<f64> = Velocity::all().iter().map(|v| v.multiplier()).collect();
        assert!(m.windows(2).all(|w| w[0] < w[1]));
    }
}
