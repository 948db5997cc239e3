use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunwatchError;

/// Independent stream of domain data tracked per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Health,
    Error,
    Reconciliation,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Health, Category::Error, Category::Reconciliation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Health => "health",
            Category::Error => "logging",
            Category::Reconciliation => "reconciliation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RunwatchError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(Category::Health),
            "logging" | "error" => Ok(Category::Error),
            "reconciliation" => Ok(Category::Reconciliation),
            other => Err(RunwatchError::InvalidArgument(format!(
                "unknown category: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!("health".parse::<Category>().unwrap(), Category::Health);
        assert_eq!("logging".parse::<Category>().unwrap(), Category::Error);
        assert_eq!("Error".parse::<Category>().unwrap(), Category::Error);
        assert_eq!(
            "reconciliation".parse::<Category>().unwrap(),
            Category::Reconciliation
        );
    }

    #[test]
    fn test_unknown_name_is_invalid_argument() {
        let err = "metrics".parse::<Category>().unwrap_err();
        assert!(matches!(err, RunwatchError::InvalidArgument(_)));
    }

    #[test]
    fn test_display_round_trips() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>().unwrap(), category);
        }
    }
}
