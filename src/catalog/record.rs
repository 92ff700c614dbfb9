use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gang-of-Four pattern family
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Creational,
    Structural,
    Behavioral,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Creational,
        Category::Structural,
        Category::Behavioral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Creational => "creational",
            Category::Structural => "structural",
            Category::Behavioral => "behavioral",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!(
                    "unknown category '{}' (expected creational, structural, or behavioral)",
                    s
                )
            })
    }
}

/// Class or object taking part in a pattern
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    pub role: String,
}

/// One catalog entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternRecord {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub intent: String,
    pub description: String,
    pub problem: String,
    pub solution: String,
    #[serde(default)]
    pub applicability: Vec<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
    /// Runnable snippet for the sandbox
    pub example_code: String,
    #[serde(default)]
    pub related_patterns: Vec<String>,
}

impl PatternRecord {
    /// Case-insensitive match against id, name, and intent
    pub fn matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [&self.id, &self.name, &self.intent]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Creational".parse::<Category>(), Ok(Category::Creational));
        assert_eq!(" BEHAVIORAL ".parse::<Category>(), Ok(Category::Behavioral));
        assert!("behavioural".parse::<Category>().is_err());
    }

    #[test]
    fn category_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Category::Structural).unwrap(),
            "\"structural\""
        );
        assert_eq!(Category::Structural.to_string(), "structural");
    }

    #[test]
    fn record_search_matches_intent() {
        let record = PatternRecord {
            id: "observer".to_string(),
            name: "Observer".to_string(),
            category: Category::Behavioral,
            intent: "Notify dependents when state changes".to_string(),
            description: String::new(),
            problem: String::new(),
            solution: String::new(),
            applicability: vec![],
            participants: vec![],
            pros: vec![],
            cons: vec![],
            example_code: String::new(),
            related_patterns: vec![],
        };
        assert!(record.matches("DEPENDENTS"));
        assert!(record.matches("obs"));
        assert!(!record.matches("factory"));
    }
}
