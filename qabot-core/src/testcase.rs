//! Test case generation from a parsed requirement

use crate::ParsedRequirement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Test case category, in generation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Positive,
    Negative,
    Boundary,
    Security,
}

impl Category {
    /// Every category, in the order cases are generated
    pub const ALL: [Category; 4] = [
        Category::Positive,
        Category::Negative,
        Category::Boundary,
        Category::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Positive => "POSITIVE",
            Category::Negative => "NEGATIVE",
            Category::Boundary => "BOUNDARY",
            Category::Security => "SECURITY",
        }
    }

    /// Fill this category's template
    pub fn describe(&self, action: &str, expected_outcome: &str) -> String {
        match self {
            Category::Positive => {
                format!("Verify user can '{}' and see '{}'.", action, expected_outcome)
            }
            Category::Negative => format!(
                "Verify '{}' with empty data does NOT show '{}'.",
                action, expected_outcome
            ),
            Category::Boundary => {
                format!("Verify '{}' with max character limit handles gracefully.", action)
            }
            Category::Security => {
                format!("Verify '{}' is protected against common vulnerabilities.", action)
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// 1-based, in generation order
    pub id: u32,
    pub category: Category,
    pub description: String,
}

/// One case per category, ids 1..=4, in `Category::ALL` order.
pub fn generate_test_cases(parsed: &ParsedRequirement) -> Vec<TestCase> {
    Category::ALL
        .iter()
        .zip(1u32..)
        .map(|(category, id)| TestCase {
            id,
            category: *category,
            description: category.describe(&parsed.action, &parsed.expected_outcome),
        })
        .collect()
}
