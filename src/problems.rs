//! Problem catalog
//!
//! Problems ship with the binary as a TOML file and are parsed once at
//! startup. `starter_code` and `expected_output` are maps keyed by
//! language identifier; a submission's language must be one of the
//! problem's known keys, checked at the judging boundary. Expected output
//! is never serialized into API responses.

use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// One catalog entry. Stored as snake_case TOML, serialized to the API
/// as camelCase JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Problem {
    /// Slug, e.g. "two-sum". Unique within the catalog.
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub category: String,
    pub description: Description,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// language -> starter source text
    pub starter_code: HashMap<String, String>,
    /// language -> expected stdout. Judging happens server-side, so the
    /// answers never leave the process.
    #[serde(skip_serializing)]
    pub expected_output: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    pub text: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Problem {
    /// Whether this problem knows the given language identifier.
    pub fn supports_language(&self, language: &str) -> bool {
        self.starter_code.contains_key(language) || self.expected_output.contains_key(language)
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    problems: Vec<Problem>,
}

/// Immutable problem catalog, ordered by title for listing.
pub struct ProblemCatalog {
    problems: Vec<Problem>,
}

impl ProblemCatalog {
    /// Load the catalog bundled with the binary.
    pub fn load() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/problems.toml"));
        Self::parse(content)
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        let raw: RawCatalog = toml::from_str(content).context("Invalid problem catalog")?;

        let mut problems = raw.problems;
        problems.sort_by(|a, b| a.title.cmp(&b.title));

        for problem in &problems {
            anyhow::ensure!(!problem.id.is_empty(), "Problem with empty slug");
            anyhow::ensure!(
                !problem.expected_output.is_empty(),
                "Problem {} has no expected output",
                problem.id
            );
        }

        Ok(Self { problems })
    }

    pub fn all(&self) -> &[Problem] {
        &self.problems
    }

    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }
}
