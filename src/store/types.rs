// Saved query data types
// JSON shapes match what the Ratel UI sends and expects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CATEGORY: &str = "General";

/// Whether a saved query is run as a query or a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryAction {
    #[default]
    Query,
    Mutate,
}

impl QueryAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutate => "mutate",
        }
    }
}

impl fmt::Display for QueryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "query" => Ok(Self::Query),
            "mutate" => Ok(Self::Mutate),
            other => Err(format!("action must be 'query' or 'mutate', got '{other}'")),
        }
    }
}

/// A persisted query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuery {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub action: QueryAction,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of create/update requests; every field may be omitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SavedQueryInput {
    pub name: String,
    pub description: String,
    pub category: String,
    pub action: String,
    pub query: String,
}

/// Input after validation and defaulting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidQuery {
    pub name: String,
    pub description: String,
    pub category: String,
    pub action: QueryAction,
    pub query: String,
}

impl SavedQueryInput {
    /// Check required fields and apply defaults
    pub fn validate(self) -> Result<ValidQuery, String> {
        if self.name.trim().is_empty() || self.query.trim().is_empty() {
            return Err("Name and query are required".to_string());
        }
        let action = self.action.trim().parse::<QueryAction>()?;
        let category = if self.category.trim().is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            self.category
        };

        Ok(ValidQuery {
            name: self.name,
            description: self.description,
            category,
            action,
            query: self.query,
        })
    }
}

/// `GET /api/saved-queries` body
#[derive(Debug, Serialize)]
pub struct SavedQueriesResponse {
    pub enabled: bool,
    pub queries: Vec<SavedQuery>,
}
