use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("the feature pack coordinate cannot be null")]
    Empty,
    #[error(
        "the feature pack coordinate has to consist of <groupId>:<artifactId>[:<version>], got '{0}'"
    )]
    Malformed(String),
}

/// Identifier of a feature-pack: `groupId:artifactId[:version]`.
///
/// Two coordinates denote the same feature-pack when their producers
/// (`groupId:artifactId`) match; the version never takes part in identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeaturePackCoordinate {
    group_id: String,
    artifact_id: String,
    version: Option<String>,
}

impl FeaturePackCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version,
        }
    }

    /// Parse and validate a textual coordinate. Performs no I/O.
    pub fn parse(input: &str) -> Result<Self, CoordinateError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoordinateError::Empty);
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
            return Err(CoordinateError::Malformed(input.to_owned()));
        }

        Ok(Self {
            group_id: parts[0].to_owned(),
            artifact_id: parts[1].to_owned(),
            version: parts.get(2).map(|v| (*v).to_owned()),
        })
    }

    /// Like [`parse`](Self::parse), but treats an absent input as empty.
    pub fn parse_optional(input: Option<&str>) -> Result<Self, CoordinateError> {
        input.map_or(Err(CoordinateError::Empty), Self::parse)
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The version-less identity of this feature-pack.
    pub fn producer(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    pub fn same_producer(&self, other: &Self) -> bool {
        self.group_id == other.group_id && self.artifact_id == other.artifact_id
    }

    #[must_use]
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: Some(version.into()),
        }
    }

    #[must_use]
    pub fn without_version(&self) -> Self {
        Self {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: None,
        }
    }
}

impl fmt::Display for FeaturePackCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}:{v}", self.group_id, self.artifact_id),
            None => write!(f, "{}:{}", self.group_id, self.artifact_id),
        }
    }
}

impl FromStr for FeaturePackCoordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FeaturePackCoordinate {
    type Error = CoordinateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FeaturePackCoordinate> for String {
    fn from(value: FeaturePackCoordinate) -> Self {
        value.to_string()
    }
}
