//! Label selectors.
//!
//! A [`ResourceSelector`] is the persisted, declarative clause (`key`,
//! `operator`, `values`). A [`LabelSelector`] is its validated, executable
//! form: a conjunction of requirements evaluated against an object's labels.
//!
//! An empty list of clauses selects nothing, never everything.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while turning declarative clauses into a selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The operator is not one of In, NotIn, Exists, DoesNotExist.
    #[error("{0:?} is not a valid resource selector operator")]
    UnknownOperator(String),

    /// In / NotIn given without values.
    #[error("operator {operator} on key {key:?} requires at least one value")]
    MissingValues { key: String, operator: SelectorOperator },

    /// Exists / DoesNotExist given values.
    #[error("operator {operator} on key {key:?} takes no values")]
    UnexpectedValues { key: String, operator: SelectorOperator },

    /// The label key is empty.
    #[error("selector key cannot be empty")]
    EmptyKey,
}

/// One persisted selector clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelector {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl ResourceSelector {
    /// `key In (values...)`.
    pub fn is_in<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            operator: SelectorOperator::In.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `key NotIn (values...)`.
    pub fn not_in<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            operator: SelectorOperator::NotIn.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `key Exists`.
    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: SelectorOperator::Exists.to_string(),
            values: Vec::new(),
        }
    }

    /// `key DoesNotExist`.
    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: SelectorOperator::DoesNotExist.to_string(),
            values: Vec::new(),
        }
    }
}

/// Selector operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl SelectorOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
        }
    }

    fn takes_values(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl fmt::Display for SelectorOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectorOperator {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            other => Err(SelectorError::UnknownOperator(other.to_string())),
        }
    }
}

/// A single validated label requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: SelectorOperator,
    values: Vec<String>,
}

impl Requirement {
    /// Validate a clause into a requirement.
    pub fn new(
        key: impl Into<String>,
        operator: SelectorOperator,
        values: Vec<String>,
    ) -> Result<Self, SelectorError> {
        let key = key.into();
        if key.is_empty() {
            return Err(SelectorError::EmptyKey);
        }

        if operator.takes_values() && values.is_empty() {
            return Err(SelectorError::MissingValues { key, operator });
        }
        if !operator.takes_values() && !values.is_empty() {
            return Err(SelectorError::UnexpectedValues { key, operator });
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> SelectorOperator {
        self.operator
    }

    /// Evaluate the requirement against a label set.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            // Absent keys satisfy NotIn, matching label-selector semantics elsewhere.
            SelectorOperator::NotIn => value.map_or(true, |v| !self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            SelectorOperator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            SelectorOperator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            SelectorOperator::Exists => write!(f, "{}", self.key),
            SelectorOperator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// An executable label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSelector {
    /// Matches no object.
    Nothing,

    /// Matches objects satisfying every requirement.
    All(Vec<Requirement>),
}

impl LabelSelector {
    /// Convert persisted clauses into a selector.
    ///
    /// An empty clause list yields [`LabelSelector::Nothing`].
    pub fn from_resource_selectors(clauses: &[ResourceSelector]) -> Result<Self, SelectorError> {
        if clauses.is_empty() {
            return Ok(Self::Nothing);
        }

        let requirements = clauses
            .iter()
            .map(|clause| {
                let operator = clause.operator.parse::<SelectorOperator>()?;
                Requirement::new(clause.key.clone(), operator, clause.values.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::All(requirements))
    }

    /// Returns true if this selector can never match.
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// Evaluate against a label set.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Nothing => false,
            Self::All(requirements) => requirements.iter().all(|r| r.matches(labels)),
        }
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("<nothing>"),
            Self::All(requirements) => {
                let parts: Vec<String> = requirements.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}
