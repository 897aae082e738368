//! Two-level fractional-factorial design (Taguchi L8)
//!
//! Maps 4–7 two-level variables onto the 8 rows of the standard L8 orthogonal
//! array. The array is a constant: its balance is checked by tests, never
//! recomputed at runtime.
//!
//! ## Layout
//!
//! ```text
//! trial  c1 c2 c3 c4 c5 c6 c7
//!   1     1  1  1  1  1  1  1
//!   2     1  1  1  2  2  2  2
//!   3     1  2  2  1  1  2  2
//!   4     1  2  2  2  2  1  1
//!   5     2  1  2  1  2  1  2
//!   6     2  1  2  2  1  2  1
//!   7     2  2  1  1  2  2  1
//!   8     2  2  1  2  1  1  2
//! ```
//!
//! Column value `1` selects `level_a`, `2` selects `level_b`.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Number of trials in the design.
pub const TRIAL_COUNT: usize = 8;

/// Fewest variables the design accepts.
pub const MIN_VARIABLES: usize = 4;

/// Most variables the design accepts (one per L8 column).
pub const MAX_VARIABLES: usize = 7;

/// Standard L8 (2^7) orthogonal array.
pub const L8: [[u8; MAX_VARIABLES]; TRIAL_COUNT] = [
    [1, 1, 1, 1, 1, 1, 1],
    [1, 1, 1, 2, 2, 2, 2],
    [1, 2, 2, 1, 1, 2, 2],
    [1, 2, 2, 2, 2, 1, 1],
    [2, 1, 2, 1, 2, 1, 2],
    [2, 1, 2, 2, 1, 2, 1],
    [2, 2, 1, 1, 2, 2, 1],
    [2, 2, 1, 2, 1, 1, 2],
];

/// Which of a variable's two levels a trial uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// First level (array value 1).
    A,
    /// Second level (array value 2).
    B,
}

impl Level {
    const fn from_cell(cell: u8) -> Self {
        if cell == 1 {
            Self::A
        } else {
            Self::B
        }
    }
}

/// A single experimental variable with two discrete levels.
///
/// Levels are arbitrary JSON values of the same JSON type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    level_a: Value,
    level_b: Value,
}

impl Variable {
    /// Create a validated variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] when the name is not a plain identifier
    /// or the two levels are equal or of different JSON types.
    pub fn new(name: impl Into<String>, level_a: impl Into<Value>, level_b: impl Into<Value>) -> Result<Self> {
        let variable = Self {
            name: name.into(),
            level_a: level_a.into(),
            level_b: level_b.into(),
        };
        variable.validate()?;
        Ok(variable)
    }

    /// Get the variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the first level value.
    #[must_use]
    pub const fn level_a(&self) -> &Value {
        &self.level_a
    }

    /// Get the second level value.
    #[must_use]
    pub const fn level_b(&self) -> &Value {
        &self.level_b
    }

    /// Get the value for a given level.
    #[must_use]
    pub const fn value(&self, level: Level) -> &Value {
        match level {
            Level::A => &self.level_a,
            Level::B => &self.level_b,
        }
    }

    /// Classify a concrete value as one of this variable's levels.
    #[must_use]
    pub fn level_of(&self, value: &Value) -> Option<Level> {
        if *value == self.level_a {
            Some(Level::A)
        } else if *value == self.level_b {
            Some(Level::B)
        } else {
            None
        }
    }

    /// Re-check invariants (used after deserialization).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let name = &self.name;
        if name.is_empty() {
            return Err(Error::InvalidDesign("variable name must be non-empty".into()));
        }
        if name.trim() != name {
            return Err(Error::InvalidDesign(format!(
                "variable name '{name}' must not have leading or trailing whitespace"
            )));
        }
        if name.starts_with('_') {
            return Err(Error::InvalidDesign(format!(
                "variable name '{name}' must not start with an underscore"
            )));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(Error::InvalidDesign(format!(
                "variable name '{name}' may only contain alphanumerics and underscores"
            )));
        }
        if self.level_a == self.level_b {
            return Err(Error::InvalidDesign(format!(
                "variable '{name}' has identical levels ({})",
                self.level_a
            )));
        }
        if json_kind(&self.level_a) != json_kind(&self.level_b) {
            return Err(Error::InvalidDesign(format!(
                "variable '{name}' levels must share a type ({} vs {})",
                json_kind(&self.level_a),
                json_kind(&self.level_b)
            )));
        }
        Ok(())
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One row of the design, bound to concrete level values.
///
/// Created once by [`generate`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfiguration {
    index: u8,
    values: BTreeMap<String, Value>,
}

impl TrialConfiguration {
    /// Get the 1-based trial index.
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Get the variable name → level value mapping.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Get the value chosen for one variable.
    #[must_use]
    pub fn value(&self, variable: &str) -> Option<&Value> {
        self.values.get(variable)
    }

    /// Render the configuration as `name=value` pairs for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Generate the 8 trial configurations for the given variables.
///
/// Variable `i` is bound to column `i` of [`L8`]; columns past the variable
/// count are ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidDesign`] on fewer than 4 or more than 7 variables,
/// duplicate names, or invalid levels.
pub fn generate(variables: &[Variable]) -> Result<Vec<TrialConfiguration>> {
    validate_variables(variables)?;

    let configurations = L8
        .iter()
        .zip(1u8..)
        .map(|(row, index)| TrialConfiguration {
            index,
            values: variables
                .iter()
                .zip(row.iter())
                .map(|(variable, &cell)| {
                    (
                        variable.name.clone(),
                        variable.value(Level::from_cell(cell)).clone(),
                    )
                })
                .collect(),
        })
        .collect();

    Ok(configurations)
}

/// Check the variable set accepted by [`generate`].
///
/// # Errors
///
/// Returns [`Error::InvalidDesign`] describing the first violation.
pub fn validate_variables(variables: &[Variable]) -> Result<()> {
    let count = variables.len();
    if !(MIN_VARIABLES..=MAX_VARIABLES).contains(&count) {
        return Err(Error::InvalidDesign(format!(
            "L8 design requires between {MIN_VARIABLES} and {MAX_VARIABLES} variables, got {count}"
        )));
    }

    let mut seen = HashSet::with_capacity(count);
    for variable in variables {
        variable.validate()?;
        if !seen.insert(variable.name.as_str()) {
            return Err(Error::InvalidDesign(format!(
                "duplicate variable name '{}'",
                variable.name
            )));
        }
    }
    Ok(())
}
