//! Recovering a structured payload from free-form judge output and mapping it
//! onto rubric dimensions.

use std::collections::BTreeMap;

use serde_json::Value;

use super::score::{DimensionScore, Rubric};
use crate::{Error, Result};

/// Recover the JSON payload from a judge response.
///
/// Tried in order: the whole text; the first JSON value starting at the first
/// `{` or `[`; the text with fence lines (```` ``` ````) removed.
///
/// # Errors
///
/// Returns [`Error::MalformedJudgment`] carrying the raw text when every
/// strategy fails.
pub fn parse_payload(raw: &str) -> Result<Value> {
    let text = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }
    if let Some(value) = first_embedded_value(text) {
        return Ok(value);
    }
    let unfenced = strip_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced.trim()) {
        return Ok(value);
    }
    if let Some(value) = first_embedded_value(&unfenced) {
        return Ok(value);
    }

    Err(Error::MalformedJudgment {
        raw: raw.to_string(),
    })
}

/// Stream-parse the first value beginning at the first `{` or `[`, ignoring
/// trailing prose.
fn first_embedded_value(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map a parsed payload onto every rubric dimension.
///
/// Accepts either `{"dim": {"score": x, "reasoning": ".."}}` or `{"dim": x}`.
/// A top-level array is searched for its first object.
///
/// # Errors
///
/// Returns [`Error::IncompleteJudgment`] naming the first dimension that is
/// missing, non-numeric or outside every accepted scale.
pub fn extract_dimensions(
    payload: &Value,
    rubric: &Rubric,
    raw: &str,
) -> Result<BTreeMap<String, DimensionScore>> {
    let object = match payload {
        Value::Object(map) => Some(map),
        Value::Array(items) => items.iter().find_map(Value::as_object),
        _ => None,
    };

    let mut scores = BTreeMap::new();
    for (name, _) in rubric.iter() {
        let incomplete = |reason: String| Error::IncompleteJudgment {
            dimension: name.to_string(),
            reason,
            raw: raw.to_string(),
        };

        let entry = object
            .and_then(|map| map.get(name))
            .filter(|v| !v.is_null())
            .ok_or_else(|| incomplete("is missing from the judge response".into()))?;

        let (raw_score, rationale) = match entry {
            Value::Object(fields) => (
                fields.get("score"),
                fields
                    .get("reasoning")
                    .or_else(|| fields.get("rationale"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            other => (Some(other), None),
        };

        let raw_score = raw_score.ok_or_else(|| incomplete("has no score".into()))?;
        let score = normalize_score(raw_score).map_err(incomplete)?;
        scores.insert(name.to_string(), DimensionScore { score, rationale });
    }
    Ok(scores)
}

/// Normalize a raw judge score onto `[0, 1]`.
///
/// `[0, 1]` is kept, `(1, 10]` is read as a ten-point scale and `(10, 100]`
/// as a percentage.
fn normalize_score(value: &Value) -> std::result::Result<f64, String> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("has non-numeric score {value}"))?;

    if !number.is_finite() {
        return Err(format!("has non-finite score {number}"));
    }
    match number {
        n if (0.0..=1.0).contains(&n) => Ok(n),
        n if n > 1.0 && n <= 10.0 => Ok(n / 10.0),
        n if n > 10.0 && n <= 100.0 => Ok(n / 100.0),
        n => Err(format!("has out-of-range score {n}")),
    }
}
