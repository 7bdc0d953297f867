//! Splits a completion into prose and the optional chart record the model
//! appends as a fenced JSON block.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::constants;

lazy_static::lazy_static! {
    // First ```json fence only, any case; non-greedy so a second block stays in the prose.
    static ref JSON_FENCE: Regex = Regex::new(r"(?si)```json\s*(.*?)\s*```").expect("valid fence regex");
}

/// Data behind the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecord {
    /// Budget category to percentage share. Shares are not required to sum to 100.
    #[serde(default)]
    pub allocation: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "four_or_zeros")]
    pub trend: [f64; 4],
    #[serde(default = "placeholder_ratio")]
    pub ratio: String,
}

impl ChartRecord {
    /// Shown until the first reply carrying a record arrives.
    pub fn placeholder() -> Self {
        Self {
            allocation: BTreeMap::from([
                ("Product".to_string(), 40.0),
                ("Marketing".to_string(), 30.0),
                ("Operations".to_string(), 30.0),
            ]),
            trend: [0.0; 4],
            ratio: placeholder_ratio(),
        }
    }
}

impl Default for ChartRecord {
    fn default() -> Self {
        Self::placeholder()
    }
}

fn placeholder_ratio() -> String {
    constants::PLACEHOLDER_RATIO.to_string()
}

fn four_or_zeros<'de, D>(deserializer: D) -> Result<[f64; 4], D::Error>
where
    D: Deserializer<'de>,
{
    // Any shape other than exactly four numbers reads as zeros.
    let values = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(serde_json::Value::as_f64)
            .collect::<Option<Vec<f64>>>(),
        _ => None,
    };
    Ok(values
        .and_then(|values| <[f64; 4]>::try_from(values).ok())
        .unwrap_or([0.0; 4]))
}

/// A completion split into display prose and an optional chart record.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReply {
    pub prose: String,
    pub record: Option<ChartRecord>,
}

pub fn split_reply(text: &str) -> SplitReply {
    let Some(captures) = JSON_FENCE.captures(text) else {
        return SplitReply {
            prose: text.trim().to_string(),
            record: None,
        };
    };

    let (Some(block), Some(body)) = (captures.get(0), captures.get(1)) else {
        return SplitReply {
            prose: text.trim().to_string(),
            record: None,
        };
    };

    match serde_json::from_str::<ChartRecord>(body.as_str()) {
        Ok(record) => {
            let mut prose = String::with_capacity(text.len());
            prose.push_str(&text[..block.start()]);
            prose.push_str(&text[block.end()..]);
            SplitReply {
                prose: prose.trim().to_string(),
                record: Some(record),
            }
        }
        Err(e) => {
            debug!(error = %e, "Ignoring malformed chart block");
            SplitReply {
                prose: text.trim().to_string(),
                record: None,
            }
        }
    }
}
