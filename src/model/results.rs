use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    #[serde(default, deserialize_with = "super::election::string_or_number")]
    pub option_id: Option<String>,
    #[serde(default)]
    pub option_name: String,
    #[serde(default)]
    pub votes: u64,
}

/// Vote counts for a finished (or running) election, as computed by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResult {
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub total_voters: u64,
    #[serde(default)]
    pub options: Vec<OptionTally>,
}

impl ElectionResult {
    /// Decode a response that is either the result itself or wraps it in `electionResult`.
    pub fn from_response(value: Value) -> Result<Self> {
        let value = match value {
            Value::Object(mut map) if map.get("electionResult").map_or(false, Value::is_object) => {
                map.remove("electionResult").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Tie-aware rank of each option, in option order.
    ///
    /// Equal vote counts share a rank and ranks are consecutive, so the leaders
    /// are rank 0 and the next distinct count is rank 1.
    pub fn dense_ranks(&self) -> Vec<usize> {
        let distinct: BTreeSet<u64> = self.options.iter().map(|o| o.votes).collect();
        let descending: Vec<u64> = distinct.into_iter().rev().collect();
        self.options
            .iter()
            .map(|option| {
                descending
                    .iter()
                    .position(|votes| *votes == option.votes)
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Rounded share of all votes that went to `option`. Zero when nobody voted.
    pub fn share_percent(&self, option: &OptionTally) -> u64 {
        if self.total_votes == 0 {
            return 0;
        }
        (option.votes as f64 / self.total_votes as f64 * 100.0).round() as u64
    }

    /// The options with the most votes. Empty when nobody voted.
    pub fn leaders(&self) -> Vec<&OptionTally> {
        let top = self.options.iter().map(|o| o.votes).max().unwrap_or(0);
        if top == 0 {
            return Vec::new();
        }
        self.options.iter().filter(|o| o.votes == top).collect()
    }
}
