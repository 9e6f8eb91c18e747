use serde::{
    ser::{Error as _, SerializeMap},
    Deserialize, Serialize, Serializer,
};

use super::election::PollType;

/// The options a voter has picked so far.
///
/// Tracks both the single choice and the multi-choice set so that switching the
/// poll type does not lose either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    option_id: Option<String>,
    option_ids: Vec<String>,
}

impl Selection {
    pub fn single(option_id: impl Into<String>) -> Self {
        Self {
            option_id: Some(option_id.into()),
            option_ids: Vec::new(),
        }
    }

    pub fn multiple<I, S>(option_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selection = Self::default();
        for option_id in option_ids {
            selection.check(option_id);
        }
        selection
    }

    /// Pick `option_id` as the single choice.
    pub fn choose(&mut self, option_id: impl Into<String>) {
        self.option_id = Some(option_id.into());
    }

    /// Add `option_id` to the multi-choice set. Duplicates are ignored.
    pub fn check(&mut self, option_id: impl Into<String>) {
        let option_id = option_id.into();
        if !self.option_ids.contains(&option_id) {
            self.option_ids.push(option_id);
        }
    }

    pub fn uncheck(&mut self, option_id: &str) {
        self.option_ids.retain(|id| id != option_id);
    }

    pub fn option_id(&self) -> Option<&str> {
        self.option_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn option_ids(&self) -> &[String] {
        &self.option_ids
    }

    /// Has anything been picked that counts for this poll type?
    pub fn is_complete(&self, poll_type: PollType) -> bool {
        match poll_type {
            PollType::Single => self.option_id().is_some(),
            PollType::Multiple => !self.option_ids.is_empty(),
        }
    }
}

/// The option part of a vote; its shape follows the poll type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VotePayload {
    Single {
        #[serde(rename = "optionId")]
        option_id: String,
    },
    Multiple {
        #[serde(rename = "optionIds")]
        option_ids: Vec<String>,
    },
}

impl VotePayload {
    pub fn poll_type(&self) -> PollType {
        match self {
            Self::Single { .. } => PollType::Single,
            Self::Multiple { .. } => PollType::Multiple,
        }
    }
}

/// How the voter reached the election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoterAccess {
    /// Anyone with the link may vote.
    Open,
    /// A personal link carrying the voter's secret id.
    VoterLink { voter_id: String },
}

impl VoterAccess {
    pub fn voter_id(&self) -> Option<&str> {
        match self {
            Self::Open => None,
            Self::VoterLink { voter_id } => Some(voter_id),
        }
    }
}

/// The body of a cast-vote call.
///
/// On the wire a multi-choice `optionIds` is a JSON-encoded string such as
/// `"[\"a\",\"b\"]"`, which is what the backend parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub election_id: String,
    pub voter_id: Option<String>,
    pub payload: VotePayload,
}

impl Serialize for VoteRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("electionId", &self.election_id)?;
        if let Some(voter_id) = &self.voter_id {
            map.serialize_entry("voterId", voter_id)?;
        }
        match &self.payload {
            VotePayload::Single { option_id } => map.serialize_entry("optionId", option_id)?,
            VotePayload::Multiple { option_ids } => {
                let encoded = serde_json::to_string(option_ids).map_err(S::Error::custom)?;
                map.serialize_entry("optionIds", &encoded)?
            }
        }
        map.end()
    }
}

impl VoteRequest {
    pub fn new(election_id: impl Into<String>, access: &VoterAccess, payload: VotePayload) -> Self {
        Self {
            election_id: election_id.into(),
            voter_id: access.voter_id().map(str::to_string),
            payload,
        }
    }

    /// Endpoint for this combination of access and poll type.
    pub fn path(&self) -> &'static str {
        match (self.voter_id.is_some(), &self.payload) {
            (true, VotePayload::Single { .. }) => "/api/v1/public/vote/cast",
            (true, VotePayload::Multiple { .. }) => "/api/v1/public/vote/cast/multi",
            (false, VotePayload::Single { .. }) => "/api/v1/public/vote/open/cast",
            (false, VotePayload::Multiple { .. }) => "/api/v1/public/vote/open/cast/multi",
        }
    }
}
