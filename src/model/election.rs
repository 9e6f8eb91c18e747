use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::timestamp;

/// How many options a voter may pick.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollType {
    /// Exactly one option.
    #[default]
    #[serde(rename = "radio", alias = "single")]
    Single,
    /// One or more options.
    #[serde(rename = "checkbox", alias = "multiple")]
    Multiple,
}

impl PollType {
    /// The value the backend stores.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Single => "radio",
            Self::Multiple => "checkbox",
        }
    }
}

impl Display for PollType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

/// How the option cards are laid out.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LayoutMode {
    #[default]
    Grid,
    List,
}

impl LayoutMode {
    /// Card ids are free-form; a few of them mean "list", in any case.
    pub fn from_card_id(card_id: Option<&str>) -> Self {
        match card_id.map(|id| id.trim().to_ascii_lowercase()).as_deref() {
            Some("2" | "list" | "style2") => Self::List,
            _ => Self::Grid,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionLayout {
    #[serde(
        default,
        deserialize_with = "lenient_poll_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub poll_type: Option<PollType>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub election_card_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionOption {
    /// Assigned by the backend; absent for options that have not been saved yet.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub option_id: Option<String>,
    #[serde(default)]
    pub option_name: String,
}

impl ElectionOption {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            option_id: None,
            option_name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub voter_email: String,
}

impl Voter {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            voter_email: email.into(),
        }
    }
}

/// An election as the backend describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    #[serde(deserialize_with = "required_string_or_number")]
    pub election_id: String,
    #[serde(default)]
    pub election_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub election_description: String,
    #[serde(default, with = "timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp", alias = "endAt", alias = "endsAt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_layout: Option<ElectionLayout>,
    /// Older records keep the poll type and card id at the top level.
    #[serde(
        default,
        deserialize_with = "lenient_poll_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub poll_type: Option<PollType>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub election_card_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<ElectionOption>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub voters: Vec<Voter>,
}

impl Election {
    /// Decode a response that is either the election itself or wraps it in `electionInfo`.
    pub fn from_response(value: Value) -> Result<Self> {
        let value = match value {
            Value::Object(mut map) if map.get("electionInfo").map_or(false, Value::is_object) => {
                map.remove("electionInfo").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }

    /// Decode a list response: `{elections: [...]}`, `{electionList: [...]}` or a bare array.
    pub fn list_from_response(value: Value) -> Result<Vec<Self>> {
        let list = match value {
            Value::Array(list) => list,
            Value::Object(mut map) => match map
                .remove("elections")
                .filter(|v| !v.is_null())
                .or_else(|| map.remove("electionList"))
            {
                Some(Value::Array(list)) => list,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(Error::BadRequest(format!(
                        "Expected a list of elections, got {other}"
                    )))
                }
            },
            _ => Vec::new(),
        };
        list.into_iter()
            .map(|election| Ok(serde_json::from_value(election)?))
            .collect()
    }

    /// Effective poll type: the layout's, then the legacy field, then single.
    pub fn poll_type(&self) -> PollType {
        self.election_layout
            .as_ref()
            .and_then(|layout| layout.poll_type)
            .or(self.poll_type)
            .unwrap_or_default()
    }

    /// Effective card id: the layout's, then the legacy field.
    pub fn card_id(&self) -> Option<&str> {
        self.election_layout
            .as_ref()
            .and_then(|layout| layout.election_card_id.as_deref())
            .or(self.election_card_id.as_deref())
    }

    pub fn layout_mode(&self) -> LayoutMode {
        LayoutMode::from_card_id(self.card_id())
    }

    pub fn option(&self, option_id: &str) -> Option<&ElectionOption> {
        self.options
            .iter()
            .find(|option| option.option_id.as_deref() == Some(option_id))
    }

    /// Body of the full-update call, which replaces the whole election in one request.
    ///
    /// Option names are trimmed and blank options dropped. An open election sends no voters.
    pub fn to_update_payload(&self) -> Value {
        let options: Vec<ElectionOption> = self
            .options
            .iter()
            .filter(|option| !option.option_name.trim().is_empty())
            .map(|option| ElectionOption {
                option_id: option.option_id.clone(),
                option_name: option.option_name.trim().to_string(),
            })
            .collect();
        let voters: &[Voter] = if self.is_open { &[] } else { &self.voters };
        json!({
            "electionId": self.election_id,
            "electionName": self.election_name,
            "electionDescription": self.election_description,
            "startTime": self.start_time.map(|t| t.timestamp_millis()),
            "endTime": self.end_time.map(|t| t.timestamp_millis()),
            "isOpen": self.is_open,
            "electionLayout": {
                "pollType": self.poll_type(),
                "electionCardId": self.card_id(),
            },
            "options": options,
            "voters": voters,
        })
    }
}

/// The payload for creating an election.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectionSpec {
    pub election_name: String,
    pub election_description: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub election_layout: ElectionLayout,
    pub options: Vec<ElectionOption>,
    pub voters: Vec<Voter>,
}

impl ElectionSpec {
    /// Check that every step of the creation form has been filled in.
    pub fn validate(&self) -> Result<()> {
        if self.election_name.trim().is_empty() {
            return Err(Error::BadRequest("Election name is required".into()));
        }
        if self.start_time.is_none() || self.end_time.is_none() {
            return Err(Error::BadRequest(
                "Both start and end time are required".into(),
            ));
        }
        if self.election_layout.poll_type.is_none()
            || self.election_layout.election_card_id.is_none()
        {
            return Err(Error::BadRequest(
                "Poll type and card layout are required".into(),
            ));
        }
        if self.named_options().next().is_none() {
            return Err(Error::BadRequest("At least one option is required".into()));
        }
        if !self.is_open && self.voters.is_empty() {
            return Err(Error::BadRequest(
                "A closed election needs at least one voter".into(),
            ));
        }
        Ok(())
    }

    fn named_options(&self) -> impl Iterator<Item = &ElectionOption> {
        self.options
            .iter()
            .filter(|option| !option.option_name.trim().is_empty())
    }

    /// Validate and build the creation request body.
    pub fn to_payload(&self) -> Result<Value> {
        self.validate()?;
        let voters: &[Voter] = if self.is_open { &[] } else { &self.voters };
        Ok(json!({
            "electionName": self.election_name,
            "electionDescription": self.election_description,
            "startTime": self.start_time.map(|t| t.timestamp_millis()),
            "endTime": self.end_time.map(|t| t.timestamp_millis()),
            "isOpen": self.is_open,
            "electionLayout": self.election_layout,
            "options": self.named_options().collect::<Vec<_>>(),
            "voters": voters,
        }))
    }
}

/// One partial-update call against an existing election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionUpdate {
    Name(String),
    Description(String),
    PollType(PollType),
    CardId(Option<String>),
    StartTime(Option<DateTime<Utc>>),
    EndTime(Option<DateTime<Utc>>),
    Voters(Vec<Voter>),
    Options(Vec<ElectionOption>),
    IsOpen(bool),
}

impl ElectionUpdate {
    /// Short name of the field, for reporting.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Description(_) => "description",
            Self::PollType(_) => "pollType",
            Self::CardId(_) => "cardId",
            Self::StartTime(_) => "startTime",
            Self::EndTime(_) => "endTime",
            Self::Voters(_) => "voters",
            Self::Options(_) => "options",
            Self::IsOpen(_) => "isOpen",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Name(_) => "/api/v1/user/election/update/name",
            Self::Description(_) => "/api/v1/user/election/update/description",
            Self::PollType(_) => "/api/v1/user/election/update/poll-type",
            Self::CardId(_) => "/api/v1/user/election/update/card-id",
            Self::StartTime(_) => "/api/v1/user/election/update/start-time",
            Self::EndTime(_) => "/api/v1/user/election/update/end-time",
            Self::Voters(_) => "/api/v1/user/election/update/voters",
            Self::Options(_) => "/api/v1/user/election/update/options",
            Self::IsOpen(_) => "/api/v1/user/election/update/is-open",
        }
    }

    pub fn body(&self, election_id: &str) -> Value {
        let mut body = match self {
            Self::Name(name) => json!({ "newElectionName": name }),
            Self::Description(description) => json!({ "newElectionDescription": description }),
            Self::PollType(poll_type) => json!({ "newPollType": poll_type }),
            Self::CardId(card_id) => json!({ "newElectionCardId": card_id }),
            Self::StartTime(time) => json!({ "newStartTime": time.map(|t| t.timestamp_millis()) }),
            Self::EndTime(time) => json!({ "newEndTime": time.map(|t| t.timestamp_millis()) }),
            Self::Voters(voters) => json!({ "newVoters": voters }),
            Self::Options(options) => json!({
                "newOptions": options
                    .iter()
                    .map(|option| json!({ "optionName": option.option_name }))
                    .collect::<Vec<_>>()
            }),
            Self::IsOpen(is_open) => json!({ "isOpen": is_open }),
        };
        body["electionId"] = json!(election_id);
        body
    }
}

/// The set of partial updates that turns one version of an election into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionEdit {
    pub election_id: String,
    /// Whether the edited election is open; voter lists are not editable then.
    pub is_open: bool,
    pub updates: Vec<ElectionUpdate>,
}

impl ElectionEdit {
    /// Diff `edited` against `original`, one update per changed field, in a fixed order.
    pub fn changes(original: &Election, edited: &Election) -> Self {
        let mut updates = Vec::new();
        if edited.election_name != original.election_name {
            updates.push(ElectionUpdate::Name(edited.election_name.clone()));
        }
        if edited.election_description != original.election_description {
            updates.push(ElectionUpdate::Description(
                edited.election_description.clone(),
            ));
        }
        if edited.poll_type() != original.poll_type() {
            updates.push(ElectionUpdate::PollType(edited.poll_type()));
        }
        if edited.card_id() != original.card_id() {
            updates.push(ElectionUpdate::CardId(edited.card_id().map(str::to_string)));
        }
        if edited.start_time != original.start_time {
            updates.push(ElectionUpdate::StartTime(edited.start_time));
        }
        if edited.end_time != original.end_time {
            updates.push(ElectionUpdate::EndTime(edited.end_time));
        }
        if !edited.is_open && edited.voters != original.voters {
            updates.push(ElectionUpdate::Voters(edited.voters.clone()));
        }
        let options: Vec<ElectionOption> = edited
            .options
            .iter()
            .filter(|option| !option.option_name.trim().is_empty())
            .cloned()
            .collect();
        if options != original.options {
            updates.push(ElectionUpdate::Options(options));
        }
        if edited.is_open != original.is_open {
            updates.push(ElectionUpdate::IsOpen(edited.is_open));
        }

        Self {
            election_id: original.election_id.clone(),
            is_open: edited.is_open,
            updates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Field names in the order they will be sent.
    pub fn fields(&self) -> Vec<&'static str> {
        self.updates.iter().map(ElectionUpdate::field).collect()
    }
}

/// Accept ids and card ids sent as either strings or numbers.
pub(super) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn required_string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("electionId must be a string or number"))
}

/// Only "checkbox" (or "multiple") selects multi-choice; any other value is single.
/// Blank values count as absent so the next fallback applies.
fn lenient_poll_type<'de, D>(deserializer: D) -> std::result::Result<Option<PollType>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "checkbox" | "multiple" => Some(PollType::Multiple),
            _ => Some(PollType::Single),
        },
        None | Some(Value::Null) => None,
        Some(_) => Some(PollType::Single),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> Election {
        Election::from_response(json!({
            "electionInfo": {
                "electionId": 42,
                "electionName": "Board",
                "electionDescription": null,
                "startTime": 1_700_000_000_000_i64,
                "endTime": "1700003600000",
                "isOpen": false,
                "electionLayout": { "pollType": "checkbox", "electionCardId": 2 },
                "options": [
                    { "optionId": "a", "optionName": "Alice" },
                    { "optionId": "b", "optionName": "Bob" }
                ],
                "voters": [{ "voterEmail": "v@example.org" }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn decodes_wrapped_election() {
        let election = sample();
        assert_eq!(election.election_id, "42");
        assert_eq!(election.election_description, "");
        assert_eq!(election.poll_type(), PollType::Multiple);
        assert_eq!(election.card_id(), Some("2"));
        assert_eq!(election.layout_mode(), LayoutMode::List);
        assert_eq!(
            election.end_time,
            Utc.timestamp_millis_opt(1_700_003_600_000).single()
        );
        assert_eq!(election.option("b").unwrap().option_name, "Bob");
    }

    #[test]
    fn poll_type_fallbacks() {
        let bare = Election::from_response(json!({ "electionId": "e1" })).unwrap();
        assert_eq!(bare.poll_type(), PollType::Single);
        assert_eq!(bare.layout_mode(), LayoutMode::Grid);

        let legacy =
            Election::from_response(json!({ "electionId": "e1", "pollType": "multiple" })).unwrap();
        assert_eq!(legacy.poll_type(), PollType::Multiple);
        assert_eq!(
            serde_json::to_value(PollType::Multiple).unwrap(),
            json!("checkbox")
        );
    }

    #[test]
    fn unknown_poll_types_are_single() {
        for raw in [json!("Radio"), json!("poll"), json!(3)] {
            let election = Election::from_response(json!({
                "electionId": "e1",
                "electionLayout": { "pollType": raw.clone() }
            }))
            .unwrap();
            assert_eq!(election.poll_type(), PollType::Single, "{raw}");
        }

        let shouting = Election::from_response(json!({
            "electionId": "e1",
            "electionLayout": { "pollType": "CHECKBOX" }
        }))
        .unwrap();
        assert_eq!(shouting.poll_type(), PollType::Multiple);

        // A blank layout value falls through to the legacy field.
        let blank = Election::from_response(json!({
            "electionId": "e1",
            "electionLayout": { "pollType": "  " },
            "pollType": "checkbox"
        }))
        .unwrap();
        assert_eq!(blank.election_layout.unwrap().poll_type, None);
        assert_eq!(blank.poll_type.unwrap(), PollType::Multiple);
    }

    #[test]
    fn end_time_aliases() {
        for key in ["endAt", "endsAt"] {
            let mut raw = json!({ "electionId": "e1" });
            raw[key] = json!(1_700_000_000_000_i64);
            let election = Election::from_response(raw).unwrap();
            assert_eq!(
                election.end_time,
                Utc.timestamp_millis_opt(1_700_000_000_000).single(),
                "{key}"
            );
        }
    }

    #[test]
    fn layout_modes() {
        for card in ["2", "list", "style2", "List", " STYLE2 "] {
            assert_eq!(LayoutMode::from_card_id(Some(card)), LayoutMode::List);
        }
        for card in [Some("1"), Some("style1"), None] {
            assert_eq!(LayoutMode::from_card_id(card), LayoutMode::Grid);
        }
    }

    #[test]
    fn list_response_variants() {
        let one = json!([{ "electionId": "e1" }]);
        assert_eq!(Election::list_from_response(one.clone()).unwrap().len(), 1);
        let wrapped = json!({ "elections": one });
        assert_eq!(Election::list_from_response(wrapped).unwrap().len(), 1);
        let legacy = json!({ "electionList": [{ "electionId": "e1" }, { "electionId": "e2" }] });
        assert_eq!(Election::list_from_response(legacy).unwrap().len(), 2);
        assert!(Election::list_from_response(json!({ "message": "none" }))
            .unwrap()
            .is_empty());
    }

    fn valid_spec() -> ElectionSpec {
        ElectionSpec {
            election_name: "Board".into(),
            election_description: String::new(),
            start_time: Utc.timestamp_millis_opt(1_000).single(),
            end_time: Utc.timestamp_millis_opt(2_000).single(),
            is_open: false,
            election_layout: ElectionLayout {
                poll_type: Some(PollType::Single),
                election_card_id: Some("1".into()),
            },
            options: vec![ElectionOption::named("Alice"), ElectionOption::named("  ")],
            voters: vec![Voter::new("v@example.org")],
        }
    }

    #[test]
    fn spec_validation() {
        valid_spec().validate().unwrap();

        let mut spec = valid_spec();
        spec.election_name = " ".into();
        assert!(matches!(spec.validate(), Err(Error::BadRequest(_))));

        let mut spec = valid_spec();
        spec.end_time = None;
        assert!(spec.validate().is_err());

        let mut spec = valid_spec();
        spec.election_layout.election_card_id = None;
        assert!(spec.validate().is_err());

        let mut spec = valid_spec();
        spec.options = vec![ElectionOption::named("")];
        assert!(spec.validate().is_err());

        let mut spec = valid_spec();
        spec.voters.clear();
        assert!(spec.validate().is_err());
        spec.is_open = true;
        spec.validate().unwrap();
    }

    #[test]
    fn spec_payload() {
        let mut spec = valid_spec();
        let payload = spec.to_payload().unwrap();
        assert_eq!(payload["startTime"], 1000);
        assert_eq!(payload["electionLayout"]["pollType"], "radio");
        assert_eq!(payload["options"], json!([{ "optionName": "Alice" }]));
        assert_eq!(payload["voters"], json!([{ "voterEmail": "v@example.org" }]));

        spec.is_open = true;
        assert_eq!(spec.to_payload().unwrap()["voters"], json!([]));
    }

    #[test]
    fn update_payload_carries_the_whole_form() {
        let mut election = sample();
        election.options = vec![
            ElectionOption {
                option_id: Some("a".into()),
                option_name: " Alice ".into(),
            },
            ElectionOption::named(""),
            ElectionOption::named("Carol"),
        ];
        let payload = election.to_update_payload();
        assert_eq!(
            payload,
            json!({
                "electionId": "42",
                "electionName": "Board",
                "electionDescription": "",
                "startTime": 1_700_000_000_000_i64,
                "endTime": 1_700_003_600_000_i64,
                "isOpen": false,
                "electionLayout": { "pollType": "checkbox", "electionCardId": "2" },
                "options": [
                    { "optionId": "a", "optionName": "Alice" },
                    { "optionName": "Carol" }
                ],
                "voters": [{ "voterEmail": "v@example.org" }]
            })
        );

        election.is_open = true;
        assert_eq!(election.to_update_payload()["voters"], json!([]));
    }

    #[test]
    fn no_changes() {
        let election = sample();
        assert!(ElectionEdit::changes(&election, &election).is_empty());
    }

    #[test]
    fn changes_in_fixed_order() {
        let original = sample();
        let mut edited = original.clone();
        edited.is_open = true;
        edited.options.push(ElectionOption::named("Carol"));
        edited.end_time = edited.end_time.map(|t| t + chrono::Duration::hours(1));
        edited.election_layout = Some(ElectionLayout {
            poll_type: Some(PollType::Single),
            election_card_id: Some("1".into()),
        });
        edited.election_name = "Board 2024".into();

        let edit = ElectionEdit::changes(&original, &edited);
        assert_eq!(
            edit.fields(),
            ["name", "pollType", "cardId", "endTime", "options", "isOpen"]
        );
        assert_eq!(edit.election_id, "42");
        assert!(edit.is_open);

        let options = &edit.updates[4];
        assert_eq!(options.path(), "/api/v1/user/election/update/options");
        assert_eq!(
            options.body("42"),
            json!({
                "electionId": "42",
                "newOptions": [
                    { "optionName": "Alice" },
                    { "optionName": "Bob" },
                    { "optionName": "Carol" }
                ]
            })
        );
        assert_eq!(
            edit.updates[1].body("42"),
            json!({ "electionId": "42", "newPollType": "radio" })
        );
    }

    #[test]
    fn voter_changes_ignored_when_open() {
        let original = sample();
        let mut edited = original.clone();
        edited.voters.push(Voter::new("w@example.org"));
        assert_eq!(ElectionEdit::changes(&original, &edited).fields(), ["voters"]);

        edited.is_open = true;
        assert_eq!(ElectionEdit::changes(&original, &edited).fields(), ["isOpen"]);
    }
}
