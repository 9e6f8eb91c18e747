use chrono::Utc;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::lifecycle::{build_vote_payload, can_vote};
use crate::model::auth::ApiMessage;
use crate::model::{Election, ElectionResult, PollType, Selection, VoteRequest, VoterAccess};
use crate::transport::ApiRequest;

use super::Client;

impl Client {
    /// An open election, as anyone with the link sees it.
    pub async fn find_open_election(&self, election_id: &str) -> Result<Election> {
        let request = ApiRequest::get("/api/v1/election/find/open")
            .public()
            .query("electionId", election_id);
        Election::from_response(self.call(request).await?)
    }

    /// A closed election, as the voter holding `voter_id` sees it.
    pub async fn find_election_for_voter(&self, election_id: &str, voter_id: &str) -> Result<Election> {
        let request = ApiRequest::get("/api/v1/election/find/voter")
            .public()
            .query("electionId", election_id)
            .query("voterId", voter_id);
        Election::from_response(self.call(request).await?)
    }

    /// Load the election the way this voter reached it.
    pub async fn ballot(&self, election_id: &str, access: &VoterAccess) -> Result<Election> {
        match access {
            VoterAccess::Open => self.find_open_election(election_id).await,
            VoterAccess::VoterLink { voter_id } => {
                self.find_election_for_voter(election_id, voter_id).await
            }
        }
    }

    /// Cast a vote in `election`.
    ///
    /// The selection is checked against the election's end time and poll type first;
    /// the backend still has the final say.
    pub async fn cast_vote(
        &self,
        election: &Election,
        access: &VoterAccess,
        selection: &Selection,
    ) -> Result<ApiMessage> {
        let poll_type = election.poll_type();
        if !can_vote(Utc::now(), election.end_time, poll_type, selection) {
            if selection.is_complete(poll_type) {
                return Err(Error::VotingClosed);
            }
            let wanted = match poll_type {
                PollType::Single => "an option",
                PollType::Multiple => "at least one option",
            };
            return Err(Error::BadRequest(format!("Select {wanted} before voting")));
        }

        let payload = build_vote_payload(poll_type, selection)
            .ok_or_else(|| Error::BadRequest("Selection does not match the poll type".into()))?;
        let vote = VoteRequest::new(election.election_id.clone(), access, payload);
        let request = ApiRequest::put(vote.path()).public().json(&vote)?;
        let ack = self.call(request).await?;
        info!("Vote cast in election {}", election.election_id);
        Ok(ack)
    }

    /// Results of an open election; no login needed.
    pub async fn open_election_result(&self, election_id: &str) -> Result<ElectionResult> {
        let request = ApiRequest::get("/api/v1/election/open/result")
            .public()
            .query("electionId", election_id);
        ElectionResult::from_response(self.call(request).await?)
    }

    pub async fn health(&self) -> Result<Value> {
        self.call(ApiRequest::get("/api/v1/public/health-check")).await
    }
}
