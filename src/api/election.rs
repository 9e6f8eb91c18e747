use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::auth::ApiMessage;
use crate::model::{Election, ElectionEdit, ElectionResult, ElectionSpec, ElectionUpdate};
use crate::session::StoreKey;
use crate::transport::ApiRequest;

use super::Client;

/// The outcome of one partial-update call.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub field: &'static str,
    /// The backend's acknowledgement, or why the update failed.
    pub result: Result<String>,
}

/// Per-field outcomes of applying an [`ElectionEdit`].
#[derive(Debug, Default)]
pub struct EditReport {
    pub outcomes: Vec<UpdateOutcome>,
}

impl EditReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.result.is_ok())
    }

    /// Names of the fields whose update failed.
    pub fn failed(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.field)
            .collect()
    }
}

impl Client {
    /// Create an election. The created election is cached as the last one created.
    pub async fn create_election(&self, spec: &ElectionSpec) -> Result<Election> {
        let request = ApiRequest::post("/api/v1/user/election/create").json(&spec.to_payload()?)?;
        let response: Value = self.call(request).await?;

        if let Some(info) = response.get("electionInfo").filter(|info| info.is_object()) {
            if let Err(e) = self.session.set(StoreKey::LastElection, info.to_string()) {
                warn!("Failed to cache created election: {e}");
            }
        }
        let election = Election::from_response(response)?;
        info!("Created election {}", election.election_id);
        Ok(election)
    }

    /// The most recently created election, if one was cached.
    pub fn last_created_election(&self) -> Option<Election> {
        let cached = self.session.get(StoreKey::LastElection)?;
        serde_json::from_str(&cached).ok()
    }

    /// All elections owned by the logged-in user.
    pub async fn elections(&self) -> Result<Vec<Election>> {
        let response = self
            .call(ApiRequest::get("/api/v1/user/election/find-all"))
            .await?;
        Election::list_from_response(response)
    }

    pub async fn election(&self, election_id: &str) -> Result<Election> {
        let request = ApiRequest::get("/api/v1/user/election/find").query("electionId", election_id);
        Election::from_response(self.call(request).await?)
    }

    pub async fn election_result(&self, election_id: &str) -> Result<ElectionResult> {
        let request =
            ApiRequest::get("/api/v1/user/election/result").query("electionId", election_id);
        ElectionResult::from_response(self.call(request).await?)
    }

    pub async fn delete_election(&self, election_id: &str) -> Result<ApiMessage> {
        let request = ApiRequest::delete("/api/v1/user/election/delete")
            .json(&json!({ "electionId": election_id }))?;
        self.call(request).await
    }

    /// Send one partial update.
    pub async fn update_election(
        &self,
        election_id: &str,
        update: &ElectionUpdate,
    ) -> Result<ApiMessage> {
        let request = ApiRequest::patch(update.path()).json(&update.body(election_id))?;
        self.call(request).await
    }

    /// Apply every update in `edit`, carrying on past failures.
    ///
    /// Fails up front with [`Error::Locked`] if `original` (the election as fetched)
    /// can no longer be edited.
    pub async fn apply_edit(&self, original: &Election, edit: &ElectionEdit) -> Result<EditReport> {
        let lock = original.edit_lock_at(Utc::now());
        if lock.is_locked() {
            return Err(Error::Locked(lock));
        }

        let mut report = EditReport::default();
        for update in &edit.updates {
            let result = match update {
                ElectionUpdate::Voters(_) if edit.is_open => Err(Error::BadRequest(
                    "Voters cannot be edited for an open election".into(),
                )),
                _ => self
                    .update_election(&edit.election_id, update)
                    .await
                    .map(|ack| ack.message.unwrap_or_else(|| "OK".to_string())),
            };
            if let Err(e) = &result {
                warn!("Updating {} of election {} failed: {e}", update.field(), edit.election_id);
            }
            report.outcomes.push(UpdateOutcome {
                field: update.field(),
                result,
            });
        }
        Ok(report)
    }

    /// Replace the whole election with `edited` in a single call.
    ///
    /// Fails up front with [`Error::Locked`] if `original` can no longer be edited.
    /// The election id is always the original's.
    pub async fn replace_election(&self, original: &Election, edited: &Election) -> Result<ApiMessage> {
        let lock = original.edit_lock_at(Utc::now());
        if lock.is_locked() {
            return Err(Error::Locked(lock));
        }

        let mut payload = edited.to_update_payload();
        payload["electionId"] = json!(original.election_id);
        let request = ApiRequest::patch("/api/v1/user/election/update").json(&payload)?;
        let ack = self.call(request).await?;
        info!("Replaced election {}", original.election_id);
        Ok(ack)
    }

    /// Diff `edited` against `original` and apply the changes.
    pub async fn save_election(&self, original: &Election, edited: &Election) -> Result<EditReport> {
        let edit = ElectionEdit::changes(original, edited);
        self.apply_edit(original, &edit).await
    }
}
