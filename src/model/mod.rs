//! Wire types exchanged with the election backend.

pub mod auth;
pub mod ballot;
pub mod election;
pub mod results;
pub mod timestamp;

pub use ballot::{Selection, VotePayload, VoteRequest, VoterAccess};
pub use election::{
    Election, ElectionEdit, ElectionLayout, ElectionOption, ElectionSpec, ElectionUpdate,
    LayoutMode, PollType, Voter,
};
pub use results::{ElectionResult, OptionTally};
