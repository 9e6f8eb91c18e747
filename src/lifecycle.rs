//! What may be done with an election at a given moment.
//!
//! Everything here is a pure function of the clock and the election's fields,
//! except [`LifecycleMonitor`] which re-evaluates them as time passes.

use std::fmt::{self, Display};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::model::{Election, PollType, Selection, VotePayload};

/// Edits are refused this long before an election starts.
pub const EDIT_LOCK_MINUTES: i64 = 15;

/// Where an election is in its lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Not started yet.
    Upcoming,
    /// Accepting votes.
    Running,
    /// Past its end time; results are final.
    Finished,
}

/// Why an election can or cannot be edited.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EditLock {
    Unlocked,
    /// Starts within the edit lock window.
    Prelock,
    Running,
    Ended,
}

impl EditLock {
    pub fn is_locked(self) -> bool {
        self != Self::Unlocked
    }
}

impl Display for EditLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Unlocked => "unlocked",
            Self::Prelock => "starts within 15 minutes",
            Self::Running => "election is running",
            Self::Ended => "election has ended",
        };
        f.write_str(reason)
    }
}

/// Classify the election at `now`.
///
/// A missing start never makes an election upcoming and a missing end never
/// finishes it.
pub fn classify(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Phase {
    match (start, end) {
        (Some(start), _) if now < start => Phase::Upcoming,
        (_, Some(end)) if now > end => Phase::Finished,
        _ => Phase::Running,
    }
}

/// Edit lock state at `now`. Only [`EditLock::Unlocked`] permits edits.
///
/// An unknown start time means no countdown is active, so the election is
/// unlocked unless it has already ended.
pub fn edit_lock_state(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> EditLock {
    if matches!(end, Some(end) if now > end) {
        return EditLock::Ended;
    }
    match start {
        Some(start) if now >= start => EditLock::Running,
        Some(start) if start - now <= Duration::minutes(EDIT_LOCK_MINUTES) => EditLock::Prelock,
        _ => EditLock::Unlocked,
    }
}

/// May this selection be submitted at `now`?
pub fn can_vote(
    now: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    poll_type: PollType,
    selection: &Selection,
) -> bool {
    if matches!(end, Some(end) if now >= end) {
        return false;
    }
    selection.is_complete(poll_type)
}

/// The vote body for `selection`, shaped by the poll type. `None` if nothing
/// that counts for this poll type has been picked.
pub fn build_vote_payload(poll_type: PollType, selection: &Selection) -> Option<VotePayload> {
    if !selection.is_complete(poll_type) {
        return None;
    }
    Some(match poll_type {
        PollType::Single => VotePayload::Single {
            option_id: selection.option_id()?.to_string(),
        },
        PollType::Multiple => VotePayload::Multiple {
            option_ids: selection.option_ids().to_vec(),
        },
    })
}

/// Voter lists only mean something for closed elections. Options are always editable.
pub fn voters_editable(is_open: bool) -> bool {
    !is_open
}

impl Election {
    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        classify(now, self.start_time, self.end_time)
    }

    pub fn edit_lock_at(&self, now: DateTime<Utc>) -> EditLock {
        edit_lock_state(now, self.start_time, self.end_time)
    }

    /// Are results worth showing yet?
    pub fn shows_results_at(&self, now: DateTime<Utc>) -> bool {
        self.phase_at(now) != Phase::Upcoming
    }
}

/// Which groups of the edit form are enabled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    pub lock: EditLock,
    /// Name, description, times, layout and the open flag.
    pub core: bool,
    pub options: bool,
    pub voters: bool,
}

impl FieldAccess {
    /// The lock comes from the election as fetched, not from the form being edited,
    /// so moving the start time in the form cannot unlock it.
    pub fn at(now: DateTime<Utc>, original: &Election, edited_is_open: bool) -> Self {
        let lock = original.edit_lock_at(now);
        let editable = !lock.is_locked();
        Self {
            lock,
            core: editable,
            options: editable,
            voters: editable && voters_editable(edited_is_open),
        }
    }
}

/// Phase and edit lock evaluated together.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LifecycleStatus {
    pub phase: Phase,
    pub edit_lock: EditLock,
}

impl LifecycleStatus {
    pub fn at(now: DateTime<Utc>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            phase: classify(now, start, end),
            edit_lock: edit_lock_state(now, start, end),
        }
    }
}

/// Re-evaluates an election's status on a fixed interval and publishes changes.
///
/// The polling task stops when the monitor is dropped.
#[derive(Debug)]
pub struct LifecycleMonitor {
    receiver: watch::Receiver<LifecycleStatus>,
    handle: JoinHandle<()>,
}

impl LifecycleMonitor {
    /// Must be called from within a tokio runtime.
    pub fn spawn(election: &Election, period: StdDuration) -> Self {
        Self::spawn_with_clock(election.start_time, election.end_time, period, Utc::now)
    }

    pub fn spawn_with_clock<C>(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        period: StdDuration,
        clock: C,
    ) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(LifecycleStatus::at(clock(), start, end));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let status = LifecycleStatus::at(clock(), start, end);
                sender.send_if_modified(|current| {
                    if *current == status {
                        return false;
                    }
                    debug!("Election status changed: {current:?} -> {status:?}");
                    *current = status;
                    true
                });
            }
        });
        Self { receiver, handle }
    }

    pub fn current(&self) -> LifecycleStatus {
        *self.receiver.borrow()
    }

    /// A receiver that is notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleStatus> {
        self.receiver.clone()
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
