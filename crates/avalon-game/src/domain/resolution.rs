//! Resolution logic: pure functions over the aggregate's current shape.
//!
//! The transition protocol uses these to decide what a vote leads to, and the
//! view projector uses the same functions to label attempts and the game, so
//! both sides always agree on where the state machine stands.

use serde::Serialize;

use super::aggregates::{Player, QuestAttempt};
use super::events::ConclusionReason;
use super::quest_sizes::{MAX_ATTEMPTS_PER_ROUND, QUESTS_TO_WIN};
use super::roles::Faction;

/// Where a single quest attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Waiting for the leader to name a team.
    Proposing,
    /// Players are voting on the team.
    VotingOnProposal,
    /// The team was voted down; a later attempt (or the end of the game)
    /// follows.
    ProposalRejected,
    /// The team is collecting quest cards.
    VotingInQuest,
    /// The quest succeeded.
    Passed,
    /// The quest failed.
    Failed,
}

/// Where the game as a whole stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    NotStarted,
    InProgress,
    GoodWon,
    EvilWon,
}

/// A proposal passes on a strictly positive approve/reject tally.
#[must_use]
pub fn proposal_accepted(tally: i32) -> bool {
    tally > 0
}

/// Fail cards needed to fail quest `round_number`: two for round 4 in games
/// of seven or more, one otherwise.
#[must_use]
pub fn fails_required(player_count: usize, round_number: u32) -> u32 {
    if player_count > 6 && round_number == 4 {
        2
    } else {
        1
    }
}

/// Whether a fully voted quest with `failure_count` fail cards succeeded.
#[must_use]
pub fn quest_succeeded(player_count: usize, round_number: u32, failure_count: u32) -> bool {
    failure_count < fails_required(player_count, round_number)
}

/// Status of `attempt` in a game of `player_count` players.
#[must_use]
pub fn quest_status(attempt: &QuestAttempt, player_count: usize) -> QuestStatus {
    if attempt.members.is_empty() {
        QuestStatus::Proposing
    } else if attempt.remaining_proposal_votes > 0 {
        QuestStatus::VotingOnProposal
    } else if !proposal_accepted(attempt.proposal_vote_tally) {
        QuestStatus::ProposalRejected
    } else if attempt.remaining_quest_votes > 0 {
        QuestStatus::VotingInQuest
    } else if quest_succeeded(player_count, attempt.round_number, attempt.failure_count) {
        QuestStatus::Passed
    } else {
        QuestStatus::Failed
    }
}

/// The player seated after `current` in `seating` (already sorted by order),
/// wrapping around.
#[must_use]
pub fn next_leader<'a>(seating: &'a [Player], current: &str) -> Option<&'a str> {
    let idx = seating.iter().position(|p| p.name == current)?;
    seating
        .get((idx + 1) % seating.len())
        .map(|p| p.name.as_str())
}

/// Running count of resolved quests. Rejected proposals never count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuestTally {
    /// Quests that succeeded.
    pub passed: usize,
    /// Quests that failed.
    pub failed: usize,
}

impl QuestTally {
    /// The tally with one more resolved quest.
    #[must_use]
    pub fn with(self, succeeded: bool) -> Self {
        if succeeded {
            Self {
                passed: self.passed + 1,
                ..self
            }
        } else {
            Self {
                failed: self.failed + 1,
                ..self
            }
        }
    }

    /// The winner, once either side has three quests.
    #[must_use]
    pub fn decided(self) -> Option<(Faction, ConclusionReason)> {
        if self.passed >= QUESTS_TO_WIN {
            Some((Faction::Good, ConclusionReason::QuestsSucceeded))
        } else if self.failed >= QUESTS_TO_WIN {
            Some((Faction::Evil, ConclusionReason::QuestsFailed))
        } else {
            None
        }
    }
}

/// Counts the passed and failed quests among `quests`.
#[must_use]
pub fn tally_quests(quests: &[QuestAttempt], player_count: usize) -> QuestTally {
    quests
        .iter()
        .fold(QuestTally::default(), |tally, quest| {
            match quest_status(quest, player_count) {
                QuestStatus::Passed => tally.with(true),
                QuestStatus::Failed => tally.with(false),
                _ => tally,
            }
        })
}

/// The decided outcome of a game, derived from its attempts alone.
#[must_use]
pub fn game_outcome(
    quests: &[QuestAttempt],
    player_count: usize,
) -> Option<(Faction, ConclusionReason)> {
    if let Some(decision) = tally_quests(quests, player_count).decided() {
        return Some(decision);
    }
    let fifth_rejected = quests.iter().any(|quest| {
        quest.attempt_number >= MAX_ATTEMPTS_PER_ROUND
            && quest_status(quest, player_count) == QuestStatus::ProposalRejected
    });
    fifth_rejected.then_some((Faction::Evil, ConclusionReason::ProposalsRejected))
}

/// Overall status for display.
#[must_use]
pub fn game_status(quests: &[QuestAttempt], player_count: usize) -> GameStatus {
    if quests.is_empty() {
        return GameStatus::NotStarted;
    }
    match game_outcome(quests, player_count) {
        Some((Faction::Good, _)) => GameStatus::GoodWon,
        Some((Faction::Evil, _)) => GameStatus::EvilWon,
        None => GameStatus::InProgress,
    }
}
