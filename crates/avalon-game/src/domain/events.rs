//! Domain events for the game context.
//!
//! A game is persisted as the ordered stream of these events; replaying them
//! rebuilds the aggregate.

use avalon_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::roles::{Faction, Role};

/// A player's verdict on a proposed quest team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalVote {
    /// Send this team.
    Approve,
    /// Pass leadership on.
    Reject,
}

impl ProposalVote {
    /// Signed contribution to the proposal tally.
    #[must_use]
    pub fn weight(self) -> i32 {
        match self {
            Self::Approve => 1,
            Self::Reject => -1,
        }
    }
}

/// A quest member's secret card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestVote {
    Success,
    Fail,
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConclusionReason {
    /// Three quests succeeded.
    QuestsSucceeded,
    /// Three quests failed.
    QuestsFailed,
    /// Five proposals in one round were rejected.
    ProposalsRejected,
}

/// One player's dealt role and seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// The player receiving the role.
    pub player_id: Uuid,
    /// The dealt role.
    pub role: Role,
    /// Seat in the leader rotation, starting at 0.
    pub order: u32,
}

/// Emitted when a game is created by its first player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameCreated {
    /// The game identifier.
    pub game_id: Uuid,
    /// Capability token of the creator.
    pub creator_id: Uuid,
    /// Display name of the creator.
    pub creator_name: String,
}

/// Emitted when a player joins a forming game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoined {
    /// The game identifier.
    pub game_id: Uuid,
    /// Capability token of the new player.
    pub player_id: Uuid,
    /// Display name, unique within the game.
    pub name: String,
}

/// Emitted once, when roles and seats are dealt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStarted {
    /// The game identifier.
    pub game_id: Uuid,
    /// One assignment per player.
    pub assignments: Vec<RoleAssignment>,
}

/// Emitted when a new quest attempt becomes current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestAttemptOpened {
    /// The game identifier.
    pub game_id: Uuid,
    /// The new attempt's identifier.
    pub quest_id: Uuid,
    /// Round, 1 through 5.
    pub round_number: u32,
    /// Attempt within the round, 1 through 5.
    pub attempt_number: u32,
    /// Team size for this round.
    pub size: u32,
    /// Name of the player who proposes the team.
    pub leader: String,
    /// Proposal votes expected (one per player).
    pub player_count: u32,
}

/// Emitted when the leader names the team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestProposed {
    /// The game identifier.
    pub game_id: Uuid,
    /// The attempt being proposed.
    pub quest_id: Uuid,
    /// Names of the team members, in the order given.
    pub members: Vec<String>,
}

/// Emitted for each accepted proposal vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalVoteCast {
    /// The game identifier.
    pub game_id: Uuid,
    /// The attempt voted on.
    pub quest_id: Uuid,
    /// Voter name.
    pub player: String,
    /// The vote.
    pub vote: ProposalVote,
}

/// Emitted for each accepted quest vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestVoteCast {
    /// The game identifier.
    pub game_id: Uuid,
    /// The attempt voted in.
    pub quest_id: Uuid,
    /// Voter name.
    pub player: String,
    /// The vote.
    pub vote: QuestVote,
}

/// Emitted when a side wins. Nothing follows it in the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConcluded {
    /// The game identifier.
    pub game_id: Uuid,
    /// The winning faction.
    pub winner: Faction,
    /// What decided it.
    pub reason: ConclusionReason,
}

/// Event type identifier for [`GameCreated`].
pub const GAME_CREATED_EVENT_TYPE: &str = "game.created";

/// Event type identifier for [`PlayerJoined`].
pub const PLAYER_JOINED_EVENT_TYPE: &str = "game.player_joined";

/// Event type identifier for [`GameStarted`].
pub const GAME_STARTED_EVENT_TYPE: &str = "game.started";

/// Event type identifier for [`QuestAttemptOpened`].
pub const QUEST_ATTEMPT_OPENED_EVENT_TYPE: &str = "game.quest_attempt_opened";

/// Event type identifier for [`QuestProposed`].
pub const QUEST_PROPOSED_EVENT_TYPE: &str = "game.quest_proposed";

/// Event type identifier for [`ProposalVoteCast`].
pub const PROPOSAL_VOTE_CAST_EVENT_TYPE: &str = "game.proposal_vote_cast";

/// Event type identifier for [`QuestVoteCast`].
pub const QUEST_VOTE_CAST_EVENT_TYPE: &str = "game.quest_vote_cast";

/// Event type identifier for [`GameConcluded`].
pub const GAME_CONCLUDED_EVENT_TYPE: &str = "game.concluded";

/// Event payload variants for the game context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameEventKind {
    /// The game was created.
    GameCreated(GameCreated),
    /// A player joined.
    PlayerJoined(PlayerJoined),
    /// Roles were dealt.
    GameStarted(GameStarted),
    /// A quest attempt became current.
    QuestAttemptOpened(QuestAttemptOpened),
    /// The leader proposed a team.
    QuestProposed(QuestProposed),
    /// A proposal vote was recorded.
    ProposalVoteCast(ProposalVoteCast),
    /// A quest vote was recorded.
    QuestVoteCast(QuestVoteCast),
    /// The game ended.
    GameConcluded(GameConcluded),
}

impl GameEventKind {
    /// The stable type name stored alongside the payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GameCreated(_) => GAME_CREATED_EVENT_TYPE,
            Self::PlayerJoined(_) => PLAYER_JOINED_EVENT_TYPE,
            Self::GameStarted(_) => GAME_STARTED_EVENT_TYPE,
            Self::QuestAttemptOpened(_) => QUEST_ATTEMPT_OPENED_EVENT_TYPE,
            Self::QuestProposed(_) => QUEST_PROPOSED_EVENT_TYPE,
            Self::ProposalVoteCast(_) => PROPOSAL_VOTE_CAST_EVENT_TYPE,
            Self::QuestVoteCast(_) => QUEST_VOTE_CAST_EVENT_TYPE,
            Self::GameConcluded(_) => GAME_CONCLUDED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the game context.
#[derive(Debug, Clone)]
pub struct GameEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: GameEventKind,
}

impl DomainEvent for GameEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("GameEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
