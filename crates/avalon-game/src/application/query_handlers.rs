//! Query handlers for the game context.
//!
//! The view projector turns a replayed game into what one player is allowed
//! to see. Votes stay hidden until every vote on an attempt is in, quest
//! cards are never tied to a voter, and knowledge of other players' roles
//! follows the role table.

use avalon_core::error::DomainError;
use avalon_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::aggregates::{Game, Player, QuestAttempt};
use crate::domain::events::{ProposalVote, QuestVote};
use crate::domain::quest_sizes::{ROUNDS, quest_sizes};
use crate::domain::resolution::{GameStatus, QuestStatus, game_status, quest_status};
use crate::domain::roles::{Faction, Role};

/// A seat at the table as everyone sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    /// Display name.
    pub name: String,
    /// Seat in the leader rotation.
    pub order: u32,
}

/// A role with its faction, detached from whoever holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RoleFactionView {
    /// The role.
    pub role: Role,
    /// Its faction.
    pub faction: Faction,
}

impl From<Role> for RoleFactionView {
    fn from(role: Role) -> Self {
        Self {
            role,
            faction: role.faction(),
        }
    }
}

/// A revealed proposal vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalVoteView {
    /// Voter name.
    pub player: String,
    /// The vote.
    pub vote: ProposalVote,
}

/// One quest attempt as the viewer sees it.
#[derive(Debug, Clone, Serialize)]
pub struct QuestAttemptView {
    pub quest_id: Uuid,
    pub round_number: u32,
    pub attempt_number: u32,
    pub size: u32,
    pub leader: String,
    pub members: Vec<String>,
    pub status: QuestStatus,
    pub remaining_proposal_votes: u32,
    pub remaining_quest_votes: u32,
    /// Every proposal vote sorted by voter, once all are in.
    pub proposal_votes: Option<Vec<ProposalVoteView>>,
    /// The sorted quest cards without voters, once all are in.
    pub quest_votes: Option<Vec<QuestVote>>,
    /// The viewer's own proposal vote, if cast.
    pub my_proposal_vote: Option<ProposalVote>,
    /// The viewer's own quest card, if played.
    pub my_quest_vote: Option<QuestVote>,
}

/// Everything one player may know about a game.
#[derive(Debug, Clone, Serialize)]
pub struct GameView {
    pub game_id: Uuid,
    pub creator: Option<String>,
    pub status: GameStatus,
    /// The viewer's name.
    pub player_name: String,
    /// The viewer's role, once dealt.
    pub role: Option<Role>,
    /// The viewer's faction, once dealt.
    pub faction: Option<Faction>,
    /// The roster in seating order.
    pub players: Vec<PlayerView>,
    /// Every dealt role, sorted, with its faction.
    pub role_composition: Vec<RoleFactionView>,
    /// Names the viewer's role is shown, sorted.
    pub known_players: Vec<String>,
    /// Roles held by `known_players`, sorted independently of the names.
    pub known_roles: Vec<RoleFactionView>,
    /// Team size per round for this roster, when supported.
    pub quest_sizes: Option<[u32; ROUNDS as usize]>,
    /// Every attempt, oldest first.
    pub quests: Vec<QuestAttemptView>,
}

fn project_quest(quest: &QuestAttempt, viewer: &str, player_count: usize) -> QuestAttemptView {
    let proposal_votes = quest.proposal_closed().then(|| {
        let mut votes: Vec<ProposalVoteView> = quest
            .proposal_votes
            .iter()
            .map(|v| ProposalVoteView {
                player: v.player.clone(),
                vote: v.vote,
            })
            .collect();
        votes.sort_by(|a, b| a.player.cmp(&b.player));
        votes
    });
    let quest_votes = quest.quest_closed().then(|| {
        let mut cards: Vec<QuestVote> = quest.quest_votes.iter().map(|v| v.vote).collect();
        cards.sort_unstable();
        cards
    });

    QuestAttemptView {
        quest_id: quest.id,
        round_number: quest.round_number,
        attempt_number: quest.attempt_number,
        size: quest.size,
        leader: quest.leader.clone(),
        members: quest.members.clone(),
        status: quest_status(quest, player_count),
        remaining_proposal_votes: quest.remaining_proposal_votes,
        remaining_quest_votes: quest.remaining_quest_votes,
        proposal_votes,
        quest_votes,
        my_proposal_vote: quest.proposal_vote_of(viewer),
        my_quest_vote: quest.quest_vote_of(viewer),
    }
}

/// Players whose role `viewer` is shown, excluding the viewer.
fn known_to<'a>(viewer: &Player, players: &'a [Player]) -> Vec<&'a Player> {
    let Some(own) = viewer.role else {
        return Vec::new();
    };
    players
        .iter()
        .filter(|p| p.id != viewer.id)
        .filter(|p| p.role.is_some_and(|role| own.can_see(role)))
        .collect()
}

/// Projects `game` for the player holding `viewer_id`. Returns `None` if no
/// such player is in the game.
#[must_use]
pub fn project_game_view(game: &Game, viewer_id: Uuid) -> Option<GameView> {
    let viewer = game.player(viewer_id)?;
    let players = game.players();

    let known = known_to(viewer, players);
    let mut known_players: Vec<String> = known.iter().map(|p| p.name.clone()).collect();
    known_players.sort();
    let mut known_roles: Vec<RoleFactionView> = known
        .iter()
        .filter_map(|p| p.role)
        .map(RoleFactionView::from)
        .collect();
    known_roles.sort_unstable();

    let mut role_composition: Vec<RoleFactionView> = players
        .iter()
        .filter_map(|p| p.role)
        .map(RoleFactionView::from)
        .collect();
    role_composition.sort_unstable();

    Some(GameView {
        game_id: game.id,
        creator: game.creator().map(str::to_owned),
        status: game_status(game.quests(), players.len()),
        player_name: viewer.name.clone(),
        role: viewer.role,
        faction: viewer.role.map(Role::faction),
        players: players
            .iter()
            .map(|p| PlayerView {
                name: p.name.clone(),
                order: p.order,
            })
            .collect(),
        role_composition,
        known_players,
        known_roles,
        quest_sizes: quest_sizes(players.len()),
        quests: game
            .quests()
            .iter()
            .map(|q| project_quest(q, &viewer.name, players.len()))
            .collect(),
    })
}

/// Retrieves the view of a game for one of its players.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the game does not exist or
/// `player_id` is not one of its players.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_game_state(
    game_id: Uuid,
    player_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<GameView, DomainError> {
    let game = command_handlers::load_game(game_id, repo).await?;
    project_game_view(&game, player_id).ok_or(DomainError::AggregateNotFound(player_id))
}
