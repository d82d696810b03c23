//! Aggregate root for the game context.
//!
//! `Game` is the only writer-facing model. Its command methods check the
//! current state (the precondition), then raise events without applying
//! them; the transition protocol appends those events conditionally on the
//! version they were computed against. Quest attempts form an append-only
//! log whose last entry is the current attempt.

use avalon_core::aggregate::AggregateRoot;
use avalon_core::clock::Clock;
use avalon_core::error::DomainError;
use avalon_core::event::EventMetadata;
use avalon_core::id::IdGenerator;
use avalon_core::rng::{DeterministicRng, choose_index, shuffle};
use serde::Serialize;
use uuid::Uuid;

use super::events::{
    ConclusionReason, GameConcluded, GameCreated, GameEvent, GameEventKind, GameStarted,
    PlayerJoined, ProposalVote, ProposalVoteCast, QuestAttemptOpened, QuestProposed, QuestVote,
    QuestVoteCast, RoleAssignment,
};
use super::quest_sizes::{
    MAX_ATTEMPTS_PER_ROUND, MAX_PLAYERS, ROUNDS, is_supported_player_count, quest_size,
};
use super::resolution::{self, QuestTally};
use super::roles::{Faction, Role};

/// A seat at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    /// Capability token.
    pub id: Uuid,
    /// Display name, unique within the game.
    pub name: String,
    /// Dealt role; `None` until the game starts.
    pub role: Option<Role>,
    /// Seat in the leader rotation, fixed at start.
    pub order: u32,
}

/// A recorded approve/reject vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastProposalVote {
    /// Voter name.
    pub player: String,
    /// The vote.
    pub vote: ProposalVote,
}

/// A recorded quest card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastQuestVote {
    /// Voter name.
    pub player: String,
    /// The card.
    pub vote: QuestVote,
}

/// One proposal-and-possibly-quest cycle within a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestAttempt {
    pub id: Uuid,
    pub round_number: u32,
    pub attempt_number: u32,
    pub size: u32,
    pub leader: String,
    /// Empty until proposed, then exactly `size` names.
    pub members: Vec<String>,
    pub proposal_votes: Vec<CastProposalVote>,
    pub quest_votes: Vec<CastQuestVote>,
    pub remaining_proposal_votes: u32,
    /// Sum of +1 approve / -1 reject.
    pub proposal_vote_tally: i32,
    pub remaining_quest_votes: u32,
    pub failure_count: u32,
}

impl QuestAttempt {
    fn opened(payload: &QuestAttemptOpened) -> Self {
        Self {
            id: payload.quest_id,
            round_number: payload.round_number,
            attempt_number: payload.attempt_number,
            size: payload.size,
            leader: payload.leader.clone(),
            members: Vec::new(),
            proposal_votes: Vec::new(),
            quest_votes: Vec::new(),
            remaining_proposal_votes: payload.player_count,
            proposal_vote_tally: 0,
            remaining_quest_votes: payload.size,
            failure_count: 0,
        }
    }

    /// Whether the leader has named a team.
    #[must_use]
    pub fn is_proposed(&self) -> bool {
        !self.members.is_empty()
    }

    /// Whether every proposal vote is in.
    #[must_use]
    pub fn proposal_closed(&self) -> bool {
        self.is_proposed() && self.remaining_proposal_votes == 0
    }

    /// Whether the team was approved, opening quest voting.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.proposal_closed() && resolution::proposal_accepted(self.proposal_vote_tally)
    }

    /// Whether every quest card is in.
    #[must_use]
    pub fn quest_closed(&self) -> bool {
        self.is_accepted() && self.remaining_quest_votes == 0
    }

    /// The proposal vote `player` cast, if any.
    #[must_use]
    pub fn proposal_vote_of(&self, player: &str) -> Option<ProposalVote> {
        self.proposal_votes
            .iter()
            .find(|v| v.player == player)
            .map(|v| v.vote)
    }

    /// The quest card `player` played, if any.
    #[must_use]
    pub fn quest_vote_of(&self, player: &str) -> Option<QuestVote> {
        self.quest_votes
            .iter()
            .find(|v| v.player == player)
            .map(|v| v.vote)
    }
}

/// The aggregate root for one game.
#[derive(Debug)]
pub struct Game {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    /// Name of the creating player; `None` until created.
    pub(crate) creator: Option<String>,
    /// Join order before start, seating order after.
    pub(crate) players: Vec<Player>,
    /// Append-only attempt log.
    pub(crate) quests: Vec<QuestAttempt>,
    /// Set by `GameConcluded`.
    pub(crate) conclusion: Option<(Faction, ConclusionReason)>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<GameEvent>,
}

fn precondition(message: &str) -> DomainError {
    DomainError::PreconditionFailed(message.to_owned())
}

fn player_count_u32(count: usize) -> u32 {
    // Rosters are capped at MAX_PLAYERS.
    u32::try_from(count).unwrap_or(u32::MAX)
}

impl Game {
    /// Creates an empty aggregate for `id`; nothing exists until `create`.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            creator: None,
            players: Vec::new(),
            quests: Vec::new(),
            conclusion: None,
            uncommitted_events: Vec::new(),
        }
    }

    /// Name of the creating player.
    #[must_use]
    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// Players in seating order (join order before the game starts).
    #[must_use]
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// The full attempt log, oldest first.
    #[must_use]
    pub fn quests(&self) -> &[QuestAttempt] {
        &self.quests
    }

    /// The attempt currently being played.
    #[must_use]
    pub fn current_quest(&self) -> Option<&QuestAttempt> {
        self.quests.last()
    }

    /// Winner and reason, once decided.
    #[must_use]
    pub fn conclusion(&self) -> Option<(Faction, ConclusionReason)> {
        self.conclusion
    }

    /// Whether roles have been dealt.
    #[must_use]
    pub fn is_started(&self) -> bool {
        !self.quests.is_empty()
    }

    /// Looks a player up by capability token.
    #[must_use]
    pub fn player(&self, player_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    fn has_player_named(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name)
    }

    /// Returns the next sequence number for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn raise(
        &mut self,
        kind: GameEventKind,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) {
        let metadata = EventMetadata::for_command(
            kind.event_type(),
            self.id,
            self.next_sequence_number(),
            correlation_id,
            clock,
            ids,
        );
        self.uncommitted_events.push(GameEvent { metadata, kind });
    }

    /// Resolves the caller and the attempt they address, which must be the
    /// current one of a game still in play.
    fn acting_on_current(
        &self,
        quest_id: Uuid,
        player_id: Uuid,
    ) -> Result<(&Player, &QuestAttempt), DomainError> {
        let player = self
            .player(player_id)
            .ok_or_else(|| precondition("caller is not a player in this game"))?;
        if self.conclusion.is_some() {
            return Err(precondition("game is over"));
        }
        let quest = self
            .current_quest()
            .filter(|q| q.id == quest_id)
            .ok_or_else(|| precondition("quest attempt is not the current attempt"))?;
        Ok((player, quest))
    }

    /// Raises the attempt that follows `leader`'s, in `round_number`.
    fn open_attempt(
        &mut self,
        round_number: u32,
        attempt_number: u32,
        leader: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        let player_count = self.players.len();
        let size = quest_size(player_count, round_number).ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "no quest size for round {round_number} with {player_count} players"
            ))
        })?;
        let kind = GameEventKind::QuestAttemptOpened(QuestAttemptOpened {
            game_id: self.id,
            quest_id: ids.new_id(),
            round_number,
            attempt_number,
            size,
            leader,
            player_count: player_count_u32(player_count),
        });
        self.raise(kind, correlation_id, clock, ids);
        Ok(())
    }

    fn leader_after(&self, current: &str) -> Result<String, DomainError> {
        resolution::next_leader(&self.players, current)
            .map(str::to_owned)
            .ok_or_else(|| {
                DomainError::Infrastructure(format!("leader {current} is not seated"))
            })
    }

    fn conclude(
        &mut self,
        (winner, reason): (Faction, ConclusionReason),
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) {
        let kind = GameEventKind::GameConcluded(GameConcluded {
            game_id: self.id,
            winner,
            reason,
        });
        self.raise(kind, correlation_id, clock, ids);
    }

    /// Creates the game with its first player, producing a `GameCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` if the game already exists.
    pub fn create(
        &mut self,
        creator_id: Uuid,
        creator_name: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        if self.creator.is_some() || !self.uncommitted_events.is_empty() {
            return Err(precondition("game already exists"));
        }
        let kind = GameEventKind::GameCreated(GameCreated {
            game_id: self.id,
            creator_id,
            creator_name,
        });
        self.raise(kind, correlation_id, clock, ids);
        Ok(())
    }

    /// Adds a player to a forming game, producing a `PlayerJoined` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` if the game has started, is
    /// full, or already has a player with this name or token.
    pub fn join(
        &mut self,
        player_id: Uuid,
        name: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        if self.is_started() {
            return Err(precondition("game has already started"));
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(precondition("game is full"));
        }
        if self.has_player_named(&name) {
            return Err(DomainError::PreconditionFailed(format!(
                "name {name} is already taken"
            )));
        }
        if self.player(player_id).is_some() {
            return Err(precondition("player has already joined"));
        }
        let kind = GameEventKind::PlayerJoined(PlayerJoined {
            game_id: self.id,
            player_id,
            name,
        });
        self.raise(kind, correlation_id, clock, ids);
        Ok(())
    }

    /// Deals a random permutation of `roles` to the players in `order`, picks
    /// a random first leader and opens round 1, producing `GameStarted` and
    /// `QuestAttemptOpened` events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a role/order length mismatch or
    /// unsupported player count, and `DomainError::PreconditionFailed` if the
    /// caller is not the creator, the game has started, or `order` does not
    /// list the roster exactly once each.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        caller_id: Uuid,
        roles: &[Role],
        order: &[String],
        correlation_id: Uuid,
        clock: &dyn Clock,
        rng: &mut dyn DeterministicRng,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        if roles.len() != order.len() || !is_supported_player_count(order.len()) {
            return Err(DomainError::Validation(
                "role list and player order must both cover 5 to 10 players".to_owned(),
            ));
        }
        if self.is_started() {
            return Err(precondition("game has already started"));
        }
        let caller = self
            .player(caller_id)
            .ok_or_else(|| precondition("caller is not a player in this game"))?;
        if self.creator.as_deref() != Some(caller.name.as_str()) {
            return Err(precondition("only the creator can start the game"));
        }
        if order.len() != self.players.len() || !order.iter().all(|n| self.has_player_named(n)) {
            return Err(precondition(
                "player order must list every player in the game exactly once",
            ));
        }

        let mut dealt = roles.to_vec();
        shuffle(&mut dealt, rng);
        let leader_idx = choose_index(order.len(), rng)
            .ok_or_else(|| DomainError::Validation("player order is empty".to_owned()))?;

        let assignments = order
            .iter()
            .zip(dealt)
            .zip(0u32..)
            .filter_map(|((name, role), seat)| {
                self.players
                    .iter()
                    .find(|p| &p.name == name)
                    .map(|p| RoleAssignment {
                        player_id: p.id,
                        role,
                        order: seat,
                    })
            })
            .collect();
        let leader = order[leader_idx].clone();
        let player_count = order.len();

        let kind = GameEventKind::GameStarted(GameStarted {
            game_id: self.id,
            assignments,
        });
        self.raise(kind, correlation_id, clock, ids);

        let size = quest_size(player_count, 1).ok_or_else(|| {
            DomainError::Validation(format!("no quest sizes for {player_count} players"))
        })?;
        let kind = GameEventKind::QuestAttemptOpened(QuestAttemptOpened {
            game_id: self.id,
            quest_id: ids.new_id(),
            round_number: 1,
            attempt_number: 1,
            size,
            leader,
            player_count: player_count_u32(player_count),
        });
        self.raise(kind, correlation_id, clock, ids);
        Ok(())
    }

    /// Names the team for the current attempt, producing a `QuestProposed`
    /// event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` unless the caller leads the
    /// current, still unproposed attempt, and `DomainError::Validation` if
    /// the team has the wrong size or names someone outside the game.
    pub fn propose_quest(
        &mut self,
        quest_id: Uuid,
        caller_id: Uuid,
        members: Vec<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        let (caller, quest) = self.acting_on_current(quest_id, caller_id)?;
        if quest.is_proposed() {
            return Err(precondition("a team has already been proposed"));
        }
        if caller.name != quest.leader {
            return Err(precondition("only the leader can propose a team"));
        }
        if members.len() != quest.size as usize {
            return Err(DomainError::Validation(format!(
                "this quest needs {} members, got {}",
                quest.size,
                members.len()
            )));
        }
        if let Some(stranger) = members.iter().find(|m| !self.has_player_named(m)) {
            return Err(DomainError::Validation(format!(
                "{stranger} is not a player in this game"
            )));
        }

        let kind = GameEventKind::QuestProposed(QuestProposed {
            game_id: self.id,
            quest_id,
            members,
        });
        self.raise(kind, correlation_id, clock, ids);
        Ok(())
    }

    /// Records the caller's vote on the current proposal, producing a
    /// `ProposalVoteCast` event. The last vote also raises what it decides:
    /// nothing when the team is approved, the next attempt of the round when
    /// rejected, or an evil win when the fifth attempt is rejected.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` unless a team is proposed on
    /// the current attempt and the caller has not voted on it yet.
    pub fn vote_on_proposal(
        &mut self,
        quest_id: Uuid,
        caller_id: Uuid,
        vote: ProposalVote,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        let (caller, quest) = self.acting_on_current(quest_id, caller_id)?;
        if !quest.is_proposed() {
            return Err(precondition("no team has been proposed yet"));
        }
        if quest.proposal_vote_of(&caller.name).is_some() {
            return Err(precondition("player has already voted on this proposal"));
        }
        if quest.remaining_proposal_votes == 0 {
            return Err(precondition("proposal voting is closed"));
        }

        let voter = caller.name.clone();
        let closes = quest.remaining_proposal_votes == 1;
        let tally = quest.proposal_vote_tally + vote.weight();
        let round_number = quest.round_number;
        let attempt_number = quest.attempt_number;
        let leader = quest.leader.clone();

        let kind = GameEventKind::ProposalVoteCast(ProposalVoteCast {
            game_id: self.id,
            quest_id,
            player: voter,
            vote,
        });
        self.raise(kind, correlation_id, clock, ids);

        if !closes || resolution::proposal_accepted(tally) {
            return Ok(());
        }
        if attempt_number >= MAX_ATTEMPTS_PER_ROUND {
            self.conclude(
                (Faction::Evil, ConclusionReason::ProposalsRejected),
                correlation_id,
                clock,
                ids,
            );
            return Ok(());
        }
        let next = self.leader_after(&leader)?;
        self.open_attempt(
            round_number,
            attempt_number + 1,
            next,
            correlation_id,
            clock,
            ids,
        )
    }

    /// Records the caller's quest card, producing a `QuestVoteCast` event.
    /// The last card resolves the quest and raises either the conclusion of
    /// the game or the first attempt of the next round.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` unless quest voting is open
    /// on the current attempt, the caller is on the team and has not voted,
    /// and (for a fail card) the caller's role is evil.
    pub fn vote_in_quest(
        &mut self,
        quest_id: Uuid,
        caller_id: Uuid,
        vote: QuestVote,
        correlation_id: Uuid,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<(), DomainError> {
        let (caller, quest) = self.acting_on_current(quest_id, caller_id)?;
        if !quest.is_accepted() {
            return Err(precondition("quest voting is not open"));
        }
        if !quest.members.contains(&caller.name) {
            return Err(precondition("only team members vote in the quest"));
        }
        if quest.quest_vote_of(&caller.name).is_some() {
            return Err(precondition("player has already voted in this quest"));
        }
        if quest.remaining_quest_votes == 0 {
            return Err(precondition("quest voting is closed"));
        }
        if vote == QuestVote::Fail && !caller.role.is_some_and(Role::is_evil) {
            return Err(precondition("only evil players may fail a quest"));
        }

        let voter = caller.name.clone();
        let closes = quest.remaining_quest_votes == 1;
        let failures = quest.failure_count + u32::from(vote == QuestVote::Fail);
        let round_number = quest.round_number;
        let leader = quest.leader.clone();
        let player_count = self.players.len();

        let kind = GameEventKind::QuestVoteCast(QuestVoteCast {
            game_id: self.id,
            quest_id,
            player: voter,
            vote,
        });
        self.raise(kind, correlation_id, clock, ids);

        if !closes {
            return Ok(());
        }
        let succeeded = resolution::quest_succeeded(player_count, round_number, failures);
        let history = &self.quests[..self.quests.len() - 1];
        let tally: QuestTally = resolution::tally_quests(history, player_count).with(succeeded);
        if let Some(decision) = tally.decided() {
            self.conclude(decision, correlation_id, clock, ids);
            return Ok(());
        }
        // Five binary results always give one side three.
        debug_assert!(round_number < ROUNDS, "final round resolved without a winner");
        let next = self.leader_after(&leader)?;
        self.open_attempt(round_number + 1, 1, next, correlation_id, clock, ids)
    }
}

impl AggregateRoot for Game {
    type Event = GameEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            GameEventKind::GameCreated(payload) => {
                self.creator = Some(payload.creator_name.clone());
                self.players.push(Player {
                    id: payload.creator_id,
                    name: payload.creator_name.clone(),
                    role: None,
                    order: 0,
                });
            }
            GameEventKind::PlayerJoined(payload) => {
                self.players.push(Player {
                    id: payload.player_id,
                    name: payload.name.clone(),
                    role: None,
                    order: 0,
                });
            }
            GameEventKind::GameStarted(payload) => {
                for assignment in &payload.assignments {
                    if let Some(player) =
                        self.players.iter_mut().find(|p| p.id == assignment.player_id)
                    {
                        player.role = Some(assignment.role);
                        player.order = assignment.order;
                    }
                }
                self.players.sort_by_key(|p| p.order);
            }
            GameEventKind::QuestAttemptOpened(payload) => {
                self.quests.push(QuestAttempt::opened(payload));
            }
            GameEventKind::QuestProposed(payload) => {
                if let Some(quest) = self.quests.iter_mut().rfind(|q| q.id == payload.quest_id) {
                    quest.members.clone_from(&payload.members);
                }
            }
            GameEventKind::ProposalVoteCast(payload) => {
                if let Some(quest) = self.quests.iter_mut().rfind(|q| q.id == payload.quest_id) {
                    quest.proposal_votes.push(CastProposalVote {
                        player: payload.player.clone(),
                        vote: payload.vote,
                    });
                    quest.remaining_proposal_votes =
                        quest.remaining_proposal_votes.saturating_sub(1);
                    quest.proposal_vote_tally += payload.vote.weight();
                }
            }
            GameEventKind::QuestVoteCast(payload) => {
                if let Some(quest) = self.quests.iter_mut().rfind(|q| q.id == payload.quest_id) {
                    quest.quest_votes.push(CastQuestVote {
                        player: payload.player.clone(),
                        vote: payload.vote,
                    });
                    quest.remaining_quest_votes = quest.remaining_quest_votes.saturating_sub(1);
                    if payload.vote == QuestVote::Fail {
                        quest.failure_count += 1;
                    }
                }
            }
            GameEventKind::GameConcluded(payload) => {
                self.conclusion = Some((payload.winner, payload.reason));
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
