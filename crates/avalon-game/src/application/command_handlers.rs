//! Command handlers for the game context.
//!
//! Every state-changing operation follows the same transition protocol:
//! validate the input, load the stream, replay it, let the aggregate check
//! the precondition and raise events, then append those events on the
//! condition that the stream still has the version that was replayed. A
//! conflicting append means another writer won the race, so the handler
//! reloads and re-checks the precondition against the fresh state. A failed
//! precondition is final and never retried.

use std::sync::Mutex;

use avalon_core::aggregate::AggregateRoot;
use avalon_core::clock::Clock;
use avalon_core::command::Command;
use avalon_core::error::DomainError;
use avalon_core::event::{DomainEvent, EventMetadata};
use avalon_core::id::IdGenerator;
use avalon_core::repository::{EventRepository, StoredEvent};
use avalon_core::rng::DeterministicRng;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::aggregates::Game;
use crate::domain::commands::{
    CreateGame, JoinGame, ProposeQuest, StartGame, VoteInQuest, VoteOnProposal,
};
use crate::domain::events::{GameEvent, GameEventKind};

/// Default bound on load-decide-append rounds per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// How hard a handler tries before surfacing a concurrency conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Load-decide-append rounds, counting the first. `1` never retries, so
    /// the first conflict is returned as is.
    pub max_attempts: u32,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct GameCommandResult {
    /// The game affected or created by the command.
    pub aggregate_id: Uuid,
    /// Capability token issued to a new player, for create and join.
    pub player_id: Option<Uuid>,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

fn to_stored_event(event: &GameEvent) -> StoredEvent {
    let meta = event.metadata();
    StoredEvent {
        event_id: meta.event_id,
        aggregate_id: meta.aggregate_id,
        event_type: event.event_type().to_owned(),
        payload: event.to_payload(),
        sequence_number: meta.sequence_number,
        correlation_id: meta.correlation_id,
        causation_id: meta.causation_id,
        occurred_at: meta.occurred_at,
    }
}

/// Reconstitutes a `Game` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    game_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Game, DomainError> {
    let mut game = Game::new(game_id);
    for stored in existing_events {
        let kind: GameEventKind = serde_json::from_value(stored.payload.clone()).map_err(|e| {
            DomainError::Infrastructure(format!("event deserialization failed: {e}"))
        })?;
        let event = GameEvent {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id,
                sequence_number: stored.sequence_number,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        };
        game.apply(&event);
    }
    Ok(game)
}

/// Loads and replays an existing game.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the stream is empty.
pub(crate) async fn load_game(
    game_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<Game, DomainError> {
    let existing_events = repo.load_events(game_id).await?;
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(game_id));
    }
    reconstitute(game_id, &existing_events)
}

/// Runs `decide` against the latest state of `game_id` and appends what it
/// raises, reloading and deciding again after each lost race.
async fn transition<F>(
    game_id: Uuid,
    policy: &TransitionPolicy,
    repo: &dyn EventRepository,
    mut decide: F,
) -> Result<Vec<StoredEvent>, DomainError>
where
    F: FnMut(&mut Game) -> Result<(), DomainError>,
{
    let mut attempt = 1;
    loop {
        let mut game = load_game(game_id, repo).await?;
        decide(&mut game)?;

        let stored_events: Vec<StoredEvent> = game
            .uncommitted_events()
            .iter()
            .map(to_stored_event)
            .collect();

        match repo
            .append_events(game_id, game.version(), &stored_events)
            .await
        {
            Ok(()) => return Ok(stored_events),
            Err(err) if err.is_conflict() && attempt < policy.max_attempts => {
                debug!(%game_id, attempt, "append lost a race, reloading");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Handles the `CreateGame` command: opens a new stream with the creator as
/// its first player.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a bad name, or whatever the append
/// fails with.
#[instrument(skip_all, fields(player_name = %command.player_name))]
pub async fn handle_create_game(
    command: &CreateGame,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    repo: &dyn EventRepository,
) -> Result<GameCommandResult, DomainError> {
    command.validate()?;

    let game_id = ids.new_id();
    let player_id = ids.new_id();
    let mut game = Game::new(game_id);

    game.create(
        player_id,
        command.player_name.clone(),
        command.correlation_id,
        clock,
        ids,
    )?;

    let stored_events: Vec<StoredEvent> = game
        .uncommitted_events()
        .iter()
        .map(to_stored_event)
        .collect();

    repo.append_events(game_id, game.version(), &stored_events)
        .await?;

    Ok(GameCommandResult {
        aggregate_id: game_id,
        player_id: Some(player_id),
        stored_events,
    })
}

/// Handles the `JoinGame` command. The new player's token is drawn once, so
/// a retried join hands out the same token it would have on the first try.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a bad name,
/// `DomainError::AggregateNotFound` for an unknown game, and
/// `DomainError::PreconditionFailed` if the aggregate refuses the join.
#[instrument(skip_all, fields(game_id = %command.game_id, player_name = %command.player_name))]
pub async fn handle_join_game(
    command: &JoinGame,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    policy: &TransitionPolicy,
    repo: &dyn EventRepository,
) -> Result<GameCommandResult, DomainError> {
    command.validate()?;

    let player_id = ids.new_id();
    let stored_events = transition(command.game_id, policy, repo, |game| {
        game.join(
            player_id,
            command.player_name.clone(),
            command.correlation_id,
            clock,
            ids,
        )
    })
    .await?;

    Ok(GameCommandResult {
        aggregate_id: command.game_id,
        player_id: Some(player_id),
        stored_events,
    })
}

/// Handles the `StartGame` command: deals roles, seats players, and opens
/// the first quest attempt.
///
/// The `Mutex` is locked only around the synchronous domain method call to
/// avoid holding a `MutexGuard` across await points.
///
/// # Errors
///
/// Returns `DomainError` if validation, the precondition, or the append
/// fails.
#[instrument(skip_all, fields(game_id = %command.game_id))]
pub async fn handle_start_game(
    command: &StartGame,
    clock: &dyn Clock,
    rng: &Mutex<dyn DeterministicRng + Send>,
    ids: &dyn IdGenerator,
    policy: &TransitionPolicy,
    repo: &dyn EventRepository,
) -> Result<GameCommandResult, DomainError> {
    command.validate()?;

    let stored_events = transition(command.game_id, policy, repo, |game| {
        let mut rng_guard = rng
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("RNG mutex poisoned: {e}")))?;
        game.start(
            command.player_id,
            &command.role_list,
            &command.player_order,
            command.correlation_id,
            clock,
            &mut *rng_guard,
            ids,
        )
    })
    .await?;

    Ok(GameCommandResult {
        aggregate_id: command.game_id,
        player_id: None,
        stored_events,
    })
}

/// Handles the `ProposeQuest` command.
///
/// # Errors
///
/// Returns `DomainError` if validation, the precondition, or the append
/// fails.
#[instrument(skip_all, fields(game_id = %command.game_id, quest_id = %command.quest_id))]
pub async fn handle_propose_quest(
    command: &ProposeQuest,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    policy: &TransitionPolicy,
    repo: &dyn EventRepository,
) -> Result<GameCommandResult, DomainError> {
    command.validate()?;

    let stored_events = transition(command.game_id, policy, repo, |game| {
        game.propose_quest(
            command.quest_id,
            command.player_id,
            command.members.clone(),
            command.correlation_id,
            clock,
            ids,
        )
    })
    .await?;

    Ok(GameCommandResult {
        aggregate_id: command.game_id,
        player_id: None,
        stored_events,
    })
}

/// Handles the `VoteOnProposal` command. When this vote is the last one,
/// the same append also carries the next attempt or the game's conclusion.
///
/// # Errors
///
/// Returns `DomainError::PreconditionFailed` for a repeated or out-of-turn
/// vote, or whatever the append fails with.
#[instrument(skip_all, fields(game_id = %command.game_id, quest_id = %command.quest_id))]
pub async fn handle_vote_on_proposal(
    command: &VoteOnProposal,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    policy: &TransitionPolicy,
    repo: &dyn EventRepository,
) -> Result<GameCommandResult, DomainError> {
    command.validate()?;

    let stored_events = transition(command.game_id, policy, repo, |game| {
        game.vote_on_proposal(
            command.quest_id,
            command.player_id,
            command.vote,
            command.correlation_id,
            clock,
            ids,
        )
    })
    .await?;

    Ok(GameCommandResult {
        aggregate_id: command.game_id,
        player_id: None,
        stored_events,
    })
}

/// Handles the `VoteInQuest` command. When this card is the last one, the
/// same append also carries the next round or the game's conclusion.
///
/// # Errors
///
/// Returns `DomainError::PreconditionFailed` for a repeated, out-of-turn or
/// forbidden vote, or whatever the append fails with.
#[instrument(skip_all, fields(game_id = %command.game_id, quest_id = %command.quest_id))]
pub async fn handle_vote_in_quest(
    command: &VoteInQuest,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
    policy: &TransitionPolicy,
    repo: &dyn EventRepository,
) -> Result<GameCommandResult, DomainError> {
    command.validate()?;

    let stored_events = transition(command.game_id, policy, repo, |game| {
        game.vote_in_quest(
            command.quest_id,
            command.player_id,
            command.vote,
            command.correlation_id,
            clock,
            ids,
        )
    })
    .await?;

    Ok(GameCommandResult {
        aggregate_id: command.game_id,
        player_id: None,
        stored_events,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use avalon_core::error::DomainError;
    use avalon_core::repository::{EventRepository, StoredEvent};
    use avalon_core::rng::DeterministicRng;
    use avalon_event_store::InMemoryEventRepository;
    use avalon_test_support::{
        ConflictingEventRepository, EmptyEventRepository, FailingEventRepository, FixedClock,
        RecordingEventRepository, SequenceRng, SequentialIdGenerator, fixed_clock,
        identity_shuffle_draws,
    };
    use uuid::Uuid;

    use super::*;
    use crate::domain::events::{ConclusionReason, ProposalVote, QuestVote};
    use crate::domain::roles::{Faction, Role};

    const NAMES: [&str; 5] = ["ann", "bob", "cat", "dan", "eve"];

    /// Test fixture holding one game's collaborators.
    struct Table {
        clock: FixedClock,
        ids: SequentialIdGenerator,
        policy: TransitionPolicy,
        repo: Arc<InMemoryEventRepository>,
        game_id: Uuid,
        players: Vec<Uuid>,
    }

    impl Table {
        /// Creates a game and seats five players; `ann` created it.
        async fn seated() -> Self {
            let clock = fixed_clock();
            let ids = SequentialIdGenerator::new();
            let policy = TransitionPolicy::default();
            let repo = Arc::new(InMemoryEventRepository::new());

            let created = handle_create_game(
                &CreateGame {
                    correlation_id: Uuid::new_v4(),
                    player_name: "ann".to_owned(),
                },
                &clock,
                &ids,
                repo.as_ref(),
            )
            .await
            .unwrap();
            let game_id = created.aggregate_id;
            let mut players = vec![created.player_id.unwrap()];

            for name in &NAMES[1..] {
                let joined = handle_join_game(
                    &JoinGame {
                        correlation_id: Uuid::new_v4(),
                        game_id,
                        player_name: (*name).to_owned(),
                    },
                    &clock,
                    &ids,
                    &policy,
                    repo.as_ref(),
                )
                .await
                .unwrap();
                players.push(joined.player_id.unwrap());
            }

            Self {
                clock,
                ids,
                policy,
                repo,
                game_id,
                players,
            }
        }

        /// Seats five players and starts with roles dealt in list order:
        /// ann merlin, bob and cat servants, dan assassin, eve minion; ann
        /// leads first.
        async fn started() -> Self {
            let table = Self::seated().await;
            let mut draws = identity_shuffle_draws(5);
            draws.push(0);
            let rng: Mutex<SequenceRng> = Mutex::new(SequenceRng::new(draws));
            let rng_ref: &Mutex<dyn DeterministicRng + Send> = &rng;
            handle_start_game(
                &StartGame {
                    correlation_id: Uuid::new_v4(),
                    game_id: table.game_id,
                    player_id: table.players[0],
                    role_list: vec![
                        Role::Merlin,
                        Role::LoyalServant,
                        Role::LoyalServant,
                        Role::Assassin,
                        Role::Minion,
                    ],
                    player_order: NAMES.iter().map(|s| (*s).to_owned()).collect(),
                },
                &table.clock,
                rng_ref,
                &table.ids,
                &table.policy,
                table.repo.as_ref(),
            )
            .await
            .unwrap();
            table
        }

        async fn game(&self) -> Game {
            load_game(self.game_id, self.repo.as_ref()).await.unwrap()
        }

        async fn current_quest_id(&self) -> Uuid {
            self.game().await.current_quest().unwrap().id
        }

        async fn propose(&self, members: &[&str]) -> Result<GameCommandResult, DomainError> {
            let game = self.game().await;
            let quest = game.current_quest().unwrap();
            let leader = game
                .players()
                .iter()
                .find(|p| p.name == quest.leader)
                .unwrap()
                .id;
            handle_propose_quest(
                &ProposeQuest {
                    correlation_id: Uuid::new_v4(),
                    game_id: self.game_id,
                    quest_id: quest.id,
                    player_id: leader,
                    members: members.iter().map(|s| (*s).to_owned()).collect(),
                },
                &self.clock,
                &self.ids,
                &self.policy,
                self.repo.as_ref(),
            )
            .await
        }

        async fn vote(
            &self,
            quest_id: Uuid,
            seat: usize,
            vote: ProposalVote,
        ) -> Result<GameCommandResult, DomainError> {
            handle_vote_on_proposal(
                &VoteOnProposal {
                    correlation_id: Uuid::new_v4(),
                    game_id: self.game_id,
                    quest_id,
                    player_id: self.players[seat],
                    vote,
                },
                &self.clock,
                &self.ids,
                &self.policy,
                self.repo.as_ref(),
            )
            .await
        }

        async fn play(
            &self,
            quest_id: Uuid,
            seat: usize,
            vote: QuestVote,
        ) -> Result<GameCommandResult, DomainError> {
            handle_vote_in_quest(
                &VoteInQuest {
                    correlation_id: Uuid::new_v4(),
                    game_id: self.game_id,
                    quest_id,
                    player_id: self.players[seat],
                    vote,
                },
                &self.clock,
                &self.ids,
                &self.policy,
                self.repo.as_ref(),
            )
            .await
        }
    }

    /// Proposes `team` for the current attempt and has everyone approve it.
    async fn approve_team(table: &Table, team: &[&str]) -> Uuid {
        table.propose(team).await.unwrap();
        let quest_id = table.current_quest_id().await;
        for seat in 0..NAMES.len() {
            table.vote(quest_id, seat, ProposalVote::Approve).await.unwrap();
        }
        quest_id
    }

    /// Sends `copies` success cards from every member of `team` at once.
    /// Returns how many were accepted and how many refused.
    async fn race_quest_votes(
        table: &Arc<Table>,
        quest_id: Uuid,
        team: &[&str],
        copies: usize,
    ) -> (usize, usize) {
        let seats: Vec<usize> = team
            .iter()
            .map(|name| NAMES.iter().position(|n| n == name).unwrap())
            .collect();
        let handles: Vec<_> = seats
            .iter()
            .flat_map(|&seat| std::iter::repeat_n(seat, copies))
            .map(|seat| {
                let table = Arc::clone(table);
                tokio::spawn(async move { table.play(quest_id, seat, QuestVote::Success).await })
            })
            .collect();

        let mut accepted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DomainError::PreconditionFailed(_)) => refused += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        (accepted, refused)
    }

    async fn count_events(table: &Table, event_type: &str) -> usize {
        table
            .repo
            .load_events(table.game_id)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    fn event_types(events: &[StoredEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event_type.as_str()).collect()
    }

    #[tokio::test]
    async fn test_handle_create_game_persists_created_event_and_issues_token() {
        // Arrange
        let ids = SequentialIdGenerator::new();
        let repo = InMemoryEventRepository::new();
        let command = CreateGame {
            correlation_id: Uuid::new_v4(),
            player_name: "ann".to_owned(),
        };

        // Act
        let result = handle_create_game(&command, &fixed_clock(), &ids, &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.aggregate_id, Uuid::from_u64_pair(0, 1));
        assert_eq!(result.player_id, Some(Uuid::from_u64_pair(0, 2)));
        assert_eq!(event_types(&result.stored_events), vec!["game.created"]);
        assert_eq!(result.stored_events[0].sequence_number, 1);
        assert_eq!(
            result.stored_events[0].correlation_id,
            command.correlation_id
        );
        let stored = repo.load_events(result.aggregate_id).await.unwrap();
        assert_eq!(stored, result.stored_events);
    }

    #[tokio::test]
    async fn test_handle_create_game_rejects_bad_name_before_touching_the_store() {
        // Arrange
        let command = CreateGame {
            correlation_id: Uuid::new_v4(),
            player_name: String::new(),
        };

        // Act
        let result = handle_create_game(
            &command,
            &fixed_clock(),
            &SequentialIdGenerator::new(),
            &FailingEventRepository,
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_handle_join_game_returns_not_found_for_unknown_game() {
        // Arrange
        let game_id = Uuid::new_v4();
        let command = JoinGame {
            correlation_id: Uuid::new_v4(),
            game_id,
            player_name: "bob".to_owned(),
        };

        // Act
        let result = handle_join_game(
            &command,
            &fixed_clock(),
            &SequentialIdGenerator::new(),
            &TransitionPolicy::default(),
            &EmptyEventRepository,
        )
        .await;

        // Assert
        match result {
            Err(DomainError::AggregateNotFound(id)) => assert_eq!(id, game_id),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handle_join_game_appends_at_the_replayed_version() {
        // Arrange
        let ids = SequentialIdGenerator::new();
        let created = handle_create_game(
            &CreateGame {
                correlation_id: Uuid::new_v4(),
                player_name: "ann".to_owned(),
            },
            &fixed_clock(),
            &ids,
            &EmptyEventRepository,
        )
        .await
        .unwrap();
        let repo = RecordingEventRepository::new(created.stored_events);
        let command = JoinGame {
            correlation_id: Uuid::new_v4(),
            game_id: created.aggregate_id,
            player_name: "bob".to_owned(),
        };

        // Act
        let result = handle_join_game(
            &command,
            &fixed_clock(),
            &ids,
            &TransitionPolicy::default(),
            &repo,
        )
        .await
        .unwrap();

        // Assert
        let appended = repo.appended_events();
        assert_eq!(appended.len(), 1);
        let (game_id, expected_version, events) = &appended[0];
        assert_eq!(*game_id, created.aggregate_id);
        assert_eq!(*expected_version, 1);
        assert_eq!(event_types(events), vec!["game.player_joined"]);
        assert_eq!(events[0].sequence_number, 2);
        assert_eq!(events[0].causation_id, command.correlation_id);
        assert_eq!(events, &result.stored_events);
    }

    #[tokio::test]
    async fn test_handle_join_game_propagates_infrastructure_errors() {
        // Arrange
        let command = JoinGame {
            correlation_id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            player_name: "bob".to_owned(),
        };

        // Act
        let result = handle_join_game(
            &command,
            &fixed_clock(),
            &SequentialIdGenerator::new(),
            &TransitionPolicy::default(),
            &FailingEventRepository,
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_handle_start_game_deals_and_opens_first_attempt_in_one_append() {
        // Arrange
        let table = Table::seated().await;
        let rng: Mutex<SequenceRng> = Mutex::new(SequenceRng::new(vec![4, 3, 2, 1, 3]));
        let rng_ref: &Mutex<dyn DeterministicRng + Send> = &rng;
        let command = StartGame {
            correlation_id: Uuid::new_v4(),
            game_id: table.game_id,
            player_id: table.players[0],
            role_list: vec![
                Role::Merlin,
                Role::Percival,
                Role::LoyalServant,
                Role::Morgana,
                Role::Assassin,
            ],
            player_order: NAMES.iter().map(|s| (*s).to_owned()).collect(),
        };

        // Act
        let result = handle_start_game(
            &command,
            &table.clock,
            rng_ref,
            &table.ids,
            &table.policy,
            table.repo.as_ref(),
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(
            event_types(&result.stored_events),
            vec!["game.started", "game.quest_attempt_opened"]
        );
        let game = table.game().await;
        assert_eq!(game.players()[4].role, Some(Role::Assassin));
        let quest = game.current_quest().unwrap();
        assert_eq!(quest.leader, "dan");
        assert_eq!(quest.size, 2);
    }

    #[tokio::test]
    async fn test_handle_start_game_rejects_unknown_game() {
        // Arrange
        let rng: Mutex<SequenceRng> = Mutex::new(SequenceRng::new(vec![]));
        let rng_ref: &Mutex<dyn DeterministicRng + Send> = &rng;
        let command = StartGame {
            correlation_id: Uuid::new_v4(),
            game_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            role_list: vec![Role::LoyalServant; 5],
            player_order: NAMES.iter().map(|s| (*s).to_owned()).collect(),
        };

        // Act
        let result = handle_start_game(
            &command,
            &fixed_clock(),
            rng_ref,
            &SequentialIdGenerator::new(),
            &TransitionPolicy::default(),
            &EmptyEventRepository,
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }

    #[tokio::test]
    async fn test_precondition_failure_is_not_retried() {
        // Arrange
        let table = Table::started().await;
        let events = table.repo.load_events(table.game_id).await.unwrap();
        let repo = ConflictingEventRepository::new(events, 0);
        let quest_id = table.current_quest_id().await;
        let command = VoteOnProposal {
            correlation_id: Uuid::new_v4(),
            game_id: table.game_id,
            quest_id,
            player_id: table.players[1],
            vote: ProposalVote::Approve,
        };

        // Act
        let result = handle_vote_on_proposal(
            &command,
            &table.clock,
            &table.ids,
            &table.policy,
            &repo,
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
        assert_eq!(repo.append_attempts(), 0);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_then_succeed() {
        // Arrange
        let table = Table::seated().await;
        let events = table.repo.load_events(table.game_id).await.unwrap();
        let repo = ConflictingEventRepository::new(events, 3);
        let command = JoinGame {
            correlation_id: Uuid::new_v4(),
            game_id: table.game_id,
            player_name: "fay".to_owned(),
        };

        // Act
        let result = handle_join_game(&command, &table.clock, &table.ids, &table.policy, &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(repo.append_attempts(), 4);
        let appended = repo.appended_events();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].1, 5);
        assert_eq!(appended[0].2, result.stored_events);
    }

    #[tokio::test]
    async fn test_conflicts_beyond_the_bound_surface_as_conflict() {
        // Arrange
        let table = Table::seated().await;
        let events = table.repo.load_events(table.game_id).await.unwrap();
        let repo = ConflictingEventRepository::new(events, 10);
        let policy = TransitionPolicy { max_attempts: 3 };
        let command = JoinGame {
            correlation_id: Uuid::new_v4(),
            game_id: table.game_id,
            player_name: "fay".to_owned(),
        };

        // Act
        let result = handle_join_game(&command, &table.clock, &table.ids, &policy, &repo).await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
        assert_eq!(repo.append_attempts(), 3);
        assert!(repo.appended_events().is_empty());
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_retries() {
        // Arrange
        let table = Table::seated().await;
        let events = table.repo.load_events(table.game_id).await.unwrap();
        let repo = ConflictingEventRepository::new(events, 1);
        let policy = TransitionPolicy { max_attempts: 1 };
        let command = JoinGame {
            correlation_id: Uuid::new_v4(),
            game_id: table.game_id,
            player_name: "fay".to_owned(),
        };

        // Act
        let result = handle_join_game(&command, &table.clock, &table.ids, &policy, &repo).await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { .. })
        ));
        assert_eq!(repo.append_attempts(), 1);
        assert!(repo.appended_events().is_empty());
    }

    #[tokio::test]
    async fn test_full_game_good_wins_after_three_quests() {
        // Arrange
        let table = Table::started().await;
        let teams: [&[&str]; 3] = [&["ann", "bob"], &["ann", "bob", "cat"], &["bob", "cat"]];

        // Act
        let mut last = None;
        for team in teams {
            table.propose(team).await.unwrap();
            let quest_id = table.current_quest_id().await;
            for seat in 0..5 {
                table.vote(quest_id, seat, ProposalVote::Approve).await.unwrap();
            }
            for name in team {
                let seat = NAMES.iter().position(|n| n == name).unwrap();
                last = Some(table.play(quest_id, seat, QuestVote::Success).await.unwrap());
            }
        }

        // Assert
        let last = last.unwrap();
        assert_eq!(
            event_types(&last.stored_events),
            vec!["game.quest_vote_cast", "game.concluded"]
        );
        let game = table.game().await;
        assert_eq!(
            game.conclusion(),
            Some((Faction::Good, ConclusionReason::QuestsSucceeded))
        );
        assert_eq!(game.quests().len(), 3);
    }

    #[tokio::test]
    async fn test_five_rejections_in_a_round_is_an_evil_win() {
        // Arrange
        let table = Table::started().await;

        // Act
        for _ in 0..5 {
            table.propose(&["ann", "bob"]).await.unwrap();
            let quest_id = table.current_quest_id().await;
            for seat in 0..5 {
                table.vote(quest_id, seat, ProposalVote::Reject).await.unwrap();
            }
        }

        // Assert
        let game = table.game().await;
        assert_eq!(game.quests().len(), 5);
        let leaders: Vec<&str> = game.quests().iter().map(|q| q.leader.as_str()).collect();
        assert_eq!(leaders, NAMES.to_vec());
        assert_eq!(
            game.conclusion(),
            Some((Faction::Evil, ConclusionReason::ProposalsRejected))
        );
        let result = table.propose(&["ann", "bob"]).await;
        assert!(matches!(result, Err(DomainError::PreconditionFailed(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_votes_record_exactly_one() {
        // Arrange
        let table = Arc::new(Table::started().await);
        table.propose(&["ann", "bob"]).await.unwrap();
        let quest_id = table.current_quest_id().await;

        // Act
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                tokio::spawn(async move { table.vote(quest_id, 2, ProposalVote::Approve).await })
            })
            .collect();
        let mut accepted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DomainError::PreconditionFailed(_)) => refused += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        // Assert
        assert_eq!(accepted, 1);
        assert_eq!(refused, 7);
        let game = table.game().await;
        let quest = game.current_quest().unwrap();
        assert_eq!(quest.proposal_votes.len(), 1);
        assert_eq!(quest.remaining_proposal_votes, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_from_everyone_close_the_proposal_once() {
        // Arrange
        let table = Arc::new(Table::started().await);
        table.propose(&["ann", "bob"]).await.unwrap();
        let quest_id = table.current_quest_id().await;

        // Act
        let handles: Vec<_> = (0..5)
            .map(|seat| {
                let table = Arc::clone(&table);
                tokio::spawn(async move { table.vote(quest_id, seat, ProposalVote::Reject).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Assert
        let game = table.game().await;
        assert_eq!(game.quests().len(), 2);
        assert_eq!(game.quests()[0].remaining_proposal_votes, 0);
        assert_eq!(game.quests()[0].proposal_vote_tally, -5);
        let opened = table
            .repo
            .load_events(table.game_id)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.event_type == "game.quest_attempt_opened")
            .count();
        assert_eq!(opened, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_last_quest_cards_open_the_next_round_once() {
        // Arrange
        let table = Arc::new(Table::started().await);
        let team = ["ann", "bob"];
        let quest_id = approve_team(&table, &team).await;

        // Act
        let (accepted, refused) = race_quest_votes(&table, quest_id, &team, 4).await;

        // Assert
        assert_eq!(accepted, 2);
        assert_eq!(refused, 6);
        assert_eq!(count_events(&table, "game.quest_vote_cast").await, 2);
        assert_eq!(count_events(&table, "game.quest_attempt_opened").await, 2);
        assert_eq!(count_events(&table, "game.concluded").await, 0);
        let game = table.game().await;
        assert_eq!(game.quests().len(), 2);
        assert_eq!(game.quests()[0].remaining_quest_votes, 0);
        assert_eq!(game.current_quest().unwrap().round_number, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deciding_quest_cards_conclude_the_game_once() {
        // Arrange
        let table = Arc::new(Table::started().await);
        let teams: [&[&str]; 2] = [&["ann", "bob"], &["ann", "bob", "cat"]];
        for team in teams {
            let quest_id = approve_team(&table, team).await;
            for name in team {
                let seat = NAMES.iter().position(|n| n == name).unwrap();
                table.play(quest_id, seat, QuestVote::Success).await.unwrap();
            }
        }
        let team = ["bob", "cat"];
        let quest_id = approve_team(&table, &team).await;

        // Act
        let (accepted, refused) = race_quest_votes(&table, quest_id, &team, 4).await;

        // Assert
        assert_eq!(accepted, 2);
        assert_eq!(refused, 6);
        assert_eq!(count_events(&table, "game.quest_vote_cast").await, 7);
        assert_eq!(count_events(&table, "game.concluded").await, 1);
        assert_eq!(count_events(&table, "game.quest_attempt_opened").await, 3);
        let game = table.game().await;
        assert_eq!(
            game.conclusion(),
            Some((Faction::Good, ConclusionReason::QuestsSucceeded))
        );
    }
}
