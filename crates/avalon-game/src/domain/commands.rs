//! Commands for the game context.
//!
//! Each command checks its own input in [`Command::validate`] before any
//! store access; checks that depend on the game's state live on the
//! aggregate.

use std::collections::HashSet;

use avalon_core::command::Command;
use avalon_core::error::DomainError;
use uuid::Uuid;

use super::events::{ProposalVote, QuestVote};
use super::quest_sizes::{MAX_PLAYERS, MIN_PLAYERS, is_supported_player_count};
use super::roles::Role;

/// Longest accepted player name, in characters.
pub const MAX_NAME_LEN: usize = 32;

fn validate_name(name: &str) -> Result<(), DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(
            "player name must not be empty".to_owned(),
        ));
    }
    if trimmed != name {
        return Err(DomainError::Validation(
            "player name must not start or end with whitespace".to_owned(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "player name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}

/// Command to create a new game with its first player.
#[derive(Debug, Clone)]
pub struct CreateGame {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Name of the creating player.
    pub player_name: String,
}

impl Command for CreateGame {
    fn command_type(&self) -> &'static str {
        "game.create_game"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn validate(&self) -> Result<(), DomainError> {
        validate_name(&self.player_name)
    }
}

/// Command to join a game that has not started.
#[derive(Debug, Clone)]
pub struct JoinGame {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The game to join.
    pub game_id: Uuid,
    /// Name of the joining player.
    pub player_name: String,
}

impl Command for JoinGame {
    fn command_type(&self) -> &'static str {
        "game.join_game"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn validate(&self) -> Result<(), DomainError> {
        validate_name(&self.player_name)
    }
}

/// Command to deal roles and open the first quest.
#[derive(Debug, Clone)]
pub struct StartGame {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The game to start.
    pub game_id: Uuid,
    /// Capability token of the caller, who must be the creator.
    pub player_id: Uuid,
    /// The multiset of roles to deal.
    pub role_list: Vec<Role>,
    /// Every player's name, in seating order.
    pub player_order: Vec<String>,
}

impl Command for StartGame {
    fn command_type(&self) -> &'static str {
        "game.start_game"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.role_list.len() != self.player_order.len() {
            return Err(DomainError::Validation(format!(
                "role list has {} entries but player order has {}",
                self.role_list.len(),
                self.player_order.len()
            )));
        }
        if !is_supported_player_count(self.player_order.len()) {
            return Err(DomainError::Validation(format!(
                "games need between {MIN_PLAYERS} and {MAX_PLAYERS} players, got {}",
                self.player_order.len()
            )));
        }
        if let Some(name) = first_duplicate(&self.player_order) {
            return Err(DomainError::Validation(format!(
                "player {name} appears more than once in the player order"
            )));
        }
        Ok(())
    }
}

/// Command for the leader to name a quest team.
#[derive(Debug, Clone)]
pub struct ProposeQuest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The game.
    pub game_id: Uuid,
    /// The attempt being proposed; must be current.
    pub quest_id: Uuid,
    /// Capability token of the caller, who must lead the attempt.
    pub player_id: Uuid,
    /// Proposed team member names.
    pub members: Vec<String>,
}

impl Command for ProposeQuest {
    fn command_type(&self) -> &'static str {
        "game.propose_quest"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.members.is_empty() {
            return Err(DomainError::Validation(
                "a proposal needs at least one member".to_owned(),
            ));
        }
        if let Some(name) = first_duplicate(&self.members) {
            return Err(DomainError::Validation(format!(
                "player {name} is proposed more than once"
            )));
        }
        Ok(())
    }
}

/// Command to approve or reject the current proposal.
#[derive(Debug, Clone)]
pub struct VoteOnProposal {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The game.
    pub game_id: Uuid,
    /// The attempt voted on; must be current.
    pub quest_id: Uuid,
    /// Capability token of the voter.
    pub player_id: Uuid,
    /// The vote.
    pub vote: ProposalVote,
}

impl Command for VoteOnProposal {
    fn command_type(&self) -> &'static str {
        "game.vote_on_proposal"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command for a team member to play a quest card.
#[derive(Debug, Clone)]
pub struct VoteInQuest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The game.
    pub game_id: Uuid,
    /// The attempt voted in; must be current.
    pub quest_id: Uuid,
    /// Capability token of the voter.
    pub player_id: Uuid,
    /// The card played.
    pub vote: QuestVote,
}

impl Command for VoteInQuest {
    fn command_type(&self) -> &'static str {
        "game.vote_in_quest"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
