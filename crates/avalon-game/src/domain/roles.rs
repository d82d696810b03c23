//! Role knowledge table.
//!
//! Role metadata is declared as data: each row names a role, its faction and
//! the roles it is shown at the start of the game. Adding a role means adding
//! a row, not a branch.

use serde::{Deserialize, Serialize};

/// The two sides of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    /// Loyal servants of Arthur.
    Good,
    /// Minions of Mordred.
    Evil,
}

/// A secret character dealt to a player when the game starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Merlin,
    Percival,
    LoyalServant,
    Morgana,
    Mordred,
    Oberon,
    Assassin,
    Minion,
}

struct RoleRow {
    role: Role,
    faction: Faction,
    sees: &'static [Role],
}

const ROLE_TABLE: [RoleRow; 8] = [
    RoleRow {
        role: Role::Merlin,
        faction: Faction::Good,
        sees: &[Role::Morgana, Role::Assassin, Role::Minion],
    },
    RoleRow {
        role: Role::Percival,
        faction: Faction::Good,
        sees: &[Role::Merlin, Role::Morgana],
    },
    RoleRow {
        role: Role::LoyalServant,
        faction: Faction::Good,
        sees: &[],
    },
    RoleRow {
        role: Role::Morgana,
        faction: Faction::Evil,
        sees: &[Role::Mordred, Role::Assassin, Role::Minion],
    },
    RoleRow {
        role: Role::Mordred,
        faction: Faction::Evil,
        sees: &[Role::Morgana, Role::Assassin, Role::Minion],
    },
    RoleRow {
        role: Role::Oberon,
        faction: Faction::Evil,
        sees: &[],
    },
    RoleRow {
        role: Role::Assassin,
        faction: Faction::Evil,
        sees: &[Role::Morgana, Role::Mordred, Role::Minion],
    },
    RoleRow {
        role: Role::Minion,
        faction: Faction::Evil,
        sees: &[Role::Morgana, Role::Mordred, Role::Assassin, Role::Minion],
    },
];

impl Role {
    /// Every role, in table order.
    pub const ALL: [Role; 8] = [
        Role::Merlin,
        Role::Percival,
        Role::LoyalServant,
        Role::Morgana,
        Role::Mordred,
        Role::Oberon,
        Role::Assassin,
        Role::Minion,
    ];

    fn row(self) -> &'static RoleRow {
        // The table holds one row per variant, in declaration order.
        &ROLE_TABLE[self as usize]
    }

    /// The faction this role plays for.
    #[must_use]
    pub fn faction(self) -> Faction {
        self.row().faction
    }

    /// Whether this role belongs to the evil faction (and may fail quests).
    #[must_use]
    pub fn is_evil(self) -> bool {
        self.faction() == Faction::Evil
    }

    /// Roles whose holders this role is shown.
    #[must_use]
    pub fn visible_roles(self) -> &'static [Role] {
        self.row().sees
    }

    /// Whether a holder of this role is shown holders of `other`.
    #[must_use]
    pub fn can_see(self, other: Role) -> bool {
        self.visible_roles().contains(&other)
    }
}
