//! Quest size table: how many players go on each of the five quests.

/// Fewest players a game can start with.
pub const MIN_PLAYERS: usize = 5;

/// Most players a game can hold.
pub const MAX_PLAYERS: usize = 10;

/// Quests (rounds) per game.
pub const ROUNDS: u32 = 5;

/// Proposals allowed per round before evil wins outright.
pub const MAX_ATTEMPTS_PER_ROUND: u32 = 5;

/// Successful or failed quests needed to decide the game.
pub const QUESTS_TO_WIN: usize = 3;

/// Rows for 5 through 10 players.
const QUEST_SIZES: [[u32; ROUNDS as usize]; MAX_PLAYERS - MIN_PLAYERS + 1] = [
    [2, 3, 2, 3, 3],
    [2, 3, 4, 3, 4],
    [2, 3, 3, 4, 4],
    [3, 4, 4, 5, 5],
    [3, 4, 4, 5, 5],
    [3, 4, 4, 5, 5],
];

/// Whether a game can be played with `player_count` players.
#[must_use]
pub fn is_supported_player_count(player_count: usize) -> bool {
    (MIN_PLAYERS..=MAX_PLAYERS).contains(&player_count)
}

/// The five quest sizes for `player_count`, or `None` if unsupported.
#[must_use]
pub fn quest_sizes(player_count: usize) -> Option<[u32; ROUNDS as usize]> {
    if !is_supported_player_count(player_count) {
        return None;
    }
    QUEST_SIZES.get(player_count - MIN_PLAYERS).copied()
}

/// Size of quest `round_number` (1-based) for `player_count`.
#[must_use]
pub fn quest_size(player_count: usize, round_number: u32) -> Option<u32> {
    let index = usize::try_from(round_number.checked_sub(1)?).ok()?;
    quest_sizes(player_count)?.get(index).copied()
}
