use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::player::Player;

/// Registry of the players a node owns, keyed by guild.
#[derive(Default)]
pub(crate) struct PlayerManager {
    players: DashMap<u64, Player>
}

impl PlayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild: u64) -> Option<Player> {
        self.players.get(&guild).map(|p| p.value().clone())
    }

    /// Returns the existing player of `guild`, or registers the one built by
    /// `create`. The flag is `true` when a new player was registered.
    pub fn get_or_insert_with(&self, guild: u64, create: impl FnOnce() -> Player) -> (Player, bool) {
        match self.players.entry(guild) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(create()).value().clone(), true)
        }
    }

    pub fn remove(&self, guild: u64) -> Option<Player> {
        self.players.remove(&guild).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }
}
