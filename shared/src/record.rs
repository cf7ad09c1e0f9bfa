//! The server description exchanged with the directory.

use serde::{Deserialize, Serialize};

fn unset() -> i32 {
    -1
}

/// A game server as advertised to the directory.
///
/// `port` stays textual to match what the directory stores. `ping` is filled
/// in locally by a probe and never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    #[serde(default)]
    pub game_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub map: String,
    #[serde(default = "unset")]
    pub max_players: i32,
    #[serde(default = "unset")]
    pub current_players: i32,
    #[serde(skip, default = "unset")]
    pub ping: i32,
}

impl Default for ServerRecord {
    fn default() -> Self {
        Self {
            game_id: 0,
            name: String::new(),
            ip: String::new(),
            port: String::new(),
            game_mode: String::new(),
            map: String::new(),
            max_players: unset(),
            current_players: unset(),
            ping: unset(),
        }
    }
}

/// Fields sent when registering; the directory takes the address from the
/// connection instead of trusting an `ip` field.
#[derive(Debug, Serialize)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub port: &'a str,
    pub game_mode: &'a str,
    pub map: &'a str,
    pub max_players: i32,
    pub current_players: i32,
    pub game_id: i64,
}

impl ServerRecord {
    /// A record is empty when it lacks either a name or a port.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.port.is_empty()
    }

    pub fn clear(&mut self) {
        *self = ServerRecord::default();
    }

    pub fn registration(&self) -> Registration<'_> {
        Registration {
            name: &self.name,
            port: &self.port,
            game_mode: &self.game_mode,
            map: &self.map,
            max_players: self.max_players,
            current_players: self.current_players,
            game_id: self.game_id,
        }
    }

    /// Free slots, never negative. Unknown counts yield zero.
    pub fn open_slots(&self) -> u32 {
        if self.max_players < 0 || self.current_players < 0 {
            return 0;
        }
        (self.max_players - self.current_players).max(0) as u32
    }
}
