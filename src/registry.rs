use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::cards::CatalogEntry;
use crate::config::GameConfig;
use crate::engine::Game;
use crate::error::{GameError, GameResult};
use crate::participants::{FakePlayer, MatchId};
use crate::types::{LobbyMemberView, LobbyView};

pub type ConnectionId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LobbyMember {
    pub name: String,
    pub ready: bool,
    pub connected: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Created,
    Joined,
    Rejoined,
}

/// How long an idle match may live before it is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupTtl {
    pub lobby: Duration,
    pub multiplayer: Duration,
    pub solo: Duration,
}

#[derive(Debug)]
struct MatchEntry {
    members: Vec<LobbyMember>,
    host: Option<String>,
    game: Option<Game>,
    generation: u64,
}

impl MatchEntry {
    fn member_mut(&mut self, name: &str) -> Option<&mut LobbyMember> {
        self.members.iter_mut().find(|member| member.name == name)
    }

    fn ensure_host(&mut self) {
        let host_connected = self
            .host
            .as_ref()
            .and_then(|host| self.members.iter().find(|member| &member.name == host))
            .map(|member| member.connected)
            .unwrap_or(false);
        if !host_connected {
            self.host = self
                .members
                .iter()
                .find(|member| member.connected)
                .map(|member| member.name.clone());
        }
    }

    fn can_start(&self) -> bool {
        let connected: Vec<&LobbyMember> = self
            .members
            .iter()
            .filter(|member| member.connected)
            .collect();
        match connected.len() {
            0 => false,
            1 => true,
            _ => connected.iter().all(|member| member.ready),
        }
    }
}

/// Every match this process hosts, in lobby or running.
#[derive(Debug)]
pub struct MatchRegistry {
    matches: HashMap<MatchId, MatchEntry>,
    ttl: CleanupTtl,
}

impl MatchRegistry {
    pub fn new(ttl: CleanupTtl) -> Self {
        Self {
            matches: HashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn contains(&self, match_id: &MatchId) -> bool {
        self.matches.contains_key(match_id)
    }

    /// Adds `name` to the lobby, creating it on first join. A running match
    /// only takes back players it already has.
    pub fn join(&mut self, match_id: &MatchId, name: &str) -> GameResult<JoinOutcome> {
        let Some(entry) = self.matches.get_mut(match_id) else {
            self.matches.insert(
                match_id.clone(),
                MatchEntry {
                    members: vec![LobbyMember {
                        name: name.to_string(),
                        ready: false,
                        connected: true,
                    }],
                    host: Some(name.to_string()),
                    game: None,
                    generation: 0,
                },
            );
            info!(match_id = %match_id, player = %name, "lobby created");
            return Ok(JoinOutcome::Created);
        };
        entry.generation += 1;

        if let Some(member) = entry.member_mut(name) {
            member.connected = true;
            entry.ensure_host();
            return Ok(JoinOutcome::Rejoined);
        }
        if entry.game.is_some() {
            return Err(GameError::invariant("match already running; reconnection only"));
        }
        entry.members.push(LobbyMember {
            name: name.to_string(),
            ready: false,
            connected: true,
        });
        entry.ensure_host();
        Ok(JoinOutcome::Joined)
    }

    pub fn set_ready(&mut self, match_id: &MatchId, name: &str, ready: bool) -> GameResult<()> {
        let entry = self.entry_mut(match_id)?;
        if entry.game.is_some() {
            return Err(GameError::invariant("match already running"));
        }
        let Some(member) = entry.member_mut(name) else {
            return Err(GameError::reference(format!("{name} is not in this lobby")));
        };
        member.ready = ready;
        Ok(())
    }

    /// Turns the lobby into a running match. Only the host may start, and
    /// every connected member must be ready unless the host is alone.
    pub fn start_game(
        &mut self,
        match_id: &MatchId,
        requested_by: &str,
        config: GameConfig,
        catalog: &[CatalogEntry],
        bots: Vec<FakePlayer>,
        seed: u32,
    ) -> GameResult<&Game> {
        let entry = self.entry_mut(match_id)?;
        if entry.game.is_some() {
            return Err(GameError::invariant("match already running"));
        }
        entry.ensure_host();
        if entry.host.as_deref() != Some(requested_by) {
            return Err(GameError::invariant("only the host can start"));
        }
        if !entry.can_start() {
            return Err(GameError::invariant("every player must be ready"));
        }

        // Disconnected members are dropped, not seated.
        entry.members.retain(|member| member.connected);
        let names: Vec<String> = entry
            .members
            .iter()
            .map(|member| member.name.clone())
            .collect();
        let game = Game::new(match_id.clone(), names, bots, catalog, config, seed)?;
        entry.generation += 1;
        Ok(entry.game.insert(game))
    }

    /// Marks `name` as gone. Lobby members are removed outright; seated
    /// players stay in the match so they can reconnect.
    pub fn mark_disconnected(&mut self, match_id: &MatchId, name: &str) {
        let Some(entry) = self.matches.get_mut(match_id) else {
            return;
        };
        if entry.game.is_some() {
            if let Some(member) = entry.member_mut(name) {
                member.connected = false;
            }
        } else {
            entry.members.retain(|member| member.name != name);
        }
        entry.ensure_host();
    }

    pub fn connected_count(&self, match_id: &MatchId) -> usize {
        self.matches
            .get(match_id)
            .map(|entry| entry.members.iter().filter(|member| member.connected).count())
            .unwrap_or(0)
    }

    pub fn game(&self, match_id: &MatchId) -> Option<&Game> {
        self.matches.get(match_id)?.game.as_ref()
    }

    pub fn game_mut(&mut self, match_id: &MatchId) -> Option<&mut Game> {
        self.matches.get_mut(match_id)?.game.as_mut()
    }

    pub fn remove(&mut self, match_id: &MatchId) -> bool {
        self.matches.remove(match_id).is_some()
    }

    pub fn lobby_view(&self, match_id: &MatchId) -> Option<LobbyView> {
        let entry = self.matches.get(match_id)?;
        Some(LobbyView {
            match_id: match_id.to_string(),
            host: entry.host.clone(),
            members: entry
                .members
                .iter()
                .map(|member| LobbyMemberView {
                    name: member.name.clone(),
                    ready: member.ready,
                    connected: member.connected,
                    is_host: entry.host.as_deref() == Some(member.name.as_str()),
                })
                .collect(),
            can_start: entry.game.is_none() && entry.can_start(),
            running: entry.game.is_some(),
        })
    }

    /// Any activity invalidates pending cleanup tokens.
    pub fn touch(&mut self, match_id: &MatchId) {
        if let Some(entry) = self.matches.get_mut(match_id) {
            entry.generation += 1;
        }
    }

    /// Token and delay for an idle-cleanup timer. The timer must hand the
    /// token back to `expire_if_current`.
    pub fn schedule_cleanup(&mut self, match_id: &MatchId) -> Option<(u64, Duration)> {
        let entry = self.matches.get_mut(match_id)?;
        entry.generation += 1;
        let ttl = match &entry.game {
            None => self.ttl.lobby,
            Some(game) if game.players().len() <= 1 => self.ttl.solo,
            Some(_) => self.ttl.multiplayer,
        };
        debug!(
            match_id = %match_id,
            token = entry.generation,
            ttl_secs = ttl.as_secs(),
            "cleanup scheduled"
        );
        Some((entry.generation, ttl))
    }

    pub fn expire_if_current(&mut self, match_id: &MatchId, token: u64) -> bool {
        let current = self
            .matches
            .get(match_id)
            .map(|entry| entry.generation == token)
            .unwrap_or(false);
        if current {
            self.matches.remove(match_id);
            info!(match_id = %match_id, "idle match expired");
        }
        current
    }

    fn entry_mut(&mut self, match_id: &MatchId) -> GameResult<&mut MatchEntry> {
        self.matches
            .get_mut(match_id)
            .ok_or_else(|| GameError::reference(format!("no match {match_id}")))
    }
}

/// Which socket currently speaks for each seated player.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_player: HashMap<(MatchId, String), ConnectionId>,
    by_connection: HashMap<ConnectionId, (MatchId, String)>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `connection` to the player and returns the connection it
    /// superseded, if any.
    pub fn bind(
        &mut self,
        match_id: &MatchId,
        name: &str,
        connection: ConnectionId,
    ) -> Option<ConnectionId> {
        if let Some(previous) = self.by_connection.remove(&connection) {
            if self.by_player.get(&previous) == Some(&connection) {
                self.by_player.remove(&previous);
            }
        }
        let key = (match_id.clone(), name.to_string());
        let superseded = self
            .by_player
            .insert(key.clone(), connection)
            .filter(|old| *old != connection);
        if let Some(old) = superseded {
            self.by_connection.remove(&old);
        }
        self.by_connection.insert(connection, key);
        superseded
    }

    /// Forgets `connection` and returns who it was bound to, but only when
    /// it is still the current connection for that player.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<(MatchId, String)> {
        let key = self.by_connection.remove(&connection)?;
        if self.by_player.get(&key) != Some(&connection) {
            return None;
        }
        self.by_player.remove(&key);
        Some(key)
    }

    pub fn binding(&self, connection: ConnectionId) -> Option<&(MatchId, String)> {
        self.by_connection.get(&connection)
    }

    pub fn connection_for(&self, match_id: &MatchId, name: &str) -> Option<ConnectionId> {
        self.by_player
            .get(&(match_id.clone(), name.to_string()))
            .copied()
    }

    pub fn players_in(&self, match_id: &MatchId) -> Vec<(String, ConnectionId)> {
        let mut players: Vec<(String, ConnectionId)> = self
            .by_player
            .iter()
            .filter(|((bound_match, _), _)| bound_match == match_id)
            .map(|((_, name), connection)| (name.clone(), *connection))
            .collect();
        players.sort();
        players
    }

    pub fn forget_match(&mut self, match_id: &MatchId) {
        self.by_player.retain(|(bound_match, _), _| bound_match != match_id);
        self.by_connection
            .retain(|_, (bound_match, _)| bound_match != match_id);
    }
}
