//! Ludo multiplayer game server.
//!
//! The [`orchestrator`] turns roll and move requests into new canonical
//! board states, one action at a time per room. Around it sit the room
//! [`store`], the [`lobby`] that seats players and starts games, the
//! [`broadcast`] hub that fans state out to subscribers, and the WebSocket
//! [`server`] that routes client messages in.

pub mod broadcast;
pub mod config;
pub mod lobby;
pub mod orchestrator;
pub mod protocol;
pub mod server;
pub mod store;

pub use broadcast::{Broadcaster, ConnectionHub};
pub use config::{ConfigError, ServerConfig};
pub use lobby::{Lobby, LobbyError};
pub use orchestrator::{GameOrchestrator, OrchestratorConfig, OrchestratorError, HISTORY_LIMIT};
pub use protocol::{EventType, GameEventEnvelope, GameStateView};
pub use store::{MemoryStore, SessionStore, StoreError, StoredGame};
