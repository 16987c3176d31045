// Library surface for the game engine; main.rs drives it headlessly.
// Rendering is a pure external concern: consumers subscribe to session
// events and issue commands, nothing here touches a terminal.
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod identity;
pub mod level;
pub mod matcher;
pub mod reconcile;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod stats;
pub mod store;
pub mod target;

pub use error::GameError;
pub use session::{GameSession, SessionPhase};
