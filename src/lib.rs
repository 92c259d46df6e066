//! # Market Mayhem
//!
//! Exchange engine for a multiplayer trading game. An admin creates a game, players join its
//! lobby, and once the game starts a synthetic market advances on a fixed wall-clock cadence while
//! players submit orders that push the price around.
//!
//! # Implementation
//!
//! A running game is composed of:
//! - A market, [Gaussian](crate::market::gaussian::Gaussian) is an example. Markets turn the
//! order flow of one epoch into a log-return and keep the per-epoch history. They contain no
//! synchronization of their own.
//! - An [Exchange](crate::exchange::Exchange) which owns the market and every player account
//! behind one lock. Trades always target the next epoch and are counted by the next market
//! update.
//! - A [GameEngine](crate::engine::GameEngine) which drives the exchange from a tokio task, one
//! epoch per timestep, until the market runs out of epochs or the game is stopped.
//!
//! Games are created and started through [Sessions](crate::session::Sessions), which the JSON
//! server in [http] exposes. Simulators are looked up by name in a
//! [SimulatorCatalog](crate::market::catalog::SimulatorCatalog).
//!
//! ```text
//! ADMIN_KEY=secret cargo run --bin mayhem_server [ipv4_address] [port]
//! ```
pub mod clock;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod http;
pub mod market;
pub mod scoreboard;
pub mod session;
