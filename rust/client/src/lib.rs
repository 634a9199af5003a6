//! Chainjack client: keeps a local blackjack view in sync with a remote,
//! asynchronously-confirmed ledger.
//!
//! Actions are validated locally, projected optimistically, and submitted
//! through a [`ledger::LedgerConnector`]; ledger events and a periodic
//! authoritative poll reconcile the view, and the ledger always wins.
//!
//! # Core Modules
//!
//! - [`view`] - The reconciled [`view::GameView`] and phase derivation
//! - [`store`] - Atomic view cell shared by all components
//! - [`orchestrator`] - Action validation, optimistic updates, rollback
//! - [`reconcile`] - Event folding and the polling fallback
//! - [`ledger`] - Connector trait, submissions, events
//! - [`client`] - The [`client::GameClient`] session facade
//! - [`mock`] - Deterministic in-process ledger for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chainjack_client::client::GameClient;
//! use chainjack_client::config::ClientConfig;
//! use chainjack_client::mock::MockLedger;
//! use chainjack_engine::amount::DEFAULT_MIN_BET;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(MockLedger::new("alice", 42));
//! let client = GameClient::connect(ledger, "alice", ClientConfig::default()).await?;
//! client.start(DEFAULT_MIN_BET).await?;
//! let view = client.view();
//! println!("phase: {:?}", view.phase);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod mock;
pub mod orchestrator;
pub mod reconcile;
pub mod store;
pub mod view;

pub use client::{ClientError, GameClient};
pub use config::ClientConfig;
pub use ledger::{BetLimits, LedgerConnector, LedgerError, LedgerEvent};
pub use orchestrator::ActionError;
pub use store::GameStore;
pub use view::{ActionKind, ErrorKind, Game, GameView, Phase, PlayerStats, RoundResult};
