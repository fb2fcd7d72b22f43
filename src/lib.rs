//! CyberBlades dashboard library
//!
//! This library provides the core components of the CyberBlades dashboard:
//!
//! - `historian` - persistent client for the historian's Unix socket
//! - `jsondom` - document tree for the historian's JSON messages
//! - `events` - events delivered to the dashboard and the handler trait
//! - `models` - dashboard data interpreted from historian documents
//!
//! # Historian Module
//!
//! ```ignore
//! use cyberblades_ui::historian::{default_socket_path, Historian};
//! use cyberblades_ui::events::UiEvent;
//!
//! let (tx, rx) = std::sync::mpsc::channel::<UiEvent>();
//! let historian = Historian::connect(default_socket_path(), tx)?;
//! for event in rx {
//!     println!("{:?}", event);
//! }
//! ```

pub mod events;
pub mod historian;
pub mod jsondom;
pub mod models;
