//! Client for the Beat Saber historian's local status socket.
//!
//! The historian pushes status and event messages to every connected client
//! and answers commands. This module keeps one persistent connection open,
//! reconnecting whenever it drops, and exposes the messages through an
//! [`EventHandler`](crate::events::EventHandler).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐         Unix Socket          ┌─────────────────────┐
//! │  Dashboard      │  ◄──────────────────────────►│     historian       │
//! │  (Historian)    │   newline-delimited JSON     │     (Python)        │
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Every message is one JSON object on one line. Inbound messages carry a
//! `msgtype`: `"response"` and `"error"` answer the command in flight,
//! anything else is an event.
//!
//! ```text
//! → {"cmd":"playerinfo","player":"joe"}
//! ← {"msgtype":"status","status":{"connection":{"connected_to_beatsaber":true}}}
//! ← {"msgtype":"response","success":true,"data":{...}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use cyberblades_ui::historian::{default_socket_path, Historian};
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! let historian = Historian::connect(default_socket_path(), tx)?;
//! let status = historian.send_command("status", "")?;
//! ```

mod client;
mod framing;

pub use client::{
    default_socket_path, Historian, HistorianConfig, HistorianError, HistorianState, MessageKind,
};
pub use framing::{format_command, param, FramingError, LineReader, MAX_LINE_LENGTH};
