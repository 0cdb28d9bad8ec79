//! Wire protocol layer for the inchain peer-to-peer network.
//!
//! inchain is a Bitcoin-derived chain and speaks the Bitcoin-family message
//! format: every frame starts with a 4-byte network magic, a 12-byte
//! NUL-padded command, a length, and a double-SHA-256 checksum over the
//! payload. This crate implements:
//!
//! - The envelope framer ([`wire::MessageSerializer`]) that locates, checks
//!   and dispatches frames from a byte stream.
//! - The typed message family ([`wire::Message`]) and the shared parse /
//!   serialize contract ([`wire::WireMessage`]) each concrete kind obeys.
//! - [`wire::PeerAddress`], the 30-byte address record carried by `addr`
//!   traffic, with the Bitcoin-family IPv4-in-IPv6 mapping.
//! - Network parameters ([`wire::NetworkParams`]) for mainnet and testnet.
//! - The key/value storage contract ([`db::Db`]) the node persists through.
//!
//! Message instances are not safe for concurrent use; isolate them per task.
//! Only [`db::Db`] implementations promise thread safety.

pub mod db;
pub mod error;
pub mod session;
pub mod utils;
pub mod wire;
