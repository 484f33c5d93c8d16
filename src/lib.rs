//! A PostgreSQL v3 wire-protocol client core.
//!
//! Covers the frame codec, the startup/authentication handshake, and a background
//! receiver that demultiplexes server messages onto an outbound queue. The
//! high-level query dispatcher, prepared-statement cache, and TLS negotiation are
//! external collaborators this crate does not implement.
//!
//! # Example
//!
//! ```no_run
//! use pg_wire::connection::{Connection, Settings};
//!
//! fn main() -> pg_wire::error::Result<()> {
//!     let settings = Settings {
//!         host: "localhost".into(),
//!         port: 5432,
//!         user: "postgres".into(),
//!         password: "secret".into(),
//!         database: "postgres".into(),
//!     };
//!
//!     let conn = Connection::connect(&settings)?;
//!     println!("server version: {:?}", conn.get_server_version());
//!     conn.close();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod receiver;
pub mod transport;
pub mod types;
pub mod values;

pub use connection::{Connection, Settings};
pub use error::{Error, ErrorDesc, Result, Severity};
pub use message::{ClientMessage, ServerMessage};
