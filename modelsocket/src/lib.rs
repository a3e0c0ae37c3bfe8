//! Client-side runtime for ModelSocket, a stateful request/response protocol
//! carried over one full-duplex WebSocket connection.
//!
//! [`Connection`] owns the transport and demultiplexes inbound events to
//! either its opening-waiter table or the owning [`Sequence`]. Callers issue
//! commands on a `Sequence` (`append`, `gen`, `create_fork`, `close`,
//! `install`); each is correlated to its completion event by a client-chosen
//! `cid`. Wire types live in the sibling `modelsocket-protocol` crate.

pub mod config;
mod connection;
pub mod error;
mod gen_stream;
mod sequence;
pub mod tool;
pub mod transport;

pub use connection::Connection;
pub use connection::OpenOptions;
pub use error::ModelSocketError;
pub use error::Result;
pub use gen_stream::Chunk;
pub use gen_stream::GenStream;
pub use modelsocket_protocol::GenOpts;
pub use sequence::AppendInput;
pub use sequence::AppendOptions;
pub use sequence::Sequence;
pub use tool::Tool;
