//! Wire types for the ModelSocket protocol.
//!
//! ModelSocket is a stateful request/response protocol carried over a single
//! full-duplex WebSocket connection: every outbound command carries a
//! client-chosen correlation id (`cid`), and the server echoes that id back
//! on the event that completes it. This crate only defines the JSON shapes
//! exchanged over the wire; the engine that tracks pending commands and
//! dispatches events lives in the `modelsocket` crate.

mod gen_opts;
mod ids;
mod inbound;
mod outbound;
mod tool;

pub use gen_opts::GenOpts;
pub use ids::Cid;
pub use ids::SeqId;
pub use inbound::InboundEvent;
pub use outbound::OutboundFrame;
pub use outbound::SeqCommandData;
pub use outbound::SeqOpenData;
pub use tool::ToolCallRequest;
pub use tool::ToolResultPayload;
