//! treesync - RPC Layer
//!
//! Multiplexes concurrent request/response exchanges over one connection.
//!
//! - [`Envelope`] and the payload types define the JSON wire shape
//! - [`PendingTable`] maps in-flight `request_id`s to one-shot waiters
//! - [`Correlator`] routes inbound frames to waiters and fails them all when
//!   the connection ends
//! - [`RpcChannel::issue`] ties the three together with a per-call deadline

mod channel;
mod correlator;
mod error;
mod message;
mod pending;

pub use channel::*;
pub use correlator::*;
pub use error::*;
pub use message::*;
pub use pending::*;
