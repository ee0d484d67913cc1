//! TCP broadcast chat: every byte chunk a client sends is rebroadcast to
//! all connected clients, and the last [`room::MAX_RECENT_MSGS`] messages
//! are replayed to anyone who joins late. Raw bytes only; there is no
//! framing, handshake, or authentication.

pub mod room;
pub mod server;
pub mod session;

pub use room::{Message, Participant, ParticipantId, Room};
pub use server::Acceptor;
