//! Room transport: membership, replicated metadata and remote invocations

pub mod protocol;
pub mod room;
pub mod rpc;
pub mod store;

pub use room::{Room, RoomRegistry, RoomStatus};
