//! Socket table collection.
//!
//! Recovers the set of listening endpoints a process actually holds, as
//! opposed to the set it was asked to bind. Linux only; other platforms
//! report [`InspectError::Unsupported`] so callers can skip rather than fail.

mod network;

pub use network::{
    parse_proc_net_tcp_content, socket_inode_from_link, InspectError, SocketInspector, TcpEntry,
    TcpState, DEFAULT_SETTLE_ATTEMPTS, DEFAULT_SETTLE_BACKOFF,
};
