//! In-memory directory of proxy hosts and their allow lists.

pub mod entry;
pub mod manager;

pub use entry::{EntryMetadata, ProxyEntry, RouteTarget, ALPHA, DEFAULT_PORT};
pub use manager::{Directory, DirectoryManager, RemoteHost, RemoteSnapshot};
