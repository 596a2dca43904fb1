//! Configuration shared by every listener.

pub mod timeouts;

pub use timeouts::ServerTimeouts;
