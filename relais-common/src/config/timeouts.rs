//! Timeouts for the receiving side of the relay.
//!
//! Clients on the private network are other services, not humans typing into
//! telnet, so the defaults are much tighter than the RFC 5321 suggestions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// How long to wait for the next command line.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// How long to wait for each line of the message body after `DATA`.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Maximum total connection duration.
    ///
    /// Default: 1800 seconds (30 minutes)
    #[serde(default = "defaults::connection_secs")]
    pub connection_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: defaults::command_secs(),
            data_secs: defaults::data_secs(),
            connection_secs: defaults::connection_secs(),
        }
    }
}

impl ServerTimeouts {
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    pub const fn connection(&self) -> Duration {
        Duration::from_secs(self.connection_secs)
    }
}

mod defaults {
    pub const fn command_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        30
    }
    pub const fn connection_secs() -> u64 {
        1800
    }
}
