//! Protocol tunables.
//!
//! The defaults reproduce the classic deployment: one well-known port, a
//! 500 ms acknowledgment timeout, a one second grace window after END and
//! ten input files named `file_1.txt` … `file_10.txt`.

use std::time::Duration;

/// Well-known port the server listens on.
pub const DEFAULT_PORT: u16 = 7777;

/// Number of files the client sends when none are named explicitly.
pub const DEFAULT_ITEM_COUNT: usize = 10;

/// Name under which the merged artifact travels in the download phase.
pub const DEFAULT_ARTIFACT_NAME: &str = "combined.txt";

/// Where the client stores the artifact it downloads.
pub const DEFAULT_CLIENT_OUTPUT: &str = "combined_from_server.txt";

/// Timing and retry knobs shared by both roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// How long a sender waits for an acknowledgment before retransmitting.
    /// Also used as the receiver's idle poll interval.
    pub ack_timeout: Duration,
    /// How long a receiver keeps re-acknowledging END after the first one.
    pub grace: Duration,
    /// Give up on a packet after this many retransmissions; `None` retries forever.
    pub max_retries: Option<u32>,
    /// Item name of the merged artifact in the download phase.
    pub artifact_name: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(500),
            grace: Duration::from_secs(1),
            max_retries: None,
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
        }
    }
}

/// File names sent by a client started without an explicit list.
pub fn default_item_names() -> Vec<String> {
    (1..=DEFAULT_ITEM_COUNT)
        .map(|i| format!("file_{i}.txt"))
        .collect()
}
