use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use superchat_common::amount::DEFAULT_MAX_ATTEMPTS;

use crate::ledger::LedgerSettings;
use crate::persistence::SnapshotFile;
use crate::sui::DEFAULT_RPC_URL;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "superchat-server",
    about = "Amount-correlated donation messages for Sui streamers"
)]
pub struct Cli {
    /// HTTP port to listen on.
    #[arg(long, default_value_t = 3080)]
    pub port: u16,

    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Sui fullnode JSON-RPC endpoint.
    #[arg(long, default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Seconds between automatic reconciliation passes (0 disables polling).
    #[arg(long, default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Upper bound on one transfer fetch, in seconds.
    #[arg(long, default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Attempts at finding a free amount before a submission fails.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Snapshot file (default: <data dir>/superchat/ledger.json).
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Keep everything in memory; nothing is read from or written to disk.
    #[arg(long, conflicts_with = "state_file")]
    pub in_memory: bool,

    /// Comma-separated streamer addresses to reconcile from start-up.
    #[arg(long, value_delimiter = ',')]
    pub watch: Vec<String>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug", "superchat_server=trace").
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }

    pub fn snapshot_file(&self) -> Option<SnapshotFile> {
        if self.in_memory {
            return None;
        }
        let path = self
            .state_file
            .clone()
            .unwrap_or_else(SnapshotFile::default_path);
        Some(SnapshotFile::new(path))
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            max_attempts: self.max_attempts,
            fetch_timeout: self.fetch_timeout(),
            snapshot_file: self.snapshot_file(),
        }
    }
}
