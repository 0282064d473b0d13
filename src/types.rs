//! Data structures shared by the catalog index and the transfer orchestrator.

use crate::client::JobEvent;
use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Separator placed between descriptor fields when deriving a [`JobKey`].
const KEY_SEPARATOR: &str = "-";

/// Identity of a file offered by an XDCC bot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// IRC network host the bot lives on (e.g., `"irc.example.net"`).
    pub network: String,
    /// Channel the bot advertises in (e.g., `"#chan"`).
    pub channel_name: String,
    /// Nickname of the bot serving the file.
    pub bot_name: String,
    /// Pack number as advertised, including the leading `#`.
    pub file_number: String,
    pub file_name: String,
    /// Human-readable size as advertised (e.g., `"1.9G"`).
    pub file_size: String,
}

impl FileDescriptor {
    /// Rejects descriptors that cannot be requested from a bot.
    ///
    /// `file_size` is display-only and may be empty.
    pub fn validate(&self) -> Result<(), TransferError> {
        let required = [
            ("network", &self.network),
            ("channelName", &self.channel_name),
            ("botName", &self.bot_name),
            ("fileNumber", &self.file_number),
            ("fileName", &self.file_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TransferError::InvalidDescriptor(field));
            }
        }
        Ok(())
    }

    /// Derives the identity key for this descriptor.
    pub fn key(&self) -> JobKey {
        JobKey::from(self)
    }
}

/// Deterministic identity of a file, used for deduplication, lookup and cancellation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&FileDescriptor> for JobKey {
    fn from(file: &FileDescriptor) -> Self {
        JobKey(
            [
                file.network.as_str(),
                file.channel_name.as_str(),
                file.bot_name.as_str(),
                file.file_number.as_str(),
                file.file_name.as_str(),
                file.file_size.as_str(),
            ]
            .join(KEY_SEPARATOR),
        )
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a requested transfer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StatusOption {
    Pending,
    Downloading,
    Downloaded,
    Error,
    Cancelled,
}

impl StatusOption {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// `downloaded`, `error` and `cancelled` accept no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for StatusOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status filter does not name a known status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown transfer status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for StatusOption {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "downloaded" => Ok(Self::Downloaded),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Poll-visible state of one requested transfer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatus {
    pub id: JobKey,
    #[serde(flatten)]
    pub file: FileDescriptor,
    pub status: StatusOption,
    /// Completion in percent, within `0.0..=100.0`.
    pub percentage: f64,
    /// Seconds remaining; `None` while unknown.
    pub eta: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransferStatus {
    /// A freshly accepted transfer with no progress yet.
    pub fn pending(file: FileDescriptor) -> Self {
        Self {
            id: file.key(),
            file,
            status: StatusOption::Pending,
            percentage: 0.0,
            eta: None,
            error_message: None,
        }
    }

    /// Folds one job event into this status.
    ///
    /// Events that do not concern this file are ignored, as is anything
    /// arriving after a terminal state.
    pub fn apply(&mut self, event: &JobEvent) {
        if self.status.is_terminal() || !event.concerns(&self.file.file_name) {
            return;
        }
        match event {
            JobEvent::Progress {
                percentage, eta, ..
            } => {
                // NaN or infinite readings leave the last known value in place.
                if percentage.is_finite() {
                    let percentage = percentage.clamp(0.0, 100.0);
                    self.percentage = if self.status == StatusOption::Downloading {
                        self.percentage.max(percentage)
                    } else {
                        percentage
                    };
                }
                self.status = StatusOption::Downloading;
                self.eta = *eta;
            }
            JobEvent::Completed { .. } => {
                self.status = StatusOption::Downloaded;
                self.percentage = 100.0;
                self.eta = None;
            }
            JobEvent::Error { message, .. } => {
                self.status = StatusOption::Error;
                self.error_message = Some(message.clone());
                self.eta = None;
            }
            JobEvent::Cancelled => {
                self.status = StatusOption::Cancelled;
                self.eta = None;
            }
            JobEvent::Finished => {}
        }
    }
}

/// One advertised bot channel and where its file listing lives.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSource {
    pub channel_name: String,
    pub network: String,
    pub listing_url: String,
}

/// One searchable row of the catalog index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub id: JobKey,
    #[serde(flatten)]
    pub file: FileDescriptor,
}

impl From<FileDescriptor> for IndexedFile {
    fn from(file: FileDescriptor) -> Self {
        Self {
            id: file.key(),
            file,
        }
    }
}

/// Configuration shared by the catalog index and the transfer orchestrator.
///
/// # Example
///
/// ```
/// use xdcc_mule::MuleConfig;
///
/// let config = MuleConfig {
///     catalog_url: "https://example.com/xdcc.ini".to_string(),
///     nickname: "mule".to_string(),
///     ..MuleConfig::default()
/// };
/// assert!(config.randomize_nick);
/// ```
#[derive(Debug, Clone)]
pub struct MuleConfig {
    /// URL of the aggregator document listing every known bot channel.
    pub catalog_url: String,
    /// Nickname used when joining IRC networks.
    ///
    /// Read by the transfer orchestrator only; the catalog binary leaves the
    /// transfer settings at their defaults.
    pub nickname: String,
    /// Append a random suffix to the nickname so restarts don't collide.
    pub randomize_nick: bool,
    /// Directory that finished transfers are written into.
    pub download_path: PathBuf,
    pub irc_port: u16,
    /// Channels whose listings are never fetched.
    pub excluded_channels: HashSet<String>,
    /// Connect timeout for catalog and listing fetches.
    ///
    /// Catalog endpoints are slow, so the default is five minutes.
    pub fetch_connect_timeout: Duration,
    /// Upper bound on listing documents fetched in parallel during a rebuild.
    pub max_concurrent_fetches: usize,
    /// How often the periodic scheduler rebuilds the index in `watch` mode.
    pub refresh_interval: Duration,
}

impl Default for MuleConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
            nickname: "xdcc-mule".to_string(),
            randomize_nick: true,
            download_path: PathBuf::from("./downloads"),
            irc_port: 6667,
            excluded_channels: HashSet::new(),
            fetch_connect_timeout: Duration::from_secs(300),
            max_concurrent_fetches: 16,
            refresh_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Parses a comma-separated channel list, trimming entries and dropping blanks.
pub fn parse_excluded_channels(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|channel| !channel.is_empty())
        .map(str::to_string)
        .collect()
}
