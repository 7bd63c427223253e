//! Key listing gateway: folds a vault listing into the text returned by the
//! HTTP endpoints.

use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, info};

use crate::infra::keyvault::{KeySummary, KeyVault};

/// Placed after every key name; the final one is trimmed.
pub const SEPARATOR: &str = ", ";

/// Response body when a listing fails for any reason.
pub const LIST_FAILURE: &str = "Failed to list KeyVault keys";

/// How the listing is retrieved from the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Fetch the complete listing, then fold it.
    Sync,
    /// Consume the key stream item by item until it completes.
    Async,
}

impl ListMode {
    pub fn from_flag(is_async: bool) -> Self {
        if is_async { ListMode::Async } else { ListMode::Sync }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListMode::Sync => "sync",
            ListMode::Async => "async",
        }
    }
}

pub struct KeyListingGateway {
    vault: Arc<dyn KeyVault>,
}

impl KeyListingGateway {
    pub fn new(vault: Arc<dyn KeyVault>) -> Self {
        Self { vault }
    }

    /// Returns the names of all keys joined by [`SEPARATOR`], or
    /// [`LIST_FAILURE`] if the vault could not be listed.
    ///
    /// Names are not escaped. In async mode the stream is drained before
    /// returning, so a failure part way yields [`LIST_FAILURE`] rather than a
    /// partial list.
    #[tracing::instrument(skip_all, fields(mode = mode.as_str()))]
    pub async fn list_keys(&self, mode: ListMode) -> String {
        let mut buffer = String::new();
        let result = self
            .for_each_key(mode, |key| {
                buffer.push_str(&key.name);
                buffer.push_str(SEPARATOR);
            })
            .await;

        match result {
            Ok(count) => {
                info!(count, "Listed KeyVault keys");
                trim_separator(buffer)
            }
            Err(e) => {
                error!(error = %e, "Failed to list KeyVault keys");
                LIST_FAILURE.to_string()
            }
        }
    }

    /// Logs every key name and returns a fixed status message.
    #[tracing::instrument(skip_all, fields(mode = mode.as_str()))]
    pub async fn log_keys(&self, mode: ListMode) -> String {
        let result = self
            .for_each_key(mode, |key| info!(key = %key.name, "KeyVault key"))
            .await;

        match result {
            Ok(count) => {
                info!(count, "Logged KeyVault keys");
                format!("Successfully ran all KeyVault Keys {} tests", mode.as_str())
            }
            Err(e) => {
                error!(error = %e, "Failed to run KeyVault {} tests", mode.as_str());
                match mode {
                    ListMode::Sync => "Failed to run KeyVault sync tests".to_string(),
                    ListMode::Async => format!("Failed to run KeyVault async tests {e}"),
                }
            }
        }
    }

    /// Calls `f` for every key in enumeration order and returns how many
    /// keys were seen.
    async fn for_each_key<F>(&self, mode: ListMode, mut f: F) -> Result<usize>
    where
        F: FnMut(&KeySummary) + Send,
    {
        match mode {
            ListMode::Sync => {
                let keys = self.vault.list_keys().await?;
                keys.iter().for_each(&mut f);
                Ok(keys.len())
            }
            ListMode::Async => {
                let mut stream = self.vault.list_keys_stream();
                let mut count = 0;
                while let Some(key) = stream.next().await {
                    f(&key?);
                    count += 1;
                }
                Ok(count)
            }
        }
    }
}

/// Removes exactly one trailing [`SEPARATOR`], if present.
fn trim_separator(mut buffer: String) -> String {
    if buffer.ends_with(SEPARATOR) {
        buffer.truncate(buffer.len() - SEPARATOR.len());
    }
    buffer
}
