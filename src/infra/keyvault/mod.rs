//! Vault access.
//!
//! [`KeyVault`] is the async trait for enumerating the keys held by a remote
//! key-management vault, either as one complete listing or as a stream.
//! [`AzureKeyVault`] talks to Azure Key Vault through the Azure SDK and
//! [`KmsKeyVault`] to AWS KMS. Both are built once from explicit
//! configuration by [`build_vault`] and shared across requests.

mod azure;
pub mod credential;
mod kms;

#[cfg(test)]
pub(crate) mod testing;

pub use azure::AzureKeyVault;
pub use kms::KmsKeyVault;

use crate::config::{Backend, Config};
use anyhow::{Result, anyhow, bail};
use azure_security_keyvault_keys::KeyClientOptions;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

/// Items buffered between a stream's producer task and its consumer.
const STREAM_BUFFER: usize = 64;

/// Name and identifier of a key, as returned by a vault listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySummary {
    pub name: String,
    /// Vault-assigned identifier (Azure `kid` URL, KMS key ARN).
    pub id: String,
}

impl KeySummary {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let id = id.into();
        if name.is_empty() {
            bail!("vault returned a key with an empty name (id '{id}')");
        }
        Ok(Self { name, id })
    }

    /// Builds a summary from an Azure key identifier such as
    /// `https://myvault.vault.azure.net/keys/signing-key` (a trailing
    /// `/<version>` segment is ignored).
    pub fn from_kid(kid: &str) -> Result<Self> {
        let name = kid
            .split_once("/keys/")
            .and_then(|(_, rest)| rest.split('/').next())
            .unwrap_or_default();
        Self::new(name, kid)
    }
}

/// Push-style stream of key summaries. An `Err` item means the listing
/// failed part way; the stream ends right after it.
pub type KeyStream = BoxStream<'static, Result<KeySummary>>;

/// Sending half handed to a [`spawn_key_stream`] producer.
pub type KeySender = mpsc::Sender<Result<KeySummary>>;

/// Enumerates the keys stored in a remote vault.
#[async_trait::async_trait]
pub trait KeyVault: Send + Sync {
    /// Fetches every page of the listing before returning.
    async fn list_keys(&self) -> Result<Vec<KeySummary>>;

    /// Streams keys in enumeration order as pages arrive.
    fn list_keys_stream(&self) -> KeyStream;
}

/// Runs `producer` on its own task and returns the receiving end as a
/// [`KeyStream`].
///
/// The producer pushes `Ok` items through the sender. If it returns an
/// error or panics, an error is delivered as the final item, so a stream
/// only ends cleanly when the producer finished. A failed send means the
/// consumer hung up and the producer should stop.
pub fn spawn_key_stream<F, Fut>(producer: F) -> KeyStream
where
    F: FnOnce(KeySender) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let err_tx = tx.clone();
    let task = producer(tx);

    tokio::spawn(async move {
        let err = match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => {
                debug!(error = %e, "Key stream producer failed");
                e
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(reason, "Key stream producer panicked");
                anyhow!("key stream producer panicked: {reason}")
            }
        };
        let _ = err_tx.send(Err(err)).await;
    });

    ReceiverStream::new(rx).boxed()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Builds the vault client selected by `config.backend`.
pub async fn build_vault(config: &Config) -> Result<Arc<dyn KeyVault>> {
    match config.backend {
        Backend::Azure => {
            let credential = credential::default_credential(&config.azure)?;
            let mut options = KeyClientOptions::default();
            if let Some(api_version) = &config.api_version {
                options.api_version = api_version.clone();
            }
            info!(vault_url = %config.vault_url, api_version = %options.api_version, "Using Azure Key Vault");
            let vault = AzureKeyVault::new(config.vault_url.clone(), credential, options)?;
            Ok(Arc::new(vault))
        }
        Backend::Kms => {
            let sdk_config = aws_config::load_from_env().await;
            info!(region = ?sdk_config.region(), "Using AWS KMS");
            Ok(Arc::new(KmsKeyVault::new(&sdk_config)))
        }
    }
}
