use anyhow::{Context, Result, anyhow};
use azure_core::credentials::TokenCredential;
use azure_core::error::ErrorKind;
use azure_core::http::policies::{Policy, PolicyResult};
use azure_core::http::{Request, Url};
use azure_security_keyvault_keys::models::KeyProperties;
use azure_security_keyvault_keys::{KeyClient, KeyClientOptions};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use super::{KeyStream, KeySummary, KeyVault, spawn_key_stream};

/// Fails any request whose origin differs from the vault endpoint, so a
/// `nextLink` pointing at another host never receives the bearer token.
///
/// Installed as a per-call policy; it runs before the SDK's authorization
/// policy attaches the token.
#[derive(Debug)]
struct SameOriginPolicy {
    endpoint: Url,
}

#[async_trait::async_trait]
impl Policy for SameOriginPolicy {
    async fn send(
        &self,
        ctx: &azure_core::http::Context,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> PolicyResult {
        if request.url().origin() != self.endpoint.origin() {
            return Err(azure_core::Error::with_message(
                ErrorKind::Other,
                format!(
                    "refusing to follow {} outside vault {}",
                    request.url().host_str().unwrap_or_default(),
                    self.endpoint
                ),
            ));
        }
        next[0].send(ctx, request, &next[1..]).await
    }
}

/// Lists keys through the Azure Key Vault SDK.
///
/// The SDK pager follows `nextLink` and handles the Key Vault
/// authentication challenge.
#[derive(Clone)]
pub struct AzureKeyVault {
    client: Arc<KeyClient>,
    vault_url: Url,
}

impl AzureKeyVault {
    pub fn new(
        vault_url: Url,
        credential: Arc<dyn TokenCredential>,
        mut options: KeyClientOptions,
    ) -> Result<Self> {
        options
            .client_options
            .per_call_policies
            .push(Arc::new(SameOriginPolicy {
                endpoint: vault_url.clone(),
            }));
        let client = KeyClient::new(vault_url.as_str(), credential, Some(options))
            .with_context(|| format!("invalid Key Vault endpoint '{vault_url}'"))?;

        Ok(Self {
            client: Arc::new(client),
            vault_url,
        })
    }

    fn keys(&self) -> Result<BoxStream<'static, Result<KeySummary>>> {
        debug!(vault_url = %self.vault_url, "Listing Key Vault keys");
        let pager = self
            .client
            .list_key_properties(None)
            .context("Key Vault list keys request failed")?;
        Ok(pager.map(summarize).boxed())
    }
}

fn summarize(item: azure_core::Result<KeyProperties>) -> Result<KeySummary> {
    let props = item.context("Key Vault list keys request failed")?;
    let kid = props
        .kid
        .ok_or_else(|| anyhow!("Key Vault returned a key without a kid"))?;
    KeySummary::from_kid(&kid)
}

#[async_trait::async_trait]
impl KeyVault for AzureKeyVault {
    #[tracing::instrument(skip(self), fields(vault_url = %self.vault_url))]
    async fn list_keys(&self) -> Result<Vec<KeySummary>> {
        let keys: Vec<KeySummary> = self.keys()?.try_collect().await?;
        info!(count = keys.len(), "Listed Key Vault keys");
        Ok(keys)
    }

    fn list_keys_stream(&self) -> KeyStream {
        let vault = self.clone();

        spawn_key_stream(move |tx| async move {
            let mut keys = vault.keys()?;
            let mut count = 0usize;

            while let Some(key) = keys.try_next().await? {
                if tx.send(Ok(key)).await.is_err() {
                    debug!(count, "Key stream consumer went away");
                    return Ok(());
                }
                count += 1;
            }

            info!(count, "Streamed Key Vault keys");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(value: serde_json::Value) -> KeyProperties {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_summarize_uses_kid_name() {
        let key = summarize(Ok(props(serde_json::json!({
            "kid": "https://test.vault.azure.net/keys/signing-key",
            "managed": true
        }))))
        .unwrap();
        assert_eq!(key.name, "signing-key");
    }

    #[test]
    fn test_summarize_rejects_missing_kid() {
        let err = summarize(Ok(props(serde_json::json!({})))).unwrap_err();
        assert!(err.to_string().contains("without a kid"));
    }

    #[test]
    fn test_summarize_keeps_sdk_error() {
        let err = summarize(Err(azure_core::Error::with_message(
            ErrorKind::Other,
            "connection reset",
        )))
        .unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"));
    }
}
