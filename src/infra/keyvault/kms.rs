use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use super::{KeyStream, KeySummary, KeyVault, spawn_key_stream};

/// Lists keys from AWS KMS.
///
/// Uses the ambient AWS configuration (env vars, instance profile, etc.)
/// loaded by `aws_config::load_from_env`. The process needs `kms:ListKeys`.
/// Keys are named by their key ID; the ARN is kept as the identifier.
#[derive(Clone)]
pub struct KmsKeyVault {
    client: aws_sdk_kms::Client,
}

impl KmsKeyVault {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self::from_client(aws_sdk_kms::Client::new(config))
    }

    pub fn from_client(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }

    /// Fetches one `ListKeys` page. Returns the keys and, if the listing is
    /// truncated, the marker for the next page.
    async fn fetch_page(&self, marker: Option<String>) -> Result<(Vec<KeySummary>, Option<String>)> {
        debug!(marker = ?marker, "Fetching KMS key page");
        let resp = self
            .client
            .list_keys()
            .set_marker(marker)
            .send()
            .await
            .context("KMS ListKeys failed")?;

        let keys = resp
            .keys
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                let key_id = entry
                    .key_id
                    .ok_or_else(|| anyhow!("KMS returned a key entry without a key ID"))?;
                let id = entry.key_arn.unwrap_or_else(|| key_id.clone());
                KeySummary::new(key_id, id)
            })
            .collect::<Result<Vec<_>>>()?;

        let next = if resp.truncated { resp.next_marker } else { None };
        Ok((keys, next))
    }
}

#[async_trait::async_trait]
impl KeyVault for KmsKeyVault {
    #[tracing::instrument(skip(self))]
    async fn list_keys(&self) -> Result<Vec<KeySummary>> {
        let mut keys = Vec::new();
        let mut marker = None;

        loop {
            let (page, next) = self.fetch_page(marker).await?;
            keys.extend(page);
            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }

        info!(count = keys.len(), "Listed KMS keys");
        Ok(keys)
    }

    fn list_keys_stream(&self) -> KeyStream {
        let vault = self.clone();

        spawn_key_stream(move |tx| async move {
            let mut marker = None;
            let mut count = 0usize;

            loop {
                let (page, next) = vault.fetch_page(marker).await?;
                for key in page {
                    if tx.send(Ok(key)).await.is_err() {
                        return Ok(());
                    }
                    count += 1;
                }
                match next {
                    Some(m) => marker = Some(m),
                    None => break,
                }
            }

            info!(count, "Streamed KMS keys");
            Ok(())
        })
    }
}
