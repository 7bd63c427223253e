//! Azure credential selection.
//!
//! A client secret is used when tenant, client ID and secret are all
//! configured. Otherwise the process authenticates as its managed identity,
//! user-assigned when a client ID is given.

use anyhow::{Context, Result};
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{
    ClientSecretCredential, ManagedIdentityCredential, ManagedIdentityCredentialOptions,
    UserAssignedId,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::config::AzureCredentialArgs;

/// The credential [`default_credential`] will build.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        client_id: Option<String>,
    },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

impl CredentialSource {
    /// Empty values count as unset.
    pub fn select(args: &AzureCredentialArgs) -> Self {
        let set = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        match (set(&args.tenant_id), set(&args.client_id), set(&args.client_secret)) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Self::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            },
            (_, client_id, _) => Self::ManagedIdentity { client_id },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClientSecret { .. } => "client_secret",
            Self::ManagedIdentity { client_id: None } => "managed_identity",
            Self::ManagedIdentity { client_id: Some(_) } => "user_assigned_managed_identity",
        }
    }

    pub fn build(self) -> Result<Arc<dyn TokenCredential>> {
        match self {
            Self::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let credential: Arc<dyn TokenCredential> = ClientSecretCredential::new(
                    &tenant_id,
                    client_id,
                    Secret::new(client_secret),
                    None,
                )
                .context("invalid Azure client secret credential")?;
                Ok(credential)
            }
            Self::ManagedIdentity { client_id } => {
                let options = ManagedIdentityCredentialOptions {
                    user_assigned_id: client_id.map(UserAssignedId::ClientId),
                    ..Default::default()
                };
                let credential: Arc<dyn TokenCredential> =
                    ManagedIdentityCredential::new(Some(options))
                        .context("invalid Azure managed identity credential")?;
                Ok(credential)
            }
        }
    }
}

/// Selects and builds the Azure credential for `args`.
pub fn default_credential(args: &AzureCredentialArgs) -> Result<Arc<dyn TokenCredential>> {
    let source = CredentialSource::select(args);
    info!(credential = source.kind(), "Selected Azure credential");
    source.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tenant: Option<&str>, client: Option<&str>, secret: Option<&str>) -> AzureCredentialArgs {
        AzureCredentialArgs {
            tenant_id: tenant.map(String::from),
            client_id: client.map(String::from),
            client_secret: secret.map(String::from),
        }
    }

    #[test]
    fn test_client_secret_needs_all_three_values() {
        let source = CredentialSource::select(&args(Some("tenant"), Some("app"), Some("s3cret")));
        assert_eq!(
            source,
            CredentialSource::ClientSecret {
                tenant_id: "tenant".into(),
                client_id: "app".into(),
                client_secret: "s3cret".into(),
            }
        );
    }

    #[test]
    fn test_partial_service_principal_falls_back_to_managed_identity() {
        assert_eq!(
            CredentialSource::select(&args(None, Some("app"), Some("s3cret"))),
            CredentialSource::ManagedIdentity {
                client_id: Some("app".into())
            }
        );
        assert_eq!(
            CredentialSource::select(&args(Some("tenant"), None, Some("s3cret"))),
            CredentialSource::ManagedIdentity { client_id: None }
        );
        assert_eq!(
            CredentialSource::select(&args(Some("tenant"), Some("app"), Some(""))),
            CredentialSource::ManagedIdentity {
                client_id: Some("app".into())
            }
        );
    }

    #[test]
    fn test_nothing_configured_uses_system_identity() {
        let source = CredentialSource::select(&args(None, None, None));
        assert_eq!(source, CredentialSource::ManagedIdentity { client_id: None });
        assert_eq!(source.kind(), "managed_identity");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let source = CredentialSource::select(&args(Some("tenant"), Some("app"), Some("s3cret")));
        let rendered = format!("{source:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_build_rejects_malformed_tenant() {
        let source = CredentialSource::select(&args(Some("not a tenant!"), Some("app"), Some("s3cret")));
        assert!(source.build().is_err());
    }

    #[test]
    fn test_build_managed_identity() {
        let source = CredentialSource::ManagedIdentity {
            client_id: Some("app".into()),
        };
        assert!(source.build().is_ok());
    }
}
