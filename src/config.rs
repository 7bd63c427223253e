//! Command-line and environment configuration.
//!
//! Every flag falls back to an environment variable, so the service can be
//! configured from a `.env` file alone.

use azure_core::http::Url;
use clap::{Args, Parser, ValueEnum};
use std::net::SocketAddr;

/// Which vault implementation serves key listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Azure Key Vault
    Azure,
    /// AWS Key Management Service
    Kms,
}

#[derive(Parser)]
#[command(name = "keyvault_lister")]
#[command(about = "HTTP service that lists the keys stored in a cloud key vault", long_about = None)]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Vault backend to list keys from
    #[arg(long, env = "KEYVAULT_BACKEND", value_enum, default_value_t = Backend::Azure)]
    pub backend: Backend,

    /// Azure Key Vault endpoint
    #[arg(long, env = "KEYVAULT_URL", default_value = "https://mykeyvault.vault.azure.net/")]
    pub vault_url: Url,

    /// Key Vault API version; the SDK default when unset
    #[arg(long, env = "KEYVAULT_API_VERSION")]
    pub api_version: Option<String>,

    #[command(flatten)]
    pub azure: AzureCredentialArgs,
}

/// Service principal settings. When tenant, client ID and secret are all
/// present the client secret credential is used, otherwise the managed
/// identity.
#[derive(Args, Clone)]
pub struct AzureCredentialArgs {
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Service principal client ID, or the user-assigned managed identity
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}
