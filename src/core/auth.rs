//! Azure AD token acquisition for the Cost Management API.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{
    ClientSecretCredential, ManagedIdentityCredential, ManagedIdentityCredentialOptions,
    UserAssignedId,
};

/// Scope for Azure Resource Manager, which hosts the Cost Management API.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "AZURE_CLIENT_SECRET";

/// Which Azure identity the report authenticates as.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service principal with a client secret.
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// System-assigned identity, or user-assigned when `client_id` is set.
    ManagedIdentity { client_id: Option<String> },
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
                .finish_non_exhaustive(),
            Self::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

impl CredentialSource {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Service principal when all three variables are present, managed identity otherwise.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        match (get(TENANT_ID_VAR), get(CLIENT_ID_VAR), get(CLIENT_SECRET_VAR)) {
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
            Self::ClientSecret { .. } => "ClientSecret",
            Self::ManagedIdentity { .. } => "ManagedIdentity",
        }
    }

    fn build(&self) -> Result<Arc<dyn TokenCredential>> {
        match self {
            Self::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let credential: Arc<dyn TokenCredential> = ClientSecretCredential::new(
                    tenant_id,
                    client_id.clone(),
                    Secret::new(client_secret.clone()),
                    None,
                )
                .map_err(|e| anyhow::anyhow!("Failed to create client secret credential: {}", e))?;
                Ok(credential)
            }
            Self::ManagedIdentity { client_id } => {
                let options = client_id.as_ref().map(|id| {
                    tracing::info!(client_id = %id, "Using user-assigned managed identity");
                    ManagedIdentityCredentialOptions {
                        user_assigned_id: Some(UserAssignedId::ClientId(id.clone())),
                        ..Default::default()
                    }
                });
                let credential: Arc<dyn TokenCredential> = ManagedIdentityCredential::new(options)
                    .map_err(|e| {
                        anyhow::anyhow!("Failed to create managed identity credential: {}", e)
                    })?;
                Ok(credential)
            }
        }
    }
}

/// Acquire a bearer token for the management API.
pub async fn acquire_token(source: &CredentialSource) -> Result<String> {
    let credential = source.build()?;
    let scopes = &[MANAGEMENT_SCOPE];
    let access_token = credential
        .get_token(scopes, None)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get Azure {} token: {}", source.kind(), e))?;

    tracing::debug!(credential = source.kind(), "Acquired Azure management token");
    Ok(access_token.token.secret().to_string())
}
