//! `OAuth2` token authority configuration.

use crate::error::{AuthError, Result};
use url::Url;
use uuid::Uuid;

/// Microsoft identity platform host.
pub const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope requesting every application permission granted on Microsoft Graph.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Scope for Azure Key Vault data-plane calls.
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

/// Issuer of client-credentials tokens, with one token endpoint per tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    base: Url,
}

impl Authority {
    /// Creates an authority rooted at `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not an absolute hierarchical URL.
    pub fn new(base: impl AsRef<str>) -> Result<Self> {
        let mut base = Url::parse(base.as_ref())?;
        if base.cannot_be_a_base() {
            return Err(AuthError::InvalidAuthority(format!(
                "{base} cannot be used as a base URL"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    /// Microsoft identity platform (`login.microsoftonline.com`).
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Self::new(MICROSOFT_AUTHORITY)
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Token endpoint for `tenant_id`: `{base}/{tenant}/oauth2/v2.0/token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built.
    pub fn token_url(&self, tenant_id: &Uuid) -> Result<Url> {
        Ok(self.base.join(&format!("{tenant_id}/oauth2/v2.0/token"))?)
    }
}
