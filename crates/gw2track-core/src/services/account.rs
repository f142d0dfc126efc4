use tracing::debug;

use crate::api::{ApiClient, ApiError, RequestOptions};
use crate::cache::{keys, ttl};
use crate::models::{AccountInfo, TokenInfo};

/// `/tokeninfo` and `/account` lookups, used to validate a key before a user
/// is created.
#[derive(Clone)]
pub struct AccountService {
    api: ApiClient,
}

impl AccountService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn token_info(&self, api_key: &str) -> Result<TokenInfo, ApiError> {
        self.api
            .get(
                "/tokeninfo",
                RequestOptions::new()
                    .credential(api_key)
                    .cache(keys::token_info(api_key), ttl::TOKEN_INFO),
            )
            .await
    }

    pub async fn account_info(&self, api_key: &str) -> Result<AccountInfo, ApiError> {
        self.api
            .get(
                "/account",
                RequestOptions::new()
                    .credential(api_key)
                    .cache(keys::account(api_key), ttl::ACCOUNT),
            )
            .await
    }

    /// True when upstream accepts the key.
    pub async fn validate_credential(&self, api_key: &str) -> bool {
        match self.token_info(api_key).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "API key validation failed");
                false
            }
        }
    }

    /// Both lookups, concurrently.
    pub async fn account_with_token_info(&self, api_key: &str) -> Result<(AccountInfo, TokenInfo), ApiError> {
        tokio::try_join!(self.account_info(api_key), self.token_info(api_key))
    }
}
