use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountInfo, TokenInfo};

/// A tracked account profile. The API key doubles as the uniqueness key.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub account_name: Option<String>,
    pub account_id: Option<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl User {
    /// Build a new profile from a validated key.
    pub fn new(name: &str, api_key: &str, account: &AccountInfo, token: &TokenInfo) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            api_key: api_key.trim().to_string(),
            account_name: Some(account.name.clone()),
            account_id: Some(account.id.clone()),
            permissions: token.permissions.clone(),
            created_at: super::now(),
            last_synced: None,
        }
    }

    pub fn display_name(&self) -> String {
        match self.account_name {
            Some(ref account) if account != &self.name => format!("{} ({})", self.name, account),
            _ => self.name.clone(),
        }
    }
}

// API keys stay out of logs
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("account_name", &self.account_name)
            .field("account_id", &self.account_id)
            .field("permissions", &self.permissions)
            .field("created_at", &self.created_at)
            .field("last_synced", &self.last_synced)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> User {
        let account = AccountInfo {
            id: "A1B2".to_string(),
            name: "Efe.1234".to_string(),
            world: Some(2003),
            created: None,
            access: vec!["GuildWars2".to_string()],
        };
        let token = TokenInfo {
            id: "T1".to_string(),
            name: "tracker".to_string(),
            permissions: vec!["account".to_string(), "progression".to_string()],
        };
        User::new(" Efe ", " SECRET-KEY ", &account, &token)
    }

    #[test]
    fn test_new_user_trims_and_copies_account() {
        let user = sample();
        assert_eq!(user.name, "Efe");
        assert_eq!(user.api_key, "SECRET-KEY");
        assert_eq!(user.account_id.as_deref(), Some("A1B2"));
        assert_eq!(user.permissions.len(), 2);
        assert!(user.last_synced.is_none());
        assert_eq!(user.display_name(), "Efe (Efe.1234)");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("SECRET-KEY"));
        assert!(rendered.contains("<redacted>"));
    }
}
