use serde::{Deserialize, Serialize};

/// `/tokeninfo`: what the API key is allowed to read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl TokenInfo {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// `/account`: only the fields the tracker keeps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub world: Option<u32>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub access: Vec<String>,
}
