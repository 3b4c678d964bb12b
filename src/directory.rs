//! # User Directory
//!
//! The identity provider's account records live outside the credential store.
//! After an assertion verifies, the owning user's name is looked up here to
//! find the account that gets signed in.
//!
//! The shipped implementation is a static list loaded from a JSON file:
//!
//! ```json
//! [
//!   { "subject_id": "alice", "username": "Alice", "display_name": "Alice Smith" },
//!   { "subject_id": "bob", "username": "Bob" }
//! ]
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// An identity provider account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable subject identifier, the `sub` of issued tokens
    pub subject_id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

pub trait UserDirectory: Send + Sync {
    fn find_by_subject_identifier(&self, subject_id: &str) -> Option<Account>;
}

/// Accounts held in memory, keyed by subject identifier
#[derive(Debug, Default)]
pub struct StaticDirectory {
    accounts: HashMap<String, Account>,
}

impl StaticDirectory {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.subject_id.clone(), a))
                .collect(),
        }
    }

    /// Loads accounts from a JSON array file. A missing file yields an empty
    /// directory, in which case no assertion can complete a sign-in.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "User directory file not found, starting empty");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };

        let accounts: Vec<Account> = serde_json::from_slice(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        let directory = Self::new(accounts);
        tracing::info!(count = directory.len(), "Loaded user directory");

        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl UserDirectory for StaticDirectory {
    fn find_by_subject_identifier(&self, subject_id: &str) -> Option<Account> {
        self.accounts.get(subject_id).cloned()
    }
}
