use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use super::ClientResult;


/// The signed-in account as the API reports it. Login and profile responses
/// use different key styles, so both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(default, alias = "isFlagged")]
    pub is_flagged: bool,
    #[serde(default, alias = "falseReportCount")]
    pub false_report_count: i32,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}


/// Who the client is talking to the API as.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    token: Option<String>,
    account: Option<AccountSummary>,
    is_admin: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: String, account: AccountSummary, is_admin: bool) {
        self.token = Some(token);
        self.account = Some(account);
        self.is_admin = is_admin;
    }

    pub fn clear(&mut self) {
        *self = Session::default();
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn account(&self) -> Option<&AccountSummary> {
        self.account.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.is_signed_in() && self.is_admin
    }

    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reads a saved session; a missing file is an empty session.
    pub fn load(path: &Path) -> ClientResult<Self> {
        match fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Session::default()),
            Err(err) => Err(err.into()),
        }
    }
}
