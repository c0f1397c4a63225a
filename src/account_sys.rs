use chrono::{DateTime, Utc};
use log::info;
use serde::Deserialize;

use crate::config::BootstrapAdmin;
use crate::db::{models::*, StoreError};
use crate::token_sys::{Identity, TokenError};
use crate::AppState;


const BOOTSTRAP_ROLE: &str = "super_admin";
const MAX_NAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 255;


#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("Username or email already exists")]
    Duplicate,
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AccountError::Duplicate,
            other => AccountError::Store(other),
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;


#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}


/// A freshly issued token with the account it was issued for.
pub struct SignedIn<T> {
    pub token: String,
    pub account: T,
}


impl Registration {
    fn verify_error(&self) -> Option<&'static str> {
        let username = self.username.as_deref().map(str::trim).unwrap_or("");
        let email = self.email.as_deref().map(str::trim).unwrap_or("");
        let password = self.password.as_deref().unwrap_or("");

        if username.is_empty() || email.is_empty() || password.is_empty() {
            Some("Username, email, and password are required")
        }
        else if username.find(char::is_whitespace).is_some() {
            Some("The username can not contain spaces")
        }
        else if username.chars().count() > MAX_NAME_LEN {
            Some("The username can not be longer than 50 characters")
        }
        else if !email.contains('@') {
            Some("Invalid email address")
        }
        else if email.chars().count() > MAX_EMAIL_LEN {
            Some("The email can not be longer than 255 characters")
        }
        else {
            None
        }
    }
}

impl Credentials {
    fn parts(&self) -> AccountResult<(&str, &str)> {
        let login = self.username.as_deref().map(str::trim).unwrap_or("");
        let password = self.password.as_deref().unwrap_or("");

        if login.is_empty() || password.is_empty() {
            Err(AccountError::Invalid("Username and password are required"))
        }
        else {
            Ok((login, password))
        }
    }
}


pub fn register(state: &AppState, registration: &Registration, ip_address: Option<String>,
    now: DateTime<Utc>) -> AccountResult<SignedIn<User>> {

    if let Some(err) = registration.verify_error() {
        return Err(AccountError::Invalid(err));
    }

    let username = registration.username.as_deref().unwrap_or("").trim();
    let email = registration.email.as_deref().unwrap_or("").trim();
    let password = registration.password.as_deref().unwrap_or("");

    if state.store.user_exists(username, email)? {
        return Err(AccountError::Duplicate);
    }

    let user = state.store.insert_user(&NewUser {
        username: username.to_owned(),
        email: email.to_owned(),
        password_hash: bcrypt::hash(password, state.bcrypt_cost)?,
        ip_address,
        created_at: now,
    })?;
    let token = state.tokens.issue(&Identity::user(user.id, &user.username))?;

    info!("User {} registered", user.id);
    Ok(SignedIn { token, account: user })
}

pub fn login(state: &AppState, credentials: &Credentials, ip_address: Option<&str>,
    now: DateTime<Utc>) -> AccountResult<SignedIn<User>> {

    let (login, password) = credentials.parts()?;
    let invalid = AccountError::InvalidCredentials("Invalid credentials");

    let mut user = match state.store.find_user_by_login(login)? {
        Some(user) => user,
        None => return Err(invalid),
    };
    if !bcrypt::verify(password, &user.password_hash)? {
        return Err(invalid);
    }

    state.store.record_user_login(user.id, ip_address, now)?;
    user.last_login = Some(now);
    if let Some(ip) = ip_address {
        user.ip_address = Some(ip.to_owned());
    }

    let token = state.tokens.issue(&Identity::user(user.id, &user.username))?;
    Ok(SignedIn { token, account: user })
}

pub fn admin_login(state: &AppState, credentials: &Credentials, now: DateTime<Utc>)
    -> AccountResult<SignedIn<Admin>> {

    let (login, password) = credentials.parts()?;
    let invalid = AccountError::InvalidCredentials("Invalid admin credentials");

    let mut admin = match state.store.find_admin_by_login(login)? {
        Some(admin) => admin,
        None => return Err(invalid),
    };
    if !bcrypt::verify(password, &admin.password_hash)? {
        return Err(invalid);
    }

    state.store.record_admin_login(admin.id, now)?;
    admin.last_login = Some(now);

    let token = state.tokens.issue(&Identity::admin(admin.id, &admin.username, &admin.role))?;
    info!("Admin {} logged in", admin.id);
    Ok(SignedIn { token, account: admin })
}

pub fn user_profile(state: &AppState, user_id: i32) -> AccountResult<User> {
    state.store.get_user(user_id)?
        .ok_or(AccountError::NotFound("User not found"))
}

pub fn admin_profile(state: &AppState, admin_id: i32) -> AccountResult<Admin> {
    state.store.get_admin(admin_id)?
        .ok_or(AccountError::NotFound("Admin not found"))
}

/// Creates the configured admin unless one with that username exists. Returns whether it did.
pub fn bootstrap_admin(state: &AppState, admin: &BootstrapAdmin, now: DateTime<Utc>)
    -> AccountResult<bool> {

    if state.store.find_admin_by_login(&admin.username)?.is_some() {
        return Ok(false);
    }

    let created = state.store.insert_admin(&NewAdmin {
        username: admin.username.clone(),
        email: admin.email.clone(),
        password_hash: bcrypt::hash(&admin.password, state.bcrypt_cost)?,
        full_name: "Administrator".into(),
        role: BOOTSTRAP_ROLE.into(),
        created_at: now,
    })?;

    info!("Bootstrap admin {} created", created.id);
    Ok(true)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_memory_store;

    fn registration(username: &str, email: &str) -> Registration {
        Registration {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some("secret-pw".into()),
        }
    }

    fn credentials(login: &str, password: &str) -> Credentials {
        Credentials {
            username: Some(login.into()),
            password: Some(password.into()),
        }
    }

    #[test]
    fn register_then_login_by_email() {
        let state = state_with_memory_store();
        let registered = register(&state, &registration("alice", "alice@example.com"),
            Some("10.0.0.1".into()), Utc::now()).unwrap();
        assert_eq!(registered.account.username, "alice");
        assert!(!state.tokens.verify(&registered.token).unwrap().is_admin);

        let session = login(&state, &credentials("alice@example.com", "secret-pw"),
            Some("10.0.0.2"), Utc::now()).unwrap();
        assert_eq!(session.account.id, registered.account.id);
        assert_eq!(session.account.ip_address.as_deref(), Some("10.0.0.2"));
        assert!(session.account.last_login.is_some());
    }

    #[test]
    fn wrong_password_is_invalid_credentials() {
        let state = state_with_memory_store();
        register(&state, &registration("bob", "bob@example.com"), None, Utc::now()).unwrap();

        assert!(matches!(login(&state, &credentials("bob", "nope"), None, Utc::now()),
            Err(AccountError::InvalidCredentials(_))));
        assert!(matches!(login(&state, &credentials("nobody", "nope"), None, Utc::now()),
            Err(AccountError::InvalidCredentials(_))));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let state = state_with_memory_store();
        register(&state, &registration("carol", "carol@example.com"), None, Utc::now()).unwrap();

        assert!(matches!(
            register(&state, &registration("carol", "other@example.com"), None, Utc::now()),
            Err(AccountError::Duplicate)));
        assert!(matches!(
            register(&state, &registration("caroline", "carol@example.com"), None, Utc::now()),
            Err(AccountError::Duplicate)));
    }

    #[test]
    fn missing_fields_are_invalid() {
        let state = state_with_memory_store();
        let mut incomplete = registration("dave", "dave@example.com");
        incomplete.password = None;

        assert!(matches!(register(&state, &incomplete, None, Utc::now()),
            Err(AccountError::Invalid(_))));
        assert!(matches!(admin_login(&state, &Credentials::default(), Utc::now()),
            Err(AccountError::Invalid(_))));
    }

    #[test]
    fn registration_lengths_fit_the_columns() {
        let state = state_with_memory_store();

        let long_email = format!("{}@example.com", "a".repeat(MAX_EMAIL_LEN - 11));
        assert_eq!(long_email.chars().count(), MAX_EMAIL_LEN + 1);
        assert!(matches!(register(&state, &registration("erin", &long_email), None, Utc::now()),
            Err(AccountError::Invalid("The email can not be longer than 255 characters"))));

        let long_name = "f".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(register(&state, &registration(&long_name, "f@example.com"), None, Utc::now()),
            Err(AccountError::Invalid(_))));

        // Counted in characters, not bytes.
        let wide_name = "é".repeat(MAX_NAME_LEN);
        let registered = register(&state, &registration(&wide_name, "e@example.com"), None, Utc::now())
            .unwrap();
        assert_eq!(registered.account.username, wide_name);
    }

    #[test]
    fn bootstrap_admin_runs_once_and_can_log_in() {
        let state = state_with_memory_store();
        let seed = BootstrapAdmin {
            username: "root".into(),
            password: "root-pw".into(),
            email: "root@localhost".into(),
        };

        assert!(bootstrap_admin(&state, &seed, Utc::now()).unwrap());
        assert!(!bootstrap_admin(&state, &seed, Utc::now()).unwrap());

        let session = admin_login(&state, &credentials("root", "root-pw"), Utc::now()).unwrap();
        let claims = state.tokens.verify(&session.token).unwrap();
        assert!(claims.is_admin);
        assert_eq!(claims.role.as_deref(), Some("super_admin"));
    }
}
