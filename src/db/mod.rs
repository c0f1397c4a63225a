pub mod models;
pub mod schema;
pub mod pg;
pub mod memory;


use chrono::{DateTime, Utc};

use models::*;

pub use memory::MemoryStore;
pub use pg::PgStore;


pub const MAX_LIST_LIMIT: i64 = 1000;
pub const DEFAULT_LIST_LIMIT: i64 = 100;
/// False-report count at which a reporter gets flagged.
pub const FLAG_THRESHOLD: i32 = 3;


#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("row not found")]
    NotFound,
    #[error("row changed since it was read")]
    Stale,
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("connection pool failed: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("connection unavailable: {0}")]
    Connection(String),
}

pub type StoreResult<T> = Result<T, StoreError>;


/// Predicates for listing incidents; `None` fields match everything.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub limit: i64,
}

impl Default for IncidentFilter {
    fn default() -> Self {
        IncidentFilter {
            status: None,
            category: None,
            priority: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.map_or(true, |s| incident.status == s)
            && self.category.as_ref().map_or(true, |c| &incident.category == c)
            && self.priority.map_or(true, |p| incident.priority == p)
    }
}


/// Every row change one moderation edit makes. A store applies all of it or none of it.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentEdit {
    pub incident_id: i32,
    /// Status and priority the edit was planned from. The store refuses the
    /// edit with `Stale` when the locked row no longer has them.
    pub seen_status: IncidentStatus,
    pub seen_priority: Priority,
    pub status: Option<IncidentStatus>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub admin_notes: Option<String>,
    /// Audit rows, inserted before the incident row is updated.
    pub actions: Vec<NewAdminAction>,
    /// Reporter whose false-report count goes up by one.
    pub false_report_user: Option<i32>,
}


pub trait Store: Send + Sync {
    fn insert_user(&self, user: &NewUser) -> StoreResult<User>;
    fn user_exists(&self, username: &str, email: &str) -> StoreResult<bool>;
    /// Looks a user up by username or email.
    fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>>;
    fn get_user(&self, id: i32) -> StoreResult<Option<User>>;
    fn record_user_login(&self, id: i32, ip_address: Option<&str>, at: DateTime<Utc>)
        -> StoreResult<()>;

    fn insert_admin(&self, admin: &NewAdmin) -> StoreResult<Admin>;
    fn find_admin_by_login(&self, login: &str) -> StoreResult<Option<Admin>>;
    fn get_admin(&self, id: i32) -> StoreResult<Option<Admin>>;
    fn record_admin_login(&self, id: i32, at: DateTime<Utc>) -> StoreResult<()>;

    fn insert_incident(&self, incident: &NewIncident) -> StoreResult<Incident>;
    fn get_incident(&self, id: i32) -> StoreResult<Option<Incident>>;
    fn get_incident_view(&self, id: i32) -> StoreResult<Option<IncidentView>>;
    /// Newest `reported_at` first.
    fn list_incidents(&self, filter: &IncidentFilter) -> StoreResult<Vec<IncidentView>>;
    /// Newest `action_timestamp` first.
    fn list_admin_actions(&self, incident_id: i32) -> StoreResult<Vec<AdminActionView>>;
    fn list_markers(&self) -> StoreResult<Vec<Marker>>;
    /// Fails with `NotFound` when the incident is gone and with `Stale` when it
    /// no longer matches what the edit was planned from; nothing is written then.
    fn apply_edit(&self, edit: &IncidentEdit) -> StoreResult<Option<ReporterStanding>>;
    /// Returns whether a row was removed. Audit rows go with it.
    fn delete_incident(&self, id: i32) -> StoreResult<bool>;
    fn stats(&self, recent_since: DateTime<Utc>) -> StoreResult<Stats>;
}
