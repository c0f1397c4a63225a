use std::{fmt, io::Write, str::FromStr};

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::{
    deserialize::{self, FromSql},
    pg::{Pg, PgValue},
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    AsExpression, FromSqlRow,
};
use serde::{Deserialize, Serialize};

use super::schema::{admin_actions, admins, incident_reports, users};


/// A text value that does not name any variant of a stored enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
    AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum IncidentStatus {
    #[default]
    Pending,
    Verified,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    #[serde(rename = "False Report")]
    FalseReport,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 5] = [
        IncidentStatus::Pending,
        IncidentStatus::Verified,
        IncidentStatus::InProgress,
        IncidentStatus::Resolved,
        IncidentStatus::FalseReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "Pending",
            IncidentStatus::Verified => "Verified",
            IncidentStatus::InProgress => "In Progress",
            IncidentStatus::Resolved => "Resolved",
            IncidentStatus::FalseReport => "False Report",
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentStatus::ALL.iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant { kind: "status", value: s.to_owned() })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL.iter()
            .copied()
            .find(|priority| priority.as_str() == s)
            .ok_or_else(|| UnknownVariant { kind: "priority", value: s.to_owned() })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum ActionType {
    #[serde(rename = "Status Change")]
    StatusChange,
    #[serde(rename = "Priority Change")]
    PriorityChange,
    #[serde(rename = "Note Added")]
    NoteAdded,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::StatusChange => "Status Change",
            ActionType::PriorityChange => "Priority Change",
            ActionType::NoteAdded => "Note Added",
        }
    }
}

impl FromStr for ActionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [ActionType::StatusChange, ActionType::PriorityChange, ActionType::NoteAdded]
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownVariant { kind: "action type", value: s.to_owned() })
    }
}


// Enumerations are stored as their display text.
macro_rules! text_column_enum {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $ty {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let text = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                Ok(text.parse::<$ty>()?)
            }
        }
    )*};
}

text_column_enum!(IncidentStatus, Priority, ActionType);


#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub ip_address: Option<String>,
    pub false_report_count: i32,
    pub is_flagged: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}


#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = admins)]
pub struct Admin {
    pub id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = admins)]
pub struct NewAdmin {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}


#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = incident_reports)]
pub struct Incident {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: Option<String>,
    pub category: String,
    pub priority: Priority,
    pub status: IncidentStatus,
    pub user_id: Option<i32>,
    pub ip_address: Option<String>,
    pub admin_notes: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = incident_reports)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: Option<String>,
    pub category: String,
    pub priority: Priority,
    pub status: IncidentStatus,
    pub user_id: Option<i32>,
    pub ip_address: Option<String>,
    pub reported_at: DateTime<Utc>,
}


#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = admin_actions)]
pub struct AdminAction {
    pub id: i32,
    pub incident_id: i32,
    pub admin_id: i32,
    pub action_type: ActionType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
    pub action_timestamp: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = admin_actions)]
pub struct NewAdminAction {
    pub incident_id: i32,
    pub admin_id: i32,
    pub action_type: ActionType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
    pub action_timestamp: DateTime<Utc>,
}


/// An incident joined with what is known about its reporter.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentView {
    #[serde(flatten)]
    pub incident: Incident,
    pub username: Option<String>,
    pub user_flagged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// An audit entry joined with the acting admin's names.
#[derive(Debug, Clone, Serialize)]
pub struct AdminActionView {
    #[serde(flatten)]
    pub action: AdminAction,
    pub admin_username: Option<String>,
    pub admin_name: Option<String>,
}

#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = incident_reports)]
pub struct Marker {
    pub id: i32,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: IncidentStatus,
    pub priority: Priority,
    pub category: String,
    pub reported_at: DateTime<Utc>,
}

impl From<&Incident> for Marker {
    fn from(incident: &Incident) -> Self {
        Marker {
            id: incident.id,
            title: incident.title.clone(),
            latitude: incident.latitude,
            longitude: incident.longitude,
            status: incident.status,
            priority: incident.priority,
            category: incident.category.clone(),
            reported_at: incident.reported_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: IncidentStatus,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_reports: i64,
    pub recent_reports: i64,
    pub flagged_users: i64,
    pub status_breakdown: Vec<StatusCount>,
}

/// A reporter's standing right after a false-report increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReporterStanding {
    pub user_id: i32,
    pub false_report_count: i32,
    pub is_flagged: bool,
}
