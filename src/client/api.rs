use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
    blocking::{Client, RequestBuilder},
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::session::{AccountSummary, Session};
use super::{ClientError, ClientResult};
use crate::db::models::{ActionType, IncidentStatus, Priority};


pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
const TIMEOUT: Duration = Duration::from_secs(10);


#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncidentSummary {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: Option<String>,
    pub category: String,
    pub priority: Priority,
    pub status: IncidentStatus,
    pub admin_notes: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_flagged: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditEntry {
    pub id: i32,
    pub action_type: ActionType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
    pub action_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub admin_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkerSummary {
    pub id: i32,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: IncidentStatus,
    pub priority: Priority,
    pub category: String,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusTally {
    pub status: IncidentStatus,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_reports: i64,
    pub recent_reports: i64,
    pub flagged_users: i64,
    pub status_breakdown: Vec<StatusTally>,
}


#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncidentQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}


#[derive(Deserialize)]
struct SignedInBody {
    token: String,
    #[serde(alias = "admin")]
    user: AccountSummary,
}

#[derive(Deserialize)]
struct AccountBody {
    #[serde(alias = "admin")]
    user: AccountSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedBody {
    incident_id: i32,
}

#[derive(Deserialize)]
struct IncidentListBody {
    incidents: Vec<IncidentSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentDetailBody {
    incident: IncidentSummary,
    admin_actions: Vec<AuditEntry>,
}

#[derive(Deserialize)]
struct MarkersBody {
    markers: Vec<MarkerSummary>,
}

#[derive(Deserialize)]
struct StatsBody {
    stats: StatsSummary,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: String,
}


/// Decodes a response body, turning `{success: false, message}` envelopes
/// and non-2xx statuses into `ClientError::Api`.
pub fn decode_body<T: DeserializeOwned>(status: u16, body: &str) -> ClientResult<T> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if !(200..300).contains(&status) => {
            return Err(ClientError::Api { status, message: format!("HTTP {}", status) });
        },
        Err(err) => return Err(err.into()),
    };

    let failed = value.get("success").and_then(Value::as_bool) == Some(false);
    if failed || !(200..300).contains(&status) {
        let message = value.get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(ClientError::Api { status, message });
    }

    Ok(serde_json::from_value(value)?)
}


pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(TIMEOUT)
            .build()?;

        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// A request carrying the session's bearer token. Refuses without one.
    fn authed(&self, method: Method, path: &str, session: &Session) -> ClientResult<RequestBuilder> {
        let token = session.bearer().ok_or(ClientError::NotSignedIn)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let res = builder.send()?;
        let status = res.status().as_u16();
        let body = res.text()?;

        decode_body(status, &body)
    }


    pub fn register(&self, session: &mut Session, username: &str, email: &str, password: &str)
        -> ClientResult<AccountSummary> {

        let builder = self.request(Method::POST, "/users/register")
            .json(&serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            }));
        let body: SignedInBody = self.send(builder)?;

        session.set(body.token, body.user.clone(), false);
        Ok(body.user)
    }

    pub fn login(&self, session: &mut Session, login: &str, password: &str)
        -> ClientResult<AccountSummary> {

        self.sign_in(session, "/users/login", login, password, false)
    }

    pub fn admin_login(&self, session: &mut Session, login: &str, password: &str)
        -> ClientResult<AccountSummary> {

        self.sign_in(session, "/admin/login", login, password, true)
    }

    fn sign_in(&self, session: &mut Session, path: &str, login: &str, password: &str,
        is_admin: bool) -> ClientResult<AccountSummary> {

        let builder = self.request(Method::POST, path)
            .json(&serde_json::json!({ "username": login, "password": password }));
        let body: SignedInBody = self.send(builder)?;

        session.set(body.token, body.user.clone(), is_admin);
        Ok(body.user)
    }

    pub fn profile(&self, session: &Session) -> ClientResult<AccountSummary> {
        let path = if session.is_admin() { "/admin/profile" } else { "/users/profile" };
        let body: AccountBody = self.send(self.authed(Method::GET, path, session)?)?;
        Ok(body.user)
    }

    pub fn stats(&self, session: &Session) -> ClientResult<StatsSummary> {
        let body: StatsBody = self.send(self.authed(Method::GET, "/admin/stats", session)?)?;
        Ok(body.stats)
    }

    /// Submits a report, attributed to the session's user when signed in.
    pub fn submit_incident(&self, session: &Session, report: &NewReport) -> ClientResult<i32> {
        let mut builder = self.request(Method::POST, "/incidents").json(report);
        if let Some(token) = session.bearer() {
            builder = builder.bearer_auth(token);
        }

        let body: CreatedBody = self.send(builder)?;
        Ok(body.incident_id)
    }

    pub fn incidents(&self, query: &IncidentQuery) -> ClientResult<Vec<IncidentSummary>> {
        let body: IncidentListBody = self.send(self.list_request(query))?;
        Ok(body.incidents)
    }

    fn list_request(&self, query: &IncidentQuery) -> RequestBuilder {
        self.request(Method::GET, "/incidents").query(query)
    }

    pub fn incident(&self, id: i32) -> ClientResult<(IncidentSummary, Vec<AuditEntry>)> {
        let body: IncidentDetailBody =
            self.send(self.request(Method::GET, &format!("/incidents/{}", id)))?;
        Ok((body.incident, body.admin_actions))
    }

    pub fn update_incident(&self, session: &Session, id: i32, update: &IncidentUpdate)
        -> ClientResult<String> {

        let builder = self.authed(Method::PUT, &format!("/incidents/{}", id), session)?
            .json(update);
        let body: MessageBody = self.send(builder)?;
        Ok(body.message)
    }

    pub fn delete_incident(&self, session: &Session, id: i32) -> ClientResult<String> {
        let builder = self.authed(Method::DELETE, &format!("/incidents/{}", id), session)?;
        let body: MessageBody = self.send(builder)?;
        Ok(body.message)
    }

    pub fn markers(&self) -> ClientResult<Vec<MarkerSummary>> {
        let body: MarkersBody = self.send(self.request(Method::GET, "/incidents/map/markers"))?;
        Ok(body.markers)
    }
}
