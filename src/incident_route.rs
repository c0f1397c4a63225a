use chrono::Utc;
use rocket::{
    http::Status,
    serde::json::{self, json, Json},
    State,
};

use crate::api_error::{invalid_body, make_json_result, JsonResult, ResultExt};
use crate::guard::{AdminClaims, ClientIp, MaybeReporter};
use crate::moderation_sys::{self, EditRequest, IncidentSubmission, ListQuery};
use crate::AppState;


#[post("/incidents", data = "<body>")]
pub fn post_incident(state: &State<AppState>, reporter: MaybeReporter, ip: ClientIp,
    body: Result<Json<IncidentSubmission>, json::Error<'_>>) -> JsonResult {

    let body = body.map_err(invalid_body)?;
    let reporter_id = reporter.0.map(|claims| claims.id);
    let incident = moderation_sys::submit_incident(
            state.store.as_ref(), &body, reporter_id, ip.0, Utc::now())
        .during("creating incident report")?;

    make_json_result(Status::Created, json!({
        "success": true,
        "message": "Incident report created successfully",
        "incidentId": incident.id,
    }))
}

#[get("/incidents?<status>&<category>&<priority>&<limit>")]
pub fn get_incidents(state: &State<AppState>, status: Option<String>,
    category: Option<String>, priority: Option<String>, limit: Option<i64>) -> JsonResult {

    let query = ListQuery { status, category, priority, limit };
    let incidents = moderation_sys::list_incidents(state.store.as_ref(), &query)
        .during("fetching incidents")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "count": incidents.len(),
        "incidents": incidents,
    }))
}

#[get("/incidents/<id>")]
pub fn get_incident(state: &State<AppState>, id: i32) -> JsonResult {
    let (incident, actions) = moderation_sys::incident_detail(state.store.as_ref(), id)
        .during("fetching incident")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "incident": incident,
        "adminActions": actions,
    }))
}

#[put("/incidents/<id>", data = "<body>")]
pub fn put_incident(state: &State<AppState>, claims: AdminClaims, id: i32,
    body: Result<Json<EditRequest>, json::Error<'_>>) -> JsonResult {

    let body = body.map_err(invalid_body)?;
    let outcome = moderation_sys::edit_incident(
            state.store.as_ref(), id, claims.0.id, &body, Utc::now())
        .during("updating incident")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "message": "Incident updated successfully",
        "actions": outcome.edit.actions.len(),
        "reporter": outcome.reporter,
    }))
}

#[delete("/incidents/<id>")]
pub fn delete_incident(state: &State<AppState>, claims: AdminClaims, id: i32) -> JsonResult {
    moderation_sys::delete_incident(state.store.as_ref(), id, claims.0.id)
        .during("deleting incident")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "message": "Incident deleted successfully",
    }))
}

#[get("/incidents/map/markers")]
pub fn get_markers(state: &State<AppState>) -> JsonResult {
    let markers = moderation_sys::map_markers(state.store.as_ref())
        .during("fetching map markers")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "markers": markers,
    }))
}
