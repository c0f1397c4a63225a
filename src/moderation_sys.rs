//! Incident lifecycle: public submission, admin edits with their audit trail,
//! reporter flagging, and the read side used by the map and the dashboard.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Deserialize;

use crate::db::{
    models::*,
    IncidentEdit, IncidentFilter, Store, StoreError, DEFAULT_LIST_LIMIT,
};
use crate::util;


const DEFAULT_CATEGORY: &str = "General";
const RECENT_WINDOW_DAYS: i64 = 7;
const MAX_TITLE_LEN: usize = 255;
const MAX_TEXT_LEN: usize = 65535;
const MAX_CATEGORY_LEN: usize = 100;
const EDIT_ATTEMPTS: u32 = 3;


#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("{0}")]
    Invalid(String),
    #[error("No valid updates provided")]
    NoChanges,
    #[error("Incident not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ModerationResult<T> = Result<T, ModerationError>;


#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSubmission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub edit: IncidentEdit,
    pub reporter: Option<ReporterStanding>,
}


fn parse_choice<T>(value: Option<&str>, label: &str) -> ModerationResult<Option<T>>
    where T: FromStr {

    match util::non_blank(value) {
        Some(text) => text.parse()
            .map(Some)
            .map_err(|_| ModerationError::Invalid(format!("Invalid {} value: {}", label, text))),
        None => Ok(None),
    }
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}


pub fn submit_incident(
    store: &dyn Store,
    submission: &IncidentSubmission,
    reporter: Option<i32>,
    ip_address: Option<String>,
    now: DateTime<Utc>,
) -> ModerationResult<Incident> {

    let title = util::non_blank(submission.title.as_deref());
    let description = util::non_blank(submission.description.as_deref());
    let (title, description, latitude, longitude) = match (
        title, description, submission.latitude, submission.longitude,
    ) {
        (Some(t), Some(d), Some(lat), Some(lng)) => (t, d, lat, lng),
        _ => return Err(ModerationError::Invalid(
            "Title, description, and location are required".into())),
    };

    if !valid_coordinates(latitude, longitude) {
        return Err(ModerationError::Invalid("Location is out of range".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ModerationError::Invalid(
            format!("The maximum length of the title is {}", MAX_TITLE_LEN)));
    }
    if description.chars().count() > MAX_TEXT_LEN {
        return Err(ModerationError::Invalid(
            format!("The maximum length of the description is {}", MAX_TEXT_LEN)));
    }
    let category = util::non_blank(submission.category.as_deref())
        .unwrap_or_else(|| DEFAULT_CATEGORY.into());
    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(ModerationError::Invalid(
            format!("The maximum length of the category is {}", MAX_CATEGORY_LEN)));
    }

    let priority = parse_choice::<Priority>(submission.priority.as_deref(), "priority")?
        .unwrap_or_default();

    let new_incident = NewIncident {
        title,
        description,
        latitude,
        longitude,
        location_address: util::non_blank(submission.location_address.as_deref()),
        category,
        priority,
        status: IncidentStatus::Pending,
        user_id: reporter,
        ip_address,
        reported_at: now,
    };

    let incident = store.insert_incident(&new_incident)?;
    info!("Incident {} reported ({}, {})", incident.id,
        incident.category, reporter.map_or("anonymous".into(), |id| format!("user {}", id)));

    Ok(incident)
}


/// Works out every row change an edit implies, without touching the store.
pub fn plan_edit(
    current: &Incident,
    admin_id: i32,
    request: &EditRequest,
    now: DateTime<Utc>,
) -> ModerationResult<IncidentEdit> {

    let status = parse_choice::<IncidentStatus>(request.status.as_deref(), "status")?;
    let priority = parse_choice::<Priority>(request.priority.as_deref(), "priority")?;
    let notes = util::non_blank(request.admin_notes.as_deref());

    let audit = |action_type, old_value: Option<&str>, new_value: Option<&str>, notes: Option<&str>| {
        NewAdminAction {
            incident_id: current.id,
            admin_id,
            action_type,
            old_value: old_value.map(str::to_owned),
            new_value: new_value.map(str::to_owned),
            notes: notes.map(str::to_owned),
            action_timestamp: now,
        }
    };

    let mut edit = IncidentEdit {
        incident_id: current.id,
        seen_status: current.status,
        seen_priority: current.priority,
        status: None,
        resolved_at: None,
        priority: None,
        admin_notes: None,
        actions: Vec::new(),
        false_report_user: None,
    };

    if let Some(status) = status.filter(|s| *s != current.status) {
        edit.actions.push(audit(ActionType::StatusChange,
            Some(current.status.as_str()), Some(status.as_str()), None));
        edit.status = Some(status);

        match status {
            IncidentStatus::Resolved => edit.resolved_at = Some(now),
            IncidentStatus::FalseReport => edit.false_report_user = current.user_id,
            _ => (),
        }
    }

    if let Some(priority) = priority.filter(|p| *p != current.priority) {
        edit.actions.push(audit(ActionType::PriorityChange,
            Some(current.priority.as_str()), Some(priority.as_str()), None));
        edit.priority = Some(priority);
    }

    if let Some(notes) = notes {
        edit.actions.push(audit(ActionType::NoteAdded, None, None, Some(notes.as_str())));
        edit.admin_notes = Some(notes);
    }

    if edit.actions.is_empty() {
        return Err(ModerationError::NoChanges);
    }

    Ok(edit)
}

pub fn edit_incident(
    store: &dyn Store,
    incident_id: i32,
    admin_id: i32,
    request: &EditRequest,
    now: DateTime<Utc>,
) -> ModerationResult<EditOutcome> {

    let mut attempts = 0;
    let (edit, reporter) = loop {
        let current = store.get_incident(incident_id)?
            .ok_or(ModerationError::NotFound)?;
        let edit = plan_edit(&current, admin_id, request, now)?;

        // A concurrent edit landed between the read and the lock: plan again.
        match store.apply_edit(&edit) {
            Ok(reporter) => break (edit, reporter),
            Err(StoreError::Stale) if attempts + 1 < EDIT_ATTEMPTS => attempts += 1,
            Err(StoreError::NotFound) => return Err(ModerationError::NotFound),
            Err(err) => return Err(ModerationError::Store(err)),
        }
    };

    info!("Incident {} edited by admin {} ({} action(s))",
        incident_id, admin_id, edit.actions.len());
    if let Some(standing) = reporter.filter(|s| s.is_flagged) {
        info!("User {} is flagged with {} false reports",
            standing.user_id, standing.false_report_count);
    }

    Ok(EditOutcome { edit, reporter })
}


pub fn list_incidents(store: &dyn Store, query: &ListQuery) -> ModerationResult<Vec<IncidentView>> {
    let filter = IncidentFilter {
        status: parse_choice(query.status.as_deref(), "status")?,
        category: util::non_blank(query.category.as_deref()),
        priority: parse_choice(query.priority.as_deref(), "priority")?,
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    };

    Ok(store.list_incidents(&filter)?)
}

pub fn incident_detail(store: &dyn Store, incident_id: i32)
    -> ModerationResult<(IncidentView, Vec<AdminActionView>)> {

    let incident = store.get_incident_view(incident_id)?
        .ok_or(ModerationError::NotFound)?;
    let actions = store.list_admin_actions(incident_id)?;

    Ok((incident, actions))
}

pub fn map_markers(store: &dyn Store) -> ModerationResult<Vec<Marker>> {
    Ok(store.list_markers()?)
}

pub fn delete_incident(store: &dyn Store, incident_id: i32, admin_id: i32) -> ModerationResult<()> {
    if store.delete_incident(incident_id)? {
        info!("Incident {} deleted by admin {}", incident_id, admin_id);
        Ok(())
    }
    else {
        Err(ModerationError::NotFound)
    }
}

pub fn stats(store: &dyn Store, now: DateTime<Utc>) -> ModerationResult<Stats> {
    Ok(store.stats(now - Duration::days(RECENT_WINDOW_DAYS))?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn incident(status: IncidentStatus, user_id: Option<i32>) -> Incident {
        Incident {
            id: 10,
            title: "Flooded road".into(),
            description: "Water over the bridge".into(),
            latitude: 8.3833,
            longitude: 124.8333,
            location_address: None,
            category: "Flood".into(),
            priority: Priority::Medium,
            status,
            user_id,
            ip_address: None,
            admin_notes: None,
            reported_at: Utc::now(),
            resolved_at: None,
        }
    }

    fn edit_of(status: Option<&str>, priority: Option<&str>, notes: Option<&str>) -> EditRequest {
        EditRequest {
            status: status.map(Into::into),
            priority: priority.map(Into::into),
            admin_notes: notes.map(Into::into),
        }
    }

    fn submission(title: &str) -> IncidentSubmission {
        IncidentSubmission {
            title: Some(title.into()),
            description: Some("Something happened".into()),
            latitude: Some(8.3833),
            longitude: Some(124.8333),
            ..Default::default()
        }
    }

    #[test]
    fn status_change_is_audited_with_old_value() {
        let now = Utc::now();
        let edit = plan_edit(&incident(IncidentStatus::Pending, None), 3,
            &edit_of(Some("Verified"), None, None), now).unwrap();

        assert_eq!(edit.status, Some(IncidentStatus::Verified));
        assert_eq!(edit.actions.len(), 1);
        assert_eq!(edit.actions[0].action_type, ActionType::StatusChange);
        assert_eq!(edit.actions[0].old_value.as_deref(), Some("Pending"));
        assert_eq!(edit.actions[0].new_value.as_deref(), Some("Verified"));
        assert_eq!(edit.actions[0].admin_id, 3);
        assert_eq!(edit.resolved_at, None);
    }

    #[test]
    fn resolving_stamps_resolved_at() {
        let now = Utc::now();
        let edit = plan_edit(&incident(IncidentStatus::InProgress, None), 1,
            &edit_of(Some("Resolved"), None, None), now).unwrap();

        assert_eq!(edit.resolved_at, Some(now));
    }

    #[test]
    fn false_report_targets_reporter_only_when_known() {
        let now = Utc::now();
        let request = edit_of(Some("False Report"), None, None);

        let known = plan_edit(&incident(IncidentStatus::Pending, Some(5)), 1, &request, now).unwrap();
        let anonymous = plan_edit(&incident(IncidentStatus::Pending, None), 1, &request, now).unwrap();

        assert_eq!(known.false_report_user, Some(5));
        assert_eq!(anonymous.false_report_user, None);
        assert_eq!(anonymous.actions.len(), 1);
    }

    #[test]
    fn status_priority_and_note_in_one_edit() {
        let edit = plan_edit(&incident(IncidentStatus::Pending, None), 1,
            &edit_of(Some("Verified"), Some("Critical"), Some("Crew dispatched")), Utc::now()).unwrap();

        let kinds = edit.actions.iter().map(|a| a.action_type).collect::<Vec<_>>();
        assert_eq!(kinds, [ActionType::StatusChange, ActionType::PriorityChange, ActionType::NoteAdded]);
        assert_eq!(edit.actions[2].notes.as_deref(), Some("Crew dispatched"));
        assert_eq!(edit.actions[2].old_value, None);
        assert_eq!(edit.admin_notes.as_deref(), Some("Crew dispatched"));
        assert_eq!(edit.priority, Some(Priority::Critical));
    }

    #[test]
    fn unchanged_or_empty_edit_is_rejected() {
        let current = incident(IncidentStatus::Pending, None);

        for request in [
            EditRequest::default(),
            edit_of(Some("Pending"), Some("Medium"), None),
            edit_of(None, None, Some("   ")),
        ] {
            assert!(matches!(plan_edit(&current, 1, &request, Utc::now()),
                Err(ModerationError::NoChanges)));
        }
    }

    #[test]
    fn unknown_status_is_invalid() {
        let result = plan_edit(&incident(IncidentStatus::Pending, None), 1,
            &edit_of(Some("Closed"), None, None), Utc::now());

        assert!(matches!(result, Err(ModerationError::Invalid(_))));
    }

    #[test]
    fn submission_defaults_and_validation() {
        let store = MemoryStore::new();

        let created = submit_incident(&store, &submission("Fire"), None, None, Utc::now()).unwrap();
        assert_eq!(created.status, IncidentStatus::Pending);
        assert_eq!(created.priority, Priority::Medium);
        assert_eq!(created.category, "General");

        let mut missing = submission("Fire");
        missing.latitude = None;
        assert!(matches!(submit_incident(&store, &missing, None, None, Utc::now()),
            Err(ModerationError::Invalid(_))));

        let mut far = submission("Fire");
        far.latitude = Some(91.0);
        assert!(matches!(submit_incident(&store, &far, None, None, Utc::now()),
            Err(ModerationError::Invalid(_))));

        let mut bad_priority = submission("Fire");
        bad_priority.priority = Some("Urgent".into());
        assert!(matches!(submit_incident(&store, &bad_priority, None, None, Utc::now()),
            Err(ModerationError::Invalid(_))));
    }

    #[test]
    fn edit_then_resolve_keeps_resolved_at() {
        let store = MemoryStore::new();
        let created = submit_incident(&store, &submission("Fire"), None, None, Utc::now()).unwrap();

        edit_incident(&store, created.id, 1, &edit_of(Some("Resolved"), None, None), Utc::now()).unwrap();
        let resolved_at = store.get_incident(created.id).unwrap().unwrap().resolved_at;
        assert!(resolved_at.is_some());

        edit_incident(&store, created.id, 1, &edit_of(Some("Verified"), None, None), Utc::now()).unwrap();
        assert_eq!(store.get_incident(created.id).unwrap().unwrap().resolved_at, resolved_at);
    }

    #[test]
    fn edits_planned_from_one_read_count_false_report_once() {
        let store = MemoryStore::new();
        let reporter = store.insert_user(&NewUser {
            username: "maria".into(),
            email: "maria@example.com".into(),
            password_hash: "hash".into(),
            ip_address: None,
            created_at: Utc::now(),
        }).unwrap();
        let created = submit_incident(&store, &submission("Fire"), Some(reporter.id), None, Utc::now())
            .unwrap();

        let request = edit_of(Some("False Report"), None, None);
        let seen = store.get_incident(created.id).unwrap().unwrap();
        let first = plan_edit(&seen, 1, &request, Utc::now()).unwrap();
        let second = plan_edit(&seen, 2, &request, Utc::now()).unwrap();

        assert!(store.apply_edit(&first).is_ok());
        assert!(matches!(store.apply_edit(&second), Err(StoreError::Stale)));

        // Going through edit_incident re-reads the row and finds nothing left to do.
        assert!(matches!(edit_incident(&store, created.id, 2, &request, Utc::now()),
            Err(ModerationError::NoChanges)));

        let user = store.get_user(reporter.id).unwrap().unwrap();
        assert_eq!(user.false_report_count, 1);
        assert_eq!(store.list_admin_actions(created.id).unwrap().len(), 1);
    }

    #[test]
    fn edit_replans_against_the_current_row() {
        let store = MemoryStore::new();
        let created = submit_incident(&store, &submission("Fire"), None, None, Utc::now()).unwrap();
        let seen = store.get_incident(created.id).unwrap().unwrap();

        edit_incident(&store, created.id, 1, &edit_of(Some("Verified"), None, None), Utc::now()).unwrap();
        let outdated = plan_edit(&seen, 2, &edit_of(Some("Resolved"), None, None), Utc::now()).unwrap();
        assert!(matches!(store.apply_edit(&outdated), Err(StoreError::Stale)));

        let outcome = edit_incident(&store, created.id, 2,
            &edit_of(Some("Resolved"), None, None), Utc::now()).unwrap();
        assert_eq!(outcome.edit.actions[0].old_value.as_deref(), Some("Verified"));
    }

    #[test]
    fn submission_lengths_are_counted_in_characters() {
        let store = MemoryStore::new();

        let mut long_category = submission("Fire");
        long_category.category = Some("c".repeat(MAX_CATEGORY_LEN + 1));
        match submit_incident(&store, &long_category, None, None, Utc::now()) {
            Err(ModerationError::Invalid(message)) =>
                assert_eq!(message, "The maximum length of the category is 100"),
            other => panic!("unexpected result: {:?}", other),
        }

        let mut full_category = submission("Fire");
        full_category.category = Some("c".repeat(MAX_CATEGORY_LEN));
        assert!(submit_incident(&store, &full_category, None, None, Utc::now()).is_ok());

        // 255 two-byte characters: over the limit in bytes, within it in characters.
        let wide_title = "é".repeat(MAX_TITLE_LEN);
        assert!(submit_incident(&store, &submission(&wide_title), None, None, Utc::now()).is_ok());

        let long_title = "é".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(submit_incident(&store, &submission(&long_title), None, None, Utc::now()),
            Err(ModerationError::Invalid(_))));
    }

    #[test]
    fn missing_incident_is_not_found() {
        let store = MemoryStore::new();

        assert!(matches!(edit_incident(&store, 99, 1, &edit_of(Some("Verified"), None, None), Utc::now()),
            Err(ModerationError::NotFound)));
        assert!(matches!(delete_incident(&store, 99, 1), Err(ModerationError::NotFound)));
        assert!(matches!(incident_detail(&store, 99), Err(ModerationError::NotFound)));
    }

    #[test]
    fn list_rejects_unknown_filter_values() {
        let store = MemoryStore::new();
        let query = ListQuery { status: Some("Done".into()), ..Default::default() };

        assert!(matches!(list_incidents(&store, &query), Err(ModerationError::Invalid(_))));
    }
}
