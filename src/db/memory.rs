use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};

use super::models::*;
use super::{
    IncidentEdit, IncidentFilter, Store, StoreError, StoreResult,
    FLAG_THRESHOLD, MAX_LIST_LIMIT,
};


#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    admins: BTreeMap<i32, Admin>,
    incidents: BTreeMap<i32, Incident>,
    actions: BTreeMap<i32, AdminAction>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn incident_view(&self, incident: &Incident, with_email: bool) -> IncidentView {
        let reporter = incident.user_id.and_then(|id| self.users.get(&id));

        IncidentView {
            incident: incident.clone(),
            username: reporter.map(|u| u.username.clone()),
            user_flagged: reporter.map(|u| u.is_flagged),
            user_email: reporter.filter(|_| with_email).map(|u| u.email.clone()),
        }
    }
}


/// Keeps every table in process memory. Used by tests and database-less development runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock()
            .map_err(|_| StoreError::Connection("memory store poisoned".into()))
    }
}


impl Store for MemoryStore {
    fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut tables = self.lock()?;
        let taken = tables.users.values()
            .any(|u| u.username == user.username || u.email == user.email);
        if taken {
            return Err(StoreError::Conflict);
        }

        let id = tables.next_id();
        let row = User {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            ip_address: user.ip_address.clone(),
            false_report_count: 0,
            is_flagged: false,
            created_at: user.created_at,
            last_login: None,
        };
        tables.users.insert(id, row.clone());

        Ok(row)
    }

    fn user_exists(&self, username: &str, email: &str) -> StoreResult<bool> {
        let tables = self.lock()?;
        Ok(tables.users.values().any(|u| u.username == username || u.email == email))
    }

    fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        let tables = self.lock()?;
        Ok(tables.users.values()
            .find(|u| u.username == login || u.email == login)
            .cloned())
    }

    fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn record_user_login(&self, id: i32, ip_address: Option<&str>, at: DateTime<Utc>)
        -> StoreResult<()> {

        let mut tables = self.lock()?;
        if let Some(user) = tables.users.get_mut(&id) {
            user.last_login = Some(at);
            if let Some(ip) = ip_address {
                user.ip_address = Some(ip.to_owned());
            }
        }

        Ok(())
    }

    fn insert_admin(&self, admin: &NewAdmin) -> StoreResult<Admin> {
        let mut tables = self.lock()?;
        let taken = tables.admins.values()
            .any(|a| a.username == admin.username || a.email == admin.email);
        if taken {
            return Err(StoreError::Conflict);
        }

        let id = tables.next_id();
        let row = Admin {
            id,
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash: admin.password_hash.clone(),
            full_name: admin.full_name.clone(),
            role: admin.role.clone(),
            created_at: admin.created_at,
            last_login: None,
        };
        tables.admins.insert(id, row.clone());

        Ok(row)
    }

    fn find_admin_by_login(&self, login: &str) -> StoreResult<Option<Admin>> {
        let tables = self.lock()?;
        Ok(tables.admins.values()
            .find(|a| a.username == login || a.email == login)
            .cloned())
    }

    fn get_admin(&self, id: i32) -> StoreResult<Option<Admin>> {
        Ok(self.lock()?.admins.get(&id).cloned())
    }

    fn record_admin_login(&self, id: i32, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.lock()?;
        if let Some(admin) = tables.admins.get_mut(&id) {
            admin.last_login = Some(at);
        }

        Ok(())
    }

    fn insert_incident(&self, incident: &NewIncident) -> StoreResult<Incident> {
        let mut tables = self.lock()?;
        let id = tables.next_id();
        let row = Incident {
            id,
            title: incident.title.clone(),
            description: incident.description.clone(),
            latitude: incident.latitude,
            longitude: incident.longitude,
            location_address: incident.location_address.clone(),
            category: incident.category.clone(),
            priority: incident.priority,
            status: incident.status,
            user_id: incident.user_id,
            ip_address: incident.ip_address.clone(),
            admin_notes: None,
            reported_at: incident.reported_at,
            resolved_at: None,
        };
        tables.incidents.insert(id, row.clone());

        Ok(row)
    }

    fn get_incident(&self, id: i32) -> StoreResult<Option<Incident>> {
        Ok(self.lock()?.incidents.get(&id).cloned())
    }

    fn get_incident_view(&self, id: i32) -> StoreResult<Option<IncidentView>> {
        let tables = self.lock()?;
        Ok(tables.incidents.get(&id).map(|i| tables.incident_view(i, true)))
    }

    fn list_incidents(&self, filter: &IncidentFilter) -> StoreResult<Vec<IncidentView>> {
        let tables = self.lock()?;
        let mut rows = tables.incidents.values()
            .filter(|i| filter.matches(i))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| (b.reported_at, b.id).cmp(&(a.reported_at, a.id)));

        Ok(rows.into_iter()
            .take(filter.limit.clamp(1, MAX_LIST_LIMIT) as usize)
            .map(|i| tables.incident_view(i, false))
            .collect())
    }

    fn list_admin_actions(&self, incident_id: i32) -> StoreResult<Vec<AdminActionView>> {
        let tables = self.lock()?;
        let mut rows = tables.actions.values()
            .filter(|a| a.incident_id == incident_id)
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| (b.action_timestamp, b.id).cmp(&(a.action_timestamp, a.id)));

        Ok(rows.into_iter()
            .map(|action| {
                let admin = tables.admins.get(&action.admin_id);
                AdminActionView {
                    action: action.clone(),
                    admin_username: admin.map(|a| a.username.clone()),
                    admin_name: admin.map(|a| a.full_name.clone()),
                }
            })
            .collect())
    }

    fn list_markers(&self) -> StoreResult<Vec<Marker>> {
        let tables = self.lock()?;
        let mut rows = tables.incidents.values()
            .map(Marker::from)
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| (b.reported_at, b.id).cmp(&(a.reported_at, a.id)));

        Ok(rows)
    }

    fn apply_edit(&self, edit: &IncidentEdit) -> StoreResult<Option<ReporterStanding>> {
        // Held for the whole edit.
        let mut tables = self.lock()?;
        let current = tables.incidents.get(&edit.incident_id)
            .map(|i| (i.status, i.priority))
            .ok_or(StoreError::NotFound)?;
        if current != (edit.seen_status, edit.seen_priority) {
            return Err(StoreError::Stale);
        }

        for action in &edit.actions {
            let id = tables.next_id();
            tables.actions.insert(id, AdminAction {
                id,
                incident_id: action.incident_id,
                admin_id: action.admin_id,
                action_type: action.action_type,
                old_value: action.old_value.clone(),
                new_value: action.new_value.clone(),
                notes: action.notes.clone(),
                action_timestamp: action.action_timestamp,
            });
        }

        if let Some(incident) = tables.incidents.get_mut(&edit.incident_id) {
            if let Some(status) = edit.status {
                incident.status = status;
            }
            if let Some(resolved_at) = edit.resolved_at {
                incident.resolved_at = Some(resolved_at);
            }
            if let Some(priority) = edit.priority {
                incident.priority = priority;
            }
            if let Some(notes) = &edit.admin_notes {
                incident.admin_notes = Some(notes.clone());
            }
        }

        let reporter = match edit.false_report_user {
            Some(user_id) => tables.users.get_mut(&user_id),
            None => None,
        };
        let standing = reporter.map(|user| {
            user.false_report_count += 1;
            user.is_flagged = user.is_flagged || user.false_report_count >= FLAG_THRESHOLD;

            ReporterStanding {
                user_id: user.id,
                false_report_count: user.false_report_count,
                is_flagged: user.is_flagged,
            }
        });

        Ok(standing)
    }

    fn delete_incident(&self, id: i32) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        let removed = tables.incidents.remove(&id).is_some();
        if removed {
            tables.actions.retain(|_, a| a.incident_id != id);
        }

        Ok(removed)
    }

    fn stats(&self, recent_since: DateTime<Utc>) -> StoreResult<Stats> {
        let tables = self.lock()?;

        let status_breakdown = IncidentStatus::ALL.iter()
            .map(|&status| StatusCount {
                status,
                count: tables.incidents.values().filter(|i| i.status == status).count() as i64,
            })
            .filter(|sc| sc.count > 0)
            .collect();

        Ok(Stats {
            total_reports: tables.incidents.len() as i64,
            recent_reports: tables.incidents.values()
                .filter(|i| i.reported_at >= recent_since)
                .count() as i64,
            flagged_users: tables.users.values().filter(|u| u.is_flagged).count() as i64,
            status_breakdown,
        })
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{}@example.com", name),
            password_hash: "hash".into(),
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    fn new_incident(title: &str, user_id: Option<i32>, at: DateTime<Utc>) -> NewIncident {
        NewIncident {
            title: title.into(),
            description: "desc".into(),
            latitude: 8.38,
            longitude: 124.83,
            location_address: None,
            category: "General".into(),
            priority: Priority::Medium,
            status: IncidentStatus::Pending,
            user_id,
            ip_address: None,
            reported_at: at,
        }
    }

    fn false_report_edit(incident_id: i32, user_id: i32) -> IncidentEdit {
        IncidentEdit {
            incident_id,
            seen_status: IncidentStatus::Pending,
            seen_priority: Priority::Medium,
            status: Some(IncidentStatus::FalseReport),
            resolved_at: None,
            priority: None,
            admin_notes: None,
            actions: Vec::new(),
            false_report_user: Some(user_id),
        }
    }

    #[test]
    fn duplicate_username_or_email_conflicts() {
        let store = MemoryStore::new();
        store.insert_user(&new_user("alice")).unwrap();

        let mut same_email = new_user("bob");
        same_email.email = "alice@example.com".into();

        assert!(matches!(store.insert_user(&new_user("alice")), Err(StoreError::Conflict)));
        assert!(matches!(store.insert_user(&same_email), Err(StoreError::Conflict)));
        assert!(store.user_exists("nobody", "alice@example.com").unwrap());
    }

    #[test]
    fn third_false_report_flags_reporter() {
        let store = MemoryStore::new();
        let user = store.insert_user(&new_user("carol")).unwrap();
        let mut standings = (0..3).map(|n| {
            let incident = store.insert_incident(
                &new_incident(&format!("fake {}", n), Some(user.id), Utc::now())).unwrap();
            store.apply_edit(&false_report_edit(incident.id, user.id)).unwrap().unwrap()
        });

        let first = standings.next().unwrap();
        let second = standings.next().unwrap();
        let third = standings.next().unwrap();

        assert_eq!((first.false_report_count, first.is_flagged), (1, false));
        assert_eq!((second.false_report_count, second.is_flagged), (2, false));
        assert_eq!((third.false_report_count, third.is_flagged), (3, true));
    }

    #[test]
    fn edit_planned_from_outdated_row_is_refused() {
        let store = MemoryStore::new();
        let user = store.insert_user(&new_user("dave")).unwrap();
        let incident = store.insert_incident(&new_incident("x", Some(user.id), Utc::now())).unwrap();

        let mut edit = false_report_edit(incident.id, user.id);
        edit.actions.push(NewAdminAction {
            incident_id: incident.id,
            admin_id: 1,
            action_type: ActionType::StatusChange,
            old_value: Some("Pending".into()),
            new_value: Some("False Report".into()),
            notes: None,
            action_timestamp: Utc::now(),
        });

        store.apply_edit(&edit).unwrap();
        assert!(matches!(store.apply_edit(&edit), Err(StoreError::Stale)));

        assert_eq!(store.get_user(user.id).unwrap().unwrap().false_report_count, 1);
        assert_eq!(store.list_admin_actions(incident.id).unwrap().len(), 1);
    }

    #[test]
    fn edit_of_missing_incident_writes_nothing() {
        let store = MemoryStore::new();
        let mut edit = false_report_edit(42, 7);
        edit.actions.push(NewAdminAction {
            incident_id: 42,
            admin_id: 1,
            action_type: ActionType::StatusChange,
            old_value: Some("Pending".into()),
            new_value: Some("False Report".into()),
            notes: None,
            action_timestamp: Utc::now(),
        });

        assert!(matches!(store.apply_edit(&edit), Err(StoreError::NotFound)));
        assert!(store.list_admin_actions(42).unwrap().is_empty());
    }

    #[test]
    fn delete_cascades_audit_rows() {
        let store = MemoryStore::new();
        let incident = store.insert_incident(&new_incident("x", None, Utc::now())).unwrap();
        let mut edit = false_report_edit(incident.id, 0);
        edit.false_report_user = None;
        edit.actions.push(NewAdminAction {
            incident_id: incident.id,
            admin_id: 1,
            action_type: ActionType::NoteAdded,
            old_value: None,
            new_value: None,
            notes: Some("checked".into()),
            action_timestamp: Utc::now(),
        });
        store.apply_edit(&edit).unwrap();
        assert_eq!(store.list_admin_actions(incident.id).unwrap().len(), 1);

        assert!(store.delete_incident(incident.id).unwrap());
        assert!(!store.delete_incident(incident.id).unwrap());
        assert!(store.list_admin_actions(incident.id).unwrap().is_empty());
    }

    #[test]
    fn list_orders_newest_first_and_honours_limit() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_incident(&new_incident("old", None, now - Duration::hours(2))).unwrap();
        store.insert_incident(&new_incident("new", None, now)).unwrap();
        store.insert_incident(&new_incident("mid", None, now - Duration::hours(1))).unwrap();

        let all = store.list_incidents(&IncidentFilter::default()).unwrap();
        let titles = all.iter().map(|v| v.incident.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, ["new", "mid", "old"]);

        let limited = store.list_incidents(&IncidentFilter { limit: 1, ..Default::default() }).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].incident.title, "new");
    }
}
