use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::models::*;
use super::schema::{admin_actions, admins, incident_reports, users};
use super::{
    IncidentEdit, IncidentFilter, Store, StoreError, StoreResult,
    FLAG_THRESHOLD, MAX_LIST_LIMIT,
};


type PgManager = ConnectionManager<PgConnection>;


/// PostgreSQL backed store.
pub struct PgStore {
    pool: Pool<PgManager>,
}

impl PgStore {
    pub fn connect(database_url: &str, pool_size: u32) -> StoreResult<Self> {
        let manager = PgManager::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::new(5, 0))
            .build(manager)
            .map_err(|err| StoreError::Connection(err.to_string()))?;

        Ok(PgStore { pool })
    }

    fn conn(&self) -> StoreResult<PooledConnection<PgManager>> {
        Ok(self.pool.get()?)
    }
}


#[derive(AsChangeset)]
#[diesel(table_name = incident_reports)]
struct IncidentChanges<'a> {
    status: Option<IncidentStatus>,
    resolved_at: Option<DateTime<Utc>>,
    priority: Option<Priority>,
    admin_notes: Option<&'a str>,
}

impl<'a> IncidentChanges<'a> {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.resolved_at.is_none()
            && self.priority.is_none()
            && self.admin_notes.is_none()
    }
}


fn unique_as_conflict(err: DieselError) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => StoreError::Conflict,
        other => StoreError::Query(other),
    }
}


impl Store for PgStore {
    fn insert_user(&self, user: &NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .map_err(unique_as_conflict)
    }

    fn user_exists(&self, username: &str, email: &str) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let count: i64 = users::table
            .filter(users::username.eq(username).or(users::email.eq(email)))
            .count()
            .get_result(&mut conn)?;

        Ok(count > 0)
    }

    fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::username.eq(login).or(users::email.eq(login)))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn record_user_login(&self, id: i32, ip_address: Option<&str>, at: DateTime<Utc>)
        -> StoreResult<()> {

        let mut conn = self.conn()?;
        let target = users::table.find(id);
        match ip_address {
            Some(ip) => diesel::update(target)
                .set((users::last_login.eq(at), users::ip_address.eq(ip)))
                .execute(&mut conn)?,
            None => diesel::update(target)
                .set(users::last_login.eq(at))
                .execute(&mut conn)?,
        };

        Ok(())
    }

    fn insert_admin(&self, admin: &NewAdmin) -> StoreResult<Admin> {
        let mut conn = self.conn()?;
        diesel::insert_into(admins::table)
            .values(admin)
            .returning(Admin::as_returning())
            .get_result(&mut conn)
            .map_err(unique_as_conflict)
    }

    fn find_admin_by_login(&self, login: &str) -> StoreResult<Option<Admin>> {
        let mut conn = self.conn()?;
        Ok(admins::table
            .filter(admins::username.eq(login).or(admins::email.eq(login)))
            .select(Admin::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn get_admin(&self, id: i32) -> StoreResult<Option<Admin>> {
        let mut conn = self.conn()?;
        Ok(admins::table
            .find(id)
            .select(Admin::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn record_admin_login(&self, id: i32, at: DateTime<Utc>) -> StoreResult<()> {
        let mut conn = self.conn()?;
        diesel::update(admins::table.find(id))
            .set(admins::last_login.eq(at))
            .execute(&mut conn)?;

        Ok(())
    }

    fn insert_incident(&self, incident: &NewIncident) -> StoreResult<Incident> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(incident_reports::table)
            .values(incident)
            .returning(Incident::as_returning())
            .get_result(&mut conn)?)
    }

    fn get_incident(&self, id: i32) -> StoreResult<Option<Incident>> {
        let mut conn = self.conn()?;
        Ok(incident_reports::table
            .find(id)
            .select(Incident::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn get_incident_view(&self, id: i32) -> StoreResult<Option<IncidentView>> {
        let mut conn = self.conn()?;
        let row = incident_reports::table
            .left_join(users::table)
            .filter(incident_reports::id.eq(id))
            .select((
                Incident::as_select(),
                users::username.nullable(),
                users::email.nullable(),
                users::is_flagged.nullable(),
            ))
            .first::<(Incident, Option<String>, Option<String>, Option<bool>)>(&mut conn)
            .optional()?;

        Ok(row.map(|(incident, username, user_email, user_flagged)| IncidentView {
            incident,
            username,
            user_flagged,
            user_email,
        }))
    }

    fn list_incidents(&self, filter: &IncidentFilter) -> StoreResult<Vec<IncidentView>> {
        let mut conn = self.conn()?;
        let mut query = incident_reports::table
            .left_join(users::table)
            .select((
                Incident::as_select(),
                users::username.nullable(),
                users::is_flagged.nullable(),
            ))
            .into_boxed();

        if let Some(status) = filter.status {
            query = query.filter(incident_reports::status.eq(status));
        }
        if let Some(category) = &filter.category {
            query = query.filter(incident_reports::category.eq(category));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(incident_reports::priority.eq(priority));
        }

        let rows = query
            .order((incident_reports::reported_at.desc(), incident_reports::id.desc()))
            .limit(filter.limit.clamp(1, MAX_LIST_LIMIT))
            .load::<(Incident, Option<String>, Option<bool>)>(&mut conn)?;

        Ok(rows.into_iter()
            .map(|(incident, username, user_flagged)| IncidentView {
                incident,
                username,
                user_flagged,
                user_email: None,
            })
            .collect())
    }

    fn list_admin_actions(&self, incident_id: i32) -> StoreResult<Vec<AdminActionView>> {
        let mut conn = self.conn()?;
        let rows = admin_actions::table
            .left_join(admins::table)
            .filter(admin_actions::incident_id.eq(incident_id))
            .order((admin_actions::action_timestamp.desc(), admin_actions::id.desc()))
            .select((
                AdminAction::as_select(),
                admins::username.nullable(),
                admins::full_name.nullable(),
            ))
            .load::<(AdminAction, Option<String>, Option<String>)>(&mut conn)?;

        Ok(rows.into_iter()
            .map(|(action, admin_username, admin_name)| AdminActionView {
                action,
                admin_username,
                admin_name,
            })
            .collect())
    }

    fn list_markers(&self) -> StoreResult<Vec<Marker>> {
        let mut conn = self.conn()?;
        Ok(incident_reports::table
            .order((incident_reports::reported_at.desc(), incident_reports::id.desc()))
            .select(Marker::as_select())
            .load(&mut conn)?)
    }

    fn apply_edit(&self, edit: &IncidentEdit) -> StoreResult<Option<ReporterStanding>> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            // Lock the row so concurrent edits of one incident queue up.
            let (status, priority) = incident_reports::table
                .find(edit.incident_id)
                .select((incident_reports::status, incident_reports::priority))
                .for_update()
                .first::<(IncidentStatus, Priority)>(conn)
                .optional()?
                .ok_or(StoreError::NotFound)?;
            if (status, priority) != (edit.seen_status, edit.seen_priority) {
                return Err(StoreError::Stale);
            }

            if !edit.actions.is_empty() {
                diesel::insert_into(admin_actions::table)
                    .values(&edit.actions)
                    .execute(conn)?;
            }

            let changes = IncidentChanges {
                status: edit.status,
                resolved_at: edit.resolved_at,
                priority: edit.priority,
                admin_notes: edit.admin_notes.as_deref(),
            };
            if !changes.is_empty() {
                diesel::update(incident_reports::table.find(edit.incident_id))
                    .set(&changes)
                    .execute(conn)?;
            }

            let user_id = match edit.false_report_user {
                Some(user_id) => user_id,
                None => return Ok(None),
            };

            // Single statement: the flag is computed from the pre-update count.
            let standing = diesel::update(users::table.find(user_id))
                .set((
                    users::false_report_count.eq(users::false_report_count + 1),
                    users::is_flagged.eq(users::is_flagged
                        .or((users::false_report_count + 1).ge(FLAG_THRESHOLD))),
                ))
                .returning((users::false_report_count, users::is_flagged))
                .get_result::<(i32, bool)>(conn)
                .optional()?;

            Ok(standing.map(|(false_report_count, is_flagged)| ReporterStanding {
                user_id,
                false_report_count,
                is_flagged,
            }))
        })
    }

    fn delete_incident(&self, id: i32) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let count = diesel::delete(incident_reports::table.find(id))
            .execute(&mut conn)?;

        Ok(count > 0)
    }

    fn stats(&self, recent_since: DateTime<Utc>) -> StoreResult<Stats> {
        let mut conn = self.conn()?;

        let total_reports = incident_reports::table
            .count()
            .get_result::<i64>(&mut conn)?;
        let recent_reports = incident_reports::table
            .filter(incident_reports::reported_at.ge(recent_since))
            .count()
            .get_result::<i64>(&mut conn)?;
        let flagged_users = users::table
            .filter(users::is_flagged.eq(true))
            .count()
            .get_result::<i64>(&mut conn)?;
        let status_breakdown = incident_reports::table
            .group_by(incident_reports::status)
            .select((incident_reports::status, diesel::dsl::count_star()))
            .load::<(IncidentStatus, i64)>(&mut conn)?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();

        Ok(Stats {
            total_reports,
            recent_reports,
            flagged_users,
            status_breakdown,
        })
    }
}
