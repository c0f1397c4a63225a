use super::api::{ApiClient, IncidentSummary, IncidentUpdate};
use super::session::Session;
use super::ClientResult;
use crate::db::models::{IncidentStatus, Priority};


/// An inline-editable value: what the server has, plus what the admin picked
/// while the update is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditCell<T> {
    Committed(T),
    Pending { committed: T, proposed: T },
}

impl<T: Copy + PartialEq> EditCell<T> {
    /// The value the control should show.
    pub fn shown(&self) -> T {
        match *self {
            EditCell::Committed(value) => value,
            EditCell::Pending { proposed, .. } => proposed,
        }
    }

    pub fn committed(&self) -> T {
        match *self {
            EditCell::Committed(value) => value,
            EditCell::Pending { committed, .. } => committed,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EditCell::Pending { .. })
    }

    /// Starts an edit. Refused while another edit is pending or when nothing changes.
    pub fn propose(&mut self, value: T) -> bool {
        match *self {
            EditCell::Committed(current) if current != value => {
                *self = EditCell::Pending { committed: current, proposed: value };
                true
            },
            _ => false,
        }
    }

    pub fn commit(&mut self) {
        if let EditCell::Pending { proposed, .. } = *self {
            *self = EditCell::Committed(proposed);
        }
    }

    pub fn revert(&mut self) {
        if let EditCell::Pending { committed, .. } = *self {
            *self = EditCell::Committed(committed);
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditResolution {
    Committed,
    Reverted(String),
    /// The edit was never sent: unknown row, no change, or one already pending.
    Ignored,
}


#[derive(Debug, Clone)]
pub struct AdminRow {
    pub incident: IncidentSummary,
    pub status: EditCell<IncidentStatus>,
    pub priority: EditCell<Priority>,
}

impl AdminRow {
    fn new(incident: IncidentSummary) -> Self {
        AdminRow {
            status: EditCell::Committed(incident.status),
            priority: EditCell::Committed(incident.priority),
            incident,
        }
    }
}


/// The admin incident table, rebuilt from each fetch.
#[derive(Debug, Clone, Default)]
pub struct AdminTable {
    rows: Vec<AdminRow>,
}

impl AdminTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[AdminRow] {
        &self.rows
    }

    pub fn load(&mut self, incidents: Vec<IncidentSummary>) {
        self.rows = incidents.into_iter().map(AdminRow::new).collect();
    }

    fn row_mut(&mut self, id: i32) -> Option<&mut AdminRow> {
        self.rows.iter_mut().find(|row| row.incident.id == id)
    }

    pub fn propose_status(&mut self, id: i32, status: IncidentStatus) -> Option<IncidentUpdate> {
        let row = self.row_mut(id)?;
        if !row.status.propose(status) {
            return None;
        }

        Some(IncidentUpdate { status: Some(status), ..Default::default() })
    }

    pub fn propose_priority(&mut self, id: i32, priority: Priority) -> Option<IncidentUpdate> {
        let row = self.row_mut(id)?;
        if !row.priority.propose(priority) {
            return None;
        }

        Some(IncidentUpdate { priority: Some(priority), ..Default::default() })
    }

    /// Settles every pending cell of a row with the server's answer.
    pub fn resolve(&mut self, id: i32, outcome: Result<(), String>) -> EditResolution {
        let row = match self.row_mut(id) {
            Some(row) => row,
            None => return EditResolution::Ignored,
        };

        match outcome {
            Ok(()) => {
                row.status.commit();
                row.priority.commit();
                row.incident.status = row.status.committed();
                row.incident.priority = row.priority.committed();
                EditResolution::Committed
            },
            Err(message) => {
                row.status.revert();
                row.priority.revert();
                EditResolution::Reverted(message)
            },
        }
    }

    pub fn edit_status(&mut self, api: &ApiClient, session: &Session, id: i32,
        status: IncidentStatus) -> EditResolution {

        match self.propose_status(id, status) {
            Some(update) => self.send(api, session, id, &update),
            None => EditResolution::Ignored,
        }
    }

    pub fn edit_priority(&mut self, api: &ApiClient, session: &Session, id: i32,
        priority: Priority) -> EditResolution {

        match self.propose_priority(id, priority) {
            Some(update) => self.send(api, session, id, &update),
            None => EditResolution::Ignored,
        }
    }

    fn send(&mut self, api: &ApiClient, session: &Session, id: i32, update: &IncidentUpdate)
        -> EditResolution {

        let outcome = api.update_incident(session, id, update)
            .map(|_| ())
            .map_err(|err| err.to_string());
        self.resolve(id, outcome)
    }

    pub fn refresh(&mut self, api: &ApiClient) -> ClientResult<()> {
        let incidents = api.incidents(&Default::default())?;
        self.load(incidents);
        Ok(())
    }
}
