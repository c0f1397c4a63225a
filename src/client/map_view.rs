use super::api::{ApiClient, MarkerSummary, NewReport};
use super::{ClientError, ClientResult};
use crate::db::models::{IncidentStatus, Priority};


pub const DEFAULT_CENTER: (f64, f64) = (8.3833, 124.8333);
pub const DEFAULT_ZOOM: u8 = 12;


pub fn status_color(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Pending => "#fbbf24",
        IncidentStatus::Verified => "#3b82f6",
        IncidentStatus::InProgress => "#6366f1",
        IncidentStatus::Resolved => "#10b981",
        IncidentStatus::FalseReport => "#ef4444",
    }
}

/// Pixel size of a marker icon.
pub fn marker_size(priority: Priority) -> u32 {
    match priority {
        Priority::Critical => 40,
        Priority::High => 35,
        _ => 30,
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerStyle {
    pub color: &'static str,
    pub size: u32,
}

impl MarkerStyle {
    pub fn of(marker: &MarkerSummary) -> Self {
        MarkerStyle {
            color: status_color(marker.status),
            size: marker_size(marker.priority),
        }
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct PlacedMarker {
    pub id: i32,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub style: MarkerStyle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerFilter {
    pub status: Option<IncidentStatus>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
}

impl MarkerFilter {
    pub fn matches(&self, marker: &MarkerSummary) -> bool {
        self.status.map_or(true, |s| s == marker.status)
            && self.priority.map_or(true, |p| p == marker.priority)
            && self.category.as_ref().map_or(true, |c| *c == marker.category)
    }
}


/// Identifies one marker fetch. Only the newest ticket may repaint the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);


pub struct MapView {
    pub center: (f64, f64),
    pub zoom: u8,
    filter: MarkerFilter,
    markers: Vec<PlacedMarker>,
    generation: u64,
}

impl Default for MapView {
    fn default() -> Self {
        MapView {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            filter: MarkerFilter::default(),
            markers: Vec::new(),
            generation: 0,
        }
    }
}

impl MapView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> &[PlacedMarker] {
        &self.markers
    }

    pub fn filter(&self) -> &MarkerFilter {
        &self.filter
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        FetchTicket(self.generation)
    }

    /// Changing the filter supersedes any fetch still in flight.
    pub fn set_filter(&mut self, filter: MarkerFilter) -> FetchTicket {
        self.filter = filter;
        self.begin_fetch()
    }

    /// Replaces every marker with the fetched set. Returns false and leaves
    /// the map untouched when a newer fetch has started since `ticket`.
    pub fn apply(&mut self, ticket: FetchTicket, fetched: &[MarkerSummary]) -> bool {
        if ticket.0 != self.generation {
            return false;
        }

        self.markers = fetched.iter()
            .filter(|marker| self.filter.matches(marker))
            .map(|marker| PlacedMarker {
                id: marker.id,
                title: marker.title.clone(),
                latitude: marker.latitude,
                longitude: marker.longitude,
                style: MarkerStyle::of(marker),
            })
            .collect();

        true
    }

    pub fn refresh(&mut self, api: &ApiClient) -> ClientResult<bool> {
        let ticket = self.begin_fetch();
        let fetched = api.markers()?;
        Ok(self.apply(ticket, &fetched))
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    Geolocation,
    MapClick,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
}

/// Holds the location chosen for a new report.
#[derive(Debug, Clone, Default)]
pub struct LocationPicker {
    picked: Option<PickedLocation>,
}

impl LocationPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick(&mut self, latitude: f64, longitude: f64, source: LocationSource)
        -> ClientResult<PickedLocation> {

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ClientError::InvalidLocation("Coordinates are out of range"));
        }

        let location = PickedLocation { latitude, longitude, source };
        self.picked = Some(location);
        Ok(location)
    }

    pub fn picked(&self) -> Option<PickedLocation> {
        self.picked
    }

    pub fn clear(&mut self) {
        self.picked = None;
    }

    /// Builds a report at the picked location.
    pub fn report(&self, title: &str, description: &str) -> ClientResult<NewReport> {
        let location = self.picked
            .ok_or(ClientError::InvalidLocation("Please select a location on the map"))?;

        Ok(NewReport {
            title: title.trim().to_owned(),
            description: description.trim().to_owned(),
            latitude: location.latitude,
            longitude: location.longitude,
            location_address: None,
            category: None,
            priority: None,
        })
    }
}
