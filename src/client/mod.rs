//! Blocking client for the incident API plus the view state a map front end
//! keeps between requests.

pub mod api;
pub mod dashboard;
pub mod map_view;
pub mod session;


pub use api::ApiClient;
pub use dashboard::{AdminTable, EditCell, EditResolution};
pub use map_view::{LocationPicker, MapView};
pub use session::Session;


#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Please login first")]
    NotSignedIn,
    #[error("{0}")]
    InvalidLocation(&'static str),
}

pub type ClientResult<T> = Result<T, ClientError>;
