use log::{debug, error};
use rocket::{
    http::Status,
    request::Request,
    response::{self, status::Custom, Responder},
    serde::json::{self, json, Json, Value},
};

use crate::account_sys::AccountError;
use crate::db::StoreError;
use crate::guard::GuardMessage;
use crate::moderation_sys::ModerationError;
use crate::AppState;


pub type JsonResult = Result<Custom<Json<Value>>, ApiError>;


pub fn make_json_result(status: Status, body: Value) -> JsonResult {
    Ok(Custom(status, Json(body)))
}


#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("server error {context}: {detail}")]
    Internal { context: &'static str, detail: String },
}

impl ApiError {
    pub fn internal(context: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Internal { context, detail: err.to_string() }
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::Validation(_) => Status::BadRequest,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Conflict(_) => Status::Conflict,
            ApiError::Internal { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let body = match &self {
            ApiError::Internal { context, detail } => {
                error!("Server error {}: {}", context, detail);

                let expose = req.rocket().state::<AppState>()
                    .map_or(false, |state| state.expose_errors);
                let mut body = json!({
                    "success": false,
                    "message": format!("Server error {}", context),
                });
                if expose {
                    body["error"] = json!(detail);
                }
                body
            },
            other => json!({
                "success": false,
                "message": other.to_string(),
            }),
        };

        Custom(status, Json(body)).respond_to(req)
    }
}


/// Maps a layer's failure onto the response taxonomy.
pub trait Classify {
    fn classify(self, context: &'static str) -> ApiError;
}

impl Classify for StoreError {
    fn classify(self, context: &'static str) -> ApiError {
        match self {
            StoreError::Stale => ApiError::Conflict(
                "Incident was changed by another request, please retry".into()),
            other => ApiError::internal(context, other),
        }
    }
}

impl Classify for ModerationError {
    fn classify(self, context: &'static str) -> ApiError {
        match self {
            ModerationError::Invalid(message) => ApiError::Validation(message),
            ModerationError::NoChanges => ApiError::Validation(self.to_string()),
            ModerationError::NotFound => ApiError::NotFound(self.to_string()),
            ModerationError::Store(err) => err.classify(context),
        }
    }
}

impl Classify for AccountError {
    fn classify(self, context: &'static str) -> ApiError {
        match self {
            AccountError::Invalid(message) => ApiError::Validation(message.into()),
            AccountError::Duplicate => ApiError::Conflict(self.to_string()),
            AccountError::InvalidCredentials(message) => ApiError::Unauthorized(message.into()),
            AccountError::NotFound(message) => ApiError::NotFound(message.into()),
            other => ApiError::internal(context, other),
        }
    }
}

pub trait ResultExt<T> {
    /// `context` completes "Server error ..." in the response message.
    fn during(self, context: &'static str) -> Result<T, ApiError>;
}

impl<T, E: Classify> ResultExt<T> for Result<T, E> {
    fn during(self, context: &'static str) -> Result<T, ApiError> {
        self.map_err(|err| err.classify(context))
    }
}


pub fn invalid_body(err: json::Error<'_>) -> ApiError {
    debug!("Rejected request body: {}", err);
    ApiError::Validation("Invalid request body".into())
}


fn default_message(status: Status) -> &'static str {
    match status.code {
        400 | 422 => "Invalid request",
        401 => "Invalid or expired token",
        403 => "Access denied",
        404 => "Endpoint not found",
        _ => "Internal server error",
    }
}

#[catch(default)]
pub fn default_catcher(status: Status, req: &Request<'_>) -> Json<Value> {
    let message = req.local_cache(|| GuardMessage(None)).0
        .unwrap_or_else(|| default_message(status));

    Json(json!({
        "success": false,
        "message": message,
    }))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outdated_edit_is_a_conflict() {
        let err = ModerationError::Store(StoreError::Stale).classify("updating incident");
        assert_eq!(err.status(), Status::Conflict);

        let err = StoreError::Connection("refused".into()).classify("updating incident");
        assert_eq!(err.status(), Status::InternalServerError);
    }
}
