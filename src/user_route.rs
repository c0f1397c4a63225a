use chrono::Utc;
use rocket::{
    http::Status,
    serde::json::{self, json, Json},
    State,
};

use crate::account_sys::{self, Credentials, Registration};
use crate::api_error::{invalid_body, make_json_result, JsonResult, ResultExt};
use crate::guard::{ClientIp, UserClaims};
use crate::AppState;


#[post("/users/register", data = "<body>")]
pub fn post_register(state: &State<AppState>, ip: ClientIp,
    body: Result<Json<Registration>, json::Error<'_>>) -> JsonResult {

    let body = body.map_err(invalid_body)?;
    let signed_in = account_sys::register(state, &body, ip.0, Utc::now())
        .during("during registration")?;
    let user = &signed_in.account;

    make_json_result(Status::Created, json!({
        "success": true,
        "message": "User registered successfully",
        "token": signed_in.token,
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
        },
    }))
}

#[post("/users/login", data = "<body>")]
pub fn post_login(state: &State<AppState>, ip: ClientIp,
    body: Result<Json<Credentials>, json::Error<'_>>) -> JsonResult {

    let body = body.map_err(invalid_body)?;
    let signed_in = account_sys::login(state, &body, ip.0.as_deref(), Utc::now())
        .during("during login")?;
    let user = &signed_in.account;

    make_json_result(Status::Ok, json!({
        "success": true,
        "message": "Login successful",
        "token": signed_in.token,
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "isFlagged": user.is_flagged,
            "falseReportCount": user.false_report_count,
        },
    }))
}

#[get("/users/profile")]
pub fn get_profile(state: &State<AppState>, claims: UserClaims) -> JsonResult {
    let user = account_sys::user_profile(state, claims.0.id)
        .during("fetching profile")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "user": user,
    }))
}
