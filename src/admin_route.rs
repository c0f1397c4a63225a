use chrono::Utc;
use rocket::{
    http::Status,
    serde::json::{self, json, Json},
    State,
};

use crate::account_sys::{self, Credentials};
use crate::api_error::{invalid_body, make_json_result, JsonResult, ResultExt};
use crate::guard::AdminClaims;
use crate::moderation_sys;
use crate::AppState;


#[post("/admin/login", data = "<body>")]
pub fn post_login(state: &State<AppState>,
    body: Result<Json<Credentials>, json::Error<'_>>) -> JsonResult {

    let body = body.map_err(invalid_body)?;
    let signed_in = account_sys::admin_login(state, &body, Utc::now())
        .during("during admin login")?;
    let admin = &signed_in.account;

    make_json_result(Status::Ok, json!({
        "success": true,
        "message": "Admin login successful",
        "token": signed_in.token,
        "admin": {
            "id": admin.id,
            "username": admin.username,
            "email": admin.email,
            "fullName": admin.full_name,
            "role": admin.role,
        },
    }))
}

#[get("/admin/profile")]
pub fn get_profile(state: &State<AppState>, claims: AdminClaims) -> JsonResult {
    let admin = account_sys::admin_profile(state, claims.0.id)
        .during("fetching admin profile")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "admin": admin,
    }))
}

#[get("/admin/stats")]
pub fn get_stats(state: &State<AppState>, _claims: AdminClaims) -> JsonResult {
    let stats = moderation_sys::stats(state.store.as_ref(), Utc::now())
        .during("fetching statistics")?;

    make_json_result(Status::Ok, json!({
        "success": true,
        "stats": stats,
    }))
}
