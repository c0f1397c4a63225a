use rocket::{
    http::Status,
    request::{FromRequest, Outcome, Request},
};

use crate::token_sys::Claims;
use crate::AppState;


/// Why a guard refused the request; read back by the catcher.
pub struct GuardMessage(pub Option<&'static str>);


/// Any valid token belonging to a registered user.
pub struct UserClaims(pub Claims);

/// Any valid token issued on admin login.
pub struct AdminClaims(pub Claims);

/// The submitting user, when a valid user token came along. Never refuses.
pub struct MaybeReporter(pub Option<Claims>);

pub struct ClientIp(pub Option<String>);


fn bearer_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    let header = req.headers().get_one("Authorization")?;
    let mut parts = header.split_whitespace();

    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

fn verify_claims(req: &Request<'_>) -> Result<Claims, (Status, &'static str)> {
    let state = req.rocket().state::<AppState>()
        .ok_or((Status::InternalServerError, "Internal server error"))?;
    let token = bearer_token(req)
        .ok_or((Status::Forbidden, "No token provided"))?;

    state.tokens.verify(token)
        .map_err(|_| (Status::Unauthorized, "Invalid or expired token"))
}

fn reject<T>(req: &Request<'_>, status: Status, message: &'static str)
    -> Outcome<T, &'static str> {

    req.local_cache(|| GuardMessage(Some(message)));
    Outcome::Error((status, message))
}


#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserClaims {
    type Error = &'static str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match verify_claims(req) {
            Ok(claims) if !claims.is_admin => Outcome::Success(UserClaims(claims)),
            Ok(_) => reject(req, Status::Forbidden, "User access required"),
            Err((status, message)) => reject(req, status, message),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminClaims {
    type Error = &'static str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match verify_claims(req) {
            Ok(claims) if claims.is_admin => Outcome::Success(AdminClaims(claims)),
            Ok(_) => reject(req, Status::Forbidden, "Admin access required"),
            Err((status, message)) => reject(req, status, message),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for MaybeReporter {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Admin ids live in a different table, so they never become a reporter.
        let reporter = match bearer_token(req) {
            Some(_) => verify_claims(req).ok().filter(|claims| !claims.is_admin),
            None => None,
        };

        Outcome::Success(MaybeReporter(reporter))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = std::convert::Infallible;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(ClientIp(req.client_ip().map(|ip| ip.to_string())))
    }
}
