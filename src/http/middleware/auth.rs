use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;

use crate::http::AppState;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Basic")],
        "",
    )
        .into_response()
}

/// Gates `/v2/*` and `/api/*` behind HTTP Basic auth when
/// `NSCR_AUTH_ENABLED=true`, checking credentials against the two
/// configured values directly -- there is no per-repository ACL in
/// scope here, just a single shared gate in front of the whole server.
pub async fn basic_auth<B>(State(state): State<AppState>, req: Request<B>, next: Next<B>) -> Response {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header) = header else {
        return unauthorized();
    };
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return unauthorized();
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return unauthorized();
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return unauthorized();
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return unauthorized();
    };

    let expected_user = state.config.auth_username.as_deref().unwrap_or("");
    let expected_pass = state.config.auth_password.as_deref().unwrap_or("");

    if user == expected_user && pass == expected_pass {
        next.run(req).await
    } else {
        unauthorized()
    }
}
