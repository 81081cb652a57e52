//! Cookie helpers for login sessions and the OAuth state nonce.
//!
//! The session cookie carries only an opaque id; the session itself lives in
//! the server database. Unknown, expired and malformed ids all read as "not
//! logged in".

use chrono::{DateTime, Utc};
use gacha_shared::constants::{OAUTH_STATE_COOKIE, SESSION_COOKIE};
use gacha_store::Session;
use rand::RngCore;
use tower_cookies::cookie::time::Duration as CookieDuration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::ledger::{lock_db, SharedDatabase};

/// How long a login may take between `/auth/login` and the callback.
const STATE_COOKIE_MAX_AGE_SECS: i64 = 10 * 60;

/// Session ids are 32 random bytes, hex encoded.
fn looks_like_session_id(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The live session of the request, if any.
pub fn current_session(cookies: &Cookies, db: &SharedDatabase, now: DateTime<Utc>) -> Option<Session> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    let id = cookie.value();
    if !looks_like_session_id(id) {
        return None;
    }

    match lock_db(db).get_session(id, now) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up session");
            None
        }
    }
}

pub fn set_session_cookie(cookies: &Cookies, session: &Session, secure: bool) {
    let max_age = (session.expires_at - session.created_at).num_seconds().max(0);
    let cookie = Cookie::build((SESSION_COOKIE, session.id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(CookieDuration::seconds(max_age))
        .build();
    cookies.add(cookie);
}

pub fn clear_session_cookie(cookies: &Cookies) {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(cookie);
}

/// Generate a login nonce and remember it in a short-lived cookie.
pub fn issue_state_cookie(cookies: &Cookies, secure: bool) -> String {
    let mut raw = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    let state = hex::encode(raw);

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, state.clone()))
        .path("/auth")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(CookieDuration::seconds(STATE_COOKIE_MAX_AGE_SECS))
        .build();
    cookies.add(cookie);
    state
}

/// Read and clear the login nonce. A nonce is good for one callback only.
pub fn take_state_cookie(cookies: &Cookies) -> Option<String> {
    let value = cookies.get(OAUTH_STATE_COOKIE)?.value().to_string();
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, ""))
        .path("/auth")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .build();
    cookies.add(cookie);
    Some(value)
}
