use axum::{
    Form,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::users::Credentials;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// Server-side session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Set on login, cleared on logout
    pub logged_in: bool,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Id of the session that passed the login check, added to request extensions.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// All live sessions, keyed by the value of the session cookie
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Create a new logged-in session
    ///
    /// # Returns
    /// * `String` - A unique session ID
    pub fn create(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            logged_in: true,
            expires_at: SystemTime::now() + self.ttl,
        };

        let mut sessions = self.write();
        let now = SystemTime::now();
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// Check whether `session_id` belongs to an unexpired, logged-in session.
    pub fn is_logged_in(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .is_some_and(|s| s.logged_in && s.expires_at > SystemTime::now())
    }

    /// Clear the logged-in flag. Returns whether the session existed.
    pub fn logout(&self, session_id: &str) -> bool {
        match self.write().get_mut(session_id) {
            Some(session) => {
                session.logged_in = false;
                true
            }
            None => false,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn logged_in_session(state: &AppState, jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| state.sessions.is_logged_in(id))
}

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Serve the login page HTML
pub async fn serve_login_page() -> Html<&'static str> {
    Html(include_str!("./static/login.html"))
}

/// Serve the dashboard HTML. Only reachable through [`require_login`].
pub async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

/// Handle login form submissions
///
/// The form is optional: a POST without a body is passed to the verifier as
/// empty credentials.
///
/// # Returns
/// * `Response` - Redirect to the dashboard with a fresh session cookie, or 401/500
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    form: Option<Form<Credentials>>,
) -> Response {
    let credentials = form.map(|Form(c)| c).unwrap_or_default();

    match state.verifier.verify(&credentials) {
        Ok(true) => {
            let session_id = state.sessions.create();
            info!("Login accepted for {:?}", credentials.username);
            (
                jar.add(session_cookie(session_id)),
                Redirect::to("/dashboard"),
            )
                .into_response()
        }
        Ok(false) => {
            warn!("Login rejected for {:?}", credentials.username);
            (StatusCode::UNAUTHORIZED, "Invalid username or password").into_response()
        }
        Err(e) => {
            error!("Credential check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error").into_response()
        }
    }
}

/// Handle user logout
///
/// Clears the logged-in flag, drops the session's dataset and removes the
/// cookie.
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value();
        if state.sessions.logout(session_id) {
            state.store.remove(session_id);
            info!("Session logged out");
        }
    }

    let removal = Cookie::build(SESSION_COOKIE).path("/").build();
    (jar.remove(removal), Redirect::to("/")).into_response()
}

/// Login-required middleware for pages: redirects to the login page.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match logged_in_session(&state, &jar) {
        Some(session_id) => {
            request.extensions_mut().insert(SessionId(session_id));
            next.run(request).await
        }
        None => Redirect::to("/").into_response(),
    }
}

/// Login-required middleware for data routes: answers 401 with a JSON error.
pub async fn require_login_api(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    match logged_in_session(&state, &jar) {
        Some(session_id) => {
            request.extensions_mut().insert(SessionId(session_id));
            next.run(request).await
        }
        None => AppError::Unauthorized.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_is_logged_in() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create();
        assert!(store.is_logged_in(&id));
        assert!(store.write()[&id].logged_in);
    }

    #[test]
    fn unknown_session_is_not_logged_in() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(!store.is_logged_in("no-such-session"));
    }

    #[test]
    fn logout_clears_flag() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create();

        assert!(store.logout(&id));
        assert!(!store.is_logged_in(&id));
        // The entry stays until it expires, with the flag cleared.
        assert!(!store.write()[&id].logged_in);
        assert!(!store.logout("no-such-session"));
    }

    #[test]
    fn expired_session_is_not_logged_in() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!store.is_logged_in(&id));
    }

    #[test]
    fn session_ids_are_unique() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert_ne!(store.create(), store.create());
    }
}
