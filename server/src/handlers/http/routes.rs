use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use shared::types::Role;

use crate::AppState;
use crate::handlers::http::utils::{body, json_response};
use crate::handlers::http::{auth, posts};
use crate::security::Authenticated;

/// Identity the router hands to Viewer and Secure handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
}

impl From<&Authenticated> for Session {
    fn from(auth: &Authenticated) -> Self {
        Self {
            user_id: auth.identity,
            role: auth.role,
        }
    }
}

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Three security tiers:
//
//   OpenHandler    no session check.  Receives (req, state).
//                  Use for: /api/login, /api/register, /health.
//
//   ViewerHandler  session optional.  Receives (req, state, Option<Session>).
//                  A bad or missing cookie just means an anonymous viewer.
//
//   SecureHandler  session required.  Receives (req, state, Session).
//                  Anything that mutates state.
//
// Viewer and Secure both slide the session forward; the refreshed cookie is
// attached to whatever the handler returns.

type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send>>;

type OpenHandler =
    Box<dyn Fn(Request<hyper::body::Incoming>, AppState) -> HandlerFuture + Send + Sync>;

type ViewerHandler = Box<
    dyn Fn(Request<hyper::body::Incoming>, AppState, Option<Session>) -> HandlerFuture
        + Send
        + Sync,
>;

type SecureHandler =
    Box<dyn Fn(Request<hyper::body::Incoming>, AppState, Session) -> HandlerFuture + Send + Sync>;

enum RouteKind {
    Open(OpenHandler),
    Viewer(ViewerHandler),
    Secure(SecureHandler),
}

impl RouteKind {
    fn tier(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Viewer(_) => "viewer",
            Self::Secure(_) => "secure",
        }
    }
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, method: Method, path: &str, kind: RouteKind) -> Self {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind,
        });
        self
    }

    // ── Open (no session) ────────────────────────────────────────────────────

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.push(
            Method::GET,
            path,
            RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        )
    }

    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.push(
            Method::POST,
            path,
            RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        )
    }

    // ── Viewer (session optional) ────────────────────────────────────────────

    pub fn get_viewer<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState, Option<Session>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.push(
            Method::GET,
            path,
            RouteKind::Viewer(Box::new(move |req, state, viewer| {
                Box::pin(handler(req, state, viewer))
            })),
        )
    }

    // ── Secure (session required) ────────────────────────────────────────────

    pub fn post_secure<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<hyper::body::Incoming>, AppState, Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<BoxBody<Bytes, Infallible>>>> + Send + 'static,
    {
        self.push(
            Method::POST,
            path,
            RouteKind::Secure(Box::new(move |req, state, session| {
                Box::pin(handler(req, state, session))
            })),
        )
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(
        &self,
        req: Request<hyper::body::Incoming>,
        state: AppState,
    ) -> Result<Response<BoxBody<Bytes, Infallible>>> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        if method == Method::OPTIONS {
            return preflight();
        }

        let Some(route) = self
            .routes
            .iter()
            .find(|route| route.method == method && Self::path_matches(&route.path, &path))
        else {
            return json_response::deliver_error_json(
                "NOT_FOUND",
                "Endpoint not found",
                StatusCode::NOT_FOUND,
            )
            .context("Failed to deliver 404 response");
        };

        debug!("{} {} -> {} route", method, path, route.kind.tier());

        match &route.kind {
            RouteKind::Open(h) => h(req, state).await,

            RouteKind::Viewer(h) => {
                let validated = state.sessions.validate(req.headers()).await;
                match validated {
                    Ok(auth) => {
                        let response = h(req, state, Some(Session::from(&auth))).await?;
                        Ok(with_refreshed_cookie(response, &auth))
                    }
                    Err(reason) => {
                        debug!("Anonymous viewer on {} {}: {}", method, path, reason);
                        h(req, state, None).await
                    }
                }
            }

            RouteKind::Secure(h) => {
                let validated = state.sessions.validate(req.headers()).await;
                match validated {
                    Ok(auth) => {
                        let response = h(req, state, Session::from(&auth)).await?;
                        Ok(with_refreshed_cookie(response, &auth))
                    }
                    Err(reason) => {
                        warn!("Secure route rejected {} {}: {}", method, path, reason);
                        unauthorized()
                    }
                }
            }
        }
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);
        route_path == clean
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_refreshed_cookie(
    mut response: Response<BoxBody<Bytes, Infallible>>,
    auth: &Authenticated,
) -> Response<BoxBody<Bytes, Infallible>> {
    if let Some(refreshed) = &auth.refreshed {
        // A handler that already set the cookie (logout) wins.
        if !response.headers().contains_key(SET_COOKIE) {
            response
                .headers_mut()
                .insert(SET_COOKIE, refreshed.set_cookie.clone());
        }
    }
    response
}

fn unauthorized() -> Result<Response<BoxBody<Bytes, Infallible>>> {
    json_response::deliver_error_json(
        "UNAUTHORIZED",
        "Authentication required",
        StatusCode::UNAUTHORIZED,
    )
    .context("Failed to deliver 401 response")
}

fn preflight() -> Result<Response<BoxBody<Bytes, Infallible>>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("access-control-max-age", HeaderValue::from_static("600"))
        .body(body::empty())
        .context("Failed to build preflight response")
}

// ---------------------------------------------------------------------------
// API router
//
// Auth tier is enforced here at the routing level; handlers never repeat the
// session check.
//
//   .get(...) / .post(...)   Open     handler gets (req, state)
//   .get_viewer(...)         Viewer   handler gets (req, state, Option<Session>)
//   .post_secure(...)        Secure   handler gets (req, state, Session)
// ---------------------------------------------------------------------------

pub fn build_api_router() -> Router {
    Router::new()
        // ── Open ─────────────────────────────────────────────────────────────
        .get("/health", |_req, _state| async move {
            json_response::deliver_json(r#"{"status":"success","health":"ok"}"#, StatusCode::OK)
        })
        .post("/api/register", |req, state| async move {
            auth::handle_register(req, state)
                .await
                .context("Register failed")
        })
        .post("/api/login", |req, state| async move {
            auth::handle_login(req, state).await.context("Login failed")
        })
        .get("/api/categories", |req, state| async move {
            posts::handle_categories(req, state)
                .await
                .context("Category list failed")
        })
        // ── Viewer ───────────────────────────────────────────────────────────
        .get_viewer("/api/viewposts", |req, state, viewer| async move {
            posts::handle_view_posts(req, state, viewer)
                .await
                .context("Post listing failed")
        })
        .get_viewer("/api/readpost", |req, state, viewer| async move {
            posts::handle_read_post(req, state, viewer)
                .await
                .context("Post read failed")
        })
        // ── Secure ───────────────────────────────────────────────────────────
        .post_secure("/api/logout", |req, state, session| async move {
            auth::handle_logout(req, state, session)
                .await
                .context("Logout failed")
        })
        .post_secure("/api/addpost", |req, state, session| async move {
            posts::handle_add_post(req, state, session)
                .await
                .context("Add post failed")
        })
        .post_secure("/api/updpost", |req, state, session| async move {
            posts::handle_update_post(req, state, session)
                .await
                .context("Update post failed")
        })
        .post_secure("/api/addcomment", |req, state, session| async move {
            posts::handle_add_comment(req, state, session)
                .await
                .context("Add comment failed")
        })
        .post_secure("/api/react", |req, state, session| async move {
            posts::handle_react(req, state, session)
                .await
                .context("React failed")
        })
}
