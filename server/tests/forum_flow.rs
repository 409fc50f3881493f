//! End-to-end: a real listener on a random port, a throw-away SQLite file,
//! and plain HTTP/1 requests against the API.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{COOKIE, HeaderMap, SET_COOKIE};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use server::AppState;
use server::handlers::{self, http::routes::build_api_router};
use shared::types::AppConfig;

struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("forum.db").to_string_lossy().into_owned();
        config.server.allowed_origin = "http://localhost:5000".into();

        let state = AppState::build(config).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            handlers::serve(listener, state.clone(), Arc::new(build_api_router()), shutdown)
                .await
                .unwrap();
            state.shutdown().await;
        });

        Self {
            addr,
            stop: Some(stop),
            _dir: dir,
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", self.addr.to_string());
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let payload = body.map(|b| b.to_string()).unwrap_or_default();
        let req = builder.body(Full::new(Bytes::from(payload))).unwrap();

        let res = sender.send_request(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    async fn get(&self, path: &str, cookie: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(Method::GET, path, None, cookie).await;
        (status, body)
    }

    async fn post(&self, path: &str, body: Value, cookie: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(Method::POST, path, Some(body), cookie).await;
        (status, body)
    }

    async fn register(&self, username: &str, email: &str) -> (StatusCode, Value) {
        self.post(
            "/api/register",
            json!({ "username": username, "email": email, "password": "correct horse" }),
            None,
        )
        .await
    }

    /// Log in and return the `jwt=...` pair to send back.
    async fn login(&self, username: &str) -> String {
        let (status, headers, _) = self
            .send(
                Method::POST,
                "/api/login",
                Some(json!({ "username": username, "password": "correct horse" })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        cookie_pair(&headers)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

fn cookie_pair(headers: &HeaderMap) -> String {
    let set_cookie = headers[SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("jwt="));
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn health_and_preflight() {
    let server = TestServer::start().await;

    let (status, headers, body) = server.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"], "ok");
    assert_eq!(
        headers["access-control-allow-origin"],
        "http://localhost:5000"
    );
    assert_eq!(
        headers["cache-control"],
        "no-cache, no-store, must-revalidate"
    );

    let (status, headers, _) = server.send(Method::OPTIONS, "/api/addpost", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(headers["access-control-allow-credentials"], "true");

    let (status, body) = server.get("/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn registration_and_login() {
    let server = TestServer::start().await;

    let (status, body) = server.register("alice", "alice@example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["user_id"].as_i64().unwrap() > 0);

    let (status, body) = server.register("alice", "alice@example.com").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["errors"].as_array().unwrap();
    assert!(!errors.is_empty());
    assert!(
        errors.contains(&json!("email already exist"))
            || errors.contains(&json!("user already exist"))
    );

    let (status, body) = server
        .post("/api/register", json!({ "username": "", "email": "", "password": "" }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"],
        json!(["empty username", "empty email", "empty password"])
    );

    let (status, _) = server
        .post("/api/login", json!({ "username": "nobody", "password": "x" }), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .post("/api/login", json!({ "username": "alice", "password": "wrong" }), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, headers, body) = server
        .send(
            Method::POST,
            "/api/login",
            Some(json!({ "username": "alice", "password": "correct horse" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "user");
    cookie_pair(&headers);
}

#[tokio::test]
async fn secure_routes_need_a_session() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/api/addpost", json!({ "title": "t", "text": "x", "categories": [1] }), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = server
        .post(
            "/api/addpost",
            json!({ "title": "t", "text": "x", "categories": [1] }),
            Some("jwt=forged"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A viewer route still answers anonymously with a bad cookie.
    let (status, body) = server.get("/api/viewposts", Some("jwt=forged")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn posting_reading_and_reacting() {
    let server = TestServer::start().await;
    server.register("alice", "alice@example.com").await;
    let cookie = server.login("alice").await;

    let (status, body) = server.get("/api/categories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["Name"], "golang");
    assert_eq!(body[1]["Name"], "js");

    let (status, body) = server
        .post("/api/addpost", json!({ "title": " ", "text": "x" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"], json!(["empty title", "no cats"]));

    let (status, body) = server
        .post(
            "/api/addpost",
            json!({ "title": "t", "text": "x", "categories": [1, 99] }),
            Some(&cookie),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"], json!(["no such category!"]));

    let (status, body) = server
        .post(
            "/api/addpost",
            json!({ "title": "Hello", "text": "first", "categories": [2, 1] }),
            Some(&cookie),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let post_id = body["data"]["post_id"].as_i64().unwrap();

    let (status, body) = server.get("/api/viewposts", None).await;
    assert_eq!(status, StatusCode::OK);
    let post = &body[0];
    assert_eq!(post["PostID"], post_id);
    assert_eq!(post["Username"], "alice");
    assert_eq!(post["Reaction"], "idle");
    assert_eq!(post["Categories"][0]["Name"], "js");
    assert_eq!(post["Categories"][1]["Name"], "golang");
    assert_eq!(post["Categories"][1], json!({ "ID": 1, "Name": "golang" }));

    let (status, body) = server.get("/api/viewposts?cat=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = server
        .post("/api/react", json!({ "postID": post_id, "reaction": "like" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post("/api/react", json!({ "postID": post_id, "reaction": "like" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"], json!(["already reacted"]));

    let (_, body) = server.get("/api/viewposts", Some(&cookie)).await;
    assert_eq!(body[0]["Likes"], 1);
    assert_eq!(body[0]["Reaction"], "like");

    let (status, _) = server
        .post(
            "/api/addcomment",
            json!({ "postID": post_id, "comment": "nice one" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .get(&format!("/api/readpost?postID={}", post_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Post"]["Title"], "Hello");
    assert_eq!(body["Comments"][0]["Comment"], "nice one");

    let (status, _) = server.get("/api/readpost?postID=999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.get("/api/readpost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .post("/api/addcomment", json!({ "postID": 999, "comment": "x" }), Some(&cookie))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_author_updates_a_post() {
    let server = TestServer::start().await;
    server.register("alice", "alice@example.com").await;
    server.register("bob", "bob@example.com").await;
    let alice = server.login("alice").await;
    let bob = server.login("bob").await;

    let (_, body) = server
        .post(
            "/api/addpost",
            json!({ "title": "Draft", "text": "x", "categories": [1] }),
            Some(&alice),
        )
        .await;
    let post_id = body["data"]["post_id"].as_i64().unwrap();

    let update = json!({
        "postID": post_id, "title": "Hidden", "text": "y", "status": 0, "categories": [1]
    });
    let (status, _) = server.post("/api/updpost", update.clone(), Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.post("/api/updpost", update, Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .post(
            "/api/updpost",
            json!({ "postID": post_id, "title": "x", "text": "y", "status": 7, "categories": [1] }),
            Some(&alice),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"], json!(["wrong status"]));

    let path = format!("/api/readpost?postID={}", post_id);
    let (status, _) = server.get(&path, Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = server.get(&path, Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Post"]["Title"], "Hidden");

    let (_, body) = server.get("/api/viewposts", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn logout_and_second_login_end_old_sessions() {
    let server = TestServer::start().await;
    server.register("alice", "alice@example.com").await;

    let first = server.login("alice").await;
    let second = server.login("alice").await;

    // The second login superseded the first.
    let (status, _) = server.post("/api/logout", json!({}), Some(&first)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, headers, _) = server
        .send(Method::POST, "/api/logout", Some(json!({})), Some(&second))
        .await;
    assert_eq!(status, StatusCode::OK);
    let cleared = headers[SET_COOKIE].to_str().unwrap();
    assert!(cleared.starts_with("jwt=;"));
    assert!(cleared.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));

    let (status, _) = server
        .post(
            "/api/addpost",
            json!({ "title": "t", "text": "x", "categories": [1] }),
            Some(&second),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
