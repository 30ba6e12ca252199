//! Shared fixtures: a small blog module, seeded users, and a raw HTTP client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use warden::container::Container;
use warden::rbac::{
    Action, ConditionMap, Instance, PermissionDef, Registration, RoleDef, USER_ROLE, checker,
    store, sync,
};
use warden::server::Server;
use warden::{Access, App, Config, DbHandle, Method, Module, Router, response};

pub const SECRET: &str = "test-secret-that-is-at-least-32b!";
pub const EDITOR_ROLE: &str = "editor";
pub const ROOT_EMAIL: &str = "root@example.com";

// ---------------------------------------------------------------------------
// Blog module
// ---------------------------------------------------------------------------

/// Post id to author id.
pub struct Posts(HashMap<String, String>);

impl Posts {
    pub fn new(users: &Users) -> Self {
        Self(HashMap::from([
            ("1".to_string(), users.alice.clone()),
            ("2".to_string(), users.bob.clone()),
        ]))
    }

    fn find(&self, id: &str) -> Option<Instance> {
        let author = self.0.get(id)?;
        Some(Instance::new("Post", json!({ "id": id, "author_id": author })))
    }
}

pub struct Blog;

impl Module for Blog {
    fn name(&self) -> &'static str {
        "blog"
    }

    fn register(&self) -> Registration {
        Registration::new()
            .permission(PermissionDef::new("post.read", Action::Read, "Post"))
            .permission(PermissionDef::new("post.create", Action::Create, "Post"))
            .permission(
                PermissionDef::new("post.owner", Action::Owner, "Post").when(|user| {
                    let mut conditions = ConditionMap::new();
                    conditions.insert("author_id".into(), json!(user.id));
                    conditions
                }),
            )
            .role(RoleDef::new(USER_ROLE).permissions(["post.read", "post.owner"]))
            .role(RoleDef::new(EDITOR_ROLE).permissions(["post.create"]))
    }

    fn routes(&self, router: &mut Router) {
        router.group(true, |r| {
            r.get("/feed", |ctx| async move {
                response::ok(&json!({ "user": ctx.user_id() }))
            });
        });

        router.get("/me", |ctx| async move {
            let user = ctx.require_user_id()?;
            response::ok(&json!({ "user": user }))
        });

        router.route_with(
            Method::GET,
            "/posts",
            Access::new().check(checker::can(Action::Read, "Post")),
            |ctx| async move {
                let can_create = ctx.ability().is_some_and(|a| a.can(Action::Create, "Post"));
                response::ok(&json!({ "can_create": can_create }))
            },
        );

        router.route_with(
            Method::POST,
            "/posts",
            Access::new().check(checker::can(Action::Create, "Post")),
            |_ctx| async move { response::created(&json!({ "id": "3" })) },
        );

        router.route_with(
            Method::DELETE,
            "/posts/{id}",
            Access::new().check(checker::can(Action::Manage, "Post")),
            |_ctx| async move { Ok(response::no_content()) },
        );

        router.route_with(
            Method::PUT,
            "/posts/{id}",
            Access::new().check(checker::owns(
                Action::Owner,
                |services: &Container, id: String| {
                    let posts = services.resolve::<Posts>();
                    async move { Ok::<_, warden::Error>(posts?.find(&id)) }
                },
            )),
            |ctx| async move {
                let id = ctx.require_param("id")?;
                response::ok(&json!({ "id": id }))
            },
        );

        router.route_with(
            Method::GET,
            "/drafts",
            Access::guest().check(checker::can(Action::Read, "Post")),
            |_ctx| async move { response::ok(&json!([])) },
        );
    }
}

// ---------------------------------------------------------------------------
// Boot
// ---------------------------------------------------------------------------

pub struct Users {
    pub alice: String,
    pub bob: String,
    pub root: String,
}

pub struct Booted {
    pub server: Server,
    pub handle: DbHandle,
    pub config: Config,
    pub users: Users,
}

impl Booted {
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    pub fn token(&self, user_id: &str) -> String {
        warden::auth::create_token(&self.config.auth, user_id).expect("failed to sign token")
    }
}

/// Config for a server on a random local port.
pub fn config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.database.url = ":memory:".to_string();
    config.auth.jwt_secret = SECRET.to_string();
    config.auth.token_expiry_days = 1;
    config
}

pub fn app(config: Config, users: &Users) -> App {
    App::new(config)
        .module(Blog)
        .service(Arc::new(Posts::new(users)))
}

/// Create the schema and roles, then the accounts every test uses:
/// alice (user), bob (user + editor) and root (user).
pub async fn seed(handle: &DbHandle) -> Users {
    let conn = handle.connection();
    warden::db::migrate(conn).await.expect("migrate failed");
    let resolver = App::new(config()).module(Blog).resolver();
    sync::synchronize(conn, &resolver, None)
        .await
        .expect("initial sync failed");

    let user_role = store::find_role(conn, USER_ROLE).await.unwrap().unwrap();
    let editor_role = store::find_role(conn, EDITOR_ROLE).await.unwrap().unwrap();

    let alice = store::insert_user(conn, "alice", None, &json!({})).await.unwrap();
    let bob = store::insert_user(conn, "bob", None, &json!({})).await.unwrap();
    let root = store::insert_user(conn, "root", Some(ROOT_EMAIL), &json!({}))
        .await
        .unwrap();

    for user in [&alice, &bob, &root] {
        store::assign_role(conn, user, &user_role.id).await.unwrap();
    }
    store::assign_role(conn, &bob, &editor_role.id).await.unwrap();

    Users { alice, bob, root }
}

/// Seed an in-memory database and start the blog server on it.
pub async fn boot(config: Config) -> Booted {
    let handle = warden::db::connect(":memory:").await.expect("connect failed");
    let users = seed(&handle).await;
    let server = app(config.clone(), &users)
        .start_with(handle.clone())
        .await
        .expect("failed to start test server");
    Booted {
        server,
        handle,
        config,
        users,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// How a request presents its token.
#[derive(Clone, Copy)]
pub enum Credential<'a> {
    Anonymous,
    Bearer(&'a str),
    Cookie(&'a str),
}

/// Send a raw HTTP/1.1 request with `Connection: close` and read the full response.
pub async fn raw_request(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("failed to connect");
    stream.write_all(payload).await.expect("failed to write");

    let mut buf = Vec::new();
    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stream.read_to_end(&mut buf),
    )
    .await;
    buf
}

/// Send a request and return the status code and body.
pub async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    credential: Credential<'_>,
    body: &str,
) -> (u16, String) {
    let auth = match credential {
        Credential::Anonymous => String::new(),
        Credential::Bearer(token) => format!("Authorization: Bearer {token}\r\n"),
        Credential::Cookie(token) => format!("Cookie: theme=dark; auth_token={token}\r\n"),
    };
    let payload = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n{auth}\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );

    let response = raw_request(addr, payload.as_bytes()).await;
    let text = String::from_utf8_lossy(&response).into_owned();
    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or_else(|| panic!("malformed response:\n{text}"));
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
