//! A small blog API guarded by roles and ownership.
//!
//! ```sh
//! BLOG_JWT_SECRET=change-me-to-something-32-bytes-long cargo run --example blog
//! curl -X POST localhost:8080/api/register -d '{"username":"alice"}'
//! curl -X POST localhost:8080/api/posts -H "Authorization: Bearer $TOKEN" -d '{"title":"Hi"}'
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;
use warden::container::Container;
use warden::rbac::{
    Action, ConditionMap, Instance, PermissionDef, Registration, RoleDef, USER_ROLE, checker,
    store,
};
use warden::{Access, App, Loader, Method, Module, Overrides, Router, json, response};

#[derive(Default)]
struct Posts {
    posts: RwLock<HashMap<String, serde_json::Value>>,
}

impl Posts {
    async fn find(&self, id: &str) -> Option<Instance> {
        let post = self.posts.read().await.get(id)?.clone();
        Some(Instance::new("Post", post))
    }
}

#[derive(Deserialize)]
struct Register {
    username: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct Draft {
    title: String,
}

struct Blog {
    posts: Arc<Posts>,
}

impl Module for Blog {
    fn name(&self) -> &'static str {
        "blog"
    }

    fn register(&self) -> Registration {
        Registration::new()
            .permission(PermissionDef::new("post.read", Action::Read, "Post").label("Read posts"))
            .permission(
                PermissionDef::new("post.create", Action::Create, "Post").label("Write posts"),
            )
            .permission(
                PermissionDef::new("post.owner", Action::Owner, "Post")
                    .label("Edit own posts")
                    .when(|user| {
                        let mut conditions = ConditionMap::new();
                        conditions.insert("author_id".into(), json!(user.id));
                        conditions
                    }),
            )
            .role(
                RoleDef::new(USER_ROLE).permissions(["post.read", "post.create", "post.owner"]),
            )
    }

    fn routes(&self, router: &mut Router) {
        router.group(true, |r| {
            r.post("/api/register", |ctx| async move {
                let input: Register = ctx.json()?;
                let conn = ctx.require_db()?.connection();
                let email = input.email.as_deref();
                let id = store::insert_user(conn, &input.username, email, &json!({})).await?;
                if let Some(role) = store::find_role(conn, USER_ROLE).await? {
                    store::assign_role(conn, &id, &role.id).await?;
                }
                let token = warden::auth::create_token(&ctx.config.auth, &id)?;
                response::created(&json!({ "id": id, "token": token }))
            });

            let posts = Arc::clone(&self.posts);
            r.get("/api/posts", move |_ctx| {
                let posts = Arc::clone(&posts);
                async move {
                    let all: Vec<_> = posts.posts.read().await.values().cloned().collect();
                    response::ok(&all)
                }
            });
        });

        let posts = Arc::clone(&self.posts);
        router.route_with(
            Method::POST,
            "/api/posts",
            Access::new().check(checker::can(Action::Create, "Post")),
            move |ctx| {
                let posts = Arc::clone(&posts);
                async move {
                    let draft: Draft = ctx.json()?;
                    let author = ctx.require_user_id()?;
                    let id = next_id(&posts).await;
                    let post = json!({ "id": id, "title": draft.title, "author_id": author });
                    posts.posts.write().await.insert(id, post.clone());
                    response::created(&post)
                }
            },
        );

        let posts = Arc::clone(&self.posts);
        router.route_with(
            Method::PUT,
            "/api/posts/{id}",
            Access::new().check(checker::owns(
                Action::Owner,
                |services: &Container, id: String| {
                    let posts = services.resolve::<Posts>();
                    async move {
                        let posts = posts?;
                        Ok::<_, warden::Error>(posts.find(&id).await)
                    }
                },
            )),
            move |ctx| {
                let posts = Arc::clone(&posts);
                async move {
                    let draft: Draft = ctx.json()?;
                    let id = ctx.require_param("id")?;
                    let mut all = posts.posts.write().await;
                    let post = all
                        .get_mut(id)
                        .ok_or_else(|| warden::Error::NotFound(format!("Post {id}")))?;
                    post["title"] = json!(draft.title);
                    response::ok(post)
                }
            },
        );
    }
}

async fn next_id(posts: &Posts) -> String {
    (posts.posts.read().await.len() + 1).to_string()
}

#[tokio::main]
async fn main() -> warden::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,warden=debug")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Loader::new("BLOG").load(config_path.as_deref(), Overrides::default())?;

    let posts = Arc::new(Posts::default());
    App::new(config)
        .module(Blog {
            posts: Arc::clone(&posts),
        })
        .service(posts)
        .run()
        .await
}
