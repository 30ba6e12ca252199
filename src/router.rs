//! HTTP routing with matchit.
//!
//! Every route carries an [`Access`] entry: whether guests may call it and
//! which checkers must pass. The server's guard reads this table before
//! dispatching to the handler.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::config::SharedConfig;
use crate::container::Container;
use crate::rbac::{Ability, SharedChecker};
use crate::response::HttpResponse;
use hyper::Method;

/// Boxed future for async handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler context passed to route handlers.
pub struct Context {
    /// The HTTP method.
    pub method: Method,
    /// The request URI.
    pub uri: hyper::Uri,
    /// The request headers.
    pub headers: hyper::http::HeaderMap,
    /// Route parameters (e.g., {id} from path).
    pub params: HashMap<String, String>,
    /// The request body, pre-read as bytes.
    pub body: Bytes,
    /// Address of the connected peer.
    pub peer: Option<IpAddr>,
    /// Database handle. Optional for modules that don't need a database.
    pub db: Option<crate::db::Handle>,
    /// Server configuration.
    pub config: SharedConfig,
    /// Services registered at startup.
    pub services: Arc<Container>,
    /// Authenticated caller, set by the guard.
    pub user_id: Option<String>,
    /// Caller's ability, set by the guard on checker-guarded routes.
    pub ability: Option<Arc<Ability>>,
}

impl Context {
    /// Parse the request body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            serde_json::from_value(serde_json::Value::Null)
                .map_err(|e| crate::Error::BadRequest(format!("Invalid request body: {e}")))
        } else {
            serde_json::from_slice(&self.body)
                .map_err(|e| crate::Error::BadRequest(format!("Invalid request body: {e}")))
        }
    }

    /// Get a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get a route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    /// Get a required route parameter, returning BadRequest if missing.
    pub fn require_param(&self, name: &str) -> Result<&str> {
        self.param(name)
            .ok_or_else(|| crate::Error::BadRequest(format!("Missing parameter: {name}")))
    }

    /// Authenticated user ID, if the request carried a valid token.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Require authenticated user, returning Unauthorized if not present.
    pub fn require_user_id(&self) -> Result<&str> {
        self.user_id().ok_or(crate::Error::Unauthorized)
    }

    /// The caller's ability, if the guard built one.
    pub fn ability(&self) -> Option<&Ability> {
        self.ability.as_deref()
    }

    /// Get the database handle if available.
    pub fn db(&self) -> Option<&crate::db::Handle> {
        self.db.as_ref()
    }

    /// Require database, returning Internal error if not configured.
    pub fn require_db(&self) -> Result<&crate::db::Handle> {
        self.db
            .as_ref()
            .ok_or_else(|| crate::Error::Internal("Database not configured".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self {
            method: Method::GET,
            uri: hyper::Uri::from_static("/"),
            headers: hyper::http::HeaderMap::new(),
            params: HashMap::new(),
            body: Bytes::new(),
            peer: None,
            db: None,
            config: Arc::new(crate::Config::default()),
            services: Arc::new(Container::new()),
            user_id: None,
            ability: None,
        }
    }
}

/// Handler function type.
/// Takes a Context and returns a future resolving to a Response.
pub type Handler = Box<dyn Fn(Context) -> BoxFuture<'static, Result<HttpResponse>> + Send + Sync>;

/// Access requirements declared for a route.
#[derive(Clone, Default)]
pub struct Access {
    /// Guest allowance. `None` defers to the enclosing group.
    pub guest: Option<bool>,
    /// Checkers that must all pass.
    pub checkers: Vec<SharedChecker>,
}

impl Access {
    /// Authenticated access, no checkers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow unauthenticated callers.
    pub fn guest() -> Self {
        Self {
            guest: Some(true),
            checkers: Vec::new(),
        }
    }

    /// Add a checker.
    pub fn check(mut self, checker: SharedChecker) -> Self {
        self.checkers.push(checker);
        self
    }
}

/// Access entry after group defaults are applied.
pub struct Policy {
    pub guest: bool,
    pub checkers: Vec<SharedChecker>,
}

/// A handler together with its access policy.
pub struct Route {
    pub handler: Handler,
    pub policy: Policy,
}

/// A registered route with method-specific handlers.
struct RouteEntry {
    handlers: HashMap<Method, Route>,
}

/// HTTP router for registering and dispatching requests.
pub struct Router {
    routes: matchit::Router<usize>,
    entries: Vec<RouteEntry>,
    /// Registered path templates, compared literally.
    paths: HashMap<String, usize>,
    group_guest: Option<bool>,
}

impl Router {
    /// Create a new router.
    pub fn new() -> Self {
        Self {
            routes: matchit::Router::new(),
            entries: Vec::new(),
            paths: HashMap::new(),
            group_guest: None,
        }
    }

    /// Register routes sharing a guest default. Routes may still override it.
    pub fn group(&mut self, guest: bool, f: impl FnOnce(&mut Router)) {
        let previous = self.group_guest.replace(guest);
        f(self);
        self.group_guest = previous;
    }

    /// Register a handler with explicit access requirements.
    ///
    /// # Panics
    /// Panics if `path` is not a valid template or conflicts with an
    /// already registered one.
    pub fn route_with<F, Fut>(&mut self, method: Method, path: &str, access: Access, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        let entry_idx = match self.paths.get(path) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                if let Err(e) = self.routes.insert(path, idx) {
                    panic!("Cannot register route {path}: {e}");
                }
                self.entries.push(RouteEntry {
                    handlers: HashMap::new(),
                });
                self.paths.insert(path.to_string(), idx);
                idx
            }
        };

        let policy = Policy {
            guest: access.guest.or(self.group_guest).unwrap_or(false),
            checkers: access.checkers,
        };
        let boxed: Handler = Box::new(move |ctx| Box::pin(handler(ctx)));
        self.entries[entry_idx].handlers.insert(
            method,
            Route {
                handler: boxed,
                policy,
            },
        );
    }

    /// Register a handler requiring authentication (or the group default).
    ///
    /// # Example
    /// ```ignore
    /// router.route(Method::GET, "/api/v1/users", |ctx| async move {
    ///     response::ok(&["user1", "user2"])
    /// });
    /// ```
    pub fn route<F, Fut>(&mut self, method: Method, path: &str, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route_with(method, path, Access::new(), handler);
    }

    /// Convenience method for GET requests.
    pub fn get<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::GET, path, handler);
    }

    /// Convenience method for POST requests.
    pub fn post<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::POST, path, handler);
    }

    /// Convenience method for PUT requests.
    pub fn put<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::PUT, path, handler);
    }

    /// Convenience method for DELETE requests.
    pub fn delete<F, Fut>(&mut self, path: &str, handler: F)
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::DELETE, path, handler);
    }

    /// Convert to a thread-safe handle for use in request handling.
    pub fn into_handle(self) -> Arc<RouterHandle> {
        Arc::new(RouterHandle {
            routes: self.routes,
            entries: self.entries,
        })
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe router handle for use in request handling.
pub struct RouterHandle {
    routes: matchit::Router<usize>,
    entries: Vec<RouteEntry>,
}

/// Result of matching a request to a route.
pub enum RouteMatch<'a> {
    /// Route matched with handler.
    Matched {
        route: &'a Route,
        params: HashMap<String, String>,
    },
    /// Path matched but method not allowed.
    MethodNotAllowed,
    /// Path not found.
    NotFound,
}

impl RouterHandle {
    /// Match a request to a route.
    pub fn match_route(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        match self.routes.at(path) {
            Ok(matched) => {
                let entry = &self.entries[*matched.value];

                // Convert params to owned HashMap
                let params: HashMap<String, String> = matched
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                match entry.handlers.get(method) {
                    Some(route) => RouteMatch::Matched { route, params },
                    None => RouteMatch::MethodNotAllowed,
                }
            }
            Err(_) => RouteMatch::NotFound,
        }
    }
}
