//! Application startup.
//!
//! [`App`] owns the boot sequence:
//!
//! 1. fold every module's [`Registration`](crate::rbac::Registration) into
//!    one [`Resolver`], in the order the modules were added,
//! 2. connect to the database and create the schema if needed,
//! 3. reconcile declared roles and permissions into the store,
//! 4. collect routes and start serving.
//!
//! Nothing registered after step 1 can change the resolver.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::container::Container;
use crate::db;
use crate::module::Module;
use crate::rbac::{Resolver, ResolverBuilder, sync};
use crate::router::Router;
use crate::server::{self, Server, State};

/// Builder for a server made of feature modules.
pub struct App {
    config: Config,
    modules: Vec<Box<dyn Module>>,
    services: Container,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            modules: Vec::new(),
            services: Container::new(),
        }
    }

    /// Add a feature module. Registration order is preserved.
    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    /// Make a service available to checkers.
    pub fn service<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.services.insert(service);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fold module registrations into a resolver.
    pub fn resolver(&self) -> Resolver {
        let mut builder = ResolverBuilder::new();
        for module in &self.modules {
            builder.register(module.register());
            info!(module = module.name(), "Registered permissions");
        }
        builder.build()
    }

    /// Collect every module's routes.
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for module in &self.modules {
            module.routes(&mut router);
        }
        router
    }

    /// Connect to the configured database, then boot.
    pub async fn start(self) -> crate::Result<Server> {
        let handle = db::connect(&self.config.database.url).await?;
        self.start_with(handle).await
    }

    /// Boot against an already connected database.
    pub async fn start_with(mut self, handle: db::Handle) -> crate::Result<Server> {
        let resolver = self.resolver();

        db::migrate(handle.connection()).await?;
        sync::run(
            handle.connection(),
            &resolver,
            self.config.rbac.super_admin.as_deref(),
        )
        .await;

        let router = self.router().into_handle();
        self.services.insert(Arc::new(handle.clone()));

        server::start(State {
            config: Arc::new(self.config),
            db: Some(handle),
            router,
            resolver: Arc::new(resolver),
            services: Arc::new(self.services),
        })
        .await
    }

    /// Boot and serve until the accept loop exits.
    pub async fn run(self) -> crate::Result<()> {
        self.start().await?.wait().await
    }
}
