//! Route checkers.
//!
//! A checker is a predicate over the caller's [`Ability`], the service
//! [`Container`] and the raw request [`Context`]. Plain functions are
//! wrapped with [`predicate`]; stateful or async checks implement
//! [`Checker`] directly.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::ability::{Ability, Instance};
use super::rule::Action;
use crate::Result;
use crate::container::Container;
use crate::router::{BoxFuture, Context};

/// A declared authorization check for a route.
pub trait Checker: Send + Sync {
    fn handle<'a>(
        &'a self,
        ability: &'a Ability,
        services: &'a Container,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<bool>>;
}

/// Shared checker as stored in the route table.
pub type SharedChecker = Arc<dyn Checker>;

/// A checker backed by a synchronous function.
pub struct Predicate<F>(F);

impl<F> Checker for Predicate<F>
where
    F: Fn(&Ability, &Container, &Context) -> bool + Send + Sync,
{
    fn handle<'a>(
        &'a self,
        ability: &'a Ability,
        services: &'a Container,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<bool>> {
        let allowed = (self.0)(ability, services, ctx);
        Box::pin(std::future::ready(Ok(allowed)))
    }
}

/// Wrap a function as a checker.
pub fn predicate<F>(f: F) -> SharedChecker
where
    F: Fn(&Ability, &Container, &Context) -> bool + Send + Sync + 'static,
{
    Arc::new(Predicate(f))
}

/// Require `action` on `subject` at type level.
pub fn can(action: Action, subject: impl Into<String>) -> SharedChecker {
    let subject = subject.into();
    predicate(move |ability, _, _| ability.can(action, &subject))
}

/// Loads the instance a request addresses, given its id.
pub type Loader =
    Arc<dyn Fn(&Container, String) -> BoxFuture<'static, Result<Option<Instance>>> + Send + Sync>;

/// Per-instance check: load the resource addressed by the request and
/// require `action` on it.
pub struct Owns {
    action: Action,
    loader: Loader,
}

impl Checker for Owns {
    fn handle<'a>(
        &'a self,
        ability: &'a Ability,
        services: &'a Container,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let Some(id) = request_id(ctx) else {
                return Ok(false);
            };
            match (self.loader)(services, id).await? {
                Some(instance) => Ok(ability.can_instance(self.action, &instance)),
                None => Ok(false),
            }
        })
    }
}

/// Build an [`Owns`] checker from an async loader.
pub fn owns<F, Fut>(action: Action, loader: F) -> SharedChecker
where
    F: Fn(&Container, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Instance>>> + Send + 'static,
{
    let loader: Loader = Arc::new(
        move |services: &Container, id: String| -> BoxFuture<'static, Result<Option<Instance>>> {
            Box::pin(loader(services, id))
        },
    );
    Arc::new(Owns { action, loader })
}

/// The addressed resource id: `params.id`, else `body.id`.
pub fn request_id(ctx: &Context) -> Option<String> {
    if let Some(id) = ctx.param("id") {
        return Some(id.to_string());
    }
    let body: Value = serde_json::from_slice(&ctx.body).ok()?;
    match body.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
