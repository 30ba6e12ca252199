//! Per-request authorization.
//!
//! For each matched route the guard:
//!
//! 1. reads the route's guest allowance,
//! 2. extracts the token from the source selected for the caller,
//! 3. authenticates it, falling back to anonymous access on guest routes,
//! 4. if the route declares checkers, loads the caller's ability and
//!    requires every checker to pass.
//!
//! Checker errors propagate unchanged; only `false` counts as a denial.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::rbac::{Resolver, builder};
use crate::router::{Context, Policy};

/// Authorize `ctx` against `policy`, recording the caller on success.
pub async fn authorize(policy: &Policy, resolver: &Resolver, ctx: &mut Context) -> Result<()> {
    match crate::auth::authenticate(&ctx.headers, &ctx.config, ctx.peer) {
        Ok(user_id) => ctx.user_id = Some(user_id),
        Err(e @ (Error::Unauthorized | Error::TokenExpired)) => {
            if !policy.guest {
                debug!(path = %ctx.uri.path(), "Rejected unauthenticated request");
                return Err(e);
            }
            debug!(path = %ctx.uri.path(), "Proceeding as guest");
        }
        Err(e) => return Err(e),
    }

    if policy.checkers.is_empty() {
        return Ok(());
    }

    // Checker-guarded routes need an identity even when guests are allowed.
    let Some(user_id) = ctx.user_id.clone() else {
        return Err(Error::Unauthorized);
    };

    let db = ctx.require_db()?;
    let Some((_, ability)) = builder::load(db.connection(), resolver, &user_id).await? else {
        warn!(user_id, "Authenticated user no longer exists");
        return Err(denied(ctx));
    };

    let mut allowed = true;
    for checker in &policy.checkers {
        if !checker.handle(&ability, &ctx.services, ctx).await? {
            allowed = false;
        }
    }

    if !allowed {
        warn!(user_id, method = %ctx.method, path = %ctx.uri.path(), "Permission denied");
        return Err(denied(ctx));
    }

    ctx.ability = Some(Arc::new(ability));
    Ok(())
}

fn denied(ctx: &Context) -> Error {
    Error::forbidden(ctx.method.as_str(), ctx.uri.path())
}
