//! Discovery bearer token with a fixed time-to-live.

use crate::caches::{AuthToken, TokenCache};
use crate::context::CdrContext;
use crate::CdrResult;

#[derive(Clone, Copy)]
pub struct TokenService<'a> {
    ctx: &'a CdrContext,
}

impl<'a> TokenService<'a> {
    pub fn new(ctx: &'a CdrContext) -> Self {
        Self { ctx }
    }

    /// The cached token while it is younger than the TTL, otherwise a fresh one.
    ///
    /// # Errors
    ///
    /// Authentication failures are returned after the cached entry has been removed.
    pub async fn get(&self) -> CdrResult<String> {
        let cache = TokenCache::new(self.ctx.global_store());
        let now = self.ctx.clock().now_ms();
        let ttl_ms = i64::try_from(self.ctx.cfg().token_ttl().as_millis()).unwrap_or(i64::MAX);

        if let Some(token) = cache.get()? {
            if token.is_valid(now, ttl_ms) {
                tracing::debug!("using cached discovery token");
                return Ok(token.jwt);
            }
        }

        tracing::info!("requesting discovery token");
        match self.ctx.fhir().authenticate().await {
            Ok(jwt) => {
                cache.set(&AuthToken {
                    jwt: jwt.clone(),
                    created_at: now,
                })?;
                Ok(jwt)
            }
            Err(e) => {
                cache.delete();
                Err(e.into())
            }
        }
    }
}
