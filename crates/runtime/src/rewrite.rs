//! URL rewriting seam for exposed endpoints. The surrounding system may
//! substitute an implementation that rewrites route hosts for external
//! access; the core only requires that a no-op rewriter exists.

use crate::model::RuntimeIdentity;

pub trait UrlRewriter: Send + Sync {
    fn rewrite(&self, identity: &RuntimeIdentity, url: &str) -> anyhow::Result<String>;
}

/// Rewriter that returns every URL unchanged.
pub struct NoOpUrlRewriter;

impl UrlRewriter for NoOpUrlRewriter {
    fn rewrite(&self, _identity: &RuntimeIdentity, url: &str) -> anyhow::Result<String> {
        Ok(url.to_string())
    }
}
