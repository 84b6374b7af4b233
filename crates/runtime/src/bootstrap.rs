//! Bootstrapper seam: the mechanism that runs a machine's declared
//! installers inside its container once the container is up.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{Installer, RuntimeIdentity};

/// Performs the blocking, possibly long-running bring-up sequence for one
/// machine. May return a classified infrastructure error or be cancelled
/// mid-flight (surfaced as [`crate::RuntimeError::Cancelled`]).
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(&self) -> anyhow::Result<()>;
}

/// Builds a [`Bootstrapper`] for one machine of a runtime.
pub trait BootstrapperFactory: Send + Sync {
    fn create(
        &self,
        identity: &RuntimeIdentity,
        machine_name: &str,
        installers: &[Installer],
    ) -> Arc<dyn Bootstrapper>;
}

/// Bootstrapper that performs no work. For environments whose machines
/// declare no installers, and for minimal configurations.
pub struct NoopBootstrapper;

#[async_trait]
impl Bootstrapper for NoopBootstrapper {
    async fn bootstrap(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Factory handing out [`NoopBootstrapper`] for every machine.
pub struct NoopBootstrapperFactory;

impl BootstrapperFactory for NoopBootstrapperFactory {
    fn create(
        &self,
        _identity: &RuntimeIdentity,
        _machine_name: &str,
        _installers: &[Installer],
    ) -> Arc<dyn Bootstrapper> {
        Arc::new(NoopBootstrapper)
    }
}
