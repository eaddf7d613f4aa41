//! Interfaces to the host's asset loading and display layers.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::asset::DisplayHandle;
use super::level::Quality;
use crate::error::{DisplayError, LoadError};

/// Fetches an instance for a source locator.
#[async_trait]
pub trait AssetLoader<I>: Send + Sync + 'static {
    async fn load(&self, locator: &str) -> Result<I, LoadError>;
}

/// Adapter turning an async closure into an [`AssetLoader`].
pub struct FnLoader<F, I> {
    load: F,
    _instance: PhantomData<fn() -> I>,
}

impl<F, I> FnLoader<F, I> {
    pub fn new(load: F) -> Self {
        Self {
            load,
            _instance: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, I> AssetLoader<I> for FnLoader<F, I>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<I, LoadError>> + Send,
    I: Send + 'static,
{
    async fn load(&self, locator: &str) -> Result<I, LoadError> {
        (self.load)(locator.to_string()).await
    }
}

/// Attaches loaded instances to display nodes.
///
/// Called while the manager holds its registry lock; implementations must
/// not call back into the manager.
pub trait DisplayTarget<I>: Send + Sync {
    fn attach(&self, handle: DisplayHandle, instance: &I, quality: Quality)
        -> Result<(), DisplayError>;

    fn detach(&self, handle: DisplayHandle) -> Result<(), DisplayError>;
}

/// Display target for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl<I> DisplayTarget<I> for NullDisplay {
    fn attach(&self, _: DisplayHandle, _: &I, _: Quality) -> Result<(), DisplayError> {
        Ok(())
    }

    fn detach(&self, _: DisplayHandle) -> Result<(), DisplayError> {
        Ok(())
    }
}
