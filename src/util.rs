//! Shared async helpers for waiting on child processes.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;

use crate::{blog_warn, Error, Result};

/// Current-thread runtime; steps never run concurrently.
pub fn runtime() -> Result<Runtime> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

/// Await `fut`, failing with `Error::Timeout` after `duration` if one is set.
pub async fn with_timeout<F, T>(duration: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match duration {
        None => fut.await,
        Some(d) => match timeout(d, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(Error::Timeout(d)),
        },
    }
}

/// Await `fut`, failing with `Error::Interrupted` on Ctrl-C.
///
/// Dropping `fut` is what stops the work, so futures owning a child
/// process must have been spawned with `kill_on_drop`.
pub async fn interruptible<F, T>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::pin!(fut);
    tokio::select! {
        out = &mut fut => out,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => Err(Error::Interrupted),
            Err(e) => {
                blog_warn!("Cannot listen for Ctrl-C: {}", e);
                fut.await
            }
        },
    }
}
