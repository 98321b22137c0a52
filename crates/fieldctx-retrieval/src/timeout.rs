use std::future::Future;
use std::time::Duration;

use fieldctx_core::{Error, Result};

pub(crate) async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{what} exceeded {} ms", limit.as_millis()))),
    }
}
