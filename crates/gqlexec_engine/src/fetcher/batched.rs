//! The batched fetcher path.
//!
//! Batched fetchers receive every source of a list at once. Per-source fetchers join that
//! path through [`UnbatchedDataFetcher`], and the per-object strategies consume batched
//! fetchers through [`SingleSourceFetcher`].

use super::{DataFetcher, DataFetcherResult, DataFetchingEnvironment, FetchResult};
use crate::error::FieldError;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

/// Fetches one field for many sources in one call.
pub trait BatchedDataFetcher: Send + Sync + 'static {
    /// Returns one value per source, in source order.
    fn get_batch(
        &self,
        env: DataFetchingEnvironment,
        sources: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, FieldError>>;
}

/// Runs a per-source fetcher once for each source of a batch.
pub struct UnbatchedDataFetcher {
    delegate: Arc<dyn DataFetcher>,
}

impl UnbatchedDataFetcher {
    pub fn new(delegate: Arc<dyn DataFetcher>) -> Self {
        Self { delegate }
    }
}

impl BatchedDataFetcher for UnbatchedDataFetcher {
    fn get_batch(
        &self,
        env: DataFetchingEnvironment,
        sources: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, FieldError>> {
        let fetches: Vec<_> = sources
            .into_iter()
            .map(|source| self.delegate.get(env.with_source(source)))
            .collect();
        async move {
            let results = try_join_all(fetches).await?;
            Ok(results.into_iter().map(|result| result.data).collect())
        }
        .boxed()
    }
}

/// Presents a batched fetcher as a per-source one.
pub struct SingleSourceFetcher {
    batched: Arc<dyn BatchedDataFetcher>,
}

impl SingleSourceFetcher {
    pub fn new(batched: Arc<dyn BatchedDataFetcher>) -> Self {
        Self { batched }
    }
}

impl DataFetcher for SingleSourceFetcher {
    fn get(&self, env: DataFetchingEnvironment) -> BoxFuture<'static, FetchResult> {
        let source = env.source().clone();
        let batch = self.batched.get_batch(env, vec![source]);
        async move {
            let mut values = batch.await?;
            if values.len() != 1 {
                return Err(FieldError::new(format!(
                    "batched data fetcher returned {} values for 1 source",
                    values.len()
                )));
            }
            Ok(DataFetcherResult::new(values.pop().unwrap_or(Value::Null)))
        }
        .boxed()
    }
}
