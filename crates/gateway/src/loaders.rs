//! The loader set built for each request.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use async_trait::async_trait;
use common::{OrderId, UserId};
use serde::de::DeserializeOwned;

use crate::client::{DownstreamClient, Downstreams};
use crate::context::AuthToken;
use crate::loader::{BatchFn, BatchLoader, LoaderConfig};
use crate::model::{OrderRecord, PaymentRecord, UserRecord};
use crate::LoadError;

/// Batch function over a downstream `/batch` endpoint.
///
/// Records are re-keyed with `key_of`, since the response order is not tied
/// to the request order.
pub struct HttpBatchFn<K, V> {
    client: DownstreamClient,
    path: &'static str,
    token: Option<AuthToken>,
    key_of: fn(&V) -> K,
}

impl<K, V> HttpBatchFn<K, V> {
    pub fn new(
        client: DownstreamClient,
        path: &'static str,
        token: Option<AuthToken>,
        key_of: fn(&V) -> K,
    ) -> Self {
        Self {
            client,
            path,
            token,
            key_of,
        }
    }
}

#[async_trait]
impl<K, V> BatchFn<K, V> for HttpBatchFn<K, V>
where
    K: Eq + Hash + Display + Send + Sync + 'static,
    V: DeserializeOwned + Send + Sync + 'static,
{
    fn resource(&self) -> &'static str {
        self.path
    }

    async fn load(&self, keys: &[K]) -> Result<HashMap<K, V>, LoadError> {
        let ids = keys.iter().map(ToString::to_string).collect();
        let records: Vec<V> = self
            .client
            .batch(self.path, ids, self.token.as_ref())
            .await?;
        Ok(records
            .into_iter()
            .map(|record| ((self.key_of)(&record), record))
            .collect())
    }
}

/// One loader per entity kind, all bound to the same caller credential.
pub struct Loaders {
    pub users: BatchLoader<UserId, UserRecord>,
    pub orders: BatchLoader<OrderId, OrderRecord>,
    pub payments_by_order: BatchLoader<OrderId, PaymentRecord>,
}

impl Loaders {
    pub fn new(downstreams: &Downstreams, token: Option<AuthToken>, config: LoaderConfig) -> Self {
        Self {
            users: BatchLoader::new(
                HttpBatchFn::new(downstreams.users.clone(), "users", token.clone(), |u: &UserRecord| u.id),
                config,
            ),
            orders: BatchLoader::new(
                HttpBatchFn::new(downstreams.orders.clone(), "orders", token.clone(), |o: &OrderRecord| o.id),
                config,
            ),
            payments_by_order: BatchLoader::new(
                HttpBatchFn::new(
                    downstreams.payments.clone(),
                    "payments/by-order",
                    token,
                    |p: &PaymentRecord| p.order_id,
                ),
                config,
            ),
        }
    }
}
