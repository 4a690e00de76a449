//! Client and product reconciliation.
//!
//! Clients resolve by (name, tax id) with first-write-wins semantics:
//! once stored, a client's fields are never touched again, even when a
//! later invoice submits different address data. Products resolve by
//! active name; a price or tax-rate divergence retires the active row
//! and inserts a replacement, keeping the old row for line-snapshot
//! history.

use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{NewClient, NewProduct};
use crate::services::store::Store;

/// Retries when an insert loses a race against a concurrent
/// reconciliation of the same name.
const MAX_RECONCILE_ATTEMPTS: u32 = 3;

pub struct EntityReconciler {
    store: Arc<dyn Store>,
}

impl EntityReconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve a client id, inserting the client on first sight.
    #[instrument(skip(self, input), fields(client_name = %input.name))]
    pub async fn resolve_client(&self, input: &NewClient) -> Result<Uuid, AppError> {
        if let Some(existing) = self
            .store
            .get_client_by_name_and_tax_id(&input.name, &input.tax_id)
            .await?
        {
            return Ok(existing.client_id);
        }

        let client = self.store.insert_client(input).await?;
        Ok(client.client_id)
    }

    /// Resolve the active product id for a line, creating or replacing
    /// the product as needed.
    ///
    /// `allow_replace` gates the divergence branch: without it a price
    /// or tax-rate mismatch is a conflict and nothing is written.
    #[instrument(skip(self, spec), fields(product_name = %spec.name))]
    pub async fn resolve_product(
        &self,
        spec: &NewProduct,
        allow_replace: bool,
    ) -> Result<Uuid, AppError> {
        let mut last_conflict: Option<AppError> = None;

        for _ in 0..MAX_RECONCILE_ATTEMPTS {
            match self.store.get_active_product_by_name(&spec.name).await? {
                None => match self.store.insert_product(spec).await {
                    Ok(product) => return Ok(product.product_id),
                    // A concurrent request registered the name first;
                    // re-read and reconcile against the winner.
                    Err(err @ AppError::Conflict(_)) => {
                        last_conflict = Some(err);
                        continue;
                    }
                    Err(err) => return Err(err),
                },
                Some(existing)
                    if existing.unit_price == spec.unit_price
                        && existing.tax_rate == spec.tax_rate =>
                {
                    return Ok(existing.product_id);
                }
                Some(existing) => {
                    if !allow_replace {
                        return Err(AppError::Conflict(anyhow::anyhow!(
                            "Active product '{}' has a different price or tax rate; set allow_replace to supersede it",
                            existing.name
                        )));
                    }

                    self.store.deactivate_product(existing.product_id).await?;
                    match self.store.insert_product(spec).await {
                        Ok(product) => {
                            info!(
                                superseded = %existing.product_id,
                                product_id = %product.product_id,
                                "Product replaced after price or tax change"
                            );
                            return Ok(product.product_id);
                        }
                        Err(err @ AppError::Conflict(_)) => {
                            last_conflict = Some(err);
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        Err(last_conflict.unwrap_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "Could not reconcile product '{}' after {} attempts",
                spec.name,
                MAX_RECONCILE_ATTEMPTS
            ))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryStore;

    fn client(name: &str, tax_id: &str) -> NewClient {
        NewClient {
            name: name.to_string(),
            address: String::new(),
            locality: String::new(),
            postal_code: String::new(),
            region: String::new(),
            tax_id: tax_id.to_string(),
        }
    }

    fn product(name: &str, unit_price: &str, tax_rate: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: String::new(),
            unit_price: unit_price.parse().unwrap(),
            tax_rate: tax_rate.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn client_resolution_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_client(&client("ACME", "B123"))
            .await
            .unwrap();
        let second = reconciler
            .resolve_client(&client("ACME", "B123"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.search_clients("", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn client_lookup_ignores_case() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_client(&client("Acme", "b123"))
            .await
            .unwrap();
        let second = reconciler
            .resolve_client(&client("ACME", "B123"))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn repeat_client_keeps_first_stored_fields() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let mut input = client("ACME", "B123");
        input.address = "Old Street 1".to_string();
        let id = reconciler.resolve_client(&input).await.unwrap();

        let mut differing = client("ACME", "B123");
        differing.address = "New Street 2".to_string();
        reconciler.resolve_client(&differing).await.unwrap();

        let stored = store.get_client(id).await.unwrap().unwrap();
        assert_eq!(stored.address, "Old Street 1");
    }

    #[tokio::test]
    async fn unchanged_product_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_product(&product("Widget", "10.00", "21"), false)
            .await
            .unwrap();
        let second = reconciler
            .resolve_product(&product("Widget", "10.00", "21"), false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.product_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn diverging_product_is_replaced_when_allowed() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_product(&product("Widget", "10.00", "21"), false)
            .await
            .unwrap();
        let second = reconciler
            .resolve_product(&product("Widget", "12.00", "21"), true)
            .await
            .unwrap();

        assert_ne!(first, second);

        let history = store.product_history().await.unwrap();
        assert_eq!(history.len(), 2);

        let old = store.get_product(first).await.unwrap().unwrap();
        assert!(!old.active);
        let new = store.get_product(second).await.unwrap().unwrap();
        assert!(new.active);

        // Subsequent lookups land on the replacement.
        let active = store
            .get_active_product_by_name("Widget")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.product_id, second);
    }

    #[tokio::test]
    async fn divergence_without_consent_is_a_conflict() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_product(&product("Widget", "10.00", "21"), false)
            .await
            .unwrap();
        let result = reconciler
            .resolve_product(&product("Widget", "12.00", "21"), false)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));

        // Nothing was written: the original row is still the active one.
        let history = store.product_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].product_id, first);
        assert!(history[0].active);
    }

    #[tokio::test]
    async fn tax_rate_change_alone_triggers_replacement() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_product(&product("Widget", "10.00", "21"), false)
            .await
            .unwrap();
        let second = reconciler
            .resolve_product(&product("Widget", "10.00", "10"), true)
            .await
            .unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn equality_is_numeric_not_textual() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = EntityReconciler::new(store.clone());

        let first = reconciler
            .resolve_product(&product("Widget", "10.00", "21.0"), false)
            .await
            .unwrap();
        // 10 == 10.00 and 21 == 21.0 as decimal values.
        let second = reconciler
            .resolve_product(&product("Widget", "10", "21"), false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.product_history().await.unwrap().len(),
            1,
            "no replacement for numerically equal values"
        );
    }
}
