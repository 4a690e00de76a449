//! Invoice number allocation.

use rand::Rng;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::services::store::Store;

/// Base used when the ledger holds no invoices yet.
const EMPTY_LEDGER_BASE: i64 = 1000;

/// Upper bound on the linear existence probe.
const DEFAULT_MAX_PROBES: u32 = 1000;

pub struct InvoiceNumberAllocator {
    store: Arc<dyn Store>,
    max_probes: u32,
}

impl InvoiceNumberAllocator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            max_probes: DEFAULT_MAX_PROBES,
        }
    }

    pub fn with_max_probes(store: Arc<dyn Store>, max_probes: u32) -> Self {
        Self { store, max_probes }
    }

    /// Determine a free invoice number.
    ///
    /// A proposed number is probed upward until a free one is found.
    /// Without a proposal the number derives from the most recently
    /// created invoice's number plus a random gap of 3 to 5, starting
    /// from 1000 on an empty ledger.
    #[instrument(skip(self))]
    pub async fn allocate(&self, proposed: Option<&str>) -> Result<String, AppError> {
        match proposed {
            Some(raw) => self.probe_from(parse_proposed(raw)?).await,
            None => self.next_from_latest().await,
        }
    }

    async fn probe_from(&self, start: i64) -> Result<String, AppError> {
        let mut candidate = start;
        for _ in 0..self.max_probes {
            let number = candidate.to_string();
            if !self.store.invoice_number_exists(&number).await? {
                if candidate != start {
                    info!(
                        proposed = start,
                        allocated = %number,
                        "Proposed invoice number taken, advanced to next free"
                    );
                }
                return Ok(number);
            }
            candidate += 1;
        }
        Err(AppError::ResourceExhausted(anyhow::anyhow!(
            "No free invoice number within {} probes of {}",
            self.max_probes,
            start
        )))
    }

    async fn next_from_latest(&self) -> Result<String, AppError> {
        let base = match self.store.latest_invoice().await? {
            // A stored number that does not parse falls back to the
            // empty-ledger base rather than poisoning the arithmetic.
            Some(invoice) => invoice
                .number
                .trim()
                .parse::<i64>()
                .unwrap_or(EMPTY_LEDGER_BASE),
            None => EMPTY_LEDGER_BASE,
        };
        let increment = rand::thread_rng().gen_range(3..=5);
        Ok((base + increment).to_string())
    }
}

/// The proposed value must be an integer; anything else is rejected
/// outright rather than probed.
fn parse_proposed(raw: &str) -> Result<i64, AppError> {
    raw.trim().parse::<i64>().map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!(
            "Proposed invoice number '{}' is not an integer",
            raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewInvoice, NewInvoiceLine};
    use crate::services::memory::MemoryStore;
    use chrono::NaiveDate;
    use uuid::Uuid;

    async fn seed_invoice(store: &MemoryStore, number: &str) {
        let header = NewInvoice {
            number: number.to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            client_id: Uuid::new_v4(),
        };
        let lines: Vec<NewInvoiceLine> = Vec::new();
        store
            .insert_invoice_with_lines(&header, &lines)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_ledger_allocates_just_past_the_default_base() {
        let store = Arc::new(MemoryStore::new());
        let allocator = InvoiceNumberAllocator::new(store);

        let number: i64 = allocator.allocate(None).await.unwrap().parse().unwrap();
        assert!((1003..=1005).contains(&number), "got {}", number);
    }

    #[tokio::test]
    async fn base_follows_the_most_recent_invoice() {
        let store = Arc::new(MemoryStore::new());
        seed_invoice(&store, "2000").await;
        let allocator = InvoiceNumberAllocator::new(store);

        let number: i64 = allocator.allocate(None).await.unwrap().parse().unwrap();
        assert!((2003..=2005).contains(&number), "got {}", number);
    }

    #[tokio::test]
    async fn base_is_insertion_order_not_numeric_maximum() {
        let store = Arc::new(MemoryStore::new());
        seed_invoice(&store, "9000").await;
        seed_invoice(&store, "3000").await;
        let allocator = InvoiceNumberAllocator::new(store);

        let number: i64 = allocator.allocate(None).await.unwrap().parse().unwrap();
        assert!((3003..=3005).contains(&number), "got {}", number);
    }

    #[tokio::test]
    async fn taken_proposal_advances_to_next_free() {
        let store = Arc::new(MemoryStore::new());
        seed_invoice(&store, "100").await;
        let allocator = InvoiceNumberAllocator::new(store);

        assert_eq!(allocator.allocate(Some("100")).await.unwrap(), "101");
    }

    #[tokio::test]
    async fn free_proposal_is_returned_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let allocator = InvoiceNumberAllocator::new(store);

        assert_eq!(allocator.allocate(Some("42")).await.unwrap(), "42");
    }

    #[tokio::test]
    async fn non_numeric_proposal_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let allocator = InvoiceNumberAllocator::new(store);

        let result = allocator.allocate(Some("A-17")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn probe_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        for n in 100..103 {
            seed_invoice(&store, &n.to_string()).await;
        }
        let allocator = InvoiceNumberAllocator::with_max_probes(store, 3);

        let result = allocator.allocate(Some("100")).await;
        assert!(matches!(result, Err(AppError::ResourceExhausted(_))));
    }

    #[tokio::test]
    async fn non_numeric_latest_number_falls_back_to_default_base() {
        let store = Arc::new(MemoryStore::new());
        seed_invoice(&store, "DRAFT-7").await;
        let allocator = InvoiceNumberAllocator::new(store);

        let number: i64 = allocator.allocate(None).await.unwrap().parse().unwrap();
        assert!((1003..=1005).contains(&number), "got {}", number);
    }
}
