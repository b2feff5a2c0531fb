use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::store::{OrderStore, PageCursor, StoreError};

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::EventEnvelope;
use super::value_objects::{DriverId, OrderId};

// ============================================================================
// Assignment Service - Drivers racing for READY orders
// ============================================================================
//
// A claim commits only if the order's version is unchanged since it was read.
// The loser of a race gets AlreadyClaimed and is never retried here.
//
// ============================================================================

pub struct AssignmentService {
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
    page_size: usize,
}

impl AssignmentService {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<Metrics>, page_size: usize) -> Self {
        Self {
            store,
            metrics,
            page_size: page_size.max(1),
        }
    }

    /// READY → ON_THE_WAY for `driver_id`, atomically.
    pub async fn claim(&self, order_id: OrderId, driver_id: DriverId) -> Result<Order, OrderError> {
        let result = self.try_claim(order_id, driver_id).await;

        match &result {
            Ok(order) => {
                self.metrics.record_claim("won");
                self.metrics.record_transition("READY", order.status.as_str());
                tracing::info!(order_id = %order_id, driver_id = %driver_id, "Order claimed");
            }
            Err(e) => {
                let outcome = match e {
                    OrderError::AlreadyClaimed(_) => "lost",
                    OrderError::DriverAlreadyDelivering => "driver_busy",
                    _ => "rejected",
                };
                self.metrics.record_claim(outcome);
                self.metrics.record_rejection("claim", e.code());
                tracing::info!(
                    order_id = %order_id,
                    driver_id = %driver_id,
                    outcome,
                    error = %e,
                    "Claim rejected"
                );
            }
        }

        result
    }

    async fn try_claim(&self, order_id: OrderId, driver_id: DriverId) -> Result<Order, OrderError> {
        if self.store.is_driver_busy(driver_id).await? {
            return Err(OrderError::DriverAlreadyDelivering);
        }

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let command = OrderCommand::Claim { driver_id };
        let event = order
            .handle_command(&command)?
            .ok_or(OrderError::AlreadyClaimed(order_id))?;

        let mut claimed = order.clone();
        claimed.apply_event(&event)?;

        let envelope = EventEnvelope::new(order_id, claimed.version, event, Uuid::new_v4());
        match self.store.commit_transition(&claimed, order.version, &envelope).await {
            Ok(()) => Ok(claimed),
            Err(StoreError::VersionConflict { .. }) => Err(OrderError::AlreadyClaimed(order_id)),
            Err(StoreError::DriverBusy(_)) => Err(OrderError::DriverAlreadyDelivering),
            Err(e) => Err(e.into()),
        }
    }

    /// READY, unassigned orders, newest first.
    ///
    /// Pages are fetched lazily as the stream is polled. Each call starts a
    /// fresh snapshot walk; no locks are held between pages.
    pub fn list_ready(&self) -> impl Stream<Item = Result<Order, OrderError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let page_size = self.page_size;

        // State: None once exhausted, otherwise the cursor for the next page
        stream::unfold(Some(None), move |next: Option<Option<PageCursor>>| {
            let store = Arc::clone(&store);
            async move {
                let after = next?;
                match store.ready_orders_page(after, page_size).await {
                    Ok(page) if page.is_empty() => None,
                    Ok(page) => {
                        let following = if page.len() < page_size {
                            None
                        } else {
                            page.last().map(|last| Some(PageCursor::from(last)))
                        };
                        Some((Ok(page), following))
                    }
                    Err(e) => Some((Err(OrderError::from(e)), None)),
                }
            }
        })
        .flat_map(|page: Result<Vec<Order>, OrderError>| {
            let items: Vec<Result<Order, OrderError>> = match page {
                Ok(orders) => orders.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
    }

    /// First `limit` entries of [`list_ready`](Self::list_ready).
    pub async fn ready_orders(&self, limit: usize) -> Result<Vec<Order>, OrderError> {
        self.list_ready().take(limit).try_collect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CustomerId, OrderStatus};
    use crate::test_support::Fixture;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let fx = Fixture::new().await;
        let order = fx.ready_order(CustomerId(Uuid::new_v4())).await;
        let order_id = order.id;
        let assignment = Arc::new(fx.assignment_with_page_size(10));

        let drivers: Vec<DriverId> = (0..16).map(|_| DriverId(Uuid::new_v4())).collect();
        let handles: Vec<_> = drivers
            .iter()
            .map(|&driver_id| {
                let assignment = Arc::clone(&assignment);
                tokio::spawn(async move { (driver_id, assignment.claim(order_id, driver_id).await) })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            let (driver_id, result) = handle.await.unwrap();
            match result {
                Ok(_) => winners.push(driver_id),
                Err(OrderError::AlreadyClaimed(id)) => assert_eq!(id, order.id),
                Err(other) => panic!("unexpected claim error: {other:?}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = fx.lifecycle.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::OnTheWay);
        assert_eq!(stored.driver_id, Some(winners[0]));
        assert_eq!(fx.metrics.claim_attempts.with_label_values(&["won"]).get(), 1);
        assert_eq!(fx.metrics.claim_attempts.with_label_values(&["lost"]).get(), 15);
    }

    #[tokio::test]
    async fn test_claim_sets_driver_and_pickup_time() {
        let fx = Fixture::new().await;
        let order = fx.ready_order(CustomerId(Uuid::new_v4())).await;
        let driver_id = DriverId(Uuid::new_v4());

        let claimed = fx.assignment.claim(order.id, driver_id).await.unwrap();

        assert_eq!(claimed.status, OrderStatus::OnTheWay);
        assert_eq!(claimed.driver_id, Some(driver_id));
        assert!(claimed.picked_up_at.is_some());
        assert_eq!(claimed.version, order.version + 1);
    }

    #[tokio::test]
    async fn test_busy_driver_cannot_claim_second_order() {
        let fx = Fixture::new().await;
        let driver_id = DriverId(Uuid::new_v4());
        let first = fx.ready_order(CustomerId(Uuid::new_v4())).await;
        let second = fx.ready_order(CustomerId(Uuid::new_v4())).await;

        fx.assignment.claim(first.id, driver_id).await.unwrap();
        let result = fx.assignment.claim(second.id, driver_id).await;

        assert!(matches!(result, Err(OrderError::DriverAlreadyDelivering)));
        assert_eq!(result.unwrap_err().to_string(), "driver already delivering");
        let untouched = fx.lifecycle.get_order(second.id).await.unwrap();
        assert_eq!(untouched.status, OrderStatus::Ready);
        assert!(untouched.driver_id.is_none());
    }

    #[tokio::test]
    async fn test_driver_may_claim_again_after_delivery() {
        let fx = Fixture::new().await;
        let driver_id = DriverId(Uuid::new_v4());
        fx.delivered_order(CustomerId(Uuid::new_v4()), driver_id).await;
        let next = fx.ready_order(CustomerId(Uuid::new_v4())).await;

        assert!(fx.assignment.claim(next.id, driver_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cannot_claim_cooking_order() {
        let fx = Fixture::new().await;
        let order = fx.place_order(CustomerId(Uuid::new_v4())).await;

        let result = fx.assignment.claim(order.id, DriverId(Uuid::new_v4())).await;
        assert!(matches!(result, Err(OrderError::InvalidState { .. })));

        let missing = fx.assignment.claim(OrderId::new(), DriverId(Uuid::new_v4())).await;
        assert!(matches!(missing, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_ready_pages_newest_first() {
        let fx = Fixture::new().await;
        let mut ready = Vec::new();
        for _ in 0..5 {
            ready.push(fx.ready_order(CustomerId(Uuid::new_v4())).await);
        }
        // Still cooking, never listed
        fx.place_order(CustomerId(Uuid::new_v4())).await;
        // Claimed, no longer listed
        let claimed = ready.remove(0);
        fx.assignment.claim(claimed.id, DriverId(Uuid::new_v4())).await.unwrap();

        let assignment = fx.assignment_with_page_size(2);
        let listed: Vec<Order> = assignment.list_ready().try_collect().await.unwrap();

        let expected: Vec<OrderId> = ready.iter().rev().map(|o| o.id).collect();
        assert_eq!(listed.iter().map(|o| o.id).collect::<Vec<_>>(), expected);
        assert!(listed.iter().all(|o| o.status == OrderStatus::Ready && o.driver_id.is_none()));
    }

    #[tokio::test]
    async fn test_list_ready_is_restartable() {
        let fx = Fixture::new().await;
        for _ in 0..3 {
            fx.ready_order(CustomerId(Uuid::new_v4())).await;
        }
        let assignment = fx.assignment_with_page_size(1);

        let first = assignment.ready_orders(2).await.unwrap();
        let second = assignment.ready_orders(10).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
        assert_eq!(first[..], second[..2]);
    }
}
