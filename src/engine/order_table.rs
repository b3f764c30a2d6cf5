use crate::core::events::Order;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

struct TableInner {
    /// Orders keyed by client order id
    orders: HashMap<String, Order>,
    /// Exchange order id -> client order id
    by_exchange_id: HashMap<String, String>,
}

/// The engine's order table.
///
/// Keyed by client order id with a secondary exchange-id index. All
/// mutation goes through the engine; reconciliation and other readers only
/// take point-in-time snapshots.
pub struct OrderTable {
    inner: RwLock<TableInner>,
}

impl OrderTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TableInner {
                orders: HashMap::new(),
                by_exchange_id: HashMap::new(),
            }),
        }
    }

    /// Insert a new row. Returns false without touching the table when the
    /// client order id is already taken.
    pub async fn insert(&self, order: Order) -> bool {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.client_order_id) {
            return false;
        }
        if order.order_id != order.client_order_id {
            inner
                .by_exchange_id
                .insert(order.order_id.clone(), order.client_order_id.clone());
        }
        inner.orders.insert(order.client_order_id.clone(), order);
        true
    }

    /// Look up by client order id or exchange order id
    pub async fn get(&self, id: &str) -> Option<Order> {
        let inner = self.inner.read().await;
        if let Some(order) = inner.orders.get(id) {
            return Some(order.clone());
        }
        inner
            .by_exchange_id
            .get(id)
            .and_then(|client_id| inner.orders.get(client_id))
            .cloned()
    }

    /// Mutate one order under the table lock. Returns the updated row, or
    /// None when the id is unknown.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Option<Order>
    where
        F: FnOnce(&mut Order),
    {
        let mut inner = self.inner.write().await;
        let client_id = if inner.orders.contains_key(id) {
            id.to_string()
        } else {
            inner.by_exchange_id.get(id)?.clone()
        };

        let order = inner.orders.get_mut(&client_id)?;
        let previous_exchange_id = order.order_id.clone();
        mutate(order);
        let updated = order.clone();

        if updated.order_id != previous_exchange_id {
            inner.by_exchange_id.remove(&previous_exchange_id);
            inner
                .by_exchange_id
                .insert(updated.order_id.clone(), client_id);
        }
        Some(updated)
    }

    /// Point-in-time copy of every row
    pub async fn snapshot(&self) -> Vec<Order> {
        self.inner.read().await.orders.values().cloned().collect()
    }

    /// Rows updated at or after `cutoff`
    pub async fn snapshot_updated_since(&self, cutoff: DateTime<Utc>) -> Vec<Order> {
        self.inner
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.updated_at >= cutoff)
            .cloned()
            .collect()
    }

    pub async fn active_orders(&self) -> Vec<Order> {
        self.inner
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.is_active())
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.orders.is_empty()
    }
}

impl Default for OrderTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{NewOrder, OrderStatus};
    use crate::types::Size;

    fn pending_order(client_id: &str) -> Order {
        let request = NewOrder::market_buy("BTCUSDT", Size::from_str("0.1").unwrap());
        Order::from_request(&request, client_id.to_string())
    }

    #[tokio::test]
    async fn test_lookup_by_either_id() {
        let table = OrderTable::new();
        table.insert(pending_order("cid-1")).await;

        // Exchange acceptance rewrites order_id; index follows
        table
            .update("cid-1", |order| {
                order.order_id = "ex-77".to_string();
                order.transition_to(OrderStatus::Open);
            })
            .await
            .unwrap();

        assert_eq!(table.get("cid-1").await.unwrap().order_id, "ex-77");
        assert_eq!(table.get("ex-77").await.unwrap().client_order_id, "cid-1");
        assert!(table.get("ex-unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_client_id() {
        let table = OrderTable::new();
        assert!(table.insert(pending_order("cid-1")).await);
        table
            .update("cid-1", |order| {
                order.order_id = "ex-1".to_string();
                order.transition_to(OrderStatus::Open);
            })
            .await
            .unwrap();

        // Second insert under the same client id leaves the live row intact
        assert!(!table.insert(pending_order("cid-1")).await);
        let row = table.get("cid-1").await.unwrap();
        assert_eq!(row.status, OrderStatus::Open);
        assert_eq!(row.order_id, "ex-1");
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let table = OrderTable::new();
        assert!(table.update("missing", |_| {}).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_updated_since() {
        let table = OrderTable::new();
        table.insert(pending_order("cid-1")).await;

        let cutoff = Utc::now();
        table.insert(pending_order("cid-2")).await;

        let recent = table.snapshot_updated_since(cutoff).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].client_order_id, "cid-2");
        assert_eq!(table.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_active_filter() {
        let table = OrderTable::new();
        table.insert(pending_order("cid-1")).await;
        table.insert(pending_order("cid-2")).await;
        table
            .update("cid-2", |order| {
                order.transition_to(OrderStatus::Rejected);
            })
            .await;

        let active = table.active_orders().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].client_order_id, "cid-1");
    }
}
