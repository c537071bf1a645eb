use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        order_file, order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// An order with its lines and uploaded files
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub files: Vec<order_file::Model>,
}

/// A page of orders
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Result of a status change, including the human-readable message returned
/// to the client
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: order::Model,
    pub message: String,
}

/// Order management service.
///
/// Single-order status updates are unconditional: staff may move an order to
/// any status from any status. The bulk actions are the ones that check the
/// source state, mirroring how back-office mass updates are meant to be safe
/// against mixed selections.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Lists orders, newest first. Staff see every order; customers see only
    /// their own.
    #[instrument(skip(self, viewer))]
    pub async fn list_orders(
        &self,
        viewer: &AuthUser,
        page: u64,
        per_page: u64,
    ) -> Result<OrderPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if !viewer.is_staff {
            query = query.filter(order::Column::UserId.eq(viewer.user_id));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Fetches one order with its lines and files. Customers get NotFound for
    /// orders that are not theirs, same as for orders that do not exist.
    #[instrument(skip(self, viewer))]
    pub async fn get_order(
        &self,
        viewer: &AuthUser,
        order_id: i64,
    ) -> Result<OrderWithDetails, ServiceError> {
        let mut query = order::Entity::find_by_id(order_id);
        if !viewer.is_staff {
            query = query.filter(order::Column::UserId.eq(viewer.user_id));
        }
        let order = query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Id)
            .all(&*self.db)
            .await?;
        let files = order_file::Entity::find()
            .filter(order_file::Column::OrderId.eq(order.id))
            .order_by_asc(order_file::Column::Id)
            .all(&*self.db)
            .await?;

        Ok(OrderWithDetails {
            order,
            items,
            files,
        })
    }

    /// Sets an order's fulfilment status. Any status may be assigned from any
    /// status; the milestone timestamps are stamped the first time their
    /// status is reached and never rewritten.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i64,
        new_status: &str,
    ) -> Result<StatusChange, ServiceError> {
        let status = OrderStatus::parse(new_status).ok_or_else(|| {
            ServiceError::ValidationError(format!("Invalid status: {}", new_status))
        })?;

        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        stamp_milestone(&mut active, status);
        let order = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: old_status.as_str().to_string(),
                new_status: status.as_str().to_string(),
            })
            .await;

        let message = format!(
            "Order status updated from {} to {}",
            old_status.as_str(),
            status.as_str()
        );
        info!("{} (order {})", message, order.id);

        Ok(StatusChange { order, message })
    }

    /// Sets an order's payment status. Unconditional, no timestamps.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: i64,
        new_status: &str,
    ) -> Result<StatusChange, ServiceError> {
        let status = PaymentStatus::parse(new_status).ok_or_else(|| {
            ServiceError::ValidationError(format!("Invalid payment status: {}", new_status))
        })?;

        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order.payment_status;
        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(status);
        let order = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id: order.id,
                old_status: old_status.as_str().to_string(),
                new_status: status.as_str().to_string(),
            })
            .await;

        let message = format!(
            "Payment status updated from {} to {}",
            old_status.as_str(),
            status.as_str()
        );

        Ok(StatusChange { order, message })
    }

    /// Bulk confirm: moves pending orders to confirmed. Orders in any other
    /// status are skipped.
    #[instrument(skip(self))]
    pub async fn mark_confirmed(&self, order_ids: &[i64]) -> Result<u64, ServiceError> {
        self.bulk_transition(order_ids, &[OrderStatus::Pending], OrderStatus::Confirmed)
            .await
    }

    /// Bulk ship: moves confirmed, processing and ready orders to shipped.
    #[instrument(skip(self))]
    pub async fn mark_shipped(&self, order_ids: &[i64]) -> Result<u64, ServiceError> {
        self.bulk_transition(
            order_ids,
            &[
                OrderStatus::Confirmed,
                OrderStatus::Processing,
                OrderStatus::Ready,
            ],
            OrderStatus::Shipped,
        )
        .await
    }

    /// Bulk deliver: moves shipped orders to delivered.
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_ids: &[i64]) -> Result<u64, ServiceError> {
        self.bulk_transition(order_ids, &[OrderStatus::Shipped], OrderStatus::Delivered)
            .await
    }

    /// Bulk mark paid: sets payment status to paid regardless of the current
    /// payment state. Returns the number of orders touched.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, order_ids: &[i64]) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;

        let orders = order::Entity::find()
            .filter(order::Column::Id.is_in(order_ids.iter().copied()))
            .all(&txn)
            .await?;

        let mut updated = 0u64;
        for order in orders {
            let order_id = order.id;
            let old_status = order.payment_status;
            let mut active: order::ActiveModel = order.into();
            active.payment_status = Set(PaymentStatus::Paid);
            active.update(&txn).await?;
            updated += 1;

            self.event_sender
                .send_or_log(Event::PaymentStatusChanged {
                    order_id,
                    old_status: old_status.as_str().to_string(),
                    new_status: PaymentStatus::Paid.as_str().to_string(),
                })
                .await;
        }

        txn.commit().await?;
        info!("Marked {} orders as paid", updated);
        Ok(updated)
    }

    async fn bulk_transition(
        &self,
        order_ids: &[i64],
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await?;

        let orders = order::Entity::find()
            .filter(order::Column::Id.is_in(order_ids.iter().copied()))
            .filter(order::Column::Status.is_in(from.iter().copied()))
            .all(&txn)
            .await?;

        let mut updated = 0u64;
        for order in orders {
            let order_id = order.id;
            let old_status = order.status;
            let mut active: order::ActiveModel = order.into();
            active.status = Set(to);
            stamp_milestone(&mut active, to);
            active.update(&txn).await?;
            updated += 1;

            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.as_str().to_string(),
                    new_status: to.as_str().to_string(),
                })
                .await;
        }

        txn.commit().await?;
        info!(
            "Bulk transition to {}: {} of {} orders updated",
            to.as_str(),
            updated,
            order_ids.len()
        );
        Ok(updated)
    }
}

/// Stamps the milestone timestamp matching the new status, but only if it was
/// never set before.
fn stamp_milestone(active: &mut order::ActiveModel, status: OrderStatus) {
    use sea_orm::ActiveValue;

    let now = Utc::now();
    match status {
        OrderStatus::Confirmed => {
            if matches!(active.confirmed_at, ActiveValue::Unchanged(None)) {
                active.confirmed_at = Set(Some(now));
            }
        }
        OrderStatus::Shipped => {
            if matches!(active.shipped_at, ActiveValue::Unchanged(None)) {
                active.shipped_at = Set(Some(now));
            }
        }
        OrderStatus::Delivered => {
            if matches!(active.delivered_at, ActiveValue::Unchanged(None)) {
                active.delivered_at = Set(Some(now));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::ActiveValue;

    fn sample_order(status: OrderStatus) -> order::Model {
        order::Model {
            id: 1,
            order_number: "ORD-20260829-DEADBEEF".to_string(),
            user_id: Some(1),
            first_name: "Amira".to_string(),
            last_name: "Hassan".to_string(),
            email: "amira@example.com".to_string(),
            phone: "+971500000000".to_string(),
            company_name: None,
            address_line_1: "1 Sheikh Zayed Rd".to_string(),
            address_line_2: None,
            city: "Dubai".to_string(),
            state: None,
            country: "AE".to_string(),
            postal_code: None,
            order_notes: None,
            subtotal: dec!(100.00),
            shipping_cost: dec!(0.00),
            tax: dec!(0.00),
            total: dec!(100.00),
            status,
            payment_status: PaymentStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
        }
    }

    #[test]
    fn stamps_confirmed_at_once() {
        let mut active: order::ActiveModel = sample_order(OrderStatus::Pending).into();
        stamp_milestone(&mut active, OrderStatus::Confirmed);
        assert!(matches!(active.confirmed_at, ActiveValue::Set(Some(_))));
    }

    #[test]
    fn does_not_restamp_existing_milestone() {
        let first = Utc::now() - chrono::Duration::days(3);
        let mut order = sample_order(OrderStatus::Shipped);
        order.shipped_at = Some(first);
        let mut active: order::ActiveModel = order.into();

        stamp_milestone(&mut active, OrderStatus::Shipped);
        assert!(matches!(
            active.shipped_at,
            ActiveValue::Unchanged(Some(v)) if v == first
        ));
    }

    #[test]
    fn non_milestone_statuses_stamp_nothing() {
        let mut active: order::ActiveModel = sample_order(OrderStatus::Pending).into();
        stamp_milestone(&mut active, OrderStatus::Processing);
        assert!(matches!(active.confirmed_at, ActiveValue::Unchanged(None)));
        assert!(matches!(active.shipped_at, ActiveValue::Unchanged(None)));
        assert!(matches!(active.delivered_at, ActiveValue::Unchanged(None)));
    }

    #[test]
    fn status_message_format() {
        let message = format!(
            "Order status updated from {} to {}",
            OrderStatus::Pending.as_str(),
            OrderStatus::Confirmed.as_str()
        );
        assert_eq!(message, "Order status updated from pending to confirmed");
    }
}
