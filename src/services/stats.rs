use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use tracing::instrument;

use crate::{
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        product, user,
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Serialize)]
pub struct OrderStats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueStats {
    pub total: Decimal,
    pub last_30_days: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductStats {
    pub total: u64,
    pub out_of_stock: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub total: u64,
    pub new_last_30_days: u64,
}

/// Back-office dashboard numbers
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub orders: OrderStats,
    pub revenue: RevenueStats,
    pub products: ProductStats,
    pub users: UserStats,
    pub recent_orders: Vec<order::Model>,
}

#[derive(Clone)]
pub struct StatsService {
    db: Arc<DatabaseConnection>,
}

impl StatsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Aggregates the dashboard statistics. Revenue counts paid orders only;
    /// completed means delivered.
    #[instrument(skip(self))]
    pub async fn statistics(&self) -> Result<Statistics, ServiceError> {
        let cutoff = Utc::now() - Duration::days(30);

        let orders_total = order::Entity::find().count(&*self.db).await?;
        let orders_pending = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .count(&*self.db)
            .await?;
        let orders_completed = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .count(&*self.db)
            .await?;

        let revenue_total = sum_totals(
            order::Entity::find()
                .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
                .select_only()
                .column(order::Column::Total)
                .into_tuple::<Decimal>()
                .all(&*self.db)
                .await?,
        );
        let revenue_recent = sum_totals(
            order::Entity::find()
                .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
                .filter(order::Column::CreatedAt.gte(cutoff))
                .select_only()
                .column(order::Column::Total)
                .into_tuple::<Decimal>()
                .all(&*self.db)
                .await?,
        );

        let products_total = product::Entity::find().count(&*self.db).await?;
        let products_out_of_stock = product::Entity::find()
            .filter(product::Column::StockQuantity.lte(0))
            .count(&*self.db)
            .await?;

        let users_total = user::Entity::find().count(&*self.db).await?;
        let users_recent = user::Entity::find()
            .filter(user::Column::CreatedAt.gte(cutoff))
            .count(&*self.db)
            .await?;

        let recent_orders = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .limit(10)
            .all(&*self.db)
            .await?;

        Ok(Statistics {
            orders: OrderStats {
                total: orders_total,
                pending: orders_pending,
                completed: orders_completed,
            },
            revenue: RevenueStats {
                total: revenue_total,
                last_30_days: revenue_recent,
            },
            products: ProductStats {
                total: products_total,
                out_of_stock: products_out_of_stock,
            },
            users: UserStats {
                total: users_total,
                new_last_30_days: users_recent,
            },
            recent_orders,
        })
    }
}

fn sum_totals(totals: Vec<Decimal>) -> Decimal {
    totals.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sums_order_totals() {
        assert_eq!(
            sum_totals(vec![dec!(100.00), dec!(49.50), dec!(0.50)]),
            dec!(150.00)
        );
    }

    #[test]
    fn empty_revenue_is_zero() {
        assert_eq!(sum_totals(vec![]), Decimal::ZERO);
    }
}
