use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QuerySelect,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::{
    entities::{order, order::OrderStatus, product},
    errors::ServiceError,
    events::{Event, EventHandler},
    services::commerce::pricing_service::round2,
};

/// Products at or below this many units count as low stock.
const LOW_STOCK_THRESHOLD: i32 = 5;

/// Cached figures older than this are recomputed on read.
pub const DEFAULT_DASHBOARD_MAX_AGE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalesMetrics {
    pub total_orders: i64,
    /// Sum of order totals, cancelled orders excluded
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
    #[schema(value_type = String)]
    pub average_order_value: Decimal,
    pub orders_today: i64,
    #[schema(value_type = String)]
    pub revenue_today: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InventoryMetrics {
    pub total_products: u64,
    pub low_stock_products: u64,
    pub out_of_stock_products: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DashboardMetrics {
    pub sales: SalesMetrics,
    pub inventory: InventoryMetrics,
    pub orders_by_status: BTreeMap<String, i64>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, FromQueryResult)]
struct StatusTotals {
    status: String,
    orders: i64,
    revenue: Option<Decimal>,
}

#[derive(Debug, FromQueryResult)]
struct PeriodTotals {
    orders: i64,
    revenue: Option<Decimal>,
}

/// Admin dashboard figures, recomputed whenever an order event arrives and
/// whenever the cached copy has aged out.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
    latest: Arc<RwLock<Option<DashboardMetrics>>>,
    max_age: Duration,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            latest: Arc::new(RwLock::new(None)),
            max_age: DEFAULT_DASHBOARD_MAX_AGE,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Cached dashboard while it is younger than `max_age`, otherwise a fresh one.
    pub async fn dashboard(&self) -> Result<DashboardMetrics, ServiceError> {
        if let Some(metrics) = self.latest.read().await.clone() {
            if self.is_fresh(&metrics) {
                return Ok(metrics);
            }
        }
        self.refresh().await
    }

    fn is_fresh(&self, metrics: &DashboardMetrics) -> bool {
        // A snapshot stamped in the future (clock step) is treated as stale.
        Utc::now()
            .signed_duration_since(metrics.generated_at)
            .to_std()
            .map(|age| age < self.max_age)
            .unwrap_or(false)
    }

    /// Recomputes and caches the dashboard.
    pub async fn refresh(&self) -> Result<DashboardMetrics, ServiceError> {
        let metrics = self.compute().await?;
        *self.latest.write().await = Some(metrics.clone());
        debug!(
            total_orders = metrics.sales.total_orders,
            "Dashboard metrics refreshed"
        );
        Ok(metrics)
    }

    async fn compute(&self) -> Result<DashboardMetrics, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let by_status = order::Entity::find()
            .select_only()
            .column(order::Column::Status)
            .column_as(Expr::col(order::Column::Id).count(), "orders")
            .column_as(Expr::col(order::Column::Total).sum(), "revenue")
            .group_by(order::Column::Status)
            .into_model::<StatusTotals>()
            .all(db)
            .await?;

        let cancelled = OrderStatus::Cancelled.to_string();
        let mut orders_by_status = BTreeMap::new();
        let mut total_orders = 0;
        let mut billable_orders = 0;
        let mut total_revenue = Decimal::ZERO;
        for row in by_status {
            total_orders += row.orders;
            if row.status != cancelled {
                billable_orders += row.orders;
                total_revenue += row.revenue.unwrap_or_default();
            }
            orders_by_status.insert(row.status, row.orders);
        }

        let average_order_value = if billable_orders > 0 {
            round2(total_revenue / Decimal::from(billable_orders))
        } else {
            Decimal::ZERO
        };

        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let today = order::Entity::find()
            .select_only()
            .column_as(Expr::col(order::Column::Id).count(), "orders")
            .column_as(Expr::col(order::Column::Total).sum(), "revenue")
            .filter(order::Column::CreatedAt.gte(start_of_day))
            .filter(order::Column::Status.ne(OrderStatus::Cancelled))
            .into_model::<PeriodTotals>()
            .one(db)
            .await?;
        let (orders_today, revenue_today) = today
            .map(|t| (t.orders, t.revenue.unwrap_or_default()))
            .unwrap_or((0, Decimal::ZERO));

        let inventory = InventoryMetrics {
            total_products: product::Entity::find().count(db).await?,
            low_stock_products: product::Entity::find()
                .filter(product::Column::Stock.lte(LOW_STOCK_THRESHOLD))
                .count(db)
                .await?,
            out_of_stock_products: product::Entity::find()
                .filter(product::Column::Stock.eq(0))
                .count(db)
                .await?,
        };

        Ok(DashboardMetrics {
            sales: SalesMetrics {
                total_orders,
                total_revenue: round2(total_revenue),
                average_order_value,
                orders_today,
                revenue_today: round2(revenue_today),
            },
            inventory,
            orders_by_status,
            generated_at: now,
        })
    }
}

#[async_trait]
impl EventHandler for AnalyticsService {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        info!(order_id = event.order_id(), "Refreshing dashboard after order event");
        self.refresh().await.map(|_| ()).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, Set};

    async fn database() -> Arc<DatabaseConnection> {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .expect("connect");
        run_migrations(&pool).await.expect("migrate");
        Arc::new(pool)
    }

    async fn add_product(db: &DatabaseConnection, stock: i32) {
        product::ActiveModel {
            name: Set("Stool".to_string()),
            price: Set(dec!(30.00)),
            stock: Set(stock),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert product");
    }

    #[tokio::test]
    async fn cached_dashboard_is_served_while_fresh() {
        let db = database().await;
        let analytics = AnalyticsService::new(db.clone());

        let first = analytics.dashboard().await.unwrap();
        add_product(&db, 0).await;

        let second = analytics.dashboard().await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn aged_dashboard_is_recomputed_without_an_event() {
        let db = database().await;
        let analytics = AnalyticsService::new(db.clone()).with_max_age(Duration::ZERO);

        assert_eq!(analytics.dashboard().await.unwrap().inventory.total_products, 0);
        add_product(&db, 0).await;

        let inventory = analytics.dashboard().await.unwrap().inventory;
        assert_eq!(inventory.total_products, 1);
        assert_eq!(inventory.out_of_stock_products, 1);
    }
}
