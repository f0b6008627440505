//! Admin dashboard: three summary cards and three range-selectable charts.
//!
//! Each chart reads `<key>Range` (a preset key) or `<key>RangeFrom` and
//! `<key>RangeTo` from the query string. Unusable values fall back to the
//! chart's default preset.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use storefront_core::analytics::range::range_option_or;
use storefront_core::analytics::{
    customer_summary, revenue_by_product, sales_series, sales_summary, signup_series, Granularity,
    ProductCounts, ProductRevenue, RangeOption, RangePreset, Series, SeriesPoint, TimeRange,
};
use storefront_core::format::{format_currency, format_number};
use storefront_db::repositories::RepositoryError;
use tracing::{error, warn};

use crate::error::correlation_id;
use crate::state::AppState;

/// Query-string prefix and fallback preset of one chart.
#[derive(Clone, Copy, Debug)]
pub struct ChartKey {
    pub key: &'static str,
    pub default: RangePreset,
}

pub const TOTAL_SALES: ChartKey = ChartKey { key: "totalSales", default: RangePreset::Last7Days };
pub const NEW_CUSTOMERS: ChartKey =
    ChartKey { key: "newCustomers", default: RangePreset::Last7Days };
pub const REVENUE_BY_PRODUCT: ChartKey =
    ChartKey { key: "revenueByProduct", default: RangePreset::AllTime };

pub fn router(state: AppState) -> Router {
    Router::new().route("/api/v1/admin/dashboard", get(dashboard)).with_state(state)
}

/// One independently loaded part of the dashboard.
#[derive(Debug, Serialize)]
pub struct Panel<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Panel<T> {
    fn from_result(panel: &str, correlation_id: &str, result: Result<T, RepositoryError>) -> Self {
        match result {
            Ok(data) => Self { data: Some(data), error: None },
            Err(failure) => {
                error!(
                    event_name = "analytics.panel.failed",
                    correlation_id,
                    panel,
                    error = %failure,
                    "dashboard panel failed to load"
                );
                Self { data: None, error: Some(format!("Unable to load {panel}")) }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SalesCard {
    pub amount: Decimal,
    pub formatted_amount: String,
    pub number_of_sales: i64,
    pub formatted_number_of_sales: String,
}

#[derive(Debug, Serialize)]
pub struct CustomersCard {
    pub user_count: i64,
    pub formatted_user_count: String,
    pub average_value_per_user: Decimal,
    pub formatted_average_value_per_user: String,
}

#[derive(Debug, Serialize)]
pub struct ProductsCard {
    pub active_count: i64,
    pub inactive_count: i64,
    pub formatted_active_count: String,
    pub formatted_inactive_count: String,
}

#[derive(Debug, Serialize)]
pub struct RangeChoice {
    pub key: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChartView<V> {
    pub range_label: String,
    pub range_options: Vec<RangeChoice>,
    pub granularity: Granularity,
    pub points: Vec<SeriesPoint<V>>,
    pub dropped_events: usize,
}

#[derive(Debug, Serialize)]
pub struct RevenueChartView {
    pub range_label: String,
    pub range_options: Vec<RangeChoice>,
    pub products: Vec<ProductRevenue>,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub sales: Panel<SalesCard>,
    pub customers: Panel<CustomersCard>,
    pub products: Panel<ProductsCard>,
    pub total_sales: Panel<ChartView<Decimal>>,
    pub new_customers: Panel<ChartView<u64>>,
    pub revenue_by_product: Panel<RevenueChartView>,
}

pub fn chart_range(
    query: &HashMap<String, String>,
    chart: ChartKey,
    now: DateTime<Utc>,
) -> RangeOption {
    let param = |suffix: &str| query.get(&format!("{}{suffix}", chart.key)).map(String::as_str);
    let mut option =
        range_option_or(param("Range"), param("RangeFrom"), param("RangeTo"), chart.default, now);
    if let TimeRange { start: Some(start), end: Some(end) } = option.range {
        if end < start {
            option.range = TimeRange { start: Some(end), end: Some(start) };
        }
    }
    option
}

fn range_choices() -> Vec<RangeChoice> {
    RangePreset::ALL
        .iter()
        .map(|preset| RangeChoice { key: preset.key(), label: preset.label() })
        .collect()
}

fn chart_view<V>(
    chart: ChartKey,
    option: RangeOption,
    series: Series<V>,
    correlation_id: &str,
) -> ChartView<V> {
    if series.dropped_events > 0 {
        warn!(
            event_name = "analytics.bucket.dropped",
            correlation_id,
            chart = chart.key,
            dropped_events = series.dropped_events,
            "events fell outside every chart bucket"
        );
    }
    ChartView {
        range_label: option.label,
        range_options: range_choices(),
        granularity: series.granularity,
        points: series.points,
        dropped_events: series.dropped_events,
    }
}

async fn sales_card(state: &AppState) -> Result<SalesCard, RepositoryError> {
    let summary = sales_summary(state.orders.totals().await?);
    Ok(SalesCard {
        formatted_amount: format_currency(summary.amount),
        formatted_number_of_sales: format_number(summary.number_of_sales),
        amount: summary.amount,
        number_of_sales: summary.number_of_sales,
    })
}

async fn customers_card(state: &AppState) -> Result<CustomersCard, RepositoryError> {
    let (user_count, totals) = tokio::join!(state.users.count(), state.orders.totals());
    let summary = customer_summary(user_count?, totals?.sum_in_cents);
    Ok(CustomersCard {
        formatted_user_count: format_number(summary.user_count),
        formatted_average_value_per_user: format_currency(summary.average_value_per_user),
        user_count: summary.user_count,
        average_value_per_user: summary.average_value_per_user,
    })
}

async fn products_card(state: &AppState) -> Result<ProductsCard, RepositoryError> {
    let ProductCounts { active_count, inactive_count } =
        state.products.count_by_availability().await?;
    Ok(ProductsCard {
        active_count,
        inactive_count,
        formatted_active_count: format_number(active_count),
        formatted_inactive_count: format_number(inactive_count),
    })
}

pub async fn dashboard(
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Json<Dashboard> {
    let correlation_id = correlation_id();
    let now = Utc::now();
    let sales_range = chart_range(&query, TOTAL_SALES, now);
    let customers_range = chart_range(&query, NEW_CUSTOMERS, now);
    let revenue_range = chart_range(&query, REVENUE_BY_PRODUCT, now);

    let total_sales = async {
        let sales = state.orders.sales_in_range(&sales_range.range).await?;
        let series = sales_series(&sales_range.range, &sales, now);
        Ok::<_, RepositoryError>(chart_view(
            TOTAL_SALES,
            sales_range.clone(),
            series,
            &correlation_id,
        ))
    };
    let new_customers = async {
        let signups = state.users.signups_in_range(&customers_range.range).await?;
        let series = signup_series(&customers_range.range, &signups, now);
        Ok::<_, RepositoryError>(chart_view(
            NEW_CUSTOMERS,
            customers_range.clone(),
            series,
            &correlation_id,
        ))
    };
    let revenue = async {
        let sales = state.products.sales_by_product(&revenue_range.range).await?;
        Ok::<_, RepositoryError>(RevenueChartView {
            range_label: revenue_range.label.clone(),
            range_options: range_choices(),
            products: revenue_by_product(&sales),
        })
    };

    let (sales, customers, products, total_sales, new_customers, revenue) = tokio::join!(
        sales_card(&state),
        customers_card(&state),
        products_card(&state),
        total_sales,
        new_customers,
        revenue,
    );

    Json(Dashboard {
        sales: Panel::from_result("sales", &correlation_id, sales),
        customers: Panel::from_result("customers", &correlation_id, customers),
        products: Panel::from_result("products", &correlation_id, products),
        total_sales: Panel::from_result("total sales", &correlation_id, total_sales),
        new_customers: Panel::from_result("new customers", &correlation_id, new_customers),
        revenue_by_product: Panel::from_result("revenue by product", &correlation_id, revenue),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        extract::{Query, State},
        Json,
    };
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use storefront_core::analytics::{Granularity, RangePreset, TimeRange};
    use storefront_core::domain::order::{
        NewPurchase, Order, OrderHistoryEntry, OrderSale, OrderTotals,
    };
    use storefront_core::domain::product::ProductId;
    use storefront_core::domain::user::UserId;
    use storefront_db::repositories::{OrderRepository, RepositoryError};

    use super::{chart_range, dashboard, NEW_CUSTOMERS, REVENUE_BY_PRODUCT, TOTAL_SALES};
    use crate::test_support::{seeded_store, test_state};

    fn query(pairs: &[(&str, &str)]) -> Query<HashMap<String, String>> {
        Query(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn chart_range_defaults_and_overrides() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 15, 0, 0).unwrap();
        let Query(params) = query(&[
            ("totalSalesRange", "last_90_days"),
            ("newCustomersRangeFrom", "2026-02-01"),
            ("newCustomersRangeTo", "2026-01-05"),
            ("revenueByProductRange", "fortnight"),
        ]);

        let sales = chart_range(&params, TOTAL_SALES, now);
        assert_eq!(sales.label, RangePreset::Last90Days.label());

        let customers = chart_range(&params, NEW_CUSTOMERS, now);
        assert_eq!(
            customers.range,
            TimeRange {
                start: Some(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()),
                end: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            }
        );

        let revenue = chart_range(&params, REVENUE_BY_PRODUCT, now);
        assert_eq!(revenue.label, RangePreset::AllTime.label());
        assert_eq!(revenue.range, TimeRange::default());

        let Query(empty) = query(&[]);
        assert_eq!(chart_range(&empty, TOTAL_SALES, now).label, RangePreset::Last7Days.label());
    }

    #[tokio::test]
    async fn dashboard_reports_cards_and_zero_filled_charts() {
        let store = seeded_store().await;
        let now = Utc::now();
        for (email, product, days_ago, paid) in [
            ("a@example.com", "ebook", 1, 1000),
            ("b@example.com", "ebook", 2, 750),
            ("a@example.com", "course", 200, 500),
        ] {
            store
                .record_purchase(NewPurchase {
                    email: email.to_string(),
                    product_id: ProductId(product.to_string()),
                    discount_code_id: None,
                    price_paid_in_cents: paid,
                    created_at: now - Duration::days(days_ago),
                })
                .await
                .expect("purchase");
        }
        let state = test_state(store, Arc::default(), Arc::default());

        let Json(board) = dashboard(query(&[]), State(state)).await;

        let sales = board.sales.data.expect("sales card");
        assert_eq!(sales.amount, Decimal::new(2250, 2));
        assert_eq!(sales.number_of_sales, 3);

        let customers = board.customers.data.expect("customers card");
        assert_eq!(customers.user_count, 2);
        assert_eq!(customers.formatted_average_value_per_user, "$11.25");

        let products = board.products.data.expect("products card");
        assert_eq!((products.active_count, products.inactive_count), (2, 1));

        let chart = board.total_sales.data.expect("sales chart");
        assert_eq!(chart.granularity, Granularity::Daily);
        assert_eq!(chart.points.len(), 7);
        let charted: Decimal = chart.points.iter().map(|point| point.value).sum();
        assert_eq!(charted, Decimal::new(1750, 2));
        assert_eq!(chart.range_options.len(), 5);

        let signups = board.new_customers.data.expect("customers chart");
        assert_eq!(signups.points.iter().map(|point| point.value).sum::<u64>(), 2);

        let revenue = board.revenue_by_product.data.expect("revenue chart");
        let names: Vec<&str> =
            revenue.products.iter().map(|product| product.name.as_str()).collect();
        assert_eq!(names, vec!["COURSE Edition", "EBOOK Edition"]);
    }

    struct BrokenOrders;

    #[async_trait]
    impl OrderRepository for BrokenOrders {
        async fn record_purchase(&self, _: NewPurchase) -> Result<Order, RepositoryError> {
            Err(RepositoryError::Decode("orders offline".to_string()))
        }
        async fn has_purchased(&self, _: &str, _: &ProductId) -> Result<bool, RepositoryError> {
            Err(RepositoryError::Decode("orders offline".to_string()))
        }
        async fn totals(&self) -> Result<OrderTotals, RepositoryError> {
            Err(RepositoryError::Decode("orders offline".to_string()))
        }
        async fn sales_in_range(&self, _: &TimeRange) -> Result<Vec<OrderSale>, RepositoryError> {
            Err(RepositoryError::Decode("orders offline".to_string()))
        }
        async fn history_for_user(
            &self,
            _: &UserId,
        ) -> Result<Vec<OrderHistoryEntry>, RepositoryError> {
            Err(RepositoryError::Decode("orders offline".to_string()))
        }
    }

    #[tokio::test]
    async fn failing_panels_do_not_block_the_others() {
        let mut state = test_state(seeded_store().await, Arc::default(), Arc::default());
        state.orders = Arc::new(BrokenOrders);

        let Json(board) =
            dashboard(query(&[("revenueByProductRange", "last_30_days")]), State(state)).await;

        assert!(board.sales.data.is_none());
        assert_eq!(board.sales.error.as_deref(), Some("Unable to load sales"));
        assert!(board.customers.data.is_none());
        assert!(board.total_sales.data.is_none());
        assert!(board.products.data.is_some());
        assert!(board.new_customers.data.is_some());
        let revenue = board.revenue_by_product.data.expect("revenue chart");
        assert_eq!(revenue.range_label, RangePreset::Last30Days.label());
        assert!(revenue.products.is_empty());
    }
}
