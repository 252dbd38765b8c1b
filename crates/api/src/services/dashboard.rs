//! Dashboard aggregates over the last 14 days (today included).
//!
//! Aggregation is pure; the route handlers fetch rows with
//! [`DashboardRepository`](crate::db::DashboardRepository) and pass them here.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use dermosul_core::{Cents, PaymentMethod};

use crate::db::dashboard::{DashboardOrder, MethodTotal};

/// Window length in days.
pub const WINDOW_DAYS: i64 = 14;

/// Category used for orders without one.
const DEFAULT_CATEGORY: &str = "Outros";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodAmount {
    pub method: PaymentMethod,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_revenue: f64,
    pub total_orders: usize,
    pub avg_ticket: f64,
    /// Percentage of orders in the window that were paid.
    pub conv_avg: f64,
    pub payments_breakdown: Vec<MethodAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenuePoint {
    pub date: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionPoint {
    pub date: String,
    /// Paid orders over all orders that day, 0 when there were none.
    pub rate: f64,
}

/// The `WINDOW_DAYS` days ending on `today`, oldest first.
#[must_use]
pub fn window(today: NaiveDate) -> Vec<NaiveDate> {
    (0..WINDOW_DAYS)
        .rev()
        .map(|back| today - Duration::days(back))
        .collect()
}

/// First day of the window ending on `today`.
#[must_use]
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(WINDOW_DAYS - 1)
}

fn in_window<'a>(
    orders: &'a [DashboardOrder],
    today: NaiveDate,
) -> impl Iterator<Item = &'a DashboardOrder> {
    let start = window_start(today);
    orders
        .iter()
        .filter(move |o| o.day >= start && o.day <= today)
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { part / whole }
}

#[must_use]
pub fn breakdown(totals: &[MethodTotal]) -> Vec<MethodAmount> {
    totals
        .iter()
        .map(|t| MethodAmount {
            method: t.method,
            amount: t.paid_cents.to_reais_f64(),
        })
        .collect()
}

/// Headline numbers. Paid means `pago` or `enviado`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn overview(orders: &[DashboardOrder], payments: &[MethodTotal], today: NaiveDate) -> Overview {
    let all: Vec<_> = in_window(orders, today).collect();
    let paid: Vec<_> = all.iter().filter(|o| o.status.is_paid()).collect();

    let revenue: Cents = paid.iter().map(|o| o.total_cents).sum();
    let total_revenue = revenue.to_reais_f64();
    let total_orders = paid.len();

    Overview {
        total_revenue,
        total_orders,
        avg_ticket: ratio(total_revenue, total_orders as f64),
        conv_avg: ratio(total_orders as f64, all.len() as f64) * 100.0,
        payments_breakdown: breakdown(payments),
    }
}

/// Paid revenue per day.
#[must_use]
pub fn revenue_by_day(orders: &[DashboardOrder], today: NaiveDate) -> Vec<RevenuePoint> {
    let mut by_day: BTreeMap<NaiveDate, Cents> = window(today)
        .into_iter()
        .map(|day| (day, Cents::ZERO))
        .collect();

    for order in in_window(orders, today).filter(|o| o.status.is_paid()) {
        if let Some(sum) = by_day.get_mut(&order.day) {
            *sum = *sum + order.total_cents;
        }
    }

    by_day
        .into_iter()
        .map(|(day, revenue)| RevenuePoint {
            date: day.format("%Y-%m-%d").to_string(),
            revenue: revenue.to_reais_f64(),
        })
        .collect()
}

/// Order count per category, alphabetically.
#[must_use]
pub fn orders_by_category(orders: &[DashboardOrder], today: NaiveDate) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for order in in_window(orders, today) {
        let category = order
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);
        *counts.entry(category.to_string()).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(category, value)| CategoryCount { category, value })
        .collect()
}

/// Daily paid/total ratio.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn conversion_by_day(orders: &[DashboardOrder], today: NaiveDate) -> Vec<ConversionPoint> {
    let mut by_day: BTreeMap<NaiveDate, (usize, usize)> =
        window(today).into_iter().map(|day| (day, (0, 0))).collect();

    for order in in_window(orders, today) {
        if let Some((paid, total)) = by_day.get_mut(&order.day) {
            *total += 1;
            if order.status.is_paid() {
                *paid += 1;
            }
        }
    }

    by_day
        .into_iter()
        .map(|(day, (paid, total))| ConversionPoint {
            date: day.format("%Y-%m-%d").to_string(),
            rate: ratio(paid as f64, total as f64),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dermosul_core::OrderStatus;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn order(d: u32, status: OrderStatus, category: Option<&str>, cents: i64) -> DashboardOrder {
        DashboardOrder {
            day: day(d),
            status,
            category: category.map(str::to_string),
            total_cents: Cents::new(cents),
        }
    }

    fn fixture() -> Vec<DashboardOrder> {
        vec![
            order(14, OrderStatus::Pago, Some("Online"), 10_000),
            order(14, OrderStatus::Pendente, Some("Online"), 5_000),
            order(13, OrderStatus::Enviado, Some("Kits"), 20_000),
            order(10, OrderStatus::Cancelado, None, 7_000),
            // Outside the window ending on the 14th.
            order(1, OrderStatus::Pago, Some("Online"), 99_900),
        ]
    }

    #[test]
    fn test_window() {
        let days = window(day(14));
        assert_eq!(days.len(), 14);
        assert_eq!(days[0], day(1));
        assert_eq!(days[13], day(14));
        assert_eq!(window_start(day(14)), day(1));
    }

    #[test]
    fn test_overview() {
        let payments = vec![MethodTotal {
            method: PaymentMethod::Cartao,
            paid_cents: Cents::new(30_000),
        }];
        // Day 1 is the first day of the window, so the 99_900 order counts.
        let ov = overview(&fixture(), &payments, day(14));
        assert_eq!(ov.total_orders, 3);
        assert!((ov.total_revenue - 1299.0).abs() < f64::EPSILON);
        assert!((ov.avg_ticket - 433.0).abs() < 1e-9);
        assert!((ov.conv_avg - 60.0).abs() < 1e-9);
        assert_eq!(ov.payments_breakdown[0].amount, 300.0);
    }

    #[test]
    fn test_overview_excludes_days_before_window() {
        let ov = overview(&fixture(), &[], day(15));
        assert_eq!(ov.total_orders, 2);
        assert!((ov.total_revenue - 300.0).abs() < f64::EPSILON);
        assert!((ov.conv_avg - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_overview_empty() {
        let ov = overview(&[], &[], day(14));
        assert_eq!(ov.total_orders, 0);
        assert_eq!(ov.avg_ticket, 0.0);
        assert_eq!(ov.conv_avg, 0.0);
        assert!(ov.payments_breakdown.is_empty());
    }

    #[test]
    fn test_revenue_by_day() {
        let points = revenue_by_day(&fixture(), day(14));
        assert_eq!(points.len(), 14);
        assert_eq!(points[13].date, "2026-03-14");
        assert_eq!(points[13].revenue, 100.0);
        assert_eq!(points[12].revenue, 200.0);
        assert_eq!(points[9].revenue, 0.0);
    }

    #[test]
    fn test_orders_by_category() {
        let counts = orders_by_category(&fixture(), day(15));
        assert_eq!(
            counts,
            vec![
                CategoryCount {
                    category: "Kits".to_string(),
                    value: 1
                },
                CategoryCount {
                    category: "Online".to_string(),
                    value: 2
                },
                CategoryCount {
                    category: "Outros".to_string(),
                    value: 1
                },
            ]
        );
    }

    #[test]
    fn test_conversion_by_day() {
        let points = conversion_by_day(&fixture(), day(14));
        assert_eq!(points[13].rate, 0.5);
        assert_eq!(points[12].rate, 1.0);
        assert_eq!(points[9].rate, 0.0);
        assert_eq!(points[5].rate, 0.0);
    }
}
