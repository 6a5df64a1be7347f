//! SQLite analytics aggregators over the platform's operational tables.
//!
//! Window filters compare timestamp text, so the platform tables must use
//! the same fixed-width UTC encoding as the reports tables.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::encode_datetime;
use crate::domain::models::{Aggregator, CellValue, CollectorWindow, Kpi, Section};
use crate::domain::ports::analytics::{AnalyticsError, AnalyticsSource};

#[derive(Clone)]
pub struct SqliteAnalyticsSource {
    pool: SqlitePool,
}

impl SqliteAnalyticsSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn bounds(window: &CollectorWindow) -> (String, String) {
        (encode_datetime(window.start), encode_datetime(window.end))
    }

    async fn production(&self, window: &CollectorWindow) -> Result<Section, sqlx::Error> {
        let (start, end) = Self::bounds(window);
        let rows: Vec<(String, String, i64, Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT line, product, COUNT(*), SUM(planned_qty), SUM(produced_qty), SUM(defect_qty)
             FROM production_batches
             WHERE produced_at >= ? AND produced_at < ?
             GROUP BY line, product
             ORDER BY line, product",
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let mut section = Section::new(
            "Production Output",
            &["Line", "Product", "Batches", "Planned Qty", "Produced Qty", "Defect Qty"],
        );
        let (mut planned, mut produced, mut defects) = (0.0, 0.0, 0.0);
        for (line, product, batches, p, q, d) in rows {
            let (p, q, d) = (p.unwrap_or(0.0), q.unwrap_or(0.0), d.unwrap_or(0.0));
            planned += p;
            produced += q;
            defects += d;
            section.push_row(vec![line.into(), product.into(), batches.into(), p.into(), q.into(), d.into()]);
        }
        section.push_kpi(Kpi::new("Total produced", produced, Some("units")));
        section.push_kpi(Kpi::new("Plan attainment", percent(produced, planned), Some("%")));
        section.push_kpi(Kpi::new("Defect rate", percent(defects, produced), Some("%")));
        Ok(section)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn quality(&self, window: &CollectorWindow) -> Result<Section, sqlx::Error> {
        let (start, end) = Self::bounds(window);
        let rows: Vec<(String, i64, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT batch_code, COUNT(*), SUM(passed), SUM(defects_found)
             FROM quality_inspections
             WHERE inspected_at >= ? AND inspected_at < ?
             GROUP BY batch_code
             ORDER BY batch_code",
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let mut section = Section::new("Quality Inspections", &["Batch", "Inspections", "Passed", "Defects Found"]);
        let (mut total, mut passed, mut defects) = (0_i64, 0_i64, 0_i64);
        for (batch, inspections, ok, found) in rows {
            let (ok, found) = (ok.unwrap_or(0), found.unwrap_or(0));
            total += inspections;
            passed += ok;
            defects += found;
            section.push_row(vec![batch.into(), inspections.into(), ok.into(), found.into()]);
        }
        section.push_kpi(Kpi::new("Inspections", total as f64, None));
        section.push_kpi(Kpi::new("Pass rate", percent(passed as f64, total as f64), Some("%")));
        section.push_kpi(Kpi::new("Defects found", defects as f64, None));
        Ok(section)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn machines(&self) -> Result<Section, sqlx::Error> {
        let rows: Vec<(String, String, String, String, f64, f64)> = sqlx::query_as(
            "SELECT machine_code, name, machine_type, status, runtime_hours, downtime_hours
             FROM machines
             ORDER BY machine_code",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut section = Section::new(
            "Machine Status",
            &["Machine", "Name", "Type", "Status", "Runtime (h)", "Downtime (h)", "Availability (%)"],
        );
        let count = rows.len();
        let mut running = 0_usize;
        let (mut runtime, mut downtime) = (0.0, 0.0);
        for (code, name, kind, status, up, down) in rows {
            if status == "running" {
                running += 1;
            }
            runtime += up;
            downtime += down;
            section.push_row(vec![
                code.into(),
                name.into(),
                kind.into(),
                status.into(),
                up.into(),
                down.into(),
                percent(up, up + down).into(),
            ]);
        }
        section.push_kpi(Kpi::new("Machines", count as f64, None));
        section.push_kpi(Kpi::new("Running", running as f64, None));
        section.push_kpi(Kpi::new("Fleet availability", percent(runtime, runtime + downtime), Some("%")));
        Ok(section)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn maintenance(&self, window: &CollectorWindow) -> Result<Section, sqlx::Error> {
        let (start, end) = Self::bounds(window);
        let rows: Vec<(String, String, i64, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT machine_code, kind, COUNT(*), SUM(downtime_hours), SUM(cost)
             FROM maintenance_logs
             WHERE started_at >= ? AND started_at < ?
             GROUP BY machine_code, kind
             ORDER BY machine_code, kind",
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let mut section = Section::new("Maintenance", &["Machine", "Kind", "Events", "Downtime (h)", "Cost"]);
        let (mut events, mut downtime, mut cost) = (0_i64, 0.0, 0.0);
        for (machine, kind, count, down, spent) in rows {
            let (down, spent) = (down.unwrap_or(0.0), spent.unwrap_or(0.0));
            events += count;
            downtime += down;
            cost += spent;
            section.push_row(vec![machine.into(), kind.into(), count.into(), down.into(), spent.into()]);
        }
        section.push_kpi(Kpi::new("Maintenance events", events as f64, None));
        section.push_kpi(Kpi::new("Downtime", downtime, Some("h")));
        section.push_kpi(Kpi::new("Maintenance cost", cost, None));
        Ok(section)
    }

    async fn allocation(&self, window: &CollectorWindow) -> Result<Section, sqlx::Error> {
        let (start, end) = Self::bounds(window);
        let rows: Vec<(String, i64, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT machine_code, COUNT(*), SUM(planned_hours), SUM(actual_hours)
             FROM allocations
             WHERE allocated_at >= ? AND allocated_at < ?
             GROUP BY machine_code
             ORDER BY machine_code",
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let mut section = Section::new(
            "Resource Allocation",
            &["Machine", "Allocations", "Planned (h)", "Actual (h)", "Utilization (%)"],
        );
        let (mut planned, mut actual) = (0.0, 0.0);
        for (machine, count, p, a) in rows {
            let (p, a) = (p.unwrap_or(0.0), a.unwrap_or(0.0));
            planned += p;
            actual += a;
            section.push_row(vec![machine.into(), count.into(), p.into(), a.into(), percent(a, p).into()]);
        }
        section.push_kpi(Kpi::new("Planned hours", planned, Some("h")));
        section.push_kpi(Kpi::new("Actual hours", actual, Some("h")));
        section.push_kpi(Kpi::new("Utilization", percent(actual, planned), Some("%")));
        Ok(section)
    }

    async fn financial(&self, window: &CollectorWindow) -> Result<Section, sqlx::Error> {
        let (start, end) = Self::bounds(window);
        let rows: Vec<(String, String, i64, Option<f64>)> = sqlx::query_as(
            "SELECT category, currency, COUNT(*), SUM(amount)
             FROM cost_entries
             WHERE incurred_at >= ? AND incurred_at < ?
             GROUP BY category, currency
             ORDER BY category, currency",
        )
        .bind(&start)
        .bind(&end)
        .fetch_all(&self.pool)
        .await?;

        let mut section = Section::new("Cost Breakdown", &["Category", "Currency", "Entries", "Amount"]);
        let mut total = 0.0;
        for (category, currency, count, amount) in rows {
            let amount = amount.unwrap_or(0.0);
            total += amount;
            section.push_row(vec![category.into(), currency.into(), count.into(), CellValue::Number(amount)]);
        }
        section.push_kpi(Kpi::new("Total cost", total, None));
        Ok(section)
    }
}

/// `part / whole` as a percentage; zero when there is nothing to divide by.
fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

#[async_trait]
impl AnalyticsSource for SqliteAnalyticsSource {
    async fn aggregate(
        &self,
        aggregator: Aggregator,
        window: &CollectorWindow,
    ) -> Result<Section, AnalyticsError> {
        let result = match aggregator {
            Aggregator::Production => self.production(window).await,
            Aggregator::Quality => self.quality(window).await,
            Aggregator::Machines => self.machines().await,
            Aggregator::Maintenance => self.maintenance(window).await,
            Aggregator::Allocation => self.allocation(window).await,
            Aggregator::Financial => self.financial(window).await,
        };

        result.map_err(|e| AnalyticsError::Query {
            aggregator: aggregator.as_str(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::{TimeZone, Utc};

    async fn seeded() -> SqliteAnalyticsSource {
        let pool = create_migrated_test_pool().await.unwrap();
        sqlx::raw_sql(
            "INSERT INTO production_batches (id, batch_code, product, line, produced_at, planned_qty, produced_qty, defect_qty)
             VALUES ('b1', 'B-1', 'Denim', 'L1', '2025-01-01T08:00:00.000000Z', 100, 90, 9),
                    ('b2', 'B-2', 'Denim', 'L1', '2025-01-01T20:00:00.000000Z', 100, 110, 1),
                    ('b3', 'B-3', 'Twill', 'L2', '2024-12-30T08:00:00.000000Z', 50, 50, 0);
             INSERT INTO machines (id, machine_code, name, machine_type, status, runtime_hours, downtime_hours, updated_at)
             VALUES ('m1', 'LOOM-01', 'Loom 1', 'loom', 'running', 90, 10, '2025-01-01T00:00:00.000000Z');",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteAnalyticsSource::new(pool)
    }

    fn day() -> CollectorWindow {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();
        CollectorWindow {
            start,
            end: start + chrono::Duration::days(1),
        }
    }

    #[tokio::test]
    async fn test_production_respects_window() {
        let source = seeded().await;
        let section = source.aggregate(Aggregator::Production, &day()).await.unwrap();

        assert_eq!(section.rows.len(), 1);
        assert_eq!(section.rows[0][2], CellValue::Integer(2));
        assert_eq!(section.kpis[0].value, 200.0);
        assert_eq!(section.kpis[1].value, 100.0);
    }

    #[tokio::test]
    async fn test_machines_snapshot_and_empty_sections() {
        let source = seeded().await;
        let machines = source.aggregate(Aggregator::Machines, &day()).await.unwrap();
        assert_eq!(machines.rows.len(), 1);
        assert_eq!(machines.kpis[2].value, 90.0);

        let costs = source.aggregate(Aggregator::Financial, &day()).await.unwrap();
        assert!(costs.rows.is_empty());
        assert_eq!(costs.kpis[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_quality_and_maintenance_counts_become_kpis() {
        let source = seeded().await;
        sqlx::raw_sql(
            "INSERT INTO quality_inspections (id, batch_code, inspected_at, passed, defects_found)
             VALUES ('q1', 'B-1', '2025-01-01T09:00:00.000000Z', 1, 0),
                    ('q2', 'B-1', '2025-01-01T10:00:00.000000Z', 0, 3),
                    ('q3', 'B-2', '2025-01-01T21:00:00.000000Z', 1, 1),
                    ('q4', 'B-2', '2025-01-02T05:00:00.000000Z', 1, 0),
                    ('q5', 'B-3', '2024-12-31T09:00:00.000000Z', 0, 9);
             INSERT INTO maintenance_logs (id, machine_code, kind, started_at, downtime_hours, cost)
             VALUES ('x1', 'LOOM-01', 'preventive', '2025-01-01T07:00:00.000000Z', 1.5, 200),
                    ('x2', 'LOOM-01', 'corrective', '2025-01-01T15:00:00.000000Z', 2.5, 300);",
        )
        .execute(&source.pool)
        .await
        .unwrap();

        let quality = source.aggregate(Aggregator::Quality, &day()).await.unwrap();
        assert_eq!(quality.rows.len(), 2);
        assert_eq!(quality.kpis[0].value, 4.0);
        assert_eq!(quality.kpis[1].value, 75.0);
        assert_eq!(quality.kpis[2].value, 4.0);

        let maintenance = source.aggregate(Aggregator::Maintenance, &day()).await.unwrap();
        assert_eq!(maintenance.rows.len(), 2);
        assert_eq!(maintenance.kpis[0].value, 2.0);
        assert_eq!(maintenance.kpis[1].value, 4.0);
        assert_eq!(maintenance.kpis[2].value, 500.0);
    }
}
