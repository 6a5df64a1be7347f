//! Neutral tabular data collected for a report, independent of output format.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::report_run::{CollectorWindow, RunOutcome};
use super::report_schedule::ReportType;

/// Analytics aggregators reachable through the analytics façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    Production,
    Quality,
    Machines,
    Maintenance,
    Allocation,
    Financial,
}

impl Aggregator {
    pub const ALL: [Self; 6] = [
        Self::Production,
        Self::Quality,
        Self::Machines,
        Self::Maintenance,
        Self::Allocation,
        Self::Financial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Quality => "quality",
            Self::Machines => "machines",
            Self::Maintenance => "maintenance",
            Self::Allocation => "allocation",
            Self::Financial => "financial",
        }
    }

    /// Aggregators that make up the report for a given type, in section order.
    pub fn strategy_for(report_type: ReportType) -> &'static [Self] {
        match report_type {
            ReportType::Production => &[Self::Production, Self::Allocation],
            ReportType::Quality => &[Self::Quality, Self::Production],
            ReportType::Performance => &[Self::Machines, Self::Production, Self::Maintenance],
            ReportType::Cost => &[Self::Financial, Self::Allocation],
            ReportType::Safety => &[Self::Maintenance, Self::Machines],
            ReportType::Custom => &Self::ALL,
        }
    }
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Number(f64),
    Text(String),
    Empty,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v:.2}"),
            Self::Text(v) => f.write_str(v),
            Self::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Empty, Into::into)
    }
}

/// A headline number shown above a section's table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub label: String,
    pub value: f64,
    pub unit: Option<String>,
}

impl Kpi {
    pub fn new(label: impl Into<String>, value: f64, unit: Option<&str>) -> Self {
        Self {
            label: label.into(),
            value,
            unit: unit.map(str::to_string),
        }
    }

    /// Value with its unit, as shown in rendered reports.
    pub fn display_value(&self) -> String {
        match &self.unit {
            Some(unit) => format!("{:.2} {unit}", self.value),
            None => format!("{:.2}", self.value),
        }
    }
}

/// One titled tabular block of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub kpis: Vec<Kpi>,
}

impl Section {
    pub fn new(title: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            title: title.into(),
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: Vec::new(),
            kpis: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn push_kpi(&mut self, kpi: Kpi) {
        self.kpis.push(kpi);
    }
}

/// An aggregator that did not produce its section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFailure {
    pub aggregator: Aggregator,
    pub error: String,
}

/// Everything collected for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub title: String,
    pub window: CollectorWindow,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
    pub failures: Vec<SectionFailure>,
}

impl ReportData {
    /// Outcome implied by collection alone.
    pub fn outcome(&self) -> RunOutcome {
        match (self.sections.is_empty(), self.failures.is_empty()) {
            (true, false) => RunOutcome::Failure,
            (false, false) => RunOutcome::Partial,
            _ => RunOutcome::Success,
        }
    }

    /// One line per failed aggregator, or `None` when nothing failed.
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|f| format!("{}: {}", f.aggregator.as_str(), f.error))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn data(sections: usize, failures: usize) -> ReportData {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();
        ReportData {
            title: "Daily Production".to_string(),
            window: CollectorWindow {
                start,
                end: start + chrono::Duration::days(1),
            },
            generated_at: start,
            sections: (0..sections).map(|i| Section::new(format!("S{i}"), &["a"])).collect(),
            failures: (0..failures)
                .map(|_| SectionFailure {
                    aggregator: Aggregator::Quality,
                    error: "timed out".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_outcome_from_sections() {
        assert_eq!(data(2, 0).outcome(), RunOutcome::Success);
        assert_eq!(data(1, 1).outcome(), RunOutcome::Partial);
        assert_eq!(data(0, 2).outcome(), RunOutcome::Failure);
        assert_eq!(data(1, 1).failure_summary().unwrap(), "quality: timed out");
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(
            Aggregator::strategy_for(ReportType::Performance),
            &[Aggregator::Machines, Aggregator::Production, Aggregator::Maintenance]
        );
        assert_eq!(Aggregator::strategy_for(ReportType::Custom).len(), 6);
        for report_type in ReportType::ALL {
            assert!(!Aggregator::strategy_for(report_type).is_empty());
        }
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::from(3_i64).to_string(), "3");
        assert_eq!(CellValue::from(2.5_f64).to_string(), "2.50");
        assert_eq!(CellValue::from(None::<i64>).to_string(), "");
        assert_eq!(Kpi::new("Yield", 97.456, Some("%")).display_value(), "97.46 %");
    }
}
