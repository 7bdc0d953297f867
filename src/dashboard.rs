//! Declarative chart descriptions built from a [`ChartRecord`]. The page draws
//! them; the terminal prints [`Dashboard::to_text`].

use serde::Serialize;

use crate::constants;
use crate::splitter::ChartRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: f64,
    pub color: &'static str,
}

/// Ring chart of the budget allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonutChart {
    pub slices: Vec<Slice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub label: &'static str,
    pub value: f64,
}

/// Four-quarter trend line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineChart {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub allocation: DonutChart,
    pub trend: LineChart,
    pub headline: Metric,
}

impl Dashboard {
    pub fn from_record(record: &ChartRecord) -> Self {
        let slices = record
            .allocation
            .iter()
            .zip(constants::CHART_PALETTE.iter().cycle())
            .map(|((label, value), color)| Slice {
                label: label.clone(),
                value: *value,
                color: *color,
            })
            .collect();

        let points = constants::TREND_LABELS
            .iter()
            .zip(record.trend.iter())
            .map(|(label, value)| Point {
                label: *label,
                value: *value,
            })
            .collect();

        Self {
            allocation: DonutChart { slices },
            trend: LineChart { points },
            headline: Metric {
                label: constants::HEADLINE_LABEL,
                value: record.ratio.clone(),
            },
        }
    }

    /// Plain-text rendering for the terminal.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Allocation\n");
        let total: f64 = self.allocation.slices.iter().map(|s| s.value.max(0.0)).sum();
        for slice in &self.allocation.slices {
            let share = if total > 0.0 { slice.value.max(0.0) / total } else { 0.0 };
            let bar = "█".repeat((share * 20.0).round() as usize);
            out.push_str(&format!("  {:<14} {:>6.1}  {}\n", slice.label, slice.value, bar));
        }
        out.push_str("Trend\n  ");
        let trend: Vec<String> = self
            .trend
            .points
            .iter()
            .map(|p| format!("{} {}", p.label, p.value))
            .collect();
        out.push_str(&trend.join("  "));
        out.push('\n');
        out.push_str(&format!("{}: {}\n", self.headline.label, self.headline.value));
        out
    }
}
