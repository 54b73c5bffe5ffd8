use serde::Serialize;
use std::collections::BTreeMap;

/// Count and mean of the values seen for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    pub count: u64,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Running {
    count: u64,
    sum: f64,
}

/// Incremental per-category accumulator; keys iterate in sorted order.
#[derive(Debug, Clone, Default)]
pub struct MetricAccumulator {
    totals: BTreeMap<String, Running>,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: &str, value: f64) {
        match self.totals.get_mut(category) {
            Some(running) => {
                running.count += 1;
                running.sum += value;
            }
            None => {
                self.totals.insert(
                    category.to_string(),
                    Running {
                        count: 1,
                        sum: value,
                    },
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Metric> {
        self.totals
            .iter()
            .map(|(category, running)| {
                (
                    category.clone(),
                    Metric {
                        count: running.count,
                        average: running.sum / running.count as f64,
                    },
                )
            })
            .collect()
    }
}
