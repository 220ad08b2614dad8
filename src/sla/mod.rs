//! SLA compliance metrics

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use servicefix_http::ApiError;

use crate::client::ApiClient;
use crate::fetch::ApiRequest;

const METRICS_PATH: &str = "/sla/metrics";

/// Compliance figures for one ticket priority
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityMetrics {
    #[serde(default)]
    pub priority: String,

    #[serde(default, alias = "totalTickets", alias = "total_tickets", deserialize_with = "lenient_u64")]
    pub total: u64,

    #[serde(default, alias = "breachedTickets", alias = "breached_tickets", deserialize_with = "lenient_u64")]
    pub breached: u64,

    #[serde(default, alias = "complianceRate", deserialize_with = "lenient_f64")]
    pub compliance_rate: f64,
}

/// Aggregate SLA metrics for a reporting period
///
/// The backend has shipped these under both snake_case and camelCase names
/// and sometimes as strings; every field parses leniently and defaults to
/// zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaMetrics {
    #[serde(default)]
    pub period: Option<String>,

    #[serde(default, alias = "totalTickets", deserialize_with = "lenient_u64")]
    pub total_tickets: u64,

    #[serde(default, alias = "withinSla", alias = "met", deserialize_with = "lenient_u64")]
    pub within_sla: u64,

    #[serde(default, alias = "breachedTickets", alias = "breached_tickets", deserialize_with = "lenient_u64")]
    pub breached: u64,

    /// Percentage in `0..=100`
    #[serde(default, alias = "complianceRate", deserialize_with = "lenient_f64")]
    pub compliance_rate: f64,

    #[serde(default, alias = "averageResponseTime", alias = "avg_response_time", deserialize_with = "lenient_f64")]
    pub average_response_minutes: f64,

    #[serde(default, alias = "averageResolutionTime", alias = "avg_resolution_time", deserialize_with = "lenient_f64")]
    pub average_resolution_minutes: f64,

    #[serde(default, alias = "byPriority", deserialize_with = "lenient_list")]
    pub by_priority: Vec<PriorityMetrics>,
}

impl SlaMetrics {
    /// Compliance rate computed from the ticket counts when the server sent none
    pub fn effective_compliance_rate(&self) -> f64 {
        if self.compliance_rate > 0.0 || self.total_tickets == 0 {
            return self.compliance_rate;
        }
        self.within_sla as f64 * 100.0 / self.total_tickets as f64
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = lenient_f64(deserializer)?;
    Ok(if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    })
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<PriorityMetrics>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let entries = match value {
        Value::Array(items) => items,
        // `{ "high": { .. }, "low": { .. } }` keyed by priority
        Value::Object(map) => map
            .into_iter()
            .map(|(priority, mut entry)| {
                if let Value::Object(fields) = &mut entry {
                    fields
                        .entry("priority")
                        .or_insert_with(|| Value::String(priority));
                }
                entry
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// Client for the `/sla` endpoints
#[derive(Clone)]
pub struct SlaService {
    client: ApiClient,
}

impl SlaService {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetch SLA metrics, optionally restricted to a period such as `"7d"`
    pub async fn metrics(&self, period: Option<&str>) -> Result<SlaMetrics, ApiError> {
        let mut request = ApiRequest::get(METRICS_PATH);
        if let Some(period) = period {
            request = request.query("period", period);
        }
        let payload = self.client.execute(request).await?;
        let mut metrics = match payload {
            Value::Object(_) => serde_json::from_value::<SlaMetrics>(payload)?,
            _ => SlaMetrics::default(),
        };
        if metrics.period.is_none() {
            metrics.period = period.map(str::to_string);
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case_metrics() {
        let metrics: SlaMetrics = serde_json::from_value(json!({
            "total_tickets": 40,
            "within_sla": 30,
            "breached": 10,
            "compliance_rate": 75.0,
            "by_priority": [{ "priority": "high", "total": 10, "breached": 4 }]
        }))
        .unwrap();

        assert_eq!(metrics.total_tickets, 40);
        assert_eq!(metrics.breached, 10);
        assert_eq!(metrics.compliance_rate, 75.0);
        assert_eq!(metrics.by_priority.len(), 1);
        assert_eq!(metrics.by_priority[0].breached, 4);
    }

    #[test]
    fn test_camel_case_and_strings() {
        let metrics: SlaMetrics = serde_json::from_value(json!({
            "totalTickets": "12",
            "withinSla": 9,
            "complianceRate": "75%",
            "averageResponseTime": "42.5",
            "byPriority": { "low": { "totalTickets": 3 } }
        }))
        .unwrap();

        assert_eq!(metrics.total_tickets, 12);
        assert_eq!(metrics.within_sla, 9);
        assert_eq!(metrics.compliance_rate, 75.0);
        assert_eq!(metrics.average_response_minutes, 42.5);
        assert_eq!(metrics.by_priority[0].priority, "low");
        assert_eq!(metrics.by_priority[0].total, 3);
    }

    #[test]
    fn test_missing_and_garbage_fields_default() {
        let metrics: SlaMetrics = serde_json::from_value(json!({
            "total_tickets": null,
            "breached": "n/a",
            "by_priority": "none"
        }))
        .unwrap();

        assert_eq!(metrics, SlaMetrics::default());
    }

    #[test]
    fn test_effective_compliance_rate() {
        let metrics = SlaMetrics {
            total_tickets: 8,
            within_sla: 6,
            ..Default::default()
        };
        assert_eq!(metrics.effective_compliance_rate(), 75.0);
        assert_eq!(SlaMetrics::default().effective_compliance_rate(), 0.0);
    }
}
