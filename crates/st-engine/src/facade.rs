//! Read, reset and export operations for the presentation layer.
//!
//! The facade never takes part in attribution. It reads the persisted
//! aggregates through the same serialized store the engine writes to.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use st_core::{Aggregates, DomainUsage, Period, Summary, date_of, format_duration, period_usage, summarize};
use st_store::{AggregateStore, KeyValueStore, StoreError};

/// Inbound request from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Snapshot of both aggregates.
    GetTimeData,
    /// Irreversibly empty both aggregates.
    ResetData,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// `{ "timeData": ..., "dailyData": ... }`
    TimeData(Aggregates),
    /// `{ "success": bool }`, with an error message on failure.
    Reset {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// `{ "error": "..." }`
    Error { error: String },
}

impl Response {
    /// The aggregates of a `getTimeData` reply.
    pub fn into_aggregates(self) -> Option<Aggregates> {
        match self {
            Self::TimeData(aggregates) => Some(aggregates),
            Self::Reset { .. } | Self::Error { .. } => None,
        }
    }
}

/// Full data export with headline totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(flatten)]
    pub aggregates: Aggregates,
    /// RFC 3339 instant the export was produced.
    pub export_date: String,
    pub summary: ExportSummary,
}

/// Headline totals of an export, formatted for people reading the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub today_total: String,
    pub week_total: String,
    pub all_time_total: String,
    /// Number of domains with a lifetime record.
    pub total_sites: usize,
}

impl From<Summary> for ExportSummary {
    fn from(summary: Summary) -> Self {
        Self {
            today_total: format_duration(summary.today_total),
            week_total: format_duration(summary.week_total),
            all_time_total: format_duration(summary.all_time_total),
            total_sites: summary.domain_count,
        }
    }
}

/// Suggested file name for an export produced at `now`.
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("screen-time-export-{}.json", date_of(now))
}

/// Query/reset/export operations over the persisted aggregates.
pub struct Facade<S> {
    store: Arc<AggregateStore<S>>,
    icon_template: String,
}

impl<S: KeyValueStore> Facade<S> {
    pub const fn new(store: Arc<AggregateStore<S>>, icon_template: String) -> Self {
        Self {
            store,
            icon_template,
        }
    }

    /// Current persisted state, verbatim.
    pub async fn get_aggregates(&self) -> Result<Aggregates, StoreError> {
        self.store.snapshot().await
    }

    /// Replaces both aggregates with empty mappings.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.reset().await?;
        tracing::info!("all time data reset");
        Ok(())
    }

    /// Headline totals as of `now`.
    pub async fn summarize(&self, now: DateTime<Utc>) -> Result<Summary, StoreError> {
        let aggregates = self.store.snapshot().await?;
        Ok(summarize(&aggregates, now))
    }

    /// Per-domain usage for a period ending today.
    pub async fn usage(&self, period: Period, now: DateTime<Utc>) -> Result<Vec<DomainUsage>, StoreError> {
        let aggregates = self.store.snapshot().await?;
        Ok(period_usage(&aggregates, period, date_of(now), &self.icon_template))
    }

    /// Both aggregates plus a summary, stamped with `now`.
    pub async fn export(&self, now: DateTime<Utc>) -> Result<ExportDocument, StoreError> {
        let aggregates = self.store.snapshot().await?;
        let summary = summarize(&aggregates, now).into();
        Ok(ExportDocument {
            aggregates,
            export_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            summary,
        })
    }

    /// Answers an inbound request. Failures become error responses.
    pub async fn respond(&self, request: Request) -> Response {
        match request {
            Request::GetTimeData => match self.get_aggregates().await {
                Ok(aggregates) => Response::TimeData(aggregates),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read time data");
                    Response::Error {
                        error: e.to_string(),
                    }
                }
            },
            Request::ResetData => match self.reset().await {
                Ok(()) => Response::Reset {
                    success: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "failed to reset time data");
                    Response::Reset {
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use st_core::Domain;
    use st_store::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    async fn seeded() -> Facade<MemoryStore> {
        let store = Arc::new(AggregateStore::new(MemoryStore::new()));
        let domain = Domain::new("example.com").unwrap();
        store
            .update(|aggs| aggs.record(&domain, 90, now(), "icon:{domain}"))
            .await
            .unwrap();
        Facade::new(store, "icon:{domain}".to_string())
    }

    #[test]
    fn requests_use_action_tags() {
        let request: Request = serde_json::from_str(r#"{"action":"getTimeData"}"#).unwrap();
        assert_eq!(request, Request::GetTimeData);
        let request: Request = serde_json::from_str(r#"{"action":"resetData"}"#).unwrap();
        assert_eq!(request, Request::ResetData);
    }

    #[tokio::test]
    async fn get_time_data_response_shape() {
        let facade = seeded().await;
        let response = facade.respond(Request::GetTimeData).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["timeData"]["example.com"]["totalTime"], 90);
        assert_eq!(json["dailyData"]["2025-03-10"]["example.com"], 90);
    }

    #[tokio::test]
    async fn reset_response_and_completeness() {
        let facade = seeded().await;
        let response = facade.respond(Request::ResetData).await;
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"success": true}));

        let aggregates = facade.get_aggregates().await.unwrap();
        assert!(aggregates.time_data.is_empty());
        assert!(aggregates.daily_data.is_empty());
    }

    #[tokio::test]
    async fn failures_become_error_responses() {
        let store = Arc::new(AggregateStore::new(MemoryStore::new()));
        store.substrate().set_unavailable(true);
        let facade = Facade::new(store, "icon:{domain}".to_string());

        let response = facade.respond(Request::ResetData).await;
        assert!(matches!(response, Response::Reset { success: false, error: Some(_) }));
        let response = facade.respond(Request::GetTimeData).await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn export_includes_summary_and_date() {
        let facade = seeded().await;
        let document = facade.export(now()).await.unwrap();
        let json = serde_json::to_value(&document).unwrap();

        assert_eq!(json["exportDate"], "2025-03-10T12:00:00.000Z");
        assert_eq!(json["summary"]["todayTotal"], "1m");
        assert_eq!(json["summary"]["weekTotal"], "1m");
        assert_eq!(json["summary"]["allTimeTotal"], "1m");
        assert_eq!(json["summary"]["totalSites"], 1);
        assert_eq!(json["timeData"]["example.com"]["totalTime"], 90);
        assert_eq!(export_file_name(now()), "screen-time-export-2025-03-10.json");
    }

    #[test]
    fn export_summary_formats_durations() {
        let summary = ExportSummary::from(Summary {
            today_total: 45,
            week_total: 7_500,
            all_time_total: 7_200,
            domain_count: 3,
        });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "todayTotal": "45s",
                "weekTotal": "2h 5m",
                "allTimeTotal": "2h",
                "totalSites": 3,
            })
        );
    }

    #[tokio::test]
    async fn usage_for_period() {
        let facade = seeded().await;
        let usage = facade.usage(Period::Today, now()).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].total_time, 90);
        assert_eq!(usage[0].favicon, "icon:example.com");
    }
}
