use crate::domain::category_tree::QueryCategory;
use crate::domain::period::PeriodRange;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const WINDOW_BUCKET: &str = "aw-watcher-window";
const AFK_BUCKET: &str = "aw-watcher-afk";
const UNCATEGORIZED: &str = "Uncategorized";
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Source of categorized activity time.
#[async_trait]
pub trait DurationFetcher: Send + Sync {
    /// Hours of activity matching `categories` inside `period`, excluding uncategorized time.
    async fn fetch_hours(
        &self,
        categories: &[QueryCategory],
        period: &PeriodRange,
    ) -> Result<f64, InfraError>;
}

#[derive(Debug, Serialize)]
struct QueryRequest {
    query: Vec<String>,
    timeperiods: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub cat_events: Vec<CategoryEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEvent {
    pub duration: f64,
    #[serde(default)]
    pub data: CategoryEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryEventData {
    #[serde(rename = "$category")]
    pub category: Option<CategoryLabel>,
}

/// `$category` is a label path in current servers and a plain name in older ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CategoryLabel {
    Path(Vec<String>),
    Name(String),
}

impl CategoryLabel {
    pub fn is_uncategorized(&self) -> bool {
        match self {
            Self::Name(name) => name == UNCATEGORIZED,
            Self::Path(path) => path.len() == 1 && path[0] == UNCATEGORIZED,
        }
    }
}

/// Sums categorized event durations across all timeperiod results, in hours.
pub fn sum_categorized_hours(results: &[QueryResult]) -> f64 {
    let total_seconds: f64 = results
        .iter()
        .flat_map(|result| result.cat_events.iter())
        .filter(|event| {
            event
                .data
                .category
                .as_ref()
                .is_some_and(|category| !category.is_uncategorized())
        })
        .map(|event| event.duration)
        .sum();
    total_seconds / SECONDS_PER_HOUR
}

/// Query program that categorizes window events and merges them per category.
pub fn build_query(
    categories: &[QueryCategory],
    filter_afk: bool,
) -> Result<Vec<String>, InfraError> {
    let encoded_categories = serde_json::to_string(categories)?;
    let mut query = vec![format!(
        "events = flood(query_bucket(find_bucket(\"{WINDOW_BUCKET}\")));"
    )];
    if filter_afk {
        query.extend([
            format!("not_afk = flood(query_bucket(find_bucket(\"{AFK_BUCKET}\")));"),
            "not_afk = filter_keyvals(not_afk, \"status\", [\"not-afk\"]);".to_string(),
            "browser_events = [];".to_string(),
            "audible_events = filter_keyvals(browser_events, \"audible\", [true]);".to_string(),
            "not_afk = period_union(not_afk, audible_events);".to_string(),
            "events = filter_period_intersect(events, not_afk);".to_string(),
        ]);
    }
    query.extend([
        format!("events = categorize(events, {encoded_categories});"),
        "cat_events = sort_by_duration(merge_events_by_keys(events, [\"$category\"]));".to_string(),
        "RETURN = {\"cat_events\": cat_events};".to_string(),
    ]);
    Ok(query)
}

#[derive(Debug, Clone)]
pub struct ReqwestActivityWatchClient {
    client: Client,
    endpoint: Url,
    filter_afk: bool,
}

impl ReqwestActivityWatchClient {
    pub fn new(config: &AppConfig) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| {
                InfraError::ActivityBackend(format!("failed to build http client: {error}"))
            })?;
        Ok(Self {
            client,
            endpoint: config.activity_watch_endpoint()?,
            filter_afk: config.filter_afk,
        })
    }

    fn backend_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("activitywatch query failed: http {}", status.as_u16())
        } else {
            format!("activitywatch query failed: http {}; body={body}", status.as_u16())
        };
        InfraError::ActivityBackend(message)
    }
}

#[async_trait]
impl DurationFetcher for ReqwestActivityWatchClient {
    async fn fetch_hours(
        &self,
        categories: &[QueryCategory],
        period: &PeriodRange,
    ) -> Result<f64, InfraError> {
        let request = QueryRequest {
            query: build_query(categories, self.filter_afk)?,
            timeperiods: vec![period.to_timeperiod()],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                InfraError::ActivityBackend(format!(
                    "network error while querying activitywatch: {error}"
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::ActivityBackend(format!("failed reading activitywatch response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::backend_http_error(status, &body));
        }

        let results: Vec<QueryResult> = serde_json::from_str(&body).map_err(|error| {
            InfraError::ActivityBackend(format!(
                "invalid activitywatch payload: {error}; body={body}"
            ))
        })?;
        Ok(sum_categorized_hours(&results))
    }
}
