use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::models::cost::{CostTable, UsageDate, NO_RESOURCE_GROUP_LABEL};
use crate::core::window::QueryWindow;

const API_VERSION: &str = "2023-03-01";
const MAX_PAGES: usize = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryDefinition {
    #[serde(rename = "type")]
    kind: &'static str,
    timeframe: &'static str,
    time_period: TimePeriod,
    dataset: Dataset,
}

#[derive(Debug, Serialize)]
struct TimePeriod {
    from: String,
    to: String,
}

#[derive(Debug, Serialize)]
struct Dataset {
    granularity: &'static str,
    grouping: Vec<Grouping>,
    aggregation: Aggregations,
}

#[derive(Debug, Serialize)]
struct Grouping {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct Aggregations {
    #[serde(rename = "totalCost")]
    total_cost: Aggregation,
}

#[derive(Debug, Serialize)]
struct Aggregation {
    name: &'static str,
    function: &'static str,
}

impl QueryDefinition {
    /// Daily pre-tax cost summed per resource group.
    fn daily_by_resource_group(window: &QueryWindow) -> Self {
        Self {
            kind: "Usage",
            timeframe: "Custom",
            time_period: TimePeriod {
                from: window.from_timestamp(),
                to: window.to_timestamp(),
            },
            dataset: Dataset {
                granularity: "Daily",
                grouping: vec![Grouping {
                    kind: "Dimension",
                    name: "ResourceGroup",
                }],
                aggregation: Aggregations {
                    total_cost: Aggregation {
                        name: "PreTaxCost",
                        function: "Sum",
                    },
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    properties: QueryProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryProperties {
    #[serde(default)]
    next_link: Option<String>,
    #[serde(default)]
    columns: Vec<QueryColumn>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct QueryColumn {
    name: String,
}

/// Row positions of the three values the report needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    cost: usize,
    date: usize,
    group: usize,
}

impl ColumnLayout {
    const POSITIONAL: Self = Self {
        cost: 0,
        date: 1,
        group: 2,
    };

    fn from_columns(columns: &[QueryColumn]) -> Result<Self> {
        if columns.is_empty() {
            return Ok(Self::POSITIONAL);
        }
        let find = |names: &[&str]| {
            columns
                .iter()
                .position(|c| names.iter().any(|n| c.name.eq_ignore_ascii_case(n)))
        };
        Ok(Self {
            cost: find(&["PreTaxCost", "Cost", "totalCost"])
                .context("Cost query response has no cost column")?,
            date: find(&["UsageDate"]).context("Cost query response has no UsageDate column")?,
            group: find(&["ResourceGroup", "ResourceGroupName"])
                .context("Cost query response has no ResourceGroup column")?,
        })
    }
}

/// Result of the cost query.
///
/// A failed query still hands back whatever rows were folded before the
/// failure so the caller can choose between alerting and reporting them.
#[derive(Debug)]
pub enum FetchOutcome {
    Complete(CostTable<UsageDate>),
    Degraded {
        table: CostTable<UsageDate>,
        error: anyhow::Error,
    },
}

#[cfg(test)]
impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn table(&self) -> &CostTable<UsageDate> {
        match self {
            Self::Complete(table) | Self::Degraded { table, .. } => table,
        }
    }
}

/// Parameters of one cost query.
pub struct CostQuery<'a> {
    pub endpoint: &'a str,
    pub subscription_id: &'a str,
    pub token: &'a str,
    pub window: &'a QueryWindow,
}

pub fn query_url(endpoint: &str, subscription_id: &str) -> String {
    format!(
        "{}/subscriptions/{}/providers/Microsoft.CostManagement/query?api-version={}",
        endpoint.trim_end_matches('/'),
        subscription_id,
        API_VERSION
    )
}

/// Query daily cost per resource group over the window.
pub async fn fetch(client: &reqwest::Client, query: &CostQuery<'_>) -> FetchOutcome {
    let mut table = CostTable::default();
    match fetch_into(client, query, &mut table).await {
        Ok(pages) => {
            tracing::info!(
                days = table.len(),
                rows = table.row_count(),
                pages,
                "Cost query complete"
            );
            FetchOutcome::Complete(table)
        }
        Err(error) => {
            tracing::error!(
                error = %format!("{:#}", error),
                rows = table.row_count(),
                "Cost query failed"
            );
            FetchOutcome::Degraded { table, error }
        }
    }
}

async fn fetch_into(
    client: &reqwest::Client,
    query: &CostQuery<'_>,
    table: &mut CostTable<UsageDate>,
) -> Result<usize> {
    let body = QueryDefinition::daily_by_resource_group(query.window);
    let mut url = query_url(query.endpoint, query.subscription_id);
    let mut pages = 0;

    loop {
        let page = fetch_page(client, &url, query.token, &body).await?;
        pages += 1;
        tracing::debug!(page = pages, rows = page.rows.len(), "Received cost query page");

        let layout = ColumnLayout::from_columns(&page.columns)?;
        for row in &page.rows {
            let (date, group, cost) = parse_row(row, layout)?;
            table.record(date, &group, cost);
        }

        match page.next_link {
            Some(next) if !next.is_empty() => {
                if pages >= MAX_PAGES {
                    anyhow::bail!("Cost query returned more than {} pages", MAX_PAGES);
                }
                // The bearer token must not leave the management endpoint.
                if !same_origin(query.endpoint, &next) {
                    anyhow::bail!("Cost query nextLink points outside {}: {}", query.endpoint, next);
                }
                url = next;
            }
            _ => return Ok(pages),
        }
    }
}

async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    body: &QueryDefinition,
) -> Result<QueryProperties> {
    let response = client
        .post(url)
        .bearer_auth(token)
        .header("Accept", "application/json")
        .json(body)
        .send()
        .await
        .context("Failed to send request to Cost Management query API")?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "HTTP {} from cost query - check the identity can read cost data for the subscription: {}",
            status.as_u16(),
            text
        );
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {} from cost query: {}", status.as_u16(), text);
    }

    let data: QueryResponse = response
        .json()
        .await
        .context("Failed to parse cost query response")?;
    Ok(data.properties)
}

/// True when `link` has the endpoint's scheme, host and port and carries no credentials.
fn same_origin(endpoint: &str, link: &str) -> bool {
    let (Ok(base), Ok(next)) = (reqwest::Url::parse(endpoint), reqwest::Url::parse(link)) else {
        return false;
    };
    next.username().is_empty()
        && next.password().is_none()
        && next.scheme() == base.scheme()
        && next.host_str().is_some()
        && next.host_str() == base.host_str()
        && next.port_or_known_default() == base.port_or_known_default()
}

fn parse_row(row: &[Value], layout: ColumnLayout) -> Result<(UsageDate, String, f64)> {
    let cost = row
        .get(layout.cost)
        .and_then(value_as_f64)
        .with_context(|| format!("Cost query row has no numeric cost: {:?}", row))?;
    let date = row
        .get(layout.date)
        .and_then(value_as_usage_date)
        .with_context(|| format!("Cost query row has no usage date: {:?}", row))?;
    let group = match row.get(layout.group) {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::String(_)) | Some(Value::Null) | None => NO_RESOURCE_GROUP_LABEL.to_string(),
        Some(other) => other.to_string(),
    };
    Ok((date, group, cost))
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_usage_date(value: &Value) -> Option<UsageDate> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .map(|d| UsageDate::new(d.to_string())),
        Value::String(s) if !s.is_empty() => Some(UsageDate::new(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const QUERY_PATH: &str = "/subscriptions/sub-1/providers/Microsoft.CostManagement/query";

    fn window() -> QueryWindow {
        QueryWindow {
            first_day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            last_day: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        }
    }

    fn columns() -> Value {
        json!([
            {"name": "PreTaxCost", "type": "Number"},
            {"name": "UsageDate", "type": "Number"},
            {"name": "ResourceGroup", "type": "String"},
            {"name": "Currency", "type": "String"}
        ])
    }

    async fn run_fetch(server: &MockServer) -> FetchOutcome {
        let endpoint = server.uri();
        let window = window();
        let query = CostQuery {
            endpoint: &endpoint,
            subscription_id: "sub-1",
            token: "tok",
            window: &window,
        };
        fetch(&reqwest::Client::new(), &query).await
    }

    #[test]
    fn query_body_matches_cost_management_schema() {
        let body = serde_json::to_value(QueryDefinition::daily_by_resource_group(&window())).unwrap();
        assert_eq!(
            body,
            json!({
                "type": "Usage",
                "timeframe": "Custom",
                "timePeriod": {"from": "2024-01-01T00:00:00Z", "to": "2024-01-03T23:59:59Z"},
                "dataset": {
                    "granularity": "Daily",
                    "grouping": [{"type": "Dimension", "name": "ResourceGroup"}],
                    "aggregation": {"totalCost": {"name": "PreTaxCost", "function": "Sum"}}
                }
            })
        );
    }

    #[test]
    fn query_url_targets_subscription_scope() {
        assert_eq!(
            query_url("https://management.azure.com/", "abc"),
            "https://management.azure.com/subscriptions/abc/providers/Microsoft.CostManagement/query?api-version=2023-03-01"
        );
    }

    #[test]
    fn layout_found_by_column_name() {
        let cols: Vec<QueryColumn> = serde_json::from_value(json!([
            {"name": "UsageDate"},
            {"name": "ResourceGroup"},
            {"name": "PreTaxCost"}
        ]))
        .unwrap();
        let layout = ColumnLayout::from_columns(&cols).unwrap();
        assert_eq!(layout, ColumnLayout { cost: 2, date: 0, group: 1 });
    }

    #[test]
    fn layout_falls_back_to_positions() {
        assert_eq!(ColumnLayout::from_columns(&[]).unwrap(), ColumnLayout::POSITIONAL);
    }

    #[test]
    fn layout_requires_date_column() {
        let cols: Vec<QueryColumn> =
            serde_json::from_value(json!([{"name": "PreTaxCost"}, {"name": "ResourceGroup"}])).unwrap();
        let err = ColumnLayout::from_columns(&cols).unwrap_err();
        assert!(err.to_string().contains("UsageDate"));
    }

    #[test]
    fn parse_row_blank_group_uses_placeholder() {
        let row = vec![json!(1.5), json!(20240101), json!("")];
        let (date, group, cost) = parse_row(&row, ColumnLayout::POSITIONAL).unwrap();
        assert_eq!(date.as_str(), "20240101");
        assert_eq!(group, NO_RESOURCE_GROUP_LABEL);
        assert!((cost - 1.5).abs() < 1e-10);
    }

    #[test]
    fn parse_row_null_group_uses_placeholder() {
        let row = vec![json!(1.5), json!(20240101), Value::Null];
        let (_, group, _) = parse_row(&row, ColumnLayout::POSITIONAL).unwrap();
        assert_eq!(group, NO_RESOURCE_GROUP_LABEL);
    }

    #[test]
    fn parse_row_accepts_string_values() {
        let row = vec![json!("2.25"), json!("20240102"), json!("rg-a")];
        let (date, group, cost) = parse_row(&row, ColumnLayout::POSITIONAL).unwrap();
        assert_eq!(date.as_str(), "20240102");
        assert_eq!(group, "rg-a");
        assert!((cost - 2.25).abs() < 1e-10);
    }

    #[test]
    fn parse_row_float_date_is_integral() {
        let row = vec![json!(1.0), json!(20240103.0), json!("rg-a")];
        let (date, _, _) = parse_row(&row, ColumnLayout::POSITIONAL).unwrap();
        assert_eq!(date.as_str(), "20240103");
    }

    #[test]
    fn parse_row_rejects_missing_cost() {
        let row = vec![Value::Null, json!(20240101), json!("rg-a")];
        assert!(parse_row(&row, ColumnLayout::POSITIONAL).is_err());
    }

    #[tokio::test]
    async fn fetch_folds_rows_in_api_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({"dataset": {"granularity": "Daily"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "nextLink": null,
                    "columns": columns(),
                    "rows": [
                        [5.0, 20240101, "rg-b", "EUR"],
                        [10.0, 20240101, "rg-a", "EUR"],
                        [7.5, 20240102, "", "EUR"]
                    ]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = run_fetch(&server).await;
        assert!(outcome.is_complete());
        let table = outcome.table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.days[0].date.as_str(), "20240101");
        assert_eq!(table.days[0].groups[0].resource_group, "rg-b");
        assert_eq!(table.days[0].groups[1].resource_group, "rg-a");
        assert_eq!(table.days[1].groups[0].resource_group, NO_RESOURCE_GROUP_LABEL);
    }

    #[tokio::test]
    async fn fetch_follows_next_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "nextLink": format!("{}/next-page", server.uri()),
                    "columns": columns(),
                    "rows": [[1.0, 20240101, "rg-a", "EUR"]]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/next-page"))
            .and(body_partial_json(json!({"type": "Usage"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "columns": columns(),
                    "rows": [[2.0, 20240102, "rg-a", "EUR"]]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = run_fetch(&server).await;
        assert!(outcome.is_complete());
        assert_eq!(outcome.table().len(), 2);
        assert_eq!(outcome.table().row_count(), 2);
    }

    #[tokio::test]
    async fn fetch_server_error_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        match run_fetch(&server).await {
            FetchOutcome::Degraded { table, error } => {
                assert!(table.is_empty());
                let msg = format!("{:#}", error);
                assert!(msg.contains("HTTP 500"));
                assert!(msg.contains("backend unavailable"));
            }
            FetchOutcome::Complete(_) => panic!("expected a degraded outcome"),
        }
    }

    #[tokio::test]
    async fn fetch_unauthorized_names_permissions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("AuthorizationFailed"))
            .mount(&server)
            .await;

        match run_fetch(&server).await {
            FetchOutcome::Degraded { error, .. } => {
                let msg = error.to_string();
                assert!(msg.contains("HTTP 403"));
                assert!(msg.contains("read cost data"));
            }
            FetchOutcome::Complete(_) => panic!("expected a degraded outcome"),
        }
    }

    #[tokio::test]
    async fn fetch_keeps_rows_from_pages_before_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "nextLink": format!("{}/next-page", server.uri()),
                    "columns": columns(),
                    "rows": [[1.0, 20240101, "rg-a", "EUR"]]
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/next-page"))
            .respond_with(ResponseTemplate::new(429).set_body_string("throttled"))
            .mount(&server)
            .await;

        match run_fetch(&server).await {
            FetchOutcome::Degraded { table, error } => {
                assert_eq!(table.row_count(), 1);
                assert!(error.to_string().contains("HTTP 429"));
            }
            FetchOutcome::Complete(_) => panic!("expected a degraded outcome"),
        }
    }

    #[test]
    fn same_origin_accepts_endpoint_links() {
        let endpoint = "https://management.azure.com";
        assert!(same_origin(
            endpoint,
            "https://management.azure.com/subscriptions/abc/providers/Microsoft.CostManagement/query?$skiptoken=x"
        ));
        assert!(same_origin(endpoint, "https://management.azure.com:443/next"));
    }

    #[test]
    fn same_origin_rejects_lookalike_hosts() {
        let endpoint = "https://management.azure.com";
        assert!(!same_origin(endpoint, "https://management.azure.com@evil.example/x"));
        assert!(!same_origin(endpoint, "https://management.azure.com.evil.example/x"));
        assert!(!same_origin(endpoint, "https://user:pw@management.azure.com/x"));
        assert!(!same_origin(endpoint, "http://management.azure.com/x"));
        assert!(!same_origin(endpoint, "https://management.azure.com:8443/x"));
        assert!(!same_origin(endpoint, "/relative/next"));
    }

    async fn assert_next_link_not_followed(server: &MockServer, next_link: String) {
        let attacker = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&attacker)
            .await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "nextLink": next_link,
                    "columns": columns(),
                    "rows": []
                }
            })))
            .mount(server)
            .await;

        let outcome = run_fetch(server).await;
        assert!(!outcome.is_complete());
        attacker.verify().await;
    }

    #[tokio::test]
    async fn fetch_refuses_next_link_with_userinfo() {
        let server = MockServer::start().await;
        let attacker = MockServer::start().await;
        let attacker_host = attacker.address().to_string();
        let next_link = format!("{}@{}/steal", server.uri(), attacker_host);
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&attacker)
            .await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "nextLink": next_link,
                    "columns": columns(),
                    "rows": []
                }
            })))
            .mount(&server)
            .await;

        let outcome = run_fetch(&server).await;
        assert!(!outcome.is_complete());
        attacker.verify().await;
    }

    #[tokio::test]
    async fn fetch_refuses_next_link_on_other_port() {
        let server = MockServer::start().await;
        let attacker = MockServer::start().await;
        assert_next_link_not_followed(&server, format!("{}/steal", attacker.uri())).await;
    }

    #[tokio::test]
    async fn fetch_refuses_foreign_next_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "nextLink": "https://elsewhere.example.com/steal",
                    "columns": columns(),
                    "rows": []
                }
            })))
            .mount(&server)
            .await;

        let outcome = run_fetch(&server).await;
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn fetch_malformed_body_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        match run_fetch(&server).await {
            FetchOutcome::Degraded { error, .. } => {
                assert!(error.to_string().contains("Failed to parse cost query response"));
            }
            FetchOutcome::Complete(_) => panic!("expected a degraded outcome"),
        }
    }
}
