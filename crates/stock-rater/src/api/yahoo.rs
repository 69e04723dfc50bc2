//! Yahoo Finance quoteSummary client

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::RaterConfig;
use crate::error::{RaterError, Result};
use crate::kpi::{Kpi, KpiValues};
use crate::source::{CompanySnapshot, MetricSource};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const SESSION_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query2.finance.yahoo.com/v1/test/getcrumb";
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData,assetProfile";
const UNKNOWN_COMPANY: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: Option<QuoteSummaryResult>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<QuoteSummaryData>>,
    error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
struct YahooApiError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryData {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    financial_data: Option<FinancialData>,
    asset_profile: Option<AssetProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<YahooValue>,
    short_name: Option<String>,
    long_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<YahooValue>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<YahooValue>,
    dividend_yield: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    #[serde(rename = "forwardPE")]
    forward_pe: Option<YahooValue>,
    price_to_book: Option<YahooValue>,
    enterprise_to_ebitda: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    debt_to_equity: Option<YahooValue>,
    return_on_equity: Option<YahooValue>,
    profit_margins: Option<YahooValue>,
    revenue_growth: Option<YahooValue>,
    current_ratio: Option<YahooValue>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

/// Yahoo wraps numbers as `{"raw": 1.5, "fmt": "1.50"}`, or `{}` when absent
#[derive(Debug, Deserialize)]
struct YahooValue {
    raw: Option<f64>,
}

fn raw(value: Option<&YahooValue>) -> Option<f64> {
    value.and_then(|v| v.raw)
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Turn a quoteSummary response body into a [`CompanySnapshot`].
///
/// A Yahoo "Not Found" error or a result without a market price means the
/// ticker does not exist; anything unparsable is an upstream problem.
pub fn parse_quote_summary(ticker: &str, body: &str) -> Result<CompanySnapshot> {
    let response: QuoteSummaryResponse = serde_json::from_str(body).map_err(|e| {
        RaterError::UpstreamUnavailable(format!("unreadable quoteSummary for {ticker}: {e}"))
    })?;
    let summary = response.quote_summary.ok_or_else(|| {
        RaterError::UpstreamUnavailable(format!("quoteSummary for {ticker} has no body"))
    })?;

    if let Some(error) = summary.error {
        return match error.code.as_deref() {
            Some("Not Found") => Err(RaterError::TickerNotFound(ticker.to_string())),
            code => Err(RaterError::UpstreamUnavailable(format!(
                "quoteSummary error for {ticker}: {} {}",
                code.unwrap_or("unknown"),
                error.description.unwrap_or_default()
            ))),
        };
    }

    let data = summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| RaterError::TickerNotFound(ticker.to_string()))?;

    let price = data.price;
    if raw(price.as_ref().and_then(|p| p.regular_market_price.as_ref())).is_none() {
        return Err(RaterError::TickerNotFound(ticker.to_string()));
    }
    let company_name = price
        .and_then(|p| non_blank(p.short_name).or_else(|| non_blank(p.long_name)))
        .unwrap_or_else(|| UNKNOWN_COMPANY.to_string());

    let detail = data.summary_detail.as_ref();
    let stats = data.default_key_statistics.as_ref();
    let financial = data.financial_data.as_ref();

    let readings = [
        (Kpi::TrailingPe, raw(detail.and_then(|d| d.trailing_pe.as_ref()))),
        (
            Kpi::ForwardPe,
            raw(detail.and_then(|d| d.forward_pe.as_ref()))
                .or_else(|| raw(stats.and_then(|s| s.forward_pe.as_ref()))),
        ),
        (Kpi::PriceToBook, raw(stats.and_then(|s| s.price_to_book.as_ref()))),
        (
            Kpi::EnterpriseToEbitda,
            raw(stats.and_then(|s| s.enterprise_to_ebitda.as_ref())),
        ),
        (Kpi::DebtToEquity, raw(financial.and_then(|f| f.debt_to_equity.as_ref()))),
        (
            Kpi::ReturnOnEquity,
            raw(financial.and_then(|f| f.return_on_equity.as_ref())),
        ),
        (Kpi::ProfitMargins, raw(financial.and_then(|f| f.profit_margins.as_ref()))),
        (Kpi::RevenueGrowth, raw(financial.and_then(|f| f.revenue_growth.as_ref()))),
        (Kpi::CurrentRatio, raw(financial.and_then(|f| f.current_ratio.as_ref()))),
        (Kpi::DividendYield, raw(detail.and_then(|d| d.dividend_yield.as_ref()))),
    ];

    let mut kpis = KpiValues::new();
    for (kpi, value) in readings {
        if let Some(value) = value {
            kpis.insert(kpi, value);
        }
    }

    let mut snapshot = CompanySnapshot::new(ticker, company_name).with_kpis(kpis);
    if let Some(profile) = data.asset_profile {
        snapshot.sector = non_blank(profile.sector);
        snapshot.industry = non_blank(profile.industry);
    }
    Ok(snapshot)
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> RaterError {
    RaterError::UpstreamUnavailable(format!("{context}: {err}"))
}

/// Where session, crumb and quoteSummary requests are sent
#[derive(Debug, Clone)]
struct Endpoints {
    session: String,
    crumb: String,
    quote_summary: String,
}

impl Endpoints {
    fn yahoo() -> Self {
        Self {
            session: SESSION_URL.to_string(),
            crumb: CRUMB_URL.to_string(),
            quote_summary: QUOTE_SUMMARY_URL.to_string(),
        }
    }
}

enum Reply {
    Body(String),
    /// 401/403: the session or crumb has expired
    SessionRejected(StatusCode),
}

/// Production [`MetricSource`] backed by Yahoo Finance.
///
/// Holds one cookie session. The crumb is fetched on first use and reused
/// until Yahoo rejects it; a rejected request renews the session and is
/// retried once.
pub struct YahooMetricSource {
    client: Client,
    endpoints: Endpoints,
    crumb: RwLock<Option<String>>,
    rate_limiter: SharedRateLimiter,
}

impl YahooMetricSource {
    pub fn new(config: &RaterConfig) -> Result<Self> {
        Self::with_endpoints(config, Endpoints::yahoo())
    }

    fn with_endpoints(config: &RaterConfig, endpoints: Endpoints) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            client,
            endpoints,
            crumb: RwLock::new(None),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn crumb(&self) -> Result<String> {
        if let Some(crumb) = self.crumb.read().await.as_deref() {
            return Ok(crumb.to_string());
        }

        let mut slot = self.crumb.write().await;
        if let Some(crumb) = slot.as_deref() {
            return Ok(crumb.to_string());
        }
        let crumb = self.open_session().await?;
        *slot = Some(crumb.clone());
        Ok(crumb)
    }

    /// Forget `stale` unless a concurrent request already replaced it
    async fn invalidate(&self, stale: &str) {
        let mut slot = self.crumb.write().await;
        if slot.as_deref() == Some(stale) {
            *slot = None;
        }
    }

    async fn open_session(&self) -> Result<String> {
        self.rate_limiter.until_ready().await;
        // the cookie jar picks up the session cookie from this response
        self.client
            .get(&self.endpoints.session)
            .send()
            .await
            .map_err(|e| unavailable("Yahoo session", e))?;

        self.rate_limiter.until_ready().await;
        let crumb = self
            .client
            .get(&self.endpoints.crumb)
            .send()
            .await
            .map_err(|e| unavailable("Yahoo crumb", e))?
            .text()
            .await
            .map_err(|e| unavailable("Yahoo crumb", e))?;

        let crumb = crumb.trim().to_string();
        if crumb.is_empty() || crumb.contains("Unauthorized") || crumb.contains("Too Many") {
            return Err(RaterError::UpstreamUnavailable(format!(
                "Yahoo crumb rejected: {crumb}"
            )));
        }
        info!("Yahoo session established");
        Ok(crumb)
    }

    async fn request(&self, ticker: &str, crumb: &str) -> Result<Reply> {
        self.rate_limiter.until_ready().await;
        debug!(ticker, "Fetching quoteSummary");

        let url = format!("{}/{ticker}", self.endpoints.quote_summary);
        let response = self
            .client
            .get(&url)
            .query(&[("modules", MODULES), ("crumb", crumb)])
            .send()
            .await
            .map_err(|e| unavailable(ticker, e))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Ok(Reply::SessionRejected(status));
            }
            StatusCode::NOT_FOUND => return Err(RaterError::TickerNotFound(ticker.to_string())),
            _ if !status.is_success() => {
                return Err(RaterError::UpstreamUnavailable(format!(
                    "quoteSummary returned {status} for {ticker}"
                )));
            }
            _ => {}
        }

        let body = response.text().await.map_err(|e| unavailable(ticker, e))?;
        Ok(Reply::Body(body))
    }
}

#[async_trait]
impl MetricSource for YahooMetricSource {
    async fn fetch(&self, ticker: &str) -> Result<CompanySnapshot> {
        let crumb = self.crumb().await?;
        match self.request(ticker, &crumb).await? {
            Reply::Body(body) => return parse_quote_summary(ticker, &body),
            Reply::SessionRejected(status) => {
                warn!(ticker, %status, "Yahoo rejected the session, renewing");
                self.invalidate(&crumb).await;
            }
        }

        let crumb = self.crumb().await?;
        match self.request(ticker, &crumb).await? {
            Reply::Body(body) => parse_quote_summary(ticker, &body),
            Reply::SessionRejected(status) => Err(RaterError::UpstreamUnavailable(format!(
                "quoteSummary returned {status} for {ticker} after renewing the session"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const APPLE: &str = r#"{
        "quoteSummary": {
            "result": [{
                "price": {
                    "regularMarketPrice": {"raw": 189.84, "fmt": "189.84"},
                    "shortName": "Apple Inc.",
                    "longName": "Apple Inc."
                },
                "summaryDetail": {
                    "trailingPE": {"raw": 29.5, "fmt": "29.50"},
                    "forwardPE": {"raw": 27.1, "fmt": "27.10"},
                    "dividendYield": {"raw": 0.0052, "fmt": "0.52%"}
                },
                "defaultKeyStatistics": {
                    "forwardPE": {"raw": 26.0, "fmt": "26.00"},
                    "priceToBook": {"raw": 47.2, "fmt": "47.20"},
                    "enterpriseToEbitda": {"raw": 22.4, "fmt": "22.40"}
                },
                "financialData": {
                    "debtToEquity": {"raw": 145.0, "fmt": "145.00"},
                    "returnOnEquity": {"raw": 1.47, "fmt": "147.00%"},
                    "profitMargins": {"raw": 0.253, "fmt": "25.30%"},
                    "revenueGrowth": {"raw": 0.061, "fmt": "6.10%"},
                    "currentRatio": {"raw": 0.99, "fmt": "0.99"}
                },
                "assetProfile": {
                    "sector": "Technology",
                    "industry": "Consumer Electronics"
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_full_response() {
        let snapshot = parse_quote_summary("AAPL", APPLE).unwrap();

        assert_eq!(snapshot.ticker, "AAPL");
        assert_eq!(snapshot.company_name, "Apple Inc.");
        assert_eq!(snapshot.classified_sector(), Some("Technology"));
        assert_eq!(snapshot.industry.as_deref(), Some("Consumer Electronics"));
        assert_eq!(snapshot.kpis.len(), 10);
        assert_eq!(snapshot.kpis.get(Kpi::TrailingPe), Some(29.5));
        assert_eq!(snapshot.kpis.get(Kpi::ForwardPe), Some(27.1));
        assert_eq!(snapshot.kpis.get(Kpi::DebtToEquity), Some(145.0));
        assert_eq!(snapshot.kpis.get(Kpi::DividendYield), Some(0.0052));
    }

    #[test]
    fn test_not_found_error_code() {
        let body = r#"{"quoteSummary": {"result": null, "error": {"code": "Not Found", "description": "Quote not found for symbol: ZZZZ"}}}"#;
        let err = parse_quote_summary("ZZZZ", body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_other_error_code_is_upstream() {
        let body = r#"{"quoteSummary": {"result": null, "error": {"code": "Internal Server Error", "description": "boom"}}}"#;
        let err = parse_quote_summary("AAPL", body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn test_missing_market_price_is_not_found() {
        let body = r#"{"quoteSummary": {"result": [{"price": {"shortName": "Ghost"}, "summaryDetail": {"trailingPE": {"raw": 10.0}}}], "error": null}}"#;
        let err = parse_quote_summary("GHST", body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let body = r#"{"quoteSummary": {"result": [], "error": null}}"#;
        assert_eq!(parse_quote_summary("GHST", body).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_garbage_is_upstream_unavailable() {
        let err = parse_quote_summary("AAPL", "<html>rate limited</html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);

        let err = parse_quote_summary("AAPL", "{}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn test_name_fallback_and_sparse_modules() {
        let body = r#"{"quoteSummary": {"result": [{
            "price": {"regularMarketPrice": {"raw": 12.0}, "shortName": "  ", "longName": "Tiny Holdings plc"},
            "summaryDetail": {"forwardPE": {}, "dividendYield": {}},
            "defaultKeyStatistics": {"forwardPE": {"raw": 8.5}},
            "assetProfile": {"sector": "", "industry": ""}
        }], "error": null}}"#;

        let snapshot = parse_quote_summary("TINY.L", body).unwrap();
        assert_eq!(snapshot.company_name, "Tiny Holdings plc");
        assert_eq!(snapshot.kpis.get(Kpi::ForwardPe), Some(8.5));
        assert_eq!(snapshot.kpis.get(Kpi::DividendYield), None);
        assert_eq!(snapshot.kpis.len(), 1);
        assert_eq!(snapshot.classified_sector(), None);
        assert_eq!(snapshot.industry, None);
    }

    #[test]
    fn test_unnamed_company() {
        let body = r#"{"quoteSummary": {"result": [{"price": {"regularMarketPrice": {"raw": 1.0}}}], "error": null}}"#;
        let snapshot = parse_quote_summary("X", body).unwrap();
        assert_eq!(snapshot.company_name, "Unknown");
        assert!(snapshot.kpis.is_empty());
        assert_eq!(snapshot.sector, None);
    }

    async fn local_yahoo(server: &MockServer) -> YahooMetricSource {
        Mock::given(method("GET"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;

        let endpoints = Endpoints {
            session: format!("{}/session", server.uri()),
            crumb: format!("{}/getcrumb", server.uri()),
            quote_summary: format!("{}/quoteSummary", server.uri()),
        };
        YahooMetricSource::with_endpoints(&RaterConfig::default(), endpoints).unwrap()
    }

    async fn mount_crumb(server: &MockServer, crumb: &str) {
        Mock::given(method("GET"))
            .and(path("/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string(crumb))
            .up_to_n_times(1)
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_rejected_crumb_is_renewed_and_retried() {
        let server = MockServer::start().await;
        let source = local_yahoo(&server).await;
        mount_crumb(&server, "crumb-1").await;
        mount_crumb(&server, "crumb-2").await;

        Mock::given(method("GET"))
            .and(path("/quoteSummary/AAPL"))
            .and(query_param("crumb", "crumb-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/quoteSummary/AAPL"))
            .and(query_param("crumb", "crumb-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(APPLE))
            .expect(2)
            .mount(&server)
            .await;

        let snapshot = source.fetch("AAPL").await.unwrap();
        assert_eq!(snapshot.company_name, "Apple Inc.");

        // the renewed crumb is kept for later requests
        let again = source.fetch("AAPL").await.unwrap();
        assert_eq!(again.ticker, "AAPL");
    }

    #[tokio::test]
    async fn test_second_rejection_is_upstream_unavailable() {
        let server = MockServer::start().await;
        let source = local_yahoo(&server).await;
        mount_crumb(&server, "crumb-1").await;
        mount_crumb(&server, "crumb-2").await;

        Mock::given(method("GET"))
            .and(path("/quoteSummary/AAPL"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let err = source.fetch("AAPL").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn test_unknown_ticker_keeps_session() {
        let server = MockServer::start().await;
        let source = local_yahoo(&server).await;
        mount_crumb(&server, "crumb-1").await;

        Mock::given(method("GET"))
            .and(path("/quoteSummary/ZZZZ"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = source.fetch("ZZZZ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(source.crumb.read().await.as_deref(), Some("crumb-1"));
    }

    #[tokio::test]
    #[ignore = "requires network access to Yahoo Finance"]
    async fn test_fetch_live_quote() {
        let source = YahooMetricSource::new(&RaterConfig::default()).unwrap();
        let snapshot = source.fetch("AAPL").await.unwrap();
        assert_eq!(snapshot.ticker, "AAPL");
        assert!(snapshot.classified_sector().is_some());
        assert!(!snapshot.kpis.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires network access to Yahoo Finance"]
    async fn test_fetch_live_unknown_ticker() {
        let source = YahooMetricSource::new(&RaterConfig::default()).unwrap();
        let err = source.fetch("ZZZZZZZZ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
