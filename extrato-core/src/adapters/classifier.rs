//! Classification adapters
//!
//! - [`HttpClassifier`]: remote classification service over JSON/HTTPS
//! - [`StaticClassifier`]: keyword rules evaluated locally

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::domain::classification::{taxonomy, FALLBACK_ICON};
use crate::domain::result::{Error, Result};
use crate::domain::{BudgetRule, Classification};
use crate::ports::Classifier;

/// Default request timeout when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Process-wide HTTP client, built on first use
fn shared_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        Client::builder()
            .user_agent(concat!("extrato/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default()
    })
}

#[derive(Debug, Serialize)]
struct TaxonomyEntry {
    rule: BudgetRule,
    label: &'static str,
    categories: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    descriptions: &'a [String],
    taxonomy: Vec<TaxonomyEntry>,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    classifications: Vec<RemoteClassification>,
}

/// Rule is read as a plain integer so one bad entry does not sink the response
#[derive(Debug, Deserialize)]
struct RemoteClassification {
    description: String,
    category: String,
    rule: i64,
    #[serde(default)]
    icon: Option<String>,
}

/// Client for a remote classification service
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpClassifier {
    /// Validate the endpoint. HTTPS is required except for loopback hosts.
    pub fn new(endpoint: &str, api_key: Option<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let parsed = Url::parse(endpoint).context("Invalid classifier URL")?;

        match parsed.scheme() {
            "https" => {}
            "http" if is_loopback(&parsed) => {}
            "http" => anyhow::bail!("Classifier URL must use HTTPS unless it points to localhost"),
            other => anyhow::bail!("Unsupported classifier URL scheme: {}", other),
        }

        Ok(Self {
            endpoint: parsed,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::classification(format!(
                "Classifier timed out after {} seconds",
                self.timeout.as_secs()
            ))
        } else if error.is_connect() {
            Error::classification(format!(
                "Unable to connect to classifier at {}",
                self.endpoint
            ))
        } else {
            Error::classification(format!("Classifier request failed: {}", error))
        }
    }

    fn check_status(status: StatusCode) -> Result<()> {
        match status.as_u16() {
            200..=299 => Ok(()),
            401 | 403 => Err(Error::classification(
                "Classifier rejected the API key (set classifier.apiKey or EXTRATO_CLASSIFIER_KEY)",
            )),
            429 => Err(Error::classification("Classifier rate limit exceeded")),
            code => Err(Error::classification(format!("Classifier error: HTTP {}", code))),
        }
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(&self, descriptions: &[String]) -> Result<HashMap<String, Classification>> {
        if descriptions.is_empty() {
            return Ok(HashMap::new());
        }

        let body = ClassifyRequest {
            descriptions,
            taxonomy: taxonomy()
                .into_iter()
                .map(|(rule, categories)| TaxonomyEntry {
                    rule,
                    label: rule.label(),
                    categories,
                })
                .collect(),
        };

        let mut request = shared_client()
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_request_error(e))?;
        Self::check_status(response.status())?;

        let data: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| Error::classification(format!("Invalid classifier response: {}", e)))?;

        let mut out = HashMap::with_capacity(data.classifications.len());
        for entry in data.classifications {
            let Ok(rule) = BudgetRule::try_from(entry.rule) else {
                tracing::debug!(rule = entry.rule, "ignoring classification with unknown rule");
                continue;
            };
            out.insert(
                entry.description,
                Classification {
                    category: entry.category,
                    rule,
                    icon: entry.icon.unwrap_or_default(),
                },
            );
        }
        Ok(out)
    }
}

/// How a keyword rule compares against a description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    StartsWith,
}

/// One local classification rule; the first matching rule wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRule {
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub category: String,
    pub rule: BudgetRule,
    #[serde(default)]
    pub icon: Option<String>,
}

impl KeywordRule {
    pub fn new(pattern: &str, category: &str, rule: BudgetRule, icon: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            match_type: MatchType::Contains,
            category: category.to_string(),
            rule,
            icon: Some(icon.to_string()),
        }
    }

    /// Case-insensitive match
    pub fn matches(&self, description: &str) -> bool {
        let desc = description.to_lowercase();
        let pattern = self.pattern.to_lowercase();
        match self.match_type {
            MatchType::Contains => desc.contains(&pattern),
            MatchType::StartsWith => desc.starts_with(&pattern),
        }
    }

    fn classification(&self) -> Classification {
        Classification {
            category: self.category.clone(),
            rule: self.rule,
            icon: self
                .icon
                .clone()
                .unwrap_or_else(|| FALLBACK_ICON.to_string()),
        }
    }
}

/// Local keyword classifier for offline use
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    rules: Vec<KeywordRule>,
}

impl StaticClassifier {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Common Brazilian merchants and transfer labels
    pub fn with_defaults() -> Self {
        use BudgetRule::*;
        Self::new(vec![
            KeywordRule::new("salario", "Salário", Income, "💰"),
            KeywordRule::new("salário", "Salário", Income, "💰"),
            KeywordRule::new("rendimento", "Rendimentos", Income, "📈"),
            KeywordRule::new("estorno", "Reembolso", Income, "↩️"),
            KeywordRule::new("aluguel", "Moradia", Necessities, "🏠"),
            KeywordRule::new("condominio", "Moradia", Necessities, "🏠"),
            KeywordRule::new("supermercado", "Mercado", Necessities, "🛒"),
            KeywordRule::new("mercado", "Mercado", Necessities, "🛒"),
            KeywordRule::new("padaria", "Alimentação", Necessities, "🥖"),
            KeywordRule::new("uber", "Transporte", Necessities, "🚗"),
            KeywordRule::new("99app", "Transporte", Necessities, "🚗"),
            KeywordRule::new("posto", "Transporte", Necessities, "⛽"),
            KeywordRule::new("farmacia", "Saúde", Necessities, "💊"),
            KeywordRule::new("drogaria", "Saúde", Necessities, "💊"),
            KeywordRule::new("energia", "Contas", Necessities, "💡"),
            KeywordRule::new("internet", "Contas", Necessities, "🌐"),
            KeywordRule::new("ifood", "Restaurantes", Wants, "🍔"),
            KeywordRule::new("restaurante", "Restaurantes", Wants, "🍽️"),
            KeywordRule::new("netflix", "Assinaturas", Wants, "📺"),
            KeywordRule::new("spotify", "Assinaturas", Wants, "🎵"),
            KeywordRule::new("tesouro", "Investimentos", Goals, "📊"),
            KeywordRule::new("aplicacao", "Investimentos", Goals, "📊"),
        ])
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    fn name(&self) -> &str {
        "static"
    }

    async fn classify(&self, descriptions: &[String]) -> Result<HashMap<String, Classification>> {
        Ok(descriptions
            .iter()
            .filter_map(|d| {
                self.rules
                    .iter()
                    .find(|r| r.matches(d))
                    .map(|r| (d.clone(), r.classification()))
            })
            .collect())
    }
}
