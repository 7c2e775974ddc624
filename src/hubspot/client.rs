//! HubSpot v3 CRM client.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use url::Url;

use super::mapper::{
    build_company_properties, build_deal_properties, evaluate_required_fields,
    resolve_company_target, CompanyTarget, Properties,
};
use super::{
    send_with_retry, HubSpotCompanyData, HubSpotError, HubSpotObject, HubSpotSearchResponse,
    HubSpotSyncResult, RetryPolicy, COMPANY_PROPERTIES,
};
use crate::config::HubSpotConfig;
use crate::error::DiligenceError;
use crate::provider::HubSpotSync;
use crate::text::normalize::normalize_domain;
use crate::types::DiligenceRecord;

const SEARCH_LIMIT: usize = 10;

pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    config: HubSpotConfig,
    retry: RetryPolicy,
}

impl HubSpotClient {
    /// Build a client, reading the access token from the configured
    /// environment variable.
    pub fn from_config(config: &HubSpotConfig) -> Result<Self, HubSpotError> {
        let token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| HubSpotError::MissingToken(config.access_token_env.clone()))?;
        Self::new(config, token)
    }

    pub fn new(config: &HubSpotConfig, token: impl Into<String>) -> Result<Self, HubSpotError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| HubSpotError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
            retry: config.retry.clone(),
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, HubSpotError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HubSpotError::InvalidUrl(e.to_string()))
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, HubSpotError> {
        let mut request = self
            .http
            .request(method, self.endpoint(path)?)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = send_with_retry(request, &self.retry).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HubSpotError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn search_companies(
        &self,
        property: &str,
        value: &str,
    ) -> Result<Vec<HubSpotCompanyData>, HubSpotError> {
        let body = json!({
            "filterGroups": [{
                "filters": [{"propertyName": property, "operator": "EQ", "value": value}]
            }],
            "properties": COMPANY_PROPERTIES,
            "limit": SEARCH_LIMIT,
        });
        let value = self
            .send_json(reqwest::Method::POST, "crm/v3/objects/companies/search", Some(&body))
            .await?;
        let response: HubSpotSearchResponse = serde_json::from_value(value)?;
        Ok(response.results.iter().map(HubSpotCompanyData::from).collect())
    }

    async fn find_candidates(
        &self,
        record: &DiligenceRecord,
    ) -> Result<Vec<HubSpotCompanyData>, HubSpotError> {
        let mut candidates = Vec::new();
        if let Some(domain) = record.company_url.as_deref().and_then(normalize_domain) {
            candidates.extend(self.search_companies("domain", &domain).await?);
        }
        if candidates.is_empty() && !record.company_name.trim().is_empty() {
            candidates.extend(
                self.search_companies("name", record.company_name.trim())
                    .await?,
            );
        }
        Ok(candidates)
    }

    async fn upsert_object(
        &self,
        object_type: &str,
        existing_id: Option<&str>,
        properties: &Properties,
    ) -> Result<String, HubSpotError> {
        let body = json!({ "properties": properties });
        let value = match existing_id {
            Some(id) => {
                self.send_json(
                    reqwest::Method::PATCH,
                    &format!("crm/v3/objects/{}/{}", object_type, id),
                    Some(&body),
                )
                .await?
            }
            None => {
                self.send_json(
                    reqwest::Method::POST,
                    &format!("crm/v3/objects/{}", object_type),
                    Some(&body),
                )
                .await?
            }
        };
        let object: HubSpotObject = serde_json::from_value(value)?;
        Ok(object.id)
    }

    async fn associate_deal_with_company(
        &self,
        deal_id: &str,
        company_id: &str,
    ) -> Result<(), HubSpotError> {
        self.send_json(
            reqwest::Method::PUT,
            &format!(
                "crm/v4/objects/deals/{}/associations/default/companies/{}",
                deal_id, company_id
            ),
            None,
        )
        .await?;
        Ok(())
    }

    /// Push company and deal properties for a record.
    pub async fn push_record(&self, record: &DiligenceRecord) -> Result<HubSpotSyncResult, HubSpotError> {
        let company_props = build_company_properties(record);
        let deal_props = build_deal_properties(record, &self.config);
        if !company_props.contains_key("name") {
            return Err(HubSpotError::MissingField("Company name".to_string()));
        }
        let missing = evaluate_required_fields(&company_props, &deal_props);
        if !missing.is_empty() {
            log::warn!(
                "hubspot: record {} missing fields: {}",
                record.id,
                missing.join(", ")
            );
        }

        let target = match record.hubspot_company_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(_) => resolve_company_target(record, &[]),
            None => resolve_company_target(record, &self.find_candidates(record).await?),
        };
        let company_id = self
            .upsert_object("companies", target.existing_id(), &company_props)
            .await?;

        let existing_deal = record
            .hubspot_deal_id
            .as_deref()
            .filter(|id| !id.trim().is_empty());
        let deal_id = self
            .upsert_object("deals", existing_deal, &deal_props)
            .await?;
        if existing_deal.is_none() || matches!(target, CompanyTarget::CreateNew) {
            self.associate_deal_with_company(&deal_id, &company_id).await?;
        }

        log::info!(
            "hubspot: synced record {} (company {} via {}, deal {})",
            record.id,
            company_id,
            target.label(),
            deal_id
        );

        Ok(HubSpotSyncResult {
            deal_id,
            company_id,
            hubspot_data: json!({
                "companyTarget": target.label(),
                "companyProperties": company_props,
                "dealProperties": deal_props,
                "missingFields": missing,
                "syncedAt": Utc::now().to_rfc3339(),
            }),
        })
    }
}

#[async_trait]
impl HubSpotSync for HubSpotClient {
    async fn fetch_company(
        &self,
        company_id: &str,
    ) -> Result<Option<HubSpotCompanyData>, DiligenceError> {
        let path = format!(
            "crm/v3/objects/companies/{}?properties={}",
            company_id,
            COMPANY_PROPERTIES.join(",")
        );
        match self.send_json(reqwest::Method::GET, &path, None).await {
            Ok(value) => {
                let object: HubSpotObject = serde_json::from_value(value).map_err(HubSpotError::from)?;
                Ok(Some(HubSpotCompanyData::from(&object)))
            }
            Err(HubSpotError::ApiError { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn sync_record(&self, record: &DiligenceRecord) -> Result<HubSpotSyncResult, DiligenceError> {
        Ok(self.push_record(record).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = HubSpotConfig {
            base_url: "https://api.hubapi.com".to_string(),
            ..HubSpotConfig::default()
        };
        let client = HubSpotClient::new(&config, "token").expect("client");
        assert_eq!(
            client.endpoint("/crm/v3/objects/companies/search").expect("url").as_str(),
            "https://api.hubapi.com/crm/v3/objects/companies/search"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = HubSpotConfig {
            base_url: "http://localhost:8080/hubspot".to_string(),
            ..HubSpotConfig::default()
        };
        let client = HubSpotClient::new(&config, "token").expect("client");
        assert_eq!(
            client.endpoint("crm/v3/objects/deals").expect("url").as_str(),
            "http://localhost:8080/hubspot/crm/v3/objects/deals"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = HubSpotConfig {
            base_url: "not a url".to_string(),
            ..HubSpotConfig::default()
        };
        assert!(matches!(
            HubSpotClient::new(&config, "token"),
            Err(HubSpotError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_missing_token_env() {
        let config = HubSpotConfig {
            access_token_env: "DEALSCORE_TEST_UNSET_HUBSPOT_TOKEN".to_string(),
            ..HubSpotConfig::default()
        };
        assert!(matches!(
            HubSpotClient::from_config(&config),
            Err(HubSpotError::MissingToken(_))
        ));
    }

    #[tokio::test]
    async fn test_push_requires_company_name() {
        let client = HubSpotClient::new(&HubSpotConfig::default(), "token").expect("client");
        let record = DiligenceRecord {
            id: "r1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            client.push_record(&record).await,
            Err(HubSpotError::MissingField(_))
        ));
    }
}
