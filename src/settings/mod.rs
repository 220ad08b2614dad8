//! Application settings

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use servicefix_http::ApiError;

use crate::client::ApiClient;
use crate::fetch::ApiRequest;

/// Client for the `/settings/{section}` endpoints
#[derive(Clone)]
pub struct SettingsService {
    client: ApiClient,
}

impl SettingsService {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn section_path(section: &str) -> String {
        let section = section.trim_matches('/');
        let encoded: Vec<_> = section
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("/settings/{}", encoded.join("/"))
    }

    /// Fetch a settings section as raw JSON
    pub async fn get(&self, section: &str) -> Result<Value, ApiError> {
        self.client.get(&Self::section_path(section)).await
    }

    /// Fetch a settings section into a typed structure
    pub async fn get_as<T: DeserializeOwned>(&self, section: &str) -> Result<T, ApiError> {
        self.client
            .execute_as(ApiRequest::get(&Self::section_path(section)))
            .await
    }

    /// Replace a settings section, returning the stored settings
    pub async fn update<B: Serialize>(&self, section: &str, settings: &B) -> Result<Value, ApiError> {
        self.client.put(&Self::section_path(section), settings).await
    }
}
