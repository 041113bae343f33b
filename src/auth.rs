use std::collections::HashMap;

use crate::error::AuthError;

pub const METRIC_SERVICE: &str = "gnocchi";

/// Source of the credentials and service catalog the sender talks with.
pub trait AuthProvider: core::fmt::Debug + Send + Sync {
    fn token(&self) -> Result<String, AuthError>;
    fn service_endpoint(&self, service: &str, region: Option<&str>) -> Result<String, AuthError>;
}

/// Token and endpoints given up front, typically from the config file.
///
/// The same token is handed out on every call, so once the store rejects it
/// every request fails until the token is replaced.
#[derive(Debug, Clone)]
pub struct StaticAuth {
    token: String,
    endpoints: HashMap<String, String>,
}
impl StaticAuth {
    pub fn new(token: impl Into<String>, endpoints: HashMap<String, String>) -> Self {
        Self {
            token: token.into(),
            endpoints,
        }
    }
}
impl AuthProvider for StaticAuth {
    fn token(&self) -> Result<String, AuthError> {
        Ok(self.token.clone())
    }

    fn service_endpoint(&self, service: &str, _region: Option<&str>) -> Result<String, AuthError> {
        self.endpoints
            .get(service)
            .map(|url| url.trim_end_matches('/').to_owned())
            .ok_or_else(|| AuthError::UnknownService {
                service: service.to_owned(),
            })
    }
}

/// What an authenticated sender needs for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub endpoint: String,
}
impl Session {
    pub fn measures_url(&self, metric_id: &str) -> String {
        format!("{}/v1/metric/{}/measures", self.endpoint, metric_id)
    }
}
