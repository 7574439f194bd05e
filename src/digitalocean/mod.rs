//! DigitalOcean implementation of [`CloudGateway`].
//!
//! Requests go straight to the v2 REST API with a bearer token. Droplets are
//! selected by exact name, so every member of a fleet shares one name and the
//! provider assigns the distinguishing numeric id.

mod error;
mod types;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::DEFAULT_API_BASE;
use crate::gateway::{
    CloudGateway, GatewayFuture, Instance, InstanceHandle, InstanceId, InstanceSpec,
};
use types::{ApiErrorBody, CreateDropletRequest, DropletEnvelope, DropletPage};

pub use error::DigitalOceanError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: &str = "200";

/// Gateway that manages droplets through the DigitalOcean API.
#[derive(Clone, Debug)]
pub struct DigitalOceanGateway {
    client: Client,
    api_key: String,
    api_base: String,
}

impl DigitalOceanGateway {
    /// Creates a gateway against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`DigitalOceanError::Config`] when the token is blank and
    /// [`DigitalOceanError::Http`] when the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, DigitalOceanError> {
        Self::with_api_base(api_key, DEFAULT_API_BASE)
    }

    /// Creates a gateway against an alternate API root.
    ///
    /// # Errors
    ///
    /// Returns [`DigitalOceanError::Config`] when the token or base URL is
    /// blank and [`DigitalOceanError::Http`] when the client cannot be built.
    pub fn with_api_base(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, DigitalOceanError> {
        let key = api_key.into().trim().to_owned();
        if key.is_empty() {
            return Err(DigitalOceanError::Config(String::from(
                "DigitalOcean API key must not be empty",
            )));
        }
        let base = api_base.into().trim().trim_end_matches('/').to_owned();
        if base.is_empty() {
            return Err(DigitalOceanError::Config(String::from(
                "DigitalOcean API base must not be empty",
            )));
        }
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: key,
            api_base: base,
        })
    }

    fn droplets_url(&self) -> String {
        format!("{}/droplets", self.api_base)
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Vec<u8>), DigitalOceanError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }

    async fn fetch_page(&self, request: RequestBuilder) -> Result<DropletPage, DigitalOceanError> {
        let (status, body) = self.send(request).await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        decode(&body)
    }

    async fn create_droplet(&self, spec: &InstanceSpec) -> Result<InstanceHandle, DigitalOceanError> {
        spec.validate()?;
        let payload = CreateDropletRequest::from(spec);
        let (status, body) = self
            .send(self.client.post(self.droplets_url()).json(&payload))
            .await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }
        let envelope: DropletEnvelope = decode(&body)?;
        debug!(id = envelope.droplet.id, name = %envelope.droplet.name, "droplet requested");
        Ok(InstanceHandle {
            id: InstanceId::new(envelope.droplet.id.to_string()),
            name: envelope.droplet.name,
        })
    }

    async fn delete_droplet(&self, id: &InstanceId) -> Result<(), DigitalOceanError> {
        let url = format!("{}/{}", self.droplets_url(), id.as_str());
        let (status, body) = self.send(self.client.delete(url)).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(api_error(status, &body))
    }

    async fn list_droplets(&self, name: &str) -> Result<Vec<Instance>, DigitalOceanError> {
        let first = self.client.get(self.droplets_url()).query(&[
            ("name", name),
            ("page", "1"),
            ("per_page", PAGE_SIZE),
        ]);
        let mut page = self.fetch_page(first).await?;
        let mut instances = Vec::new();
        loop {
            let next = page.next_page().map(str::to_owned);
            instances.extend(page.droplets.drain(..).map(Instance::from));
            let Some(url) = next else {
                break;
            };
            page = self.fetch_page(self.client.get(url)).await?;
        }
        Ok(instances)
    }
}

impl CloudGateway for DigitalOceanGateway {
    type Error = DigitalOceanError;

    fn create<'a>(
        &'a self,
        spec: &'a InstanceSpec,
    ) -> GatewayFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(self.create_droplet(spec))
    }

    fn delete<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(self.delete_droplet(id))
    }

    fn list<'a>(&'a self, name_filter: &'a str) -> GatewayFuture<'a, Vec<Instance>, Self::Error> {
        Box::pin(self.list_droplets(name_filter))
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, DigitalOceanError> {
    serde_json::from_slice(body).map_err(|err| DigitalOceanError::Decode(err.to_string()))
}

fn api_error(status: StatusCode, body: &[u8]) -> DigitalOceanError {
    let parsed = serde_json::from_slice::<ApiErrorBody>(body).ok();
    let id = parsed
        .as_ref()
        .and_then(|error| error.id.clone())
        .unwrap_or_else(|| String::from("unknown"));
    let message = parsed
        .and_then(|error| error.message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_owned());
    DigitalOceanError::Api {
        status: status.as_u16(),
        id,
        message,
    }
}

#[cfg(test)]
mod tests;
