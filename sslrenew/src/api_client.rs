use std::{fmt, time::Duration};

use anyhow::{bail, Context, Result};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    bot::StepError,
    response::{parse_response, ApiResponse, CertificateId},
};

/// The Namecheap sandbox endpoint. Production is `https://api.namecheap.com/xml.response`.
pub const SANDBOX_API_URL: &str = "https://api.sandbox.namecheap.com/xml.response";

/// Credentials and defaults shared by every API command.
#[derive(Clone, bon::Builder)]
#[builder(on(String, into))]
pub struct ApiConfig {
    #[builder(default = SANDBOX_API_URL.to_string())]
    api_url: String,
    api_user: String,
    api_key: String,
    username: String,
    client_ip: String,
    ssl_type: String,
    #[builder(default = 1)]
    years: u32,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_url", &self.api_url)
            .field("api_user", &self.api_user)
            .field("api_key", &"<redacted>")
            .field("username", &self.username)
            .field("client_ip", &self.client_ip)
            .field("ssl_type", &self.ssl_type)
            .field("years", &self.years)
            .finish()
    }
}

/// The SSL commands used during renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Create,
    GetInfo {
        certificate_id: &'a CertificateId,
    },
    Renew {
        certificate_id: &'a CertificateId,
    },
    Activate {
        certificate_id: &'a CertificateId,
        csr: &'a str,
    },
}

impl Command<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create => "namecheap.ssl.create",
            Command::GetInfo { .. } => "namecheap.ssl.getinfo",
            Command::Renew { .. } => "namecheap.ssl.renew",
            Command::Activate { .. } => "namecheap.ssl.activate",
        }
    }
}

/// Fetches a URL and hands back the full response body.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &Url) -> Result<String>;
}

/// [`Transport`] over HTTPS.
///
/// Without a timeout a stalled connection blocks forever; requests are never retried.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build http client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<String> {
        // The query string carries the API key, keep it out of error messages.
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to send request")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to read response body")?;
        if !status.is_success() {
            bail!("unexpected http status {status}: {body}");
        }
        Ok(body)
    }
}

/// A Namecheap API client.
pub struct ApiClient<T> {
    config: ApiConfig,
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(config: ApiConfig, transport: T) -> Self {
        Self { config, transport }
    }

    /// Build the request URL for `command`.
    pub fn url(&self, command: &Command<'_>) -> Result<Url> {
        let config = &self.config;
        let mut url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid api url {:?}", config.api_url))?;
        let years = config.years.to_string();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("ApiUser", &config.api_user)
                .append_pair("ApiKey", &config.api_key)
                .append_pair("UserName", &config.username)
                .append_pair("ClientIp", &config.client_ip)
                .append_pair("Command", command.name());
            match command {
                Command::Create => {
                    query
                        .append_pair("Type", &config.ssl_type)
                        .append_pair("Years", &years);
                }
                Command::GetInfo { certificate_id } => {
                    query
                        .append_pair("CertificateID", certificate_id.as_str())
                        .append_pair("ReturnCertificate", "true")
                        .append_pair("ReturnType", "Individual");
                }
                Command::Renew { certificate_id } => {
                    query
                        .append_pair("CertificateID", certificate_id.as_str())
                        .append_pair("SSLType", &config.ssl_type)
                        .append_pair("Years", &years);
                }
                Command::Activate {
                    certificate_id,
                    csr,
                } => {
                    query
                        .append_pair("CertificateID", certificate_id.as_str())
                        .append_pair("CSR", csr)
                        .append_pair("Type", &config.ssl_type);
                }
            }
        }
        Ok(url)
    }

    /// Send `command` and decode the response envelope.
    ///
    /// A non-OK status is not an error here, callers decide what it means.
    pub async fn call<R: DeserializeOwned>(
        &self,
        command: &Command<'_>,
    ) -> Result<ApiResponse<R>, StepError> {
        let url = self.url(command).map_err(StepError::Transport)?;
        debug!(command = command.name(), "calling namecheap api");
        let body = self
            .transport
            .get(&url)
            .await
            .map_err(StepError::Transport)?;
        Ok(parse_response(&body)?)
    }
}

#[cfg(test)]
mod tests;
