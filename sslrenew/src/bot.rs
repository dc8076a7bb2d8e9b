use std::{fmt, path::PathBuf};

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::{
    api_client::{ApiClient, Command, Transport},
    csr::{generate_csr, CsrSubject, GeneratedCsr, DEFAULT_KEY_BITS},
    expiry::{days_until, is_eligible, parse_expiration, DEFAULT_RENEW_WINDOW_DAYS},
    response::{
        ActivateResponse, ApiResponse, CertificateId, CreateResponse, Errors, GetInfoResponse,
        RenewResponse, Status,
    },
    workdir::OutputDir,
};

#[allow(clippy::duplicated_attributes)]
#[derive(Clone, Debug, bon::Builder)]
#[builder(on(String, into))]
#[builder(on(PathBuf, into))]
pub struct RenewerConfig {
    subject: CsrSubject,
    /// Renew this certificate instead of creating a new one.
    certificate_id: Option<String>,
    #[builder(default = DEFAULT_RENEW_WINDOW_DAYS)]
    renew_window_days: i64,
    #[builder(default = DEFAULT_KEY_BITS)]
    key_bits: usize,
    /// Renew even when the certificate is outside the renewal window.
    #[builder(default)]
    force: bool,
    output_dir: Option<PathBuf>,
}

/// Steps of the renewal flow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    Renew,
    GenerateCsr,
    Activate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Create => "create",
            Stage::Renew => "renew",
            Stage::GenerateCsr => "generate-csr",
            Stage::Activate => "activate",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] quick_xml::DeError),
    #[error("api returned status {status}: {errors}")]
    Api { status: Status, errors: Errors },
    #[error("response is missing {0}")]
    MissingField(&'static str),
    #[error("no usable certificate id")]
    NoCertificateId,
    #[error("activation reported IsSuccess=false")]
    NotActivated,
    #[error("invalid expiration date: {0:#}")]
    InvalidExpiration(anyhow::Error),
    #[error("failed to generate csr: {0:#}")]
    Csr(anyhow::Error),
    #[error("failed to store csr: {0:#}")]
    Output(anyhow::Error),
}

impl StepError {
    fn rejected<T>(response: ApiResponse<T>) -> Self {
        StepError::Api {
            status: response.status,
            errors: response.errors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    /// `None` when the expiration could not be determined.
    pub days_until_expiration: Option<i64>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Activated {
        certificate_id: CertificateId,
        csr: GeneratedCsr,
    },
    NotEligible {
        certificate_id: CertificateId,
        days_until_expiration: Option<i64>,
    },
    Halted {
        stage: Stage,
        error: StepError,
    },
}

impl RunOutcome {
    pub fn is_halted(&self) -> bool {
        matches!(self, RunOutcome::Halted { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Activated { certificate_id, .. } => {
                write!(f, "certificate {certificate_id} renewed and activated")
            }
            RunOutcome::NotEligible {
                certificate_id,
                days_until_expiration: Some(days),
            } => write!(
                f,
                "certificate {certificate_id} expires in {days} days, not eligible for renewal"
            ),
            RunOutcome::NotEligible {
                certificate_id,
                days_until_expiration: None,
            } => write!(
                f,
                "certificate {certificate_id} not renewed, expiration unknown"
            ),
            RunOutcome::Halted { stage, error } => {
                write!(f, "renewal halted at {stage}: {error}")
            }
        }
    }
}

/// Drives create, get-info, renew and activate for one certificate.
pub struct Renewer<T> {
    client: ApiClient<T>,
    config: RenewerConfig,
}

impl<T: Transport> Renewer<T> {
    pub fn new(client: ApiClient<T>, config: RenewerConfig) -> Self {
        Self { client, config }
    }

    /// Run the whole flow once. Each step only runs if the previous one succeeded.
    pub async fn run(&self) -> RunOutcome {
        let certificate_id = match self.resolve_certificate_id().await {
            Ok(id) => id,
            Err(error) => return halt(Stage::Create, error),
        };
        info!(%certificate_id, "checking renewal eligibility");

        let eligibility = self.check_eligibility(&certificate_id).await;
        if !eligibility.eligible {
            if !self.config.force {
                return RunOutcome::NotEligible {
                    certificate_id,
                    days_until_expiration: eligibility.days_until_expiration,
                };
            }
            warn!(%certificate_id, "certificate is not eligible, renewing anyway (forced)");
        }

        if let Err(error) = self.renew(&certificate_id).await {
            return halt(Stage::Renew, error);
        }
        let csr = match self.generate_csr(&certificate_id) {
            Ok(csr) => csr,
            Err(error) => return halt(Stage::GenerateCsr, error),
        };
        if let Err(error) = self.activate(&certificate_id, &csr.csr_pem).await {
            return halt(Stage::Activate, error);
        }
        RunOutcome::Activated {
            certificate_id,
            csr,
        }
    }

    async fn resolve_certificate_id(&self) -> Result<CertificateId, StepError> {
        match &self.config.certificate_id {
            Some(raw) => {
                debug!("using configured certificate id");
                CertificateId::parse(raw).ok_or(StepError::NoCertificateId)
            }
            None => self.create().await,
        }
    }

    /// Purchase a new certificate and return its ID.
    pub async fn create(&self) -> Result<CertificateId, StepError> {
        let response: ApiResponse<CreateResponse> = self.client.call(&Command::Create).await?;
        if !response.is_ok() {
            let errors = serde_json::to_string(&response.errors).unwrap_or_default();
            error!(%errors, "certificate creation failed");
            return Err(StepError::rejected(response));
        }
        info!(response = %response.to_json(), "certificate creation succeeded");
        response
            .command_response
            .as_ref()
            .and_then(CreateResponse::certificate_id)
            .ok_or(StepError::NoCertificateId)
    }

    /// Decide whether the certificate is inside the renewal window.
    ///
    /// Any failure counts as not eligible.
    pub async fn check_eligibility(&self, certificate_id: &CertificateId) -> Eligibility {
        let window = self.config.renew_window_days;
        match self.days_until_expiration(certificate_id).await {
            Ok(days) if is_eligible(days, window) => {
                info!(days, "certificate is eligible for renewal");
                Eligibility {
                    eligible: true,
                    days_until_expiration: Some(days),
                }
            }
            Ok(days) => {
                info!(
                    days,
                    "certificate not eligible for renewal, days until eligible: {}",
                    days - window
                );
                Eligibility {
                    eligible: false,
                    days_until_expiration: Some(days),
                }
            }
            Err(err) => {
                error!("failed to check certificate expiration: {err}");
                Eligibility {
                    eligible: false,
                    days_until_expiration: None,
                }
            }
        }
    }

    async fn days_until_expiration(&self, certificate_id: &CertificateId) -> Result<i64, StepError> {
        let response: ApiResponse<GetInfoResponse> =
            self.client.call(&Command::GetInfo { certificate_id }).await?;
        info!(response = %response.to_json(), "ssl info response");
        if !response.is_ok() {
            return Err(StepError::rejected(response));
        }
        let result = response
            .command_response
            .and_then(|r| r.result)
            .ok_or(StepError::MissingField("SSLGetInfoResult"))?;
        if let Some(status) = &result.status {
            debug!(status, "certificate status");
        }
        let text = result
            .expiration()
            .ok_or(StepError::MissingField("Expires"))?;
        let expires = parse_expiration(text).map_err(StepError::InvalidExpiration)?;
        Ok(days_until(expires, OffsetDateTime::now_utc()))
    }

    pub async fn renew(&self, certificate_id: &CertificateId) -> Result<(), StepError> {
        let response: ApiResponse<RenewResponse> =
            self.client.call(&Command::Renew { certificate_id }).await?;
        info!(response = %response.to_json(), "renewal response");
        if !response.is_ok() {
            return Err(StepError::rejected(response));
        }
        Ok(())
    }

    fn generate_csr(&self, certificate_id: &CertificateId) -> Result<GeneratedCsr, StepError> {
        let csr = generate_csr(&self.config.subject, self.config.key_bits).map_err(StepError::Csr)?;
        info!(csr = %csr.csr_pem, "generated csr");
        if let Some(dir) = &self.config.output_dir {
            let stored = OutputDir::new(dir)
                .store(certificate_id, &csr)
                .map_err(StepError::Output)?;
            info!("wrote csr and private key to {}", stored.display());
        }
        Ok(csr)
    }

    pub async fn activate(&self, certificate_id: &CertificateId, csr: &str) -> Result<(), StepError> {
        let response: ApiResponse<ActivateResponse> = self
            .client
            .call(&Command::Activate {
                certificate_id,
                csr,
            })
            .await?;
        info!(response = %response.to_json(), "activation response");
        if !response.is_ok() {
            return Err(StepError::rejected(response));
        }
        let is_success = response
            .command_response
            .and_then(|r| r.result)
            .and_then(|r| r.is_success);
        if is_success == Some(false) {
            return Err(StepError::NotActivated);
        }
        info!(%certificate_id, "ssl activation succeeded");
        Ok(())
    }
}

fn halt(stage: Stage, error: StepError) -> RunOutcome {
    error!(%stage, "renewal halted: {error}");
    RunOutcome::Halted { stage, error }
}
