//! Typed views over the Namecheap XML responses.
//!
//! Every command answers with the same `<ApiResponse Status="...">` envelope; the
//! command specific payload lives under `<CommandResponse>`. Field names on the
//! deserialize side follow the XML (`@` marks an attribute), while serialization
//! uses the Rust names so the decoded responses can be logged as JSON.
use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Decode an API response envelope with the command payload `T`.
pub fn parse_response<T: DeserializeOwned>(xml: &str) -> Result<ApiResponse<T>, quick_xml::DeError> {
    quick_xml::de::from_str(xml)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename(deserialize = "@Status"))]
    pub status: Status,
    #[serde(rename(deserialize = "Errors"), default)]
    pub errors: Errors,
    #[serde(rename(deserialize = "RequestedCommand"))]
    pub requested_command: Option<String>,
    #[serde(rename(deserialize = "CommandResponse"))]
    pub command_response: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Render the response as a JSON string for logging.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| format!("<unserializable: {err}>"))
    }
}

/// The `Status` attribute of the envelope. Only the exact string `OK` is success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Ok,
    Error(String),
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        if value == "OK" {
            Status::Ok
        } else {
            Status::Error(value)
        }
    }
}

impl From<Status> for String {
    fn from(value: Status) -> Self {
        match value {
            Status::Ok => "OK".into(),
            Status::Error(raw) => raw,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("OK"),
            Status::Error(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errors {
    #[serde(rename(deserialize = "Error"), default)]
    pub errors: Vec<ApiError>,
}

impl Errors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("no error details");
        }
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            match &error.number {
                Some(number) => write!(f, "[{number}] {}", error.message.trim())?,
                None => f.write_str(error.message.trim())?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename(deserialize = "@Number"))]
    pub number: Option<String>,
    #[serde(rename(deserialize = "$text"), default)]
    pub message: String,
}

/// A certificate handle assigned by the API.
///
/// Empty identifiers and identifiers that read as the number zero are never
/// valid, so they cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || matches!(raw.parse::<u64>(), Ok(0)) {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// namecheap.ssl.create

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    #[serde(rename(deserialize = "SSLCreateResult"))]
    pub result: Option<CreateResult>,
}

impl CreateResponse {
    pub fn certificate_id(&self) -> Option<CertificateId> {
        let raw = self
            .result
            .as_ref()?
            .certificate
            .as_ref()?
            .certificate_id
            .as_deref()?;
        CertificateId::parse(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResult {
    #[serde(rename(deserialize = "@IsSuccess"))]
    pub is_success: Option<bool>,
    #[serde(rename(deserialize = "@OrderId"))]
    pub order_id: Option<String>,
    #[serde(rename(deserialize = "@TransactionId"))]
    pub transaction_id: Option<String>,
    #[serde(rename(deserialize = "@ChargedAmount"))]
    pub charged_amount: Option<String>,
    #[serde(rename(deserialize = "SSLCertificate"))]
    pub certificate: Option<CreatedCertificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedCertificate {
    #[serde(rename(deserialize = "@CertificateID"))]
    pub certificate_id: Option<String>,
    #[serde(rename(deserialize = "@Created"))]
    pub created: Option<String>,
    #[serde(rename(deserialize = "@SSLType"))]
    pub ssl_type: Option<String>,
    #[serde(rename(deserialize = "@Years"))]
    pub years: Option<String>,
    #[serde(rename(deserialize = "@Status"))]
    pub status: Option<String>,
}

// namecheap.ssl.getinfo

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetInfoResponse {
    #[serde(rename(deserialize = "SSLGetInfoResult"))]
    pub result: Option<GetInfoResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetInfoResult {
    /// Certificate status as reported by the CA, e.g. `active`.
    #[serde(rename(deserialize = "@Status"))]
    pub status: Option<String>,
    #[serde(rename(deserialize = "@StatusDescription"))]
    pub status_description: Option<String>,
    #[serde(rename(deserialize = "@Type"))]
    pub ssl_type: Option<String>,
    #[serde(rename(deserialize = "@IssuedOn"))]
    pub issued_on: Option<String>,
    #[serde(rename(deserialize = "@Expires"))]
    pub expires: Option<String>,
    #[serde(rename(deserialize = "CertificateDetails"))]
    pub details: Option<CertificateDetails>,
}

impl GetInfoResult {
    /// The expiration date text. The `CertificateDetails/Expires` element takes
    /// precedence over the `Expires` attribute.
    pub fn expiration(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|details| details.expires.as_deref())
            .or(self.expires.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateDetails {
    #[serde(rename(deserialize = "CommonName"))]
    pub common_name: Option<String>,
    #[serde(rename(deserialize = "Expires"))]
    pub expires: Option<String>,
    #[serde(rename(deserialize = "ApproverEmail"))]
    pub approver_email: Option<String>,
}

// namecheap.ssl.renew

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewResponse {
    #[serde(rename(deserialize = "SSLRenewResult"))]
    pub result: Option<RenewResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewResult {
    #[serde(rename(deserialize = "@CertificateID"))]
    pub certificate_id: Option<String>,
    #[serde(rename(deserialize = "@Years"))]
    pub years: Option<String>,
    #[serde(rename(deserialize = "@SSLType"))]
    pub ssl_type: Option<String>,
    #[serde(rename(deserialize = "@OrderId"))]
    pub order_id: Option<String>,
    #[serde(rename(deserialize = "@TransactionId"))]
    pub transaction_id: Option<String>,
    #[serde(rename(deserialize = "@ChargedAmount"))]
    pub charged_amount: Option<String>,
}

// namecheap.ssl.activate

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    #[serde(rename(deserialize = "SSLActivateResult"))]
    pub result: Option<ActivateResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResult {
    #[serde(rename(deserialize = "@ID"))]
    pub id: Option<String>,
    #[serde(rename(deserialize = "@IsSuccess"))]
    pub is_success: Option<bool>,
}
