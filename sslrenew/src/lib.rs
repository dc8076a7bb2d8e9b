//! A renewal client for SSL certificates sold through the Namecheap API.
//!
//! The Namecheap SSL API is a set of XML-over-HTTP commands. This crate drives the
//! four commands needed to roll a certificate over:
//!
//! - `namecheap.ssl.create` to obtain a certificate ID (optional when the ID is known)
//! - `namecheap.ssl.getinfo` to check how long until the certificate expires
//! - `namecheap.ssl.renew` once the certificate is inside the renewal window
//! - `namecheap.ssl.activate` with a freshly generated CSR
//!
//! # Usage
//!
//! ```rust,no_run
//! use sslrenew::{ApiClient, ApiConfig, CsrSubject, HttpTransport, Renewer, RenewerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = ApiConfig::builder()
//!         .api_user("user")
//!         .api_key("key")
//!         .username("user")
//!         .client_ip("203.0.113.7")
//!         .ssl_type("PositiveSSL")
//!         .build();
//!     let subject = CsrSubject::builder()
//!         .common_name("www.example.com")
//!         .country("US".to_string())
//!         .build();
//!     let config = RenewerConfig::builder()
//!         .subject(subject)
//!         .certificate_id("12345".to_string())
//!         .build();
//!     let client = ApiClient::new(api, HttpTransport::new(None)?);
//!     let outcome = Renewer::new(client, config).run().await;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```
pub use api_client::{ApiClient, ApiConfig, Command, HttpTransport, Transport, SANDBOX_API_URL};
pub use reqwest::Url;
pub use bot::{Eligibility, Renewer, RenewerConfig, RunOutcome, Stage, StepError};
pub use csr::{generate_csr, CsrSubject, GeneratedCsr};
pub use expiry::{days_until, is_eligible, parse_expiration, DEFAULT_RENEW_WINDOW_DAYS};
pub use response::{parse_response, ApiResponse, CertificateId, Status};
pub use workdir::OutputDir;

mod api_client;
mod bot;
mod csr;
mod expiry;
pub mod response;
mod workdir;
