use httptest::{matchers::*, responders::*, Expectation, Server};

use super::*;
use crate::response::CreateResponse;

fn api_config(api_url: &str) -> ApiConfig {
    ApiConfig::builder()
        .api_url(api_url)
        .api_user("apiuser")
        .api_key("secret-key")
        .username("nc-user")
        .client_ip("203.0.113.7")
        .ssl_type("PositiveSSL")
        .build()
}

fn client() -> ApiClient<HttpTransport> {
    ApiClient::new(
        api_config(SANDBOX_API_URL),
        HttpTransport::new(None).unwrap(),
    )
}

fn pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[test]
fn create_url_carries_credentials_then_command() {
    let url = client().url(&Command::Create).unwrap();
    assert_eq!(url.host_str(), Some("api.sandbox.namecheap.com"));
    assert_eq!(url.path(), "/xml.response");
    let keys = pairs(&url)
        .into_iter()
        .map(|(k, _)| k)
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        ["ApiUser", "ApiKey", "UserName", "ClientIp", "Command", "Type", "Years"]
    );
    let query = pairs(&url);
    assert_eq!(get(&query, "ApiKey"), Some("secret-key"));
    assert_eq!(get(&query, "Command"), Some("namecheap.ssl.create"));
    assert_eq!(get(&query, "Type"), Some("PositiveSSL"));
    assert_eq!(get(&query, "Years"), Some("1"));
}

#[test]
fn getinfo_and_renew_urls_include_certificate_id() {
    let id = CertificateId::parse("12345").unwrap();
    let client = client();

    let url = client
        .url(&Command::GetInfo {
            certificate_id: &id,
        })
        .unwrap();
    let query = pairs(&url);
    assert_eq!(get(&query, "Command"), Some("namecheap.ssl.getinfo"));
    assert_eq!(get(&query, "CertificateID"), Some("12345"));
    assert_eq!(get(&query, "ReturnCertificate"), Some("true"));

    let url = client
        .url(&Command::Renew {
            certificate_id: &id,
        })
        .unwrap();
    let query = pairs(&url);
    assert_eq!(get(&query, "Command"), Some("namecheap.ssl.renew"));
    assert_eq!(get(&query, "CertificateID"), Some("12345"));
    assert_eq!(get(&query, "SSLType"), Some("PositiveSSL"));
}

#[test]
fn activate_url_encodes_csr() {
    let id = CertificateId::parse("12345").unwrap();
    let csr = "-----BEGIN CERTIFICATE REQUEST-----\nMIIB+/a=\n-----END CERTIFICATE REQUEST-----\n";
    let url = client()
        .url(&Command::Activate {
            certificate_id: &id,
            csr,
        })
        .unwrap();
    let raw_query = url.query().unwrap();
    assert!(!raw_query.contains('\n'));
    assert!(raw_query.contains("MIIB%2B%2Fa%3D"));
    let query = pairs(&url);
    assert_eq!(get(&query, "CSR"), Some(csr));
    assert_eq!(get(&query, "Type"), Some("PositiveSSL"));
}

#[test]
fn invalid_api_url_is_an_error() {
    let client = ApiClient::new(api_config("not a url"), HttpTransport::new(None).unwrap());
    assert!(client.url(&Command::Create).is_err());
}

#[test]
fn debug_redacts_api_key() {
    let debug = format!("{:?}", api_config(SANDBOX_API_URL));
    assert!(!debug.contains("secret-key"));
    assert!(debug.contains("apiuser"));
}

#[tokio::test]
async fn http_transport_returns_body() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/xml.response"),
            request::query(url_decoded(contains(("Command", "namecheap.ssl.create")))),
        ])
        .respond_with(status_code(200).body(
            r#"<ApiResponse Status="OK"><CommandResponse><SSLCreateResult><SSLCertificate CertificateID="777"/></SSLCreateResult></CommandResponse></ApiResponse>"#,
        )),
    );
    let client = ApiClient::new(
        api_config(&server.url_str("/xml.response")),
        HttpTransport::new(Some(Duration::from_secs(10))).unwrap(),
    );
    let response: ApiResponse<CreateResponse> = client.call(&Command::Create).await.unwrap();
    assert!(response.is_ok());
    let id = response.command_response.unwrap().certificate_id().unwrap();
    assert_eq!(id.as_str(), "777");
}

#[tokio::test]
async fn http_transport_rejects_error_status() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/xml.response"))
            .respond_with(status_code(500).body("upstream exploded")),
    );
    let transport = HttpTransport::new(None).unwrap();
    let url = Url::parse(&server.url_str("/xml.response")).unwrap();
    let err = transport.get(&url).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/xml.response"))
            .respond_with(status_code(200).body("<html>gateway timeout")),
    );
    let client = ApiClient::new(
        api_config(&server.url_str("/xml.response")),
        HttpTransport::new(None).unwrap(),
    );
    let err = client
        .call::<CreateResponse>(&Command::Create)
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::Decode(_)));
}
