use std::{net::IpAddr, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use documented::DocumentedFields;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use sslrenew::{ApiConfig, CsrSubject, RenewerConfig};
use toml_edit::{ser::to_document, Item};
use tracing::info;

pub const DEFAULT_CONFIG: &str = include_str!("../sslrenew.toml");
const CONFIG_NAME: &str = "sslrenew";
const ENV_PREFIX: &str = "SSLRENEW_";
/// Fields taken verbatim from the environment. Figment would read `00123` as
/// the number 123 and `true` as a bool.
const RAW_ENV_FIELDS: &[&str] = &["api_user", "api_key", "username", "certificate_id"];

#[derive(Debug, Clone, Deserialize, Serialize, DocumentedFields)]
pub struct Config {
    /// Namecheap API endpoint. Use https://api.namecheap.com/xml.response for production
    pub api_url: String,
    /// Namecheap API user
    #[serde(deserialize_with = "lenient_string")]
    pub api_user: String,
    /// Namecheap API key
    #[serde(deserialize_with = "lenient_string")]
    pub api_key: String,
    /// Namecheap account username
    #[serde(deserialize_with = "lenient_string")]
    pub username: String,
    /// Whitelisted IP address of the machine making the requests
    pub client_ip: String,
    /// SSL product type, e.g. PositiveSSL
    pub ssl_type: String,
    /// Number of years to purchase or renew for
    pub years: u32,
    /// HTTP request timeout in seconds, 0 waits forever
    pub request_timeout: u64,
    /// Certificate to renew. A new certificate is created when unset
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub certificate_id: Option<String>,
    /// Renew when the certificate expires within this many days
    pub renew_window_days: i64,
    /// RSA key size of the generated private key
    pub key_bits: usize,
    /// Directory to write generated CSRs and private keys to
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Subject of the certificate signing request
    pub subject: CsrSubject,
}

fn merge_file(figment: Figment, path: &str) -> Figment {
    if path.ends_with(".json") {
        return figment.merge(Json::file(path));
    }
    figment.merge(Toml::file(path))
}

fn search_load_config(search_paths: &[&str], leaf_config: Option<&str>) -> Figment {
    let mut figment = Figment::from(Toml::string(DEFAULT_CONFIG));
    for dir in search_paths {
        for ext in ["toml", "json"] {
            let filename = format!("{dir}/{CONFIG_NAME}.{ext}");
            if std::path::Path::new(&filename).exists() {
                info!("loading config file: {filename}");
                figment = merge_file(figment, &filename);
            }
        }
    }
    if let Some(path) = leaf_config {
        figment = merge_file(figment, path);
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
    for field in RAW_ENV_FIELDS {
        let name = format!("{ENV_PREFIX}{}", field.to_uppercase());
        if let Ok(raw) = std::env::var(name) {
            figment = figment.merge(Serialized::default(field, raw));
        }
    }
    figment
}

/// Layered configuration: defaults, `/etc/sslrenew`, the working directory, the
/// file given on the command line, then `SSLRENEW_*` environment variables.
pub fn load_config_figment(config_file: Option<&str>) -> Figment {
    let etc_path = format!("/etc/{CONFIG_NAME}");
    search_load_config(&[&etc_path, "."], config_file)
}

pub fn load_config(config_file: Option<&str>) -> Result<Config> {
    load_config_figment(config_file)
        .extract()
        .context("failed to load configuration")
}

impl Config {
    /// The built-in defaults, used to render the configuration template.
    pub fn template() -> Result<Self> {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .extract()
            .context("invalid default configuration")
    }

    /// Check everything the API commands need before any request is made.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("api_user", &self.api_user),
            ("api_key", &self.api_key),
            ("username", &self.username),
            ("ssl_type", &self.ssl_type),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                bail!(
                    "{name} is not set, add it to the config file or set {ENV_PREFIX}{}",
                    name.to_uppercase()
                );
            }
        }
        self.client_ip
            .trim()
            .parse::<IpAddr>()
            .with_context(|| format!("client_ip {:?} is not an IP address", self.client_ip))?;
        if !(1..=5).contains(&self.years) {
            bail!("years must be between 1 and 5, got {}", self.years);
        }
        if self.renew_window_days < 0 {
            bail!("renew_window_days must not be negative");
        }
        if self.key_bits < 2048 {
            bail!("key_bits must be at least 2048, got {}", self.key_bits);
        }
        self.subject.validate().context("invalid subject")
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::builder()
            .api_url(self.api_url.clone())
            .api_user(self.api_user.trim())
            .api_key(self.api_key.trim())
            .username(self.username.trim())
            .client_ip(self.client_ip.trim())
            .ssl_type(self.ssl_type.trim())
            .years(self.years)
            .build()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    /// `certificate_id` overrides the configured one.
    pub fn renewer_config(&self, certificate_id: Option<String>, force: bool) -> RenewerConfig {
        RenewerConfig::builder()
            .subject(self.subject.clone())
            .maybe_certificate_id(certificate_id.or_else(|| self.certificate_id.clone()))
            .renew_window_days(self.renew_window_days)
            .key_bits(self.key_bits)
            .force(force)
            .maybe_output_dir(self.output_dir.clone())
            .build()
    }

    pub fn to_commented_toml(&self) -> Result<String> {
        let mut doc = to_document(self)?;

        for (mut key, item) in doc.iter_mut() {
            let Ok(docstring) = Self::get_field_docs(key.get()) else {
                continue;
            };
            let mut comment = String::new();
            for line in docstring.lines() {
                let line = if line.is_empty() {
                    String::from("#\n")
                } else {
                    format!("# {line}\n")
                };
                comment.push_str(&line);
            }
            if let Some(inline) = item.as_inline_table() {
                *item = Item::Table(inline.clone().into_table());
            }
            match item {
                Item::Table(table) => table.decor_mut().set_prefix(comment),
                _ => key.leaf_decor_mut().set_prefix(comment),
            }
        }
        Ok(doc.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Unsigned(u64),
    Signed(i64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Unsigned(n) => n.to_string(),
            StringOrNumber::Signed(n) => n.to_string(),
        }
    }
}

/// Config files may write ids and credentials as bare numbers.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(Into::into)
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(Into::into))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use figment::Jail;
    use sslrenew::{ApiClient, Renewer, RunOutcome, Transport, Url};

    const CREDENTIALS: &str = r#"
api_user = "apiuser"
api_key = "0123abcd"
username = "nc-user"
client_ip = "203.0.113.7"
"#;

    #[test]
    fn defaults_need_credentials() {
        Jail::expect_with(|_jail| {
            let config = load_config(None).unwrap();
            assert_eq!(config.api_url, sslrenew::SANDBOX_API_URL);
            assert_eq!(config.years, 1);
            assert_eq!(config.renew_window_days, 90);
            assert_eq!(config.subject.common_name, "www.example.com");
            assert!(config.certificate_id.is_none());
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("api_user"));
            Ok(())
        });
    }

    #[test]
    fn working_directory_file_is_layered_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("sslrenew.toml", CREDENTIALS)?;
            let config = load_config(None).unwrap();
            assert_eq!(config.api_user, "apiuser");
            assert_eq!(config.ssl_type, "PositiveSSL");
            config.validate().unwrap();
            Ok(())
        });
    }

    #[test]
    fn leaf_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("sslrenew.toml", CREDENTIALS)?;
            jail.create_file(
                "leaf.json",
                r#"{"years": 2, "subject": {"common_name": "leaf.example.com"}}"#,
            )?;
            jail.set_env("SSLRENEW_API_KEY", "from-env");
            jail.set_env("SSLRENEW_CERTIFICATE_ID", "12345");
            jail.set_env("SSLRENEW_SUBJECT__ORGANIZATION", "Env Org");
            let config = load_config(Some("leaf.json")).unwrap();
            assert_eq!(config.years, 2);
            assert_eq!(config.api_key, "from-env");
            assert_eq!(config.certificate_id.as_deref(), Some("12345"));
            assert_eq!(config.subject.common_name, "leaf.example.com");
            assert_eq!(config.subject.country.as_deref(), Some("US"));
            assert_eq!(config.subject.organization.as_deref(), Some("Env Org"));
            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file("sslrenew.toml", CREDENTIALS)?;
            let base = load_config(None).unwrap();

            let mut config = base.clone();
            config.client_ip = "localhost".into();
            assert!(config.validate().is_err());

            let mut config = base.clone();
            config.years = 0;
            assert!(config.validate().is_err());

            let mut config = base.clone();
            config.key_bits = 1024;
            assert!(config.validate().is_err());

            let mut config = base.clone();
            config.subject.country = Some("USA".into());
            assert!(config.validate().is_err());
            Ok(())
        });
    }

    #[test]
    fn env_strings_are_taken_verbatim() {
        Jail::expect_with(|jail| {
            jail.create_file("sslrenew.toml", CREDENTIALS)?;
            jail.set_env("SSLRENEW_API_KEY", "00123");
            jail.set_env("SSLRENEW_USERNAME", "true");
            jail.set_env("SSLRENEW_CERTIFICATE_ID", "0042");
            let config = load_config(None).unwrap();
            assert_eq!(config.api_key, "00123");
            assert_eq!(config.username, "true");
            assert_eq!(config.certificate_id.as_deref(), Some("0042"));
            Ok(())
        });
    }

    /// Fails every request, remembering what was asked for.
    struct Offline(Arc<Mutex<Vec<Url>>>);

    impl Transport for Offline {
        async fn get(&self, url: &Url) -> Result<String> {
            self.0.lock().unwrap().push(url.clone());
            bail!("offline")
        }
    }

    async fn requested_certificate(config: &Config, cli_id: Option<&str>) -> Option<String> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let client = ApiClient::new(config.api_config(), Offline(calls.clone()));
        let renewer = Renewer::new(client, config.renewer_config(cli_id.map(Into::into), false));
        let outcome = renewer.run().await;
        assert!(matches!(
            outcome,
            RunOutcome::NotEligible {
                days_until_expiration: None,
                ..
            }
        ));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        calls[0]
            .query_pairs()
            .find(|(key, _)| key == "CertificateID")
            .map(|(_, value)| value.into_owned())
    }

    #[tokio::test]
    async fn cli_certificate_id_wins() {
        let mut config = Config::template().unwrap();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(
            requested_certificate(&config, Some("999")).await.as_deref(),
            Some("999")
        );

        config.certificate_id = Some("555".into());
        assert_eq!(
            requested_certificate(&config, None).await.as_deref(),
            Some("555")
        );
        assert_eq!(
            requested_certificate(&config, Some("999")).await.as_deref(),
            Some("999")
        );
    }

    #[test]
    fn template_is_commented_and_parses_back() {
        let template = Config::template().unwrap().to_commented_toml().unwrap();
        assert!(template.contains("# Namecheap API key\n"));
        assert!(template.contains("# Subject of the certificate signing request\n[subject]"));
        let parsed: Config = toml_edit::de::from_str(&template).unwrap();
        assert_eq!(parsed.subject.organizational_unit.as_deref(), Some("IT"));
        assert_eq!(parsed.key_bits, 2048);
    }
}
