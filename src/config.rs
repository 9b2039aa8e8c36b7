use anyhow::{Context, Result, anyhow};
use ipnet::IpNet;
use std::env;
use std::path::PathBuf;
use ticket_core::mapping::{FieldMappings, MappingOverrides};

const RESERVED_PATHS: &[&str] = &["/health", "/ready", "/api/workitem-types"];

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub webhook_path: String,
    pub max_payload_bytes: usize,
    pub ip_limit_per_minute: u32,
    pub trust_proxy_headers: bool,
    pub trusted_proxy_cidrs: Vec<IpNet>,
    pub mapping_file: Option<PathBuf>,
    pub embed_images: bool,
    pub tapd_api_base: String,
    pub tapd_web_base: String,
    pub tapd_api_user: String,
    pub tapd_api_password: String,
    pub tapd_workspace_id: Option<String>,
    pub tapd_http_timeout_ms: u64,
    pub tapd_retry_delay_ms: u64,
    pub feishu_verification_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let config = Self {
            bind_addr: vars.string_or("RELAY_BIND", "0.0.0.0:8080"),
            webhook_path: vars.string_or("RELAY_WEBHOOK_PATH", "/webhook/feishu"),
            max_payload_bytes: vars.parsed_or("RELAY_MAX_PAYLOAD_BYTES", 1_048_576usize)?,
            ip_limit_per_minute: vars.parsed_or("RELAY_IP_RATE_PER_MINUTE", 100u32)?,
            trust_proxy_headers: vars.bool_or("RELAY_TRUST_PROXY_HEADERS", true),
            trusted_proxy_cidrs: parse_cidrs(
                &vars.string_or("RELAY_TRUSTED_PROXY_CIDRS", "127.0.0.1/32,::1/128"),
            )?,
            mapping_file: vars.optional("RELAY_MAPPING_FILE").map(PathBuf::from),
            embed_images: vars.bool_or("RELAY_EMBED_IMAGES", true),
            tapd_api_base: trim_base(&vars.string_or("TAPD_API_BASE", "https://api.tapd.cn")),
            tapd_web_base: trim_base(&vars.string_or("TAPD_WEB_BASE", "https://www.tapd.cn")),
            tapd_api_user: vars.required("TAPD_API_USER")?,
            tapd_api_password: vars.required("TAPD_API_PASSWORD")?,
            tapd_workspace_id: vars.optional("TAPD_WORKSPACE_ID"),
            tapd_http_timeout_ms: vars.parsed_or("TAPD_HTTP_TIMEOUT_MS", 5_000u64)?,
            tapd_retry_delay_ms: vars.parsed_or("TAPD_RETRY_DELAY_MS", 500u64)?,
            feishu_verification_token: vars.optional("FEISHU_VERIFICATION_TOKEN"),
        };

        if !config.webhook_path.starts_with('/') {
            return Err(anyhow!("RELAY_WEBHOOK_PATH must start with '/'"));
        }

        if is_reserved_path(&config.webhook_path) {
            return Err(anyhow!(
                "RELAY_WEBHOOK_PATH {} collides with a built-in route",
                config.webhook_path
            ));
        }

        if config.ip_limit_per_minute == 0 {
            return Err(anyhow!("RELAY_IP_RATE_PER_MINUTE must be greater than 0"));
        }

        if config.tapd_http_timeout_ms == 0 {
            return Err(anyhow!("TAPD_HTTP_TIMEOUT_MS must be greater than 0"));
        }

        Ok(config)
    }

    pub fn load_mappings(&self) -> Result<FieldMappings> {
        let overrides = match &self.mapping_file {
            Some(path) => MappingOverrides::load(path)?,
            None => MappingOverrides::default(),
        };
        FieldMappings::with_overrides(overrides).context("build field mappings")
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        let value = (self.0)(name).with_context(|| format!("missing required env var: {name}"))?;
        if value.trim().is_empty() {
            return Err(anyhow!("required env var {name} cannot be empty"));
        }
        Ok(value)
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
    {
        self.optional(name)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| anyhow!("invalid {} for {name}", std::any::type_name::<T>()))
            })
            .transpose()
            .map(|value| value.unwrap_or(default))
    }

    fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.optional(name) {
            Some(value) => matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            None => default,
        }
    }
}

fn is_reserved_path(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    RESERVED_PATHS.contains(&path)
        || path == "/api/create"
        || path.starts_with("/api/create/")
        || path.contains(['{', '}', '*'])
}

fn parse_cidrs(raw: &str) -> Result<Vec<IpNet>> {
    raw.split(',')
        .map(str::trim)
        .filter(|cidr| !cidr.is_empty())
        .map(|cidr| {
            cidr.parse::<IpNet>()
                .with_context(|| format!("invalid CIDR in RELAY_TRUSTED_PROXY_CIDRS: {cidr}"))
        })
        .collect()
}

fn trim_base(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}
