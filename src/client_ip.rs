use crate::config::Config;
use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::http::request::Request;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use tower_governor::errors::GovernorError;
use tower_governor::key_extractor::KeyExtractor;

#[derive(Debug, Clone)]
pub struct TunnelClientIpKeyExtractor {
    trust_proxy_headers: bool,
    trusted_proxies: Vec<IpNet>,
}

impl TunnelClientIpKeyExtractor {
    pub fn new(trust_proxy_headers: bool, trusted_proxies: Vec<IpNet>) -> Self {
        Self {
            trust_proxy_headers,
            trusted_proxies,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.trust_proxy_headers, config.trusted_proxy_cidrs.clone())
    }

    pub fn client_ip(&self, peer_ip: IpAddr, headers: &HeaderMap) -> IpAddr {
        let via_trusted_proxy = self.trust_proxy_headers
            && self.trusted_proxies.iter().any(|cidr| cidr.contains(&peer_ip));
        if !via_trusted_proxy {
            return peer_ip;
        }

        forwarded_client_ip(headers).unwrap_or(peer_ip)
    }
}

impl KeyExtractor for TunnelClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let peer_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.client_ip(peer_ip, req.headers()))
    }
}

/// `X-Forwarded-For` (left-most parsable entry), then `X-Real-IP`, then
/// the `for=` parameter of `Forwarded`.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    header("x-forwarded-for")
        .and_then(|raw| raw.split(',').find_map(|part| part.trim().parse().ok()))
        .or_else(|| header("x-real-ip").and_then(|raw| raw.trim().parse().ok()))
        .or_else(|| header("forwarded").and_then(forwarded_for))
}

fn forwarded_for(raw: &str) -> Option<IpAddr> {
    raw.split([';', ','])
        .map(str::trim)
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| key.trim().eq_ignore_ascii_case("for"))
        .find_map(|(_, value)| {
            let value = value.trim().trim_matches('"');
            if let Some(bracketed) = value.strip_prefix('[') {
                return bracketed.split(']').next()?.parse().ok();
            }
            value.parse().ok().or_else(|| value.split(':').next()?.parse().ok())
        })
}
