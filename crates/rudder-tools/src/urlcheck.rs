// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use url::Url;

use rudder_config::UrlPolicyConfig;
use rudder_runs::RunError;

/// DNS seam for the resolved URL check; swapped for a static table in tests
/// so validation stays hermetic.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Fixed host → address table.
pub struct StaticResolver {
    map: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.map.insert(host.into(), addrs);
        self
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn lookup(&self, host: &str, _port: u16) -> std::io::Result<Vec<IpAddr>> {
        self.map.get(host).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("no entry for {host}"))
        })
    }
}

/// URL ingress guard.
///
/// [`UrlValidator::validate`] applies scheme and literal-address checks;
/// [`UrlValidator::validate_resolved`] additionally resolves hostnames and
/// rejects private answers (anti-DNS-rebinding).  Resolver errors fail
/// open after one retry so constrained resolvers do not produce false
/// negatives.
pub struct UrlValidator {
    policy: UrlPolicyConfig,
    resolver: Arc<dyn DnsResolver>,
}

impl UrlValidator {
    pub fn new(policy: UrlPolicyConfig) -> Self {
        Self {
            policy,
            resolver: Arc::new(SystemResolver),
        }
    }

    pub fn with_resolver(policy: UrlPolicyConfig, resolver: Arc<dyn DnsResolver>) -> Self {
        Self { policy, resolver }
    }

    /// Scheme allowlist plus literal private-address rejection.
    pub fn validate(&self, raw: &str) -> Result<Url, RunError> {
        let url = Url::parse(raw)
            .map_err(|e| RunError::invalid_parameter("url", format!("{raw}: {e}")))?;

        match url.scheme() {
            "http" | "https" => {}
            "file" if self.policy.allow_file => return Ok(url),
            "file" => {
                return Err(RunError::invalid_parameter(
                    "url",
                    "file:// URLs are disabled",
                ))
            }
            other => {
                return Err(RunError::invalid_parameter(
                    "url",
                    format!("unsupported scheme '{other}'"),
                ))
            }
        }

        if self.policy.block_private {
            if let Some(host) = url.host_str() {
                if let Some(ip) = literal_host_ip(host) {
                    if is_private_ip(&ip) {
                        return Err(RunError::invalid_parameter(
                            "url",
                            format!("private address {ip} is blocked"),
                        ));
                    }
                }
            }
        }

        Ok(url)
    }

    /// [`Self::validate`] plus DNS resolution of domain hosts.
    pub async fn validate_resolved(&self, raw: &str) -> Result<Url, RunError> {
        let url = self.validate(raw)?;
        if !self.policy.block_private || url.scheme() == "file" {
            return Ok(url);
        }
        let Some(host) = url.host_str() else {
            return Ok(url);
        };
        if literal_host_ip(host).is_some() {
            return Ok(url); // literal addresses were already classified
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let addrs = match self.resolver.lookup(host, port).await {
            Ok(a) => a,
            Err(first) => match self.resolver.lookup(host, port).await {
                Ok(a) => a,
                Err(second) => {
                    // Fail open: a constrained resolver must not turn every
                    // fetch into a false negative.
                    warn!(host, %first, %second, "DNS validation failed twice; allowing");
                    return Ok(url);
                }
            },
        };
        if let Some(private) = addrs.iter().find(|ip| is_private_ip(ip)) {
            return Err(RunError::invalid_parameter(
                "url",
                format!("{host} resolves to private address {private}"),
            ));
        }
        Ok(url)
    }
}

/// Interpret a URL host as a literal address, covering dotted-quad,
/// IPv6, and the numeric IPv4 notations (decimal, octal, hex) that the
/// WHATWG parser may leave as opaque domains.
fn literal_host_ip(host: &str) -> Option<IpAddr> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(v4) = bare.parse::<Ipv4Addr>() {
        return Some(IpAddr::V4(v4));
    }
    if let Ok(v6) = bare.parse::<Ipv6Addr>() {
        return Some(IpAddr::V6(v6));
    }
    parse_numeric_v4(bare).map(IpAddr::V4)
}

fn parse_numeric_v4(s: &str) -> Option<Ipv4Addr> {
    if s.is_empty() {
        return None;
    }
    if !s.contains('.') {
        return parse_u32_radix(s).map(Ipv4Addr::from);
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut octets = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        let v = parse_u32_radix(part)?;
        if v > 255 {
            return None;
        }
        octets[i] = v as u8;
    }
    Some(Ipv4Addr::from(octets))
}

fn parse_u32_radix(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    if s.len() > 1 && s.starts_with('0') && s.bytes().all(|b| b.is_ascii_digit()) {
        return u32::from_str_radix(s, 8).ok();
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok();
    }
    None
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // ULA fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // link-local fe80::/10
        }
    }
}

fn is_private_v4(v4: &Ipv4Addr) -> bool {
    v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
