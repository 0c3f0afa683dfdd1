//! Domain resolution with ASN and netblock attribution.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use corpscope_shared::{AssetCheckError, DomainResolver, Resolution};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Subset of the `{base}/{ip}/json` response.
#[derive(Debug, Deserialize)]
struct IpInfo {
    #[serde(default)]
    org: Option<String>,
}

/// [`DomainResolver`] using the system resolver plus an HTTP ASN lookup.
pub struct NetworkResolver {
    client: Client,
    asn_lookup_url: String,
    timeout: Duration,
}

impl NetworkResolver {
    pub fn new(client: Client, asn_lookup_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            asn_lookup_url: asn_lookup_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// ASN for an address, e.g. `AS15169`. Lookup failures yield `None`.
    pub async fn lookup_asn(&self, ip: IpAddr) -> Option<String> {
        let url = format!("{}/{ip}/json", self.asn_lookup_url);

        let resp = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(%ip, status = %resp.status(), "ASN lookup returned error status");
                return None;
            }
            Err(e) => {
                debug!(%ip, error = %e, "ASN lookup failed");
                return None;
            }
        };

        let info: IpInfo = match resp.json().await {
            Ok(info) => info,
            Err(e) => {
                debug!(%ip, error = %e, "ASN lookup response unreadable");
                return None;
            }
        };
        info.org.as_deref().and_then(parse_asn)
    }
}

#[async_trait]
impl DomainResolver for NetworkResolver {
    #[instrument(skip_all, fields(domain = %domain))]
    async fn resolve(&self, domain: &str) -> Result<Option<Resolution>, AssetCheckError> {
        let lookup = tokio::time::timeout(self.timeout, tokio::net::lookup_host((domain, 80)));

        let addrs = match lookup.await {
            Err(_) => {
                return Err(AssetCheckError::timeout(
                    domain,
                    self.timeout.as_millis() as u64,
                ));
            }
            Ok(Err(e)) => return lookup_failure(domain, &e),
            Ok(Ok(addrs)) => addrs,
        };

        let Some(ip) = addrs.map(|a| a.ip()).find(|ip| !is_private_ip(ip)) else {
            debug!("domain resolves only to private addresses");
            return Ok(None);
        };

        let asn = self.lookup_asn(ip).await;
        debug!(%ip, asn = ?asn, "domain resolved");

        Ok(Some(Resolution {
            ip_address: ip.to_string(),
            asn,
            netblock: Some(netblock(ip)),
        }))
    }
}

/// Resolver messages meaning the name has no address (NXDOMAIN or no data),
/// across glibc, musl, macOS and Windows.
const MISSING_NAME_MESSAGES: &[&str] = &[
    "name or service not known",
    "no address associated with hostname",
    "nodename nor servname provided",
    "no such host is known",
    "name has no usable address",
    "host not found",
];

/// A name that does not exist is `Ok(None)`; anything else (resolver down,
/// temporary failure, no network) is an error the caller records and may
/// retry.
fn lookup_failure(
    domain: &str,
    e: &std::io::Error,
) -> Result<Option<Resolution>, AssetCheckError> {
    let message = e.to_string().to_lowercase();
    if e.kind() == std::io::ErrorKind::NotFound
        || MISSING_NAME_MESSAGES.iter().any(|m| message.contains(m))
    {
        debug!(error = %e, "domain does not resolve");
        Ok(None)
    } else {
        Err(AssetCheckError::network(domain, e.to_string()))
    }
}

/// Extract the leading `AS<number>` token from an org string.
pub fn parse_asn(org: &str) -> Option<String> {
    let token = org.split_whitespace().next()?;
    let digits = token.strip_prefix("AS")?;
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())).then(|| token.to_string())
}

/// Covering /24 for IPv4, /48 for IPv6.
pub fn netblock(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.0/24")
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2])
        }
    }
}

/// Check if an IP is in a private/reserved range.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
