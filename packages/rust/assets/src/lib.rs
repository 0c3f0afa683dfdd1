//! Network collaborators for digital assets: DNS resolution with ASN
//! attribution, and HTTP reachability checks.

mod probe;
mod resolver;

use std::time::Duration;

use corpscope_shared::{AssetsConfig, CorpscopeError, Result};
use reqwest::Client;

pub use probe::HttpProbe;
pub use resolver::{NetworkResolver, is_private_ip, netblock, parse_asn};

/// User-Agent string for asset requests.
const USER_AGENT: &str = concat!("corpscope/", env!("CARGO_PKG_VERSION"));

/// Redirect hops followed when probing a domain.
const MAX_REDIRECTS: usize = 5;

/// Build the shared HTTP client for resolution and probing.
pub fn build_client(config: &AssetsConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.check_timeout_secs.max(1)))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| CorpscopeError::Network(format!("failed to build HTTP client: {e}")))
}

/// Resolver and probe configured from the `[assets]` section.
pub fn from_config(config: &AssetsConfig) -> Result<(NetworkResolver, HttpProbe)> {
    let client = build_client(config)?;
    let timeout = Duration::from_secs(config.check_timeout_secs.max(1));
    Ok((
        NetworkResolver::new(client.clone(), config.asn_lookup_url.clone(), timeout),
        HttpProbe::new(client, timeout),
    ))
}
