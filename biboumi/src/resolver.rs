//! Asynchronous hostname -> address-list lookup (spec.md §4.3).
//!
//! Order: numeric parse, then `/etc/hosts`, then concurrent A+AAAA DNS
//! queries via `hickory-resolver` (already a teacher dependency, used the
//! same way `tokio_xmpp::connect::Tcp::resolve` does). The result is an
//! owned `Vec<IpAddr>` suitable for "try in sequence" connect behavior —
//! per spec.md §9 Open Question (a), no synthetic `addrinfo` chain is
//! reproduced.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::sync::OnceLock;

use hickory_resolver::config::LookupIpStrategy;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioAsyncResolver;

/// Resolves `hostname` to an ordered list of addresses.
pub async fn resolve(hostname: &str) -> Result<Vec<IpAddr>, String> {
    if let Ok(ip) = hostname.parse() {
        return Ok(vec![ip]);
    }

    if let Some(addrs) = lookup_etc_hosts(hostname) {
        return Ok(addrs);
    }

    let (config, mut options) = hickory_resolver::system_conf::read_system_conf()
        .map_err(|e| e.to_string())?;
    options.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    let resolver = TokioAsyncResolver::new(config, options, TokioConnectionProvider::default());

    match resolver.lookup_ip(hostname).await {
        Ok(lookup) => {
            let addrs: Vec<IpAddr> = lookup.iter().collect();
            if addrs.is_empty() {
                Err("no address found".to_owned())
            } else {
                Ok(addrs)
            }
        }
        Err(e) => Err(e.to_string()),
    }
}

fn etc_hosts_path() -> &'static str {
    "/etc/hosts"
}

fn lookup_etc_hosts(hostname: &str) -> Option<Vec<IpAddr>> {
    static CACHE: OnceLock<HashMap<String, Vec<IpAddr>>> = OnceLock::new();
    let map = CACHE.get_or_init(|| parse_etc_hosts(&fs::read_to_string(etc_hosts_path()).unwrap_or_default()));
    map.get(hostname).cloned()
}

/// Parses the `/etc/hosts` token grammar: whitespace-separated tokens,
/// `#` starts a comment, the first token is the address, the rest are
/// names. Matching is case-sensitive.
fn parse_etc_hosts(contents: &str) -> HashMap<String, Vec<IpAddr>> {
    let mut map: HashMap<String, Vec<IpAddr>> = HashMap::new();
    for line in contents.lines() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        };
        let mut tokens = line.split_whitespace();
        let Some(addr) = tokens.next().and_then(|a| a.parse::<IpAddr>().ok()) else {
            continue;
        };
        for name in tokens {
            map.entry(name.to_owned()).or_default().push(addr);
        }
    }
    map
}
