//! Suffix-based UDP forwarding (SPEC_FULL.md §4.3 step 6): queries whose
//! qname ends in a configured suffix are tried against an external UDP
//! resolver before falling through to the upstream DoH pool.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

const FORWARD_TIMEOUT: Duration = Duration::from_millis(1500);

/// Parse one `"<suffix>:<ip>[,<ip>...]"` rule and, if `qname` ends with
/// `.<suffix>.`, return the first listed IP (the only one actually used).
fn matching_server(rule: &str, qname: &str) -> Option<String> {
    let (suffix, servers) = rule.split_once(':')?;
    let suffix = suffix.trim();
    let needle = format!(".{}.", suffix.trim_end_matches('.'));
    if !qname.ends_with(&needle) && qname != format!("{}.", suffix) {
        return None;
    }
    servers.split(',').next().map(|s| s.trim().to_string())
}

pub fn find_forward_server(rules: &[String], qname: &str) -> Option<String> {
    rules.iter().find_map(|rule| matching_server(rule, qname))
}

/// Send `wire_query` to `server:53` over UDP and wait up to 1.5s for a reply.
pub async fn try_forward(server: &str, wire_query: &[u8]) -> Option<Vec<u8>> {
    let result = timeout(FORWARD_TIMEOUT, send_and_receive(server, wire_query)).await;
    match result {
        Ok(Ok(bytes)) => Some(bytes),
        Ok(Err(err)) => {
            tracing::warn!(server, error = %err, "forwarder unreachable");
            None
        }
        Err(_) => {
            tracing::warn!(server, "forwarder timed out");
            None
        }
    }
}

async fn send_and_receive(server: &str, wire_query: &[u8]) -> std::io::Result<Vec<u8>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect((server, 53)).await?;
    socket.send(wire_query).await?;
    let mut buf = vec![0u8; 65535];
    let len = socket.recv(&mut buf).await?;
    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_suffix() {
        let rules = vec!["corp.internal:10.0.0.1,10.0.0.2".to_string()];
        assert_eq!(
            find_forward_server(&rules, "host.corp.internal."),
            Some("10.0.0.1".to_string())
        );
    }

    #[test]
    fn does_not_match_unrelated_suffix() {
        let rules = vec!["corp.internal:10.0.0.1".to_string()];
        assert_eq!(find_forward_server(&rules, "example.com."), None);
    }

    #[test]
    fn takes_only_the_first_listed_server() {
        let rules = vec!["corp.internal:10.0.0.1,10.0.0.2,10.0.0.3".to_string()];
        assert_eq!(
            find_forward_server(&rules, "a.corp.internal."),
            Some("10.0.0.1".to_string())
        );
    }
}
