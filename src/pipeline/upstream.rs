//! Outbound DoH resolution with sticky-avoidance pool selection and the
//! alternate JSON response-mode translation (SPEC_FULL.md §4.3).

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::config::TargetMode;
use crate::dns::{DnsPacket, DnsQType, DnsResourceRecord, RData};
use crate::error::{Error, Result};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(9);
const UPSTREAM_RETRIES: usize = 3;

/// Tracks the last-chosen upstream so two consecutive queries never repeat
/// it while an alternative exists (§4.3 "Upstream sticky-avoidance").
pub struct UpstreamSelector {
    last: Mutex<Option<String>>,
}

impl UpstreamSelector {
    pub fn new() -> Self {
        Self { last: Mutex::new(None) }
    }

    pub fn pick(&self, pool: &[String]) -> Option<String> {
        if pool.is_empty() {
            return None;
        }
        let mut last = self.last.lock();

        let candidates: Vec<&String> =
            pool.iter().filter(|url| Some(*url) != last.as_ref()).collect();

        let chosen = if candidates.is_empty() {
            last.clone().unwrap_or_else(|| pool[0].clone())
        } else {
            let idx = rand::rng().random_range(0..candidates.len());
            candidates[idx].clone()
        };

        *last = Some(chosen.clone());
        chosen
    }
}

impl Default for UpstreamSelector {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent("sentrydns/0.1 (upstream)")
        .timeout(UPSTREAM_TIMEOUT)
        .build()
}

/// Resolve one query against the selected upstream pool, retrying transport
/// failures. `mode` picks between a binary `application/dns-message` POST and
/// the alternate JSON API.
pub async fn resolve(
    client: &Client,
    selector: &UpstreamSelector,
    pool: &[String],
    mode: TargetMode,
    qname: &str,
    qtype: DnsQType,
    wire_query: &[u8],
) -> Result<Vec<DnsResourceRecord>> {
    let target = selector
        .pick(pool)
        .ok_or_else(|| Error::ConfigInvalid("base.target_doh must not be empty".to_string()))?;

    let retry_strategy = FixedInterval::from_millis(300).take(UPSTREAM_RETRIES);
    Retry::spawn(retry_strategy, || {
        let client = client.clone();
        let target = target.clone();
        async move {
            match mode {
                TargetMode::DnsMessage => resolve_wire(&client, &target, wire_query).await,
                TargetMode::DnsJson => resolve_json(&client, &target, qname, qtype).await,
            }
        }
    })
    .await
}

async fn resolve_wire(client: &Client, target: &str, wire_query: &[u8]) -> Result<Vec<DnsResourceRecord>> {
    let response = client
        .post(target)
        .header("content-type", "application/dns-message")
        .header("accept", "application/dns-message")
        .body(wire_query.to_vec())
        .send()
        .await
        .map_err(|err| Error::UpstreamTransient(err.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::UpstreamHttpError(response.status().as_u16()));
    }

    let body = response.bytes().await.map_err(|err| Error::UpstreamTransient(err.to_string()))?;
    let packet = DnsPacket::parse(&body).map_err(|err| Error::UpstreamTransient(err.to_string()))?;
    Ok(packet.answers)
}

#[derive(Debug, Deserialize)]
struct JsonAnswer {
    name: String,
    #[serde(rename = "type")]
    rtype: Value,
    #[serde(rename = "TTL")]
    ttl: u32,
    data: String,
}

#[derive(Debug, Deserialize)]
struct JsonResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<JsonAnswer>,
}

async fn resolve_json(client: &Client, target: &str, qname: &str, qtype: DnsQType) -> Result<Vec<DnsResourceRecord>> {
    let qtype_numeric: u16 = qtype.into();
    let response = client
        .get(target)
        .header("accept", "application/dns-json")
        .query(&[("name", qname), ("type", &qtype_numeric.to_string())])
        .send()
        .await
        .map_err(|err| Error::UpstreamTransient(err.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::UpstreamHttpError(response.status().as_u16()));
    }

    let parsed: JsonResponse =
        response.json().await.map_err(|err| Error::UpstreamTransient(err.to_string()))?;

    Ok(parsed.answer.iter().filter_map(json_answer_to_rr).collect())
}

/// Translate one JSON `Answer[]` entry into a wire RRset, per §4.3's
/// "JSON-mode translation" rule: numeric type only, TTL copied verbatim, a
/// single `data` field parsed by the usual text-presentation rules.
fn json_answer_to_rr(entry: &JsonAnswer) -> Option<DnsResourceRecord> {
    let numeric_type = match &entry.rtype {
        Value::Number(n) => n.as_u64()? as u16,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };
    let qtype = DnsQType::from(numeric_type);
    let name = crate::dns::normalize(&entry.name);

    let rdata = match qtype {
        DnsQType::A => RData::A(entry.data.parse::<Ipv4Addr>().ok()?),
        DnsQType::AAAA => RData::AAAA(entry.data.parse::<Ipv6Addr>().ok()?),
        DnsQType::CNAME => RData::CNAME(crate::dns::normalize(&entry.data)),
        DnsQType::NS => RData::NS(crate::dns::normalize(&entry.data)),
        DnsQType::PTR => RData::PTR(crate::dns::normalize(&entry.data)),
        DnsQType::TXT => RData::TXT(vec![entry.data.clone()]),
        DnsQType::MX => {
            let (preference, exchange) = entry.data.split_once(' ')?;
            RData::MX {
                preference: preference.parse().ok()?,
                exchange: crate::dns::normalize(exchange),
            }
        }
        _ => RData::Unknown(entry.data.clone().into_bytes()),
    };

    Some(DnsResourceRecord {
        name,
        qtype,
        qclass: crate::dns::DnsQClass::IN,
        ttl: entry.ttl,
        rdata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_avoidance_never_repeats_while_an_alternative_exists() {
        let selector = UpstreamSelector::new();
        let pool = vec!["https://u1".to_string(), "https://u2".to_string()];

        let mut previous = selector.pick(&pool).unwrap();
        for _ in 0..20 {
            let chosen = selector.pick(&pool).unwrap();
            assert_ne!(chosen, previous);
            previous = chosen;
        }
    }

    #[test]
    fn single_target_pool_always_falls_back_to_itself() {
        let selector = UpstreamSelector::new();
        let pool = vec!["https://only".to_string()];
        assert_eq!(selector.pick(&pool), Some("https://only".to_string()));
        assert_eq!(selector.pick(&pool), Some("https://only".to_string()));
    }

    #[test]
    fn empty_pool_yields_none() {
        let selector = UpstreamSelector::new();
        assert_eq!(selector.pick(&[]), None);
    }

    #[test]
    fn json_answer_translates_a_record() {
        let entry = JsonAnswer {
            name: "example.com".to_string(),
            rtype: Value::Number(1.into()),
            ttl: 300,
            data: "1.2.3.4".to_string(),
        };
        let rr = json_answer_to_rr(&entry).unwrap();
        assert_eq!(rr.rdata, RData::A(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(rr.ttl, 300);
    }

    #[test]
    fn json_answer_accepts_stringly_typed_numeric_type() {
        let entry = JsonAnswer {
            name: "example.com".to_string(),
            rtype: Value::String("1".to_string()),
            ttl: 300,
            data: "1.2.3.4".to_string(),
        };
        assert!(json_answer_to_rr(&entry).is_some());
    }
}
