//! The shared resolution state machine driving all three listeners
//! (SPEC_FULL.md §4.3): parse → custom → block → cache → forward → upstream.

mod forward;
mod upstream;

pub use upstream::UpstreamSelector;

use std::net::Ipv4Addr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use reqwest::Client;
use tracing::debug;

use crate::blocklist::{BlockDecision, BlocklistManager};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::dns::{fingerprint, normalize, DnsPacket, DnsQType, DnsResourceRecord, RData};
use crate::storage::{CounterKind, Storage};

/// Dependency-injection record shared by every listener (§9's `PipelineContext`).
pub struct PipelineContext {
    pub cache: Arc<ResponseCache>,
    pub blocklist: Arc<BlocklistManager>,
    pub storage: Arc<dyn Storage>,
    pub config: ArcSwap<Config>,
    pub upstream: UpstreamSelector,
    pub http_client: Client,
    pub hostname: String,
}

impl PipelineContext {
    pub fn new(
        cache: Arc<ResponseCache>,
        blocklist: Arc<BlocklistManager>,
        storage: Arc<dyn Storage>,
        config: Config,
        hostname: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            blocklist,
            storage,
            config: ArcSwap::from_pointee(config),
            upstream: UpstreamSelector::new(),
            http_client: upstream::build_client().expect("building the upstream http client failed"),
            hostname: hostname.into(),
        })
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    pub fn set_config(&self, config: Config) {
        self.config.store(Arc::new(config));
    }
}

pub struct ResolverPipeline {
    ctx: Arc<PipelineContext>,
}

impl ResolverPipeline {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Run the full state machine on one decoded wire message, returning a
    /// wire-encoded response. This never fails outward: every error path
    /// resolves to a concrete DNS response per §7's propagation policy.
    pub async fn handle(&self, wire: &[u8]) -> Vec<u8> {
        let packet = match DnsPacket::parse(wire) {
            Ok(packet) => packet,
            Err(_) => return DnsPacket::format_error().to_wire(),
        };

        let Some(question) = packet.questions.first() else {
            return packet.respond_with(crate::dns::DnsResponseCode::FormatError).to_wire();
        };

        let qname = normalize(&question.name);
        let qtype = question.qtype;
        let fp = fingerprint(&qname, &qtype.mnemonic());

        debug!(qname = %qname, qtype = %qtype.mnemonic(), "pipeline: parsed query");

        let config = self.ctx.config();

        if matches!(qtype, DnsQType::A | DnsQType::PTR) {
            if let Some(literal) = config.custom_map(&self.ctx.hostname).get(&qname) {
                if let Some(rr) = build_custom_rr(&qname, qtype, literal) {
                    self.record_counter(&fp, CounterKind::CustomHit).await;
                    let mut response = packet.respond_with(crate::dns::DnsResponseCode::NoError);
                    response.answers.push(rr);
                    return response.to_wire();
                }
            }
        }

        if qtype == DnsQType::PTR || self.ctx.blocklist.decide(&qname) == BlockDecision::Blocked {
            self.record_counter(&fp, CounterKind::Blacklisted).await;
            return packet.respond_with(crate::dns::DnsResponseCode::NameError).to_wire();
        }

        if let Some(cached) = self.ctx.cache.get(&fp) {
            self.record_counter(&fp, CounterKind::CacheHit).await;
            let mut response = packet.respond_with(crate::dns::DnsResponseCode::NoError);
            response.answers = cached.answer;
            return response.to_wire();
        }

        if let Some(server) = forward::find_forward_server(&config.base.forward, &qname) {
            if let Some(reply_bytes) = forward::try_forward(&server, wire).await {
                if let Ok(reply_packet) = DnsPacket::parse(&reply_bytes) {
                    self.ctx.cache.set(fp.clone(), reply_packet.answers.clone());
                    self.record_counter(&fp, CounterKind::Forward).await;
                    return reply_bytes;
                }
            }
        }

        let ctx = self.ctx.clone();
        let qname_for_upstream = qname.clone();
        let wire_query = wire.to_vec();
        let config_for_upstream = config.clone();

        let result = self
            .ctx
            .cache
            .get_or_compute(&fp, move || async move {
                upstream::resolve(
                    &ctx.http_client,
                    &ctx.upstream,
                    &config_for_upstream.base.target_doh,
                    config_for_upstream.base.target_mode,
                    &qname_for_upstream,
                    qtype,
                    &wire_query,
                )
                .await
            })
            .await;

        match result {
            Ok(answers) => {
                self.record_counter(&fp, CounterKind::Upstream).await;
                let mut response = packet.respond_with(crate::dns::DnsResponseCode::NoError);
                response.answers = answers;
                response.to_wire()
            }
            Err(err) => {
                tracing::warn!(qname = %qname, error = %err, "upstream resolution failed");
                packet.respond_with(crate::dns::DnsResponseCode::ServerFailure).to_wire()
            }
        }
    }

    async fn record_counter(&self, fingerprint: &str, kind: CounterKind) {
        if let Err(err) = self.ctx.storage.upsert_counter(fingerprint, kind).await {
            tracing::warn!(error = %err, "failed to record counter");
        }
    }
}

/// Build the single RRset a custom-hit returns: TTL 300, class IN, rdata
/// matching the literal string in `custom_map` (§3's Custom Record).
fn build_custom_rr(qname: &str, qtype: DnsQType, literal: &str) -> Option<DnsResourceRecord> {
    match qtype {
        DnsQType::A => {
            let addr: Ipv4Addr = literal.parse().ok()?;
            Some(DnsResourceRecord::a(qname, 300, addr))
        }
        DnsQType::PTR => Some(DnsResourceRecord::ptr(qname, 300, normalize(literal))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dns::{DnsHeader, DnsQClass, DnsQuestion, DnsResponseCode, DnsWireFormat};
    use crate::storage::SqliteStorage;
    use std::time::Duration;

    async fn test_context(config: Config) -> Arc<PipelineContext> {
        let cache = Arc::new(ResponseCache::new(100, Duration::from_secs(60)));
        let blocklist = Arc::new(BlocklistManager::new(&[], &[], &[]));
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::connect(":memory:").await.unwrap());
        PipelineContext::new(cache, blocklist, storage, config, "testhost")
    }

    fn query_wire(qname: &str, qtype: DnsQType) -> Vec<u8> {
        let packet = DnsPacket {
            header: DnsHeader { id: 7, rd: true, qdcount: 1, ..Default::default() },
            questions: vec![DnsQuestion { name: qname.to_string(), qtype, qclass: DnsQClass::IN }],
            answers: vec![],
            authorities: vec![],
            additional: vec![],
        };
        packet.to_wire()
    }

    #[tokio::test]
    async fn custom_hit_returns_configured_literal() {
        let mut config = Config::default();
        config.dns.custom.push("example.com:1.2.3.4".to_string());
        let ctx = test_context(config).await;
        let pipeline = ResolverPipeline::new(ctx);

        let response = pipeline.handle(&query_wire("example.com.", DnsQType::A)).await;
        let decoded = DnsPacket::parse(&response).unwrap();

        assert_eq!(decoded.header.rcode, DnsResponseCode::NoError);
        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.answers[0].rdata, RData::A(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[tokio::test]
    async fn ptr_queries_are_unconditionally_blocked() {
        let ctx = test_context(Config::default()).await;
        let pipeline = ResolverPipeline::new(ctx);

        let response = pipeline.handle(&query_wire("1.2.3.4.in-addr.arpa.", DnsQType::PTR)).await;
        let decoded = DnsPacket::parse(&response).unwrap();
        assert_eq!(decoded.header.rcode, DnsResponseCode::NameError);
    }

    #[tokio::test]
    async fn malformed_query_yields_formerr() {
        let ctx = test_context(Config::default()).await;
        let pipeline = ResolverPipeline::new(ctx);

        let response = pipeline.handle(&[0u8, 0, 1]).await;
        let decoded = DnsPacket::parse(&response).unwrap();
        assert_eq!(decoded.header.rcode, DnsResponseCode::FormatError);
        assert!(decoded.questions.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_without_touching_upstream() {
        let ctx = test_context(Config::default()).await;
        let fp = fingerprint("cached.example.com.", "A");
        ctx.cache.set(fp, vec![DnsResourceRecord::a("cached.example.com.", 300, Ipv4Addr::new(9, 9, 9, 9))]);
        let pipeline = ResolverPipeline::new(ctx);

        let response = pipeline.handle(&query_wire("cached.example.com.", DnsQType::A)).await;
        let decoded = DnsPacket::parse(&response).unwrap();
        assert_eq!(decoded.answers[0].rdata, RData::A(Ipv4Addr::new(9, 9, 9, 9)));
    }
}
