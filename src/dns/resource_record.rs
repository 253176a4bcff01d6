use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::name::{decode_name, encode_name};
use super::traits::DnsWireFormat;
use super::types::{DnsQClass, DnsQType};

/// Typed rdata for the record kinds this resolver produces or forwards.
/// Anything else survives as raw bytes so upstream/forwarder answers are
/// never dropped just because the core doesn't have a typed variant for them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    NS(String),
    CNAME(String),
    PTR(String),
    MX { preference: u16, exchange: String },
    TXT(Vec<String>),
    SOA {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    SRV { priority: u16, weight: u16, port: u16, target: String },
    Unknown(Vec<u8>),
}

impl RData {
    fn to_wire(&self, out: &mut Vec<u8>) {
        match self {
            RData::A(addr) => out.extend_from_slice(&addr.octets()),
            RData::AAAA(addr) => out.extend_from_slice(&addr.octets()),
            RData::NS(name) | RData::CNAME(name) | RData::PTR(name) => {
                out.extend_from_slice(&encode_name(name));
            }
            RData::MX { preference, exchange } => {
                out.extend_from_slice(&preference.to_be_bytes());
                out.extend_from_slice(&encode_name(exchange));
            }
            RData::TXT(segments) => {
                for segment in segments {
                    let bytes = segment.as_bytes();
                    out.push(bytes.len().min(255) as u8);
                    out.extend_from_slice(&bytes[..bytes.len().min(255)]);
                }
            }
            RData::SOA { mname, rname, serial, refresh, retry, expire, minimum } => {
                out.extend_from_slice(&encode_name(mname));
                out.extend_from_slice(&encode_name(rname));
                out.extend_from_slice(&serial.to_be_bytes());
                out.extend_from_slice(&refresh.to_be_bytes());
                out.extend_from_slice(&retry.to_be_bytes());
                out.extend_from_slice(&expire.to_be_bytes());
                out.extend_from_slice(&minimum.to_be_bytes());
            }
            RData::SRV { priority, weight, port, target } => {
                out.extend_from_slice(&priority.to_be_bytes());
                out.extend_from_slice(&weight.to_be_bytes());
                out.extend_from_slice(&port.to_be_bytes());
                out.extend_from_slice(&encode_name(target));
            }
            RData::Unknown(bytes) => out.extend_from_slice(bytes),
        }
    }

    fn from_wire_typed(buf: &[u8], pos: usize, qtype: DnsQType, rdlength: usize) -> io::Result<Self> {
        let raw = buf
            .get(pos..pos + rdlength)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated rdata"))?;

        let data = match qtype {
            DnsQType::A => {
                if raw.len() != 4 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "A rdata must be 4 bytes"));
                }
                RData::A(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
            }
            DnsQType::AAAA => {
                if raw.len() != 16 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "AAAA rdata must be 16 bytes"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(raw);
                RData::AAAA(Ipv6Addr::from(octets))
            }
            DnsQType::NS => RData::NS(decode_name(buf, pos)?.0),
            DnsQType::CNAME => RData::CNAME(decode_name(buf, pos)?.0),
            DnsQType::PTR => RData::PTR(decode_name(buf, pos)?.0),
            DnsQType::MX => {
                if raw.len() < 2 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated MX preference"));
                }
                let preference = u16::from_be_bytes([raw[0], raw[1]]);
                let (exchange, _) = decode_name(buf, pos + 2)?;
                RData::MX { preference, exchange }
            }
            DnsQType::TXT => {
                let mut segments = Vec::new();
                let mut i = 0;
                while i < raw.len() {
                    let len = raw[i] as usize;
                    i += 1;
                    let end = (i + len).min(raw.len());
                    segments.push(String::from_utf8_lossy(&raw[i..end]).into_owned());
                    i = end;
                }
                RData::TXT(segments)
            }
            DnsQType::SOA => {
                let (mname, next) = decode_name(buf, pos)?;
                let (rname, next) = decode_name(buf, next)?;
                let tail = buf.get(next..next + 20).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated SOA counters")
                })?;
                RData::SOA {
                    mname,
                    rname,
                    serial: u32::from_be_bytes(tail[0..4].try_into().unwrap()),
                    refresh: u32::from_be_bytes(tail[4..8].try_into().unwrap()),
                    retry: u32::from_be_bytes(tail[8..12].try_into().unwrap()),
                    expire: u32::from_be_bytes(tail[12..16].try_into().unwrap()),
                    minimum: u32::from_be_bytes(tail[16..20].try_into().unwrap()),
                }
            }
            DnsQType::SRV => {
                if raw.len() < 6 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated SRV header"));
                }
                let priority = u16::from_be_bytes([raw[0], raw[1]]);
                let weight = u16::from_be_bytes([raw[2], raw[3]]);
                let port = u16::from_be_bytes([raw[4], raw[5]]);
                let (target, _) = decode_name(buf, pos + 6)?;
                RData::SRV { priority, weight, port, target }
            }
            _ => RData::Unknown(raw.to_vec()),
        };
        Ok(data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsResourceRecord {
    pub name: String,
    pub qtype: DnsQType,
    pub qclass: DnsQClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl DnsResourceRecord {
    pub fn a(name: impl Into<String>, ttl: u32, addr: Ipv4Addr) -> Self {
        Self { name: name.into(), qtype: DnsQType::A, qclass: DnsQClass::IN, ttl, rdata: RData::A(addr) }
    }

    pub fn ptr(name: impl Into<String>, ttl: u32, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qtype: DnsQType::PTR,
            qclass: DnsQClass::IN,
            ttl,
            rdata: RData::PTR(target.into()),
        }
    }
}

impl DnsWireFormat for DnsResourceRecord {
    fn to_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&encode_name(&self.name));
        out.extend_from_slice(&u16::from(self.qtype).to_be_bytes());
        out.extend_from_slice(&u16::from(self.qclass).to_be_bytes());
        out.extend_from_slice(&self.ttl.to_be_bytes());

        let mut rdata_bytes = Vec::new();
        self.rdata.to_wire(&mut rdata_bytes);
        out.extend_from_slice(&(rdata_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&rdata_bytes);
    }

    fn from_wire(buf: &[u8], pos: usize) -> io::Result<(Self, usize)> {
        let (name, pos) = decode_name(buf, pos)?;
        let header = buf
            .get(pos..pos + 10)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated RR header"))?;
        let qtype = DnsQType::from(u16::from_be_bytes([header[0], header[1]]));
        let qclass = DnsQClass::from(u16::from_be_bytes([header[2], header[3]]));
        let ttl = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let rdlength = u16::from_be_bytes([header[8], header[9]]) as usize;
        let rdata_pos = pos + 10;

        let rdata = RData::from_wire_typed(buf, rdata_pos, qtype, rdlength)?;
        let end = rdata_pos + rdlength;

        Ok((DnsResourceRecord { name, qtype, qclass, ttl, rdata }, end))
    }
}
