use serde::{Deserialize, Serialize};

/// DNS OPCODE, RFC 1035 §4.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DnsOpcode {
    #[default]
    Query,
    IQuery,
    Status,
    Other(u8),
}

impl From<u8> for DnsOpcode {
    fn from(value: u8) -> Self {
        match value {
            0 => DnsOpcode::Query,
            1 => DnsOpcode::IQuery,
            2 => DnsOpcode::Status,
            other => DnsOpcode::Other(other),
        }
    }
}

impl From<DnsOpcode> for u8 {
    fn from(value: DnsOpcode) -> Self {
        match value {
            DnsOpcode::Query => 0,
            DnsOpcode::IQuery => 1,
            DnsOpcode::Status => 2,
            DnsOpcode::Other(other) => other,
        }
    }
}

/// DNS RCODE, RFC 1035 §4.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DnsResponseCode {
    #[default]
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    Other(u8),
}

impl DnsResponseCode {
    pub const NOERROR: u8 = 0;
    pub const FORMERR: u8 = 1;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
}

impl From<u8> for DnsResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => DnsResponseCode::NoError,
            1 => DnsResponseCode::FormatError,
            2 => DnsResponseCode::ServerFailure,
            3 => DnsResponseCode::NameError,
            other => DnsResponseCode::Other(other),
        }
    }
}

impl From<DnsResponseCode> for u8 {
    fn from(value: DnsResponseCode) -> Self {
        match value {
            DnsResponseCode::NoError => 0,
            DnsResponseCode::FormatError => 1,
            DnsResponseCode::ServerFailure => 2,
            DnsResponseCode::NameError => 3,
            DnsResponseCode::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DnsQr {
    #[default]
    Query,
    Response,
}

impl From<bool> for DnsQr {
    fn from(value: bool) -> Self {
        if value { DnsQr::Response } else { DnsQr::Query }
    }
}

impl From<DnsQr> for bool {
    fn from(value: DnsQr) -> Self {
        matches!(value, DnsQr::Response)
    }
}

/// The query-type registry the pipeline actually needs. Anything outside this
/// set still round-trips via `Other`, it just never gets typed rdata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsQType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    OPT,
    ANY,
    Other(u16),
}

impl DnsQType {
    /// The fingerprint mnemonic used by the query pipeline (`qname + ":" + mnemonic`).
    pub fn mnemonic(self) -> String {
        match self {
            DnsQType::A => "A".to_string(),
            DnsQType::NS => "NS".to_string(),
            DnsQType::CNAME => "CNAME".to_string(),
            DnsQType::SOA => "SOA".to_string(),
            DnsQType::PTR => "PTR".to_string(),
            DnsQType::MX => "MX".to_string(),
            DnsQType::TXT => "TXT".to_string(),
            DnsQType::AAAA => "AAAA".to_string(),
            DnsQType::SRV => "SRV".to_string(),
            DnsQType::OPT => "OPT".to_string(),
            DnsQType::ANY => "ANY".to_string(),
            DnsQType::Other(code) => code.to_string(),
        }
    }
}

impl From<u16> for DnsQType {
    fn from(value: u16) -> Self {
        match value {
            1 => DnsQType::A,
            2 => DnsQType::NS,
            5 => DnsQType::CNAME,
            6 => DnsQType::SOA,
            12 => DnsQType::PTR,
            15 => DnsQType::MX,
            16 => DnsQType::TXT,
            28 => DnsQType::AAAA,
            33 => DnsQType::SRV,
            41 => DnsQType::OPT,
            255 => DnsQType::ANY,
            other => DnsQType::Other(other),
        }
    }
}

impl From<DnsQType> for u16 {
    fn from(value: DnsQType) -> Self {
        match value {
            DnsQType::A => 1,
            DnsQType::NS => 2,
            DnsQType::CNAME => 5,
            DnsQType::SOA => 6,
            DnsQType::PTR => 12,
            DnsQType::MX => 15,
            DnsQType::TXT => 16,
            DnsQType::AAAA => 28,
            DnsQType::SRV => 33,
            DnsQType::OPT => 41,
            DnsQType::ANY => 255,
            DnsQType::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsQClass {
    IN,
    CH,
    HS,
    ANY,
    Other(u16),
}

impl From<u16> for DnsQClass {
    fn from(value: u16) -> Self {
        match value {
            1 => DnsQClass::IN,
            3 => DnsQClass::CH,
            4 => DnsQClass::HS,
            255 => DnsQClass::ANY,
            other => DnsQClass::Other(other),
        }
    }
}

impl From<DnsQClass> for u16 {
    fn from(value: DnsQClass) -> Self {
        match value {
            DnsQClass::IN => 1,
            DnsQClass::CH => 3,
            DnsQClass::HS => 4,
            DnsQClass::ANY => 255,
            DnsQClass::Other(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qtype_round_trips_through_u16() {
        for qtype in [DnsQType::A, DnsQType::AAAA, DnsQType::PTR, DnsQType::MX] {
            let code: u16 = qtype.into();
            assert_eq!(DnsQType::from(code), qtype);
        }
    }

    #[test]
    fn unknown_opcode_never_panics() {
        assert_eq!(DnsOpcode::from(200), DnsOpcode::Other(200));
    }

    #[test]
    fn mnemonic_matches_common_names() {
        assert_eq!(DnsQType::A.mnemonic(), "A");
        assert_eq!(DnsQType::PTR.mnemonic(), "PTR");
    }
}
