use std::io;

use serde::{Deserialize, Serialize};

use super::name::{decode_name, encode_name};
use super::traits::DnsWireFormat;
use super::types::{DnsQClass, DnsQType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: DnsQType,
    pub qclass: DnsQClass,
}

impl DnsWireFormat for DnsQuestion {
    fn to_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&encode_name(&self.name));
        out.extend_from_slice(&u16::from(self.qtype).to_be_bytes());
        out.extend_from_slice(&u16::from(self.qclass).to_be_bytes());
    }

    fn from_wire(buf: &[u8], pos: usize) -> io::Result<(Self, usize)> {
        let (name, pos) = decode_name(buf, pos)?;
        let qtype_bytes = buf
            .get(pos..pos + 2)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated qtype"))?;
        let qtype = DnsQType::from(u16::from_be_bytes([qtype_bytes[0], qtype_bytes[1]]));
        let pos = pos + 2;
        let qclass_bytes = buf
            .get(pos..pos + 2)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated qclass"))?;
        let qclass = DnsQClass::from(u16::from_be_bytes([qclass_bytes[0], qclass_bytes[1]]));
        let pos = pos + 2;

        Ok((DnsQuestion { name, qtype, qclass }, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_round_trips() {
        let question = DnsQuestion {
            name: "example.com.".to_string(),
            qtype: DnsQType::A,
            qclass: DnsQClass::IN,
        };
        let mut bytes = Vec::new();
        question.to_wire(&mut bytes);

        let (decoded, end) = DnsQuestion::from_wire(&bytes, 0).unwrap();
        assert_eq!(decoded, question);
        assert_eq!(end, bytes.len());
    }
}
