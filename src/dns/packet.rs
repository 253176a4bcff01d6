use std::io;

use super::header::DnsHeader;
use super::question::DnsQuestion;
use super::resource_record::DnsResourceRecord;
use super::traits::DnsWireFormat;
use super::types::{DnsOpcode, DnsQr, DnsResponseCode};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<DnsResourceRecord>,
    pub authorities: Vec<DnsResourceRecord>,
    pub additional: Vec<DnsResourceRecord>,
}

impl DnsPacket {
    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        let (header, mut pos) = DnsHeader::from_wire(bytes, 0)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let (question, next) = DnsQuestion::from_wire(bytes, pos)?;
            questions.push(question);
            pos = next;
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let (rr, next) = DnsResourceRecord::from_wire(bytes, pos)?;
            answers.push(rr);
            pos = next;
        }

        let mut authorities = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            let (rr, next) = DnsResourceRecord::from_wire(bytes, pos)?;
            authorities.push(rr);
            pos = next;
        }

        let mut additional = Vec::with_capacity(header.arcount as usize);
        for _ in 0..header.arcount {
            let (rr, next) = DnsResourceRecord::from_wire(bytes, pos)?;
            additional.push(rr);
            pos = next;
        }

        Ok(DnsPacket { header, questions, answers, authorities, additional })
    }

    fn sync_counts(&mut self) {
        self.header.qdcount = self.questions.len() as u16;
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authorities.len() as u16;
        self.header.arcount = self.additional.len() as u16;
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut synced = self.clone();
        synced.sync_counts();

        let mut out = Vec::new();
        synced.header.to_wire(&mut out);
        for question in &synced.questions {
            question.to_wire(&mut out);
        }
        for rr in synced.answers.iter().chain(&synced.authorities).chain(&synced.additional) {
            rr.to_wire(&mut out);
        }
        out
    }

    /// Build an empty FORMERR response when the query itself could not be
    /// decoded. There is no question section to echo back.
    pub fn format_error() -> Self {
        DnsPacket {
            header: DnsHeader {
                id: 0,
                qr: DnsQr::Response,
                opcode: DnsOpcode::Query,
                aa: false,
                tc: false,
                rd: false,
                ra: true,
                z: 0,
                rcode: DnsResponseCode::FormatError,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Build a bare response header/questions for `self` (the decoded query),
    /// with the given rcode and no answer records. Listeners/pipeline fill in
    /// `answers` afterward for success paths.
    pub fn respond_with(&self, rcode: DnsResponseCode) -> Self {
        DnsPacket {
            header: DnsHeader {
                id: self.header.id,
                qr: DnsQr::Response,
                opcode: self.header.opcode,
                aa: false,
                tc: false,
                rd: self.header.rd,
                ra: true,
                z: 0,
                rcode,
                qdcount: self.questions.len() as u16,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additional: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::question::DnsQuestion;
    use crate::dns::resource_record::DnsResourceRecord;
    use crate::dns::types::{DnsQClass, DnsQType};
    use std::net::Ipv4Addr;

    fn sample_query() -> DnsPacket {
        DnsPacket {
            header: DnsHeader {
                id: 42,
                qr: DnsQr::Query,
                opcode: DnsOpcode::Query,
                rd: true,
                ra: false,
                qdcount: 1,
                ..Default::default()
            },
            questions: vec![DnsQuestion {
                name: "example.com.".to_string(),
                qtype: DnsQType::A,
                qclass: DnsQClass::IN,
            }],
            answers: vec![],
            authorities: vec![],
            additional: vec![],
        }
    }

    #[test]
    fn packet_round_trips() {
        let packet = sample_query();
        let bytes = packet.to_wire();
        let decoded = DnsPacket::parse(&bytes).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn respond_with_copies_id_and_questions() {
        let query = sample_query();
        let mut response = query.respond_with(DnsResponseCode::NameError);
        response.answers.push(DnsResourceRecord::a("example.com.", 300, Ipv4Addr::new(1, 2, 3, 4)));

        let bytes = response.to_wire();
        let decoded = DnsPacket::parse(&bytes).unwrap();
        assert_eq!(decoded.header.id, 42);
        assert_eq!(decoded.header.rcode, DnsResponseCode::NameError);
        assert_eq!(decoded.answers.len(), 1);
    }

    #[test]
    fn malformed_bytes_fail_to_parse() {
        let bytes = [0u8, 0, 1];
        assert!(DnsPacket::parse(&bytes).is_err());
    }
}
