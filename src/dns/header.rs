use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use serde::{Deserialize, Serialize};

use super::traits::DnsWireFormat;
use super::types::{DnsOpcode, DnsQr, DnsResponseCode};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsHeader {
    pub id: u16,
    pub qr: DnsQr,
    pub opcode: DnsOpcode,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub z: u8,
    pub rcode: DnsResponseCode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl DnsWireFormat for DnsHeader {
    fn to_wire(&self, out: &mut Vec<u8>) {
        let mut bytes = Vec::with_capacity(12);
        let mut writer = BitWriter::endian(&mut bytes, BigEndian);
        writer.write_var::<u16>(16, self.id).expect("fixed-width write");
        writer
            .write_var::<u8>(1, bool::from(self.qr) as u8)
            .expect("fixed-width write");
        writer
            .write_var::<u8>(4, u8::from(self.opcode))
            .expect("fixed-width write");
        writer.write_var::<u8>(1, self.aa as u8).expect("fixed-width write");
        writer.write_var::<u8>(1, self.tc as u8).expect("fixed-width write");
        writer.write_var::<u8>(1, self.rd as u8).expect("fixed-width write");
        writer.write_var::<u8>(1, self.ra as u8).expect("fixed-width write");
        writer.write_var::<u8>(3, self.z).expect("fixed-width write");
        writer
            .write_var::<u8>(4, u8::from(self.rcode))
            .expect("fixed-width write");
        writer.write_var::<u16>(16, self.qdcount).expect("fixed-width write");
        writer.write_var::<u16>(16, self.ancount).expect("fixed-width write");
        writer.write_var::<u16>(16, self.nscount).expect("fixed-width write");
        writer.write_var::<u16>(16, self.arcount).expect("fixed-width write");
        writer.byte_align().expect("byte align");
        out.extend_from_slice(&bytes);
    }

    fn from_wire(buf: &[u8], pos: usize) -> io::Result<(Self, usize)> {
        let slice = buf
            .get(pos..pos + 12)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated header"))?;
        let mut reader = BitReader::endian(slice, BigEndian);
        let header = DnsHeader {
            id: reader.read_var::<u16>(16)?,
            qr: DnsQr::from(reader.read_var::<u8>(1)? == 1),
            opcode: DnsOpcode::from(reader.read_var::<u8>(4)?),
            aa: reader.read_var::<u8>(1)? == 1,
            tc: reader.read_var::<u8>(1)? == 1,
            rd: reader.read_var::<u8>(1)? == 1,
            ra: reader.read_var::<u8>(1)? == 1,
            z: reader.read_var::<u8>(3)?,
            rcode: DnsResponseCode::from(reader.read_var::<u8>(4)?),
            qdcount: reader.read_var::<u16>(16)?,
            ancount: reader.read_var::<u16>(16)?,
            nscount: reader.read_var::<u16>(16)?,
            arcount: reader.read_var::<u16>(16)?,
        };
        Ok((header, pos + 12))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = DnsHeader {
            id: 0xBEEF,
            qr: DnsQr::Response,
            opcode: DnsOpcode::Query,
            aa: false,
            tc: false,
            rd: true,
            ra: true,
            z: 0,
            rcode: DnsResponseCode::NoError,
            qdcount: 1,
            ancount: 1,
            nscount: 0,
            arcount: 0,
        };
        let mut bytes = Vec::new();
        header.to_wire(&mut bytes);
        assert_eq!(bytes.len(), 12);

        let (decoded, end) = DnsHeader::from_wire(&bytes, 0).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(end, 12);
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = vec![0u8; 4];
        assert!(DnsHeader::from_wire(&bytes, 0).is_err());
    }
}
