mod header;
mod name;
mod packet;
mod question;
mod resource_record;
mod traits;
mod types;

pub use header::DnsHeader;
pub use name::{decode_name, encode_name, fingerprint, normalize};
pub use packet::DnsPacket;
pub use question::DnsQuestion;
pub use resource_record::{DnsResourceRecord, RData};
pub use traits::DnsWireFormat;
pub use types::{DnsOpcode, DnsQClass, DnsQType, DnsQr, DnsResponseCode};
