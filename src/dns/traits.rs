use std::io;

/// Wire-format codec for DNS packet components. Decoding takes the full
/// packet buffer plus an offset (rather than a plain byte slice) so that
/// compression pointers can be followed back into earlier sections.
pub trait DnsWireFormat: Sized {
    fn to_wire(&self, out: &mut Vec<u8>);

    fn from_wire(buf: &[u8], pos: usize) -> io::Result<(Self, usize)>;
}
