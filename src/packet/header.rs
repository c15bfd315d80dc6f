use std::fmt::{Debug, Display, Formatter};
use std::net::Ipv4Addr;

use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};

use crate::path::ron_path::RonPath;

/// Reasons for rejecting a received header. A packet with an undecodable header is discarded
///  as a whole.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    Truncated { required: usize, available: usize },
    InvalidForwardFlag(u8),
    HopCountOutOfRange { hops: u8, num_intermediates: u8 },
}
impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated { required, available } => {
                write!(f, "truncated packet header: required {} bytes, {} available", required, available)
            }
            DecodeError::InvalidForwardFlag(flag) => {
                write!(f, "invalid forward flag {:#x}", flag)
            }
            DecodeError::HopCountOutOfRange { hops, num_intermediates } => {
                write!(f, "hop count {} exceeds the number of intermediates {}", hops, num_intermediates)
            }
        }
    }
}
impl std::error::Error for DecodeError {}


/// The header in front of every overlay datagram, carrying an explicit source route - see the
///  crate documentation for the wire layout.
#[derive(Clone, Eq, PartialEq)]
pub struct PacketHeader {
    forward: bool,
    hops: u8,
    intermediates: Vec<Ipv4Addr>,
    destination: Ipv4Addr,
    origin: Ipv4Addr,
    seq: u32,
}

impl Debug for PacketHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[#{} {}->{} hop {}/{:?}{}]",
               self.seq,
               self.origin,
               self.destination,
               self.hops,
               self.intermediates,
               if self.forward { " fwd" } else { "" },
        )
    }
}

impl Display for PacketHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Packet {} from {} to {}", self.seq, self.origin, self.destination)?;
        if self.forward {
            write!(f, " on hop # {} with next destination {}", self.hops, self.next_dest())?;
        }
        Ok(())
    }
}

impl PacketHeader {
    pub const FIXED_LEN: usize = 3 + size_of::<u32>() * 3;
    const ADDR_LEN: usize = size_of::<u32>();

    /// A header for sending directly to `destination`, without intermediate hops
    pub fn new(destination: Ipv4Addr) -> PacketHeader {
        PacketHeader {
            forward: false,
            hops: 0,
            intermediates: Vec::new(),
            destination,
            origin: Ipv4Addr::UNSPECIFIED,
            seq: 0,
        }
    }

    /// A header for sending to `destination` through a single relay
    pub fn via(destination: Ipv4Addr, intermediate: Ipv4Addr) -> PacketHeader {
        PacketHeader {
            forward: true,
            hops: 0,
            intermediates: vec![intermediate],
            destination,
            origin: Ipv4Addr::UNSPECIFIED,
            seq: 0,
        }
    }

    /// Flattens a path into a header. The path's first hop is its origin, the last hop its
    ///  destination, everything in between becomes intermediates. For multi-peer hops, the
    ///  first peer is used.
    ///
    /// A single-hop path is just a destination, and the origin is left unspecified.
    pub fn from_path(path: &RonPath) -> anyhow::Result<PacketHeader> {
        let hops = path.hops();
        let (Some(first), Some(last)) = (hops.first(), hops.last()) else {
            bail!("cannot build a packet header from an empty path");
        };

        let mut header = PacketHeader::new(last.first_peer().address);
        if hops.len() > 1 {
            header.origin = first.first_peer().address;
            for hop in &hops[1..hops.len()-1] {
                header.add_dest(hop.first_peer().address)?;
            }
        }
        Ok(header)
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    pub fn hops(&self) -> u8 {
        self.hops
    }

    pub fn intermediates(&self) -> &[Ipv4Addr] {
        &self.intermediates
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
    }

    pub fn origin(&self) -> Ipv4Addr {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Ipv4Addr) {
        self.origin = origin;
    }

    pub fn final_dest(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn set_destination(&mut self, destination: Ipv4Addr) {
        self.destination = destination;
    }

    /// The address this packet must be sent to next: the intermediate at position `hops`, or
    ///  the final destination once all intermediates were passed
    pub fn next_dest(&self) -> Ipv4Addr {
        self.intermediates.get(self.hops as usize)
            .copied()
            .unwrap_or(self.destination)
    }

    /// true if there are no more relays between this packet and its final destination
    pub fn has_arrived(&self) -> bool {
        self.final_dest() == self.next_dest()
    }

    /// Called by a relay before forwarding. Returns the new hop count.
    pub fn incr_hops(&mut self) -> anyhow::Result<u8> {
        if self.hops as usize >= self.intermediates.len() {
            bail!("packet {:?} has already passed all of its intermediate hops", self);
        }
        self.hops += 1;
        Ok(self.hops)
    }

    /// Appends a relay to the route. A header with relays is an overlay packet.
    pub fn add_dest(&mut self, addr: Ipv4Addr) -> anyhow::Result<()> {
        if self.intermediates.len() >= u8::MAX as usize {
            bail!("a packet header can hold at most {} intermediate addresses", u8::MAX);
        }
        self.intermediates.push(addr);
        self.forward = true;
        Ok(())
    }

    /// Turns the header around for the return trip: origin and destination swap places, the
    ///  relays are visited in reverse order, and the hop count starts over.
    pub fn reverse_path(&mut self) {
        self.intermediates.reverse();
        std::mem::swap(&mut self.origin, &mut self.destination);
        self.hops = 0;
    }

    pub fn serialized_len(&self) -> usize {
        Self::FIXED_LEN + Self::ADDR_LEN * self.intermediates.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.reserve(self.serialized_len());

        buf.put_u8(self.forward.into());
        buf.put_u8(self.hops);
        buf.put_u8(self.intermediates.len() as u8); // add_dest limits the length
        buf.put_u32(self.seq);
        buf.put_u32(self.destination.to_bits());
        buf.put_u32(self.origin.to_bits());
        for addr in &self.intermediates {
            buf.put_u32(addr.to_bits());
        }
    }

    /// Reads a header from the start of `buf`, advancing `buf` to the payload that follows.
    ///  `buf` is left untouched if the header can not be decoded.
    pub fn deser(buf: &mut &[u8]) -> Result<PacketHeader, DecodeError> {
        if buf.len() < Self::FIXED_LEN {
            return Err(DecodeError::Truncated { required: Self::FIXED_LEN, available: buf.len() });
        }

        let mut b: &[u8] = buf;
        let forward = match b.get_u8() {
            0 => false,
            1 => true,
            n => return Err(DecodeError::InvalidForwardFlag(n)),
        };
        let hops = b.get_u8();
        let num_intermediates = b.get_u8();
        if hops > num_intermediates {
            return Err(DecodeError::HopCountOutOfRange { hops, num_intermediates });
        }

        let required = Self::FIXED_LEN + Self::ADDR_LEN * num_intermediates as usize;
        if buf.len() < required {
            return Err(DecodeError::Truncated { required, available: buf.len() });
        }

        let seq = b.get_u32();
        let destination = Ipv4Addr::from_bits(b.get_u32());
        let origin = Ipv4Addr::from_bits(b.get_u32());
        let intermediates = (0..num_intermediates)
            .map(|_| Ipv4Addr::from_bits(b.get_u32()))
            .collect();

        *buf = b;
        Ok(PacketHeader {
            forward,
            hops,
            intermediates,
            destination,
            origin,
            seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;
    use crate::path::ron_path::RonPath;
    use crate::test_util::peers::test_peer_from_number;

    fn addr(s: &str) -> Ipv4Addr {
        Ipv4Addr::from_str(s).unwrap()
    }

    fn header(forward: bool, hops: u8, intermediates: &[&str], seq: u32, dest: &str, origin: &str) -> PacketHeader {
        PacketHeader {
            forward,
            hops,
            intermediates: intermediates.iter().map(|s| addr(s)).collect(),
            destination: addr(dest),
            origin: addr(origin),
            seq,
        }
    }

    #[test]
    fn test_new() {
        let h = PacketHeader::new(addr("10.0.0.5"));
        assert!(!h.is_forward());
        assert_eq!(h.hops(), 0);
        assert!(h.intermediates().is_empty());
        assert_eq!(h.final_dest(), addr("10.0.0.5"));
        assert_eq!(h.next_dest(), addr("10.0.0.5"));
        assert!(h.has_arrived());
        assert_eq!(h.serialized_len(), 15);
    }

    #[test]
    fn test_via() {
        let h = PacketHeader::via(addr("10.0.0.5"), addr("10.0.0.9"));
        assert!(h.is_forward());
        assert_eq!(h.intermediates(), &[addr("10.0.0.9")]);
        assert_eq!(h.next_dest(), addr("10.0.0.9"));
        assert!(!h.has_arrived());
        assert_eq!(h.serialized_len(), 19);
    }

    #[rstest]
    #[case::direct(header(false, 0, &[], 0, "1.2.3.4", "5.6.7.8"),
        b"\0\0\0\0\0\0\0\x01\x02\x03\x04\x05\x06\x07\x08")]
    #[case::one_relay(header(true, 0, &["9.9.9.9"], 0x01020304, "1.2.3.4", "5.6.7.8"),
        b"\x01\0\x01\x01\x02\x03\x04\x01\x02\x03\x04\x05\x06\x07\x08\x09\x09\x09\x09")]
    #[case::two_relays_one_passed(header(true, 1, &["9.9.9.9", "10.0.0.1"], 7, "1.2.3.4", "5.6.7.8"),
        b"\x01\x01\x02\0\0\0\x07\x01\x02\x03\x04\x05\x06\x07\x08\x09\x09\x09\x09\x0a\0\0\x01")]
    fn test_ser(#[case] header: PacketHeader, #[case] expected: &[u8]) {
        let mut buf = BytesMut::new();
        header.ser(&mut buf);
        assert_eq!(&buf, expected);
        assert_eq!(buf.len(), header.serialized_len());
    }

    #[rstest]
    #[case::direct(header(false, 0, &[], 0, "1.2.3.4", "5.6.7.8"))]
    #[case::relayed(header(true, 1, &["9.9.9.9"], u32::MAX, "1.2.3.4", "0.0.0.0"))]
    #[case::added_without_forward(header(false, 0, &["9.9.9.9", "8.8.8.8", "7.7.7.7"], 12345, "1.2.3.4", "5.6.7.8"))]
    fn test_deser_consumes_header_only(#[case] original: PacketHeader) {
        let mut buf = BytesMut::new();
        original.ser(&mut buf);
        buf.put_slice(b"payload");

        let mut b: &[u8] = &buf;
        let deser = PacketHeader::deser(&mut b).unwrap();
        assert_eq!(deser, original);
        assert_eq!(b, b"payload");
    }

    #[test]
    fn test_max_intermediates() {
        let mut original = PacketHeader::new(addr("1.2.3.4"));
        for i in 0..255u32 {
            original.add_dest(Ipv4Addr::from_bits(0x0a000000 + i)).unwrap();
        }
        original.incr_hops().unwrap();
        original.set_seq(99);
        assert!(original.add_dest(addr("10.1.1.1")).is_err());

        let mut buf = BytesMut::new();
        original.ser(&mut buf);
        assert_eq!(buf.len(), 15 + 4*255);

        let mut b: &[u8] = &buf;
        assert_eq!(PacketHeader::deser(&mut b).unwrap(), original);
        assert!(b.is_empty());
    }

    #[rstest]
    #[case::empty(b"", DecodeError::Truncated { required: 15, available: 0 })]
    #[case::short_fixed(b"\0\0\0\0\0\0\0\x01\x02\x03\x04\x05\x06\x07", DecodeError::Truncated { required: 15, available: 14 })]
    #[case::short_intermediates(b"\x01\0\x02\0\0\0\0\x01\x02\x03\x04\x05\x06\x07\x08\x09\x09\x09\x09", DecodeError::Truncated { required: 23, available: 19 })]
    #[case::forward_flag(b"\x02\0\0\0\0\0\0\x01\x02\x03\x04\x05\x06\x07\x08", DecodeError::InvalidForwardFlag(2))]
    #[case::hops(b"\x01\x02\x01\0\0\0\0\x01\x02\x03\x04\x05\x06\x07\x08\x09\x09\x09\x09", DecodeError::HopCountOutOfRange { hops: 2, num_intermediates: 1 })]
    fn test_deser_invalid(#[case] data: &[u8], #[case] expected: DecodeError) {
        let mut b: &[u8] = data;
        assert_eq!(PacketHeader::deser(&mut b), Err(expected));
        assert_eq!(b, data);
    }

    #[test]
    fn test_next_dest_progression() {
        let mut h = PacketHeader::new(addr("10.0.0.100"));
        h.add_dest(addr("10.0.0.1")).unwrap();
        h.add_dest(addr("10.0.0.2")).unwrap();
        assert!(h.is_forward());

        assert_eq!(h.next_dest(), addr("10.0.0.1"));
        assert_eq!(h.incr_hops().unwrap(), 1);
        assert_eq!(h.next_dest(), addr("10.0.0.2"));
        assert!(!h.has_arrived());
        assert_eq!(h.incr_hops().unwrap(), 2);
        assert_eq!(h.next_dest(), h.final_dest());
        assert!(h.has_arrived());

        assert!(h.incr_hops().is_err());
        assert_eq!(h.hops(), 2);
    }

    #[test]
    fn test_reverse_path() {
        let mut h = header(true, 2, &["10.0.0.1", "10.0.0.2", "10.0.0.3"], 5, "10.0.0.100", "10.0.0.50");
        h.reverse_path();

        assert_eq!(h.final_dest(), addr("10.0.0.50"));
        assert_eq!(h.origin(), addr("10.0.0.100"));
        assert_eq!(h.hops(), 0);
        assert_eq!(h.intermediates(), &[addr("10.0.0.3"), addr("10.0.0.2"), addr("10.0.0.1")]);
        assert_eq!(h.next_dest(), addr("10.0.0.3"));
        assert_eq!(h.seq(), 5);
        assert!(h.is_forward());
    }

    #[test]
    fn test_reverse_path_direct() {
        let mut h = header(false, 0, &[], 1, "10.0.0.100", "10.0.0.50");
        h.reverse_path();
        assert_eq!(h, header(false, 0, &[], 1, "10.0.0.50", "10.0.0.100"));
        assert_eq!(h.next_dest(), addr("10.0.0.50"));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = header(true, 0, &["10.0.0.1"], 1, "10.0.0.100", "10.0.0.50");
        let mut copy = original.clone();
        copy.add_dest(addr("10.0.0.2")).unwrap();
        copy.reverse_path();

        assert_eq!(original.intermediates(), &[addr("10.0.0.1")]);
        assert_eq!(copy.intermediates(), &[addr("10.0.0.2"), addr("10.0.0.1")]);
    }

    #[rstest]
    #[case::direct(header(false, 0, &[], 3, "10.0.0.100", "10.0.0.50"), "Packet 3 from 10.0.0.50 to 10.0.0.100")]
    #[case::forward(header(true, 1, &["10.0.0.1", "10.0.0.2"], 4, "10.0.0.100", "10.0.0.50"), "Packet 4 from 10.0.0.50 to 10.0.0.100 on hop # 1 with next destination 10.0.0.2")]
    fn test_display(#[case] header: PacketHeader, #[case] expected: &str) {
        assert_eq!(header.to_string(), expected);
    }

    #[test]
    fn test_from_path() {
        let mut path = RonPath::from_peer(test_peer_from_number(1));
        path.add_hop(test_peer_from_number(2).into());
        path.add_hop(test_peer_from_number(3).into());
        path.add_hop(test_peer_from_number(9).into());

        let h = PacketHeader::from_path(&path).unwrap();
        assert_eq!(h.origin(), test_peer_from_number(1).address);
        assert_eq!(h.final_dest(), test_peer_from_number(9).address);
        assert_eq!(h.intermediates(), &[test_peer_from_number(2).address, test_peer_from_number(3).address]);
        assert_eq!(h.hops(), 0);
        assert!(h.is_forward());
    }

    #[test]
    fn test_from_single_hop_path() {
        let path = RonPath::from_peer(test_peer_from_number(4));
        let h = PacketHeader::from_path(&path).unwrap();
        assert_eq!(h, PacketHeader::new(test_peer_from_number(4).address));
    }
}
