//! Typed views over data and (non-handshake) control packets.
//!
//! Handshake packets are large enough, and carry enough extension structure, to warrant their
//! own module; see [`super::handshake_packet`].
use bytes::{Bytes, BytesMut};

use crate::error::Error;
use crate::proto::{Decode, Encode};

use super::header::{Header, PacketType};
use super::message::MessageNumber;
use super::sequence::Sequence;

bitflags::bitflags! {
    /// The six message-boundary/ordering/encryption/retransmission flags packed into the top
    /// byte of a data packet's message-number field (bytes `[4..8)`, bits `31..26`).
    #[derive(Default)]
    pub struct DataFlags: u8 {
        const FIRST         = 0b1000_0000;
        const LAST          = 0b0100_0000;
        const ORDERED       = 0b0010_0000;
        const ENC_EVEN      = 0b0000_1000;
        const ENC_ODD       = 0b0001_0000;
        const RETRANSMITTED = 0b0000_0100;
    }
}

impl DataFlags {
    #[inline]
    pub fn is_first(self) -> bool {
        self.contains(Self::FIRST)
    }

    #[inline]
    pub fn is_last(self) -> bool {
        self.contains(Self::LAST)
    }

    #[inline]
    pub fn is_single(self) -> bool {
        self.contains(Self::FIRST | Self::LAST)
    }
}

/// An owned SRT data packet: the common header, a 26-bit message number plus flags packed into
/// the same 32-bit field, and the payload.
#[derive(Clone, Debug)]
pub struct DataPacket {
    pub sequence: Sequence,
    pub flags: DataFlags,
    pub message_number: MessageNumber,
    pub timestamp: u32,
    pub destination_socket_id: u32,
    pub payload: Bytes,
}

impl DataPacket {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Header::SIZE {
            return Err(Error::MalformedPacket);
        }

        let header = Header::decode(&buf[..Header::SIZE]).map_err(|_| Error::MalformedPacket)?;
        if header.packet_type() != PacketType::Data {
            return Err(Error::MalformedPacket);
        }

        let flags = DataFlags::from_bits_truncate((header.oct1 >> 24) as u8);
        let message_number = MessageNumber::from(header.oct1 & 0x03FF_FFFF);

        Ok(Self {
            sequence: Sequence::from(header.oct0),
            flags,
            message_number,
            timestamp: header.timestamp,
            destination_socket_id: header.destination_socket_id,
            payload: Bytes::copy_from_slice(&buf[Header::SIZE..]),
        })
    }

    pub fn encode(&self) -> Bytes {
        let header = Header {
            oct0: self.sequence.get(),
            oct1: ((self.flags.bits() as u32) << 24) | (self.message_number.get() & 0x03FF_FFFF),
            timestamp: self.timestamp,
            destination_socket_id: self.destination_socket_id,
        };

        let mut buf = BytesMut::with_capacity(Header::SIZE + self.payload.len());
        header.encode(&mut buf).expect("encoding to an in-memory buffer cannot fail");
        buf.extend_from_slice(&self.payload);

        buf.freeze()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ControlPacketType {
    Handshake = 0x0000,
    Keepalive = 0x0001,
    Ack = 0x0002,
    Nak = 0x0003,
    CongestionWarning = 0x0004,
    Shutdown = 0x0005,
    AckAck = 0x0006,
    DropRequest = 0x0007,
    PeerError = 0x0008,
    UserDefined = 0x7FFF,
}

impl ControlPacketType {
    fn from_wire(v: u16) -> Result<Self, Error> {
        Ok(match v {
            0x0000 => Self::Handshake,
            0x0001 => Self::Keepalive,
            0x0002 => Self::Ack,
            0x0003 => Self::Nak,
            0x0004 => Self::CongestionWarning,
            0x0005 => Self::Shutdown,
            0x0006 => Self::AckAck,
            0x0007 => Self::DropRequest,
            0x0008 => Self::PeerError,
            0x7FFF => Self::UserDefined,
            _ => return Err(Error::MalformedPacket),
        })
    }
}

/// A non-handshake control packet: keepalive, (light-)ack, nak, shutdown, ack-ack, congestion
/// warning or drop-request. All of these share the same 16-byte-header shape with a single
/// type-specific 32-bit field, so one struct covers them; [`super::handshake_packet`] has the
/// richer handshake body.
#[derive(Clone, Debug)]
pub struct ControlPacket {
    pub control_type: ControlPacketType,
    pub subtype: u16,
    pub type_specific: u32,
    pub timestamp: u32,
    pub destination_socket_id: u32,
}

impl ControlPacket {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Header::SIZE {
            return Err(Error::MalformedPacket);
        }

        let header = Header::decode(&buf[..Header::SIZE]).map_err(|_| Error::MalformedPacket)?;
        if header.packet_type() != PacketType::Control {
            return Err(Error::MalformedPacket);
        }

        let control_type = ControlPacketType::from_wire(((header.oct0 >> 16) as u16) & 0x7FFF)?;
        let subtype = (header.oct0 & 0xFFFF) as u16;
        let type_specific = header.oct1;

        Ok(Self {
            control_type,
            subtype,
            type_specific,
            timestamp: header.timestamp,
            destination_socket_id: header.destination_socket_id,
        })
    }

    pub fn encode(&self) -> Bytes {
        let oct0 = (0x8000u32 | (self.control_type as u32 & 0x7FFF)) << 16 | self.subtype as u32;
        let header = Header {
            oct0,
            oct1: self.type_specific,
            timestamp: self.timestamp,
            destination_socket_id: self.destination_socket_id,
        };

        let mut buf = BytesMut::with_capacity(Header::SIZE);
        header.encode(&mut buf).expect("encoding to an in-memory buffer cannot fail");

        buf.freeze()
    }
}

/// Returns `Control` or `Data` for any buffer at least [`Header::SIZE`] bytes long.
pub fn classify(buf: &[u8]) -> Result<PacketType, Error> {
    Header::classify(buf)
}
