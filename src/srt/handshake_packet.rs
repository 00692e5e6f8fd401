//! The handshake control packet and its TLV extension records.
use bytes::{Bytes, BytesMut};

use crate::error::Error;
use crate::proto::{Decode, Encode};

use super::header::{Header, PacketType};
use super::sequence::Sequence;

/// 16 + 48 bytes: the common header plus the fixed handshake body, before any extensions.
pub const HANDSHAKE_MIN_SIZE: usize = Header::SIZE + 48;

/// `0x4A17`, written into the extension field of an Induction response to identify SRT (as
/// opposed to plain UDT, which this field format was inherited from).
pub const MAGIC: u16 = 0x4A17;

/// Extension-field bit for an embedded HS-request/HS-response.
pub const EXT_FLAG_HSREQ: u16 = 1;
/// Extension-field bit for an embedded key-material request. This engine never negotiates
/// encryption, but a conformant Induction request still sets only this bit (no actual
/// KM-request extension record is attached).
pub const EXT_FLAG_KMREQ: u16 = 2;
/// Extension-field bit for an embedded config extension (e.g. congestion, stream id).
pub const EXT_FLAG_CONFIG: u16 = 4;

pub const EXT_TYPE_HSREQ: u16 = 1;
pub const EXT_TYPE_HSRESP: u16 = 2;
pub const EXT_TYPE_CONGESTION: u16 = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandshakeType {
    Wavehand,
    Induction,
    Conclusion,
    Agreement,
    Done,
}

impl HandshakeType {
    fn from_wire(v: u32) -> Result<Self, Error> {
        Ok(match v {
            0x0000_0000 => Self::Wavehand,
            0x0000_0001 => Self::Induction,
            0xFFFF_FFFF => Self::Conclusion,
            0xFFFF_FFFE => Self::Agreement,
            0xFFFF_FFFD => Self::Done,
            _ => return Err(Error::BadHandshake("unknown handshake type")),
        })
    }

    fn to_wire(self) -> u32 {
        match self {
            Self::Wavehand => 0x0000_0000,
            Self::Induction => 0x0000_0001,
            Self::Conclusion => 0xFFFF_FFFF,
            Self::Agreement => 0xFFFF_FFFE,
            Self::Done => 0xFFFF_FFFD,
        }
    }
}

/// One TLV extension record: a 16-bit type, a 16-bit length in 4-byte words, then that many
/// words of payload.
#[derive(Clone, Debug)]
pub struct Extension {
    pub ext_type: u16,
    pub payload: Bytes,
}

impl Extension {
    /// Builds the 12-byte HS-request/HS-response body: SRT library version, flags, and TSBPD
    /// delays in milliseconds. Neither side of this core negotiates TSBPD, so the delays are
    /// carried as zero.
    pub fn hs_request(library_version: u32, flags: u32) -> Self {
        let mut buf = BytesMut::with_capacity(16);
        buf.extend_from_slice(&library_version.to_be_bytes());
        buf.extend_from_slice(&flags.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // recv TSBPD delay
        buf.extend_from_slice(&0u16.to_be_bytes()); // send TSBPD delay

        Self {
            ext_type: EXT_TYPE_HSREQ,
            payload: buf.freeze(),
        }
    }

    pub fn hs_response(library_version: u32, flags: u32) -> Self {
        let mut ext = Self::hs_request(library_version, flags);
        ext.ext_type = EXT_TYPE_HSRESP;
        ext
    }

    /// Builds the 4-byte congestion-control-algorithm tag extension (e.g. `"file"`, sent on the
    /// wire as-is; SRT convention writes it reversed as `"elif"`, see the fixture in the
    /// end-to-end tests).
    pub fn congestion(tag: &[u8; 4]) -> Self {
        Self {
            ext_type: EXT_TYPE_CONGESTION,
            payload: Bytes::copy_from_slice(tag),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandshakePacket {
    pub header: Header,
    pub version: u32,
    pub encryption_field: u16,
    pub extension_field: u16,
    pub initial_sequence_number: Sequence,
    pub mtu: u32,
    pub max_flow_window: u32,
    pub handshake_type: HandshakeType,
    pub srt_socket_id: u32,
    pub syn_cookie: u32,
    pub peer_ip_address: u128,
    pub extensions: Vec<Extension>,
}

impl HandshakePacket {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HANDSHAKE_MIN_SIZE {
            return Err(Error::MalformedPacket);
        }
        if Header::classify(buf)? != PacketType::Control {
            return Err(Error::MalformedPacket);
        }

        let header = Header::decode(&buf[..Header::SIZE]).map_err(|_| Error::MalformedPacket)?;

        let b = &buf[Header::SIZE..];
        let version = u32::from_be_bytes(b[0..4].try_into().unwrap());
        let encryption_field = u16::from_be_bytes(b[4..6].try_into().unwrap());
        let extension_field = u16::from_be_bytes(b[6..8].try_into().unwrap());
        let initial_sequence_number = Sequence::from(u32::from_be_bytes(b[8..12].try_into().unwrap()));
        let mtu = u32::from_be_bytes(b[12..16].try_into().unwrap());
        let max_flow_window = u32::from_be_bytes(b[16..20].try_into().unwrap());
        let handshake_type = HandshakeType::from_wire(u32::from_be_bytes(b[20..24].try_into().unwrap()))?;
        let srt_socket_id = u32::from_be_bytes(b[24..28].try_into().unwrap());
        let syn_cookie = u32::from_be_bytes(b[28..32].try_into().unwrap());
        let peer_ip_address = u128::from_be_bytes(b[32..48].try_into().unwrap());

        let mut extensions = Vec::new();
        let mut st = HANDSHAKE_MIN_SIZE;
        while st < buf.len() {
            if st + 4 > buf.len() {
                return Err(Error::MalformedPacket);
            }

            let ext_type = u16::from_be_bytes(buf[st..st + 2].try_into().unwrap());
            let len_words = u16::from_be_bytes(buf[st + 2..st + 4].try_into().unwrap());
            let next = st + 4 + 4 * len_words as usize;

            if next > buf.len() {
                return Err(Error::MalformedPacket);
            }

            extensions.push(Extension {
                ext_type,
                payload: Bytes::copy_from_slice(&buf[st + 4..next]),
            });

            st = next;
        }

        Ok(Self {
            header,
            version,
            encryption_field,
            extension_field,
            initial_sequence_number,
            mtu,
            max_flow_window,
            handshake_type,
            srt_socket_id,
            syn_cookie,
            peer_ip_address,
            extensions,
        })
    }

    pub fn encode(&self) -> Bytes {
        let ext_len: usize = self.extensions.iter().map(|e| 4 + e.payload.len()).sum();
        let mut buf = BytesMut::with_capacity(HANDSHAKE_MIN_SIZE + ext_len);

        let header = Header {
            oct0: self.header.oct0 | (1 << 31),
            ..self.header
        };
        header.encode(&mut buf).expect("encoding to an in-memory buffer cannot fail");

        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&self.encryption_field.to_be_bytes());
        buf.extend_from_slice(&self.extension_field.to_be_bytes());
        buf.extend_from_slice(&self.initial_sequence_number.get().to_be_bytes());
        buf.extend_from_slice(&self.mtu.to_be_bytes());
        buf.extend_from_slice(&self.max_flow_window.to_be_bytes());
        buf.extend_from_slice(&self.handshake_type.to_wire().to_be_bytes());
        buf.extend_from_slice(&self.srt_socket_id.to_be_bytes());
        buf.extend_from_slice(&self.syn_cookie.to_be_bytes());
        buf.extend_from_slice(&self.peer_ip_address.to_be_bytes());

        for ext in &self.extensions {
            buf.extend_from_slice(&ext.ext_type.to_be_bytes());
            let len_words = (ext.payload.len() / 4) as u16;
            buf.extend_from_slice(&len_words.to_be_bytes());
            buf.extend_from_slice(&ext.payload);
        }

        buf.freeze()
    }

    /// Looks up the first extension of the given type, if any.
    pub fn extension(&self, ext_type: u16) -> Option<&Extension> {
        self.extensions.iter().find(|e| e.ext_type == ext_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> HandshakePacket {
        HandshakePacket {
            header: Header {
                oct0: 0,
                oct1: 0,
                timestamp: 0,
                destination_socket_id: 0x209e_7d6d,
            },
            version: 5,
            encryption_field: 0,
            extension_field: MAGIC,
            initial_sequence_number: Sequence::from(12345),
            mtu: 1500,
            max_flow_window: 0x2000,
            handshake_type: HandshakeType::Induction,
            srt_socket_id: 42,
            syn_cookie: 0xdead_beef,
            peer_ip_address: 0,
            extensions: Vec::new(),
        }
    }

    #[test]
    fn test_round_trip_no_extensions() {
        let p = base();
        let buf = p.encode();
        let decoded = HandshakePacket::decode(&buf).unwrap();

        assert_eq!(decoded.version, 5);
        assert_eq!(decoded.handshake_type, HandshakeType::Induction);
        assert_eq!(decoded.syn_cookie, 0xdead_beef);
        assert!(decoded.extensions.is_empty());
    }

    #[test]
    fn test_round_trip_with_extensions() {
        let mut p = base();
        p.handshake_type = HandshakeType::Conclusion;
        p.extensions.push(Extension::hs_request(0x0001_0203, 0));
        p.extensions.push(Extension::congestion(b"file"));

        let buf = p.encode();
        let decoded = HandshakePacket::decode(&buf).unwrap();

        assert_eq!(decoded.extensions.len(), 2);
        assert_eq!(decoded.extension(EXT_TYPE_HSREQ).unwrap().payload.len(), 12);
        assert_eq!(&decoded.extension(EXT_TYPE_CONGESTION).unwrap().payload[..], b"file");
    }

    #[test]
    fn test_truncated_extension_is_malformed() {
        let p = base();
        let mut buf = p.encode().to_vec();
        // Declare a 4-word extension but don't provide the bytes.
        buf.extend_from_slice(&EXT_TYPE_CONGESTION.to_be_bytes());
        buf.extend_from_slice(&4u16.to_be_bytes());

        assert!(matches!(HandshakePacket::decode(&buf), Err(Error::MalformedPacket)));
    }

    #[test]
    fn test_too_short_is_malformed() {
        assert!(matches!(HandshakePacket::decode(&[0u8; 10]), Err(Error::MalformedPacket)));
    }
}
