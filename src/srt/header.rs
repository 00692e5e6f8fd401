//! The 16-byte header common to every SRT packet (control and data alike).
use std::io::{Read, Write};

use crate::error::Error;
use crate::proto::{Decode, Encode};

/// `oct0`/`oct1` carry different fields depending on [`PacketType`]; see [`DataPacket`] and
/// [`ControlPacket`] for the typed views.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub(crate) oct0: u32,
    pub(crate) oct1: u32,
    pub timestamp: u32,
    pub destination_socket_id: u32,
}

impl Header {
    pub const SIZE: usize = 16;

    #[inline]
    pub fn packet_type(&self) -> PacketType {
        if self.oct0 & (1 << 31) == 0 {
            PacketType::Data
        } else {
            PacketType::Control
        }
    }

    #[inline]
    pub fn set_packet_type(&mut self, ty: PacketType) {
        match ty {
            PacketType::Data => self.oct0 &= !(1 << 31),
            PacketType::Control => self.oct0 |= 1 << 31,
        }
    }

    /// Classifies a raw buffer without fully decoding it.
    ///
    /// Returns `MalformedPacket` if `buf` is shorter than [`Header::SIZE`].
    pub fn classify(buf: &[u8]) -> Result<PacketType, Error> {
        if buf.len() < Self::SIZE {
            return Err(Error::MalformedPacket);
        }

        if buf[0] & 0x80 == 0 {
            Ok(PacketType::Data)
        } else {
            Ok(PacketType::Control)
        }
    }
}

impl Encode for Header {
    type Error = Error;

    fn encode<W>(&self, mut writer: W) -> Result<(), Self::Error>
    where
        W: Write,
    {
        self.oct0.encode(&mut writer).map_err(|_| Error::Io(std::io::ErrorKind::WriteZero.into()))?;
        self.oct1.encode(&mut writer).map_err(|_| Error::Io(std::io::ErrorKind::WriteZero.into()))?;
        self.timestamp.encode(&mut writer).map_err(|_| Error::Io(std::io::ErrorKind::WriteZero.into()))?;
        self.destination_socket_id
            .encode(&mut writer)
            .map_err(|_| Error::Io(std::io::ErrorKind::WriteZero.into()))?;
        Ok(())
    }
}

impl Decode for Header {
    type Error = Error;

    fn decode<R>(mut reader: R) -> Result<Self, Self::Error>
    where
        R: Read,
    {
        let oct0 = u32::decode(&mut reader).map_err(|_| Error::MalformedPacket)?;
        let oct1 = u32::decode(&mut reader).map_err(|_| Error::MalformedPacket)?;
        let timestamp = u32::decode(&mut reader).map_err(|_| Error::MalformedPacket)?;
        let destination_socket_id = u32::decode(&mut reader).map_err(|_| Error::MalformedPacket)?;

        Ok(Self {
            oct0,
            oct1,
            timestamp,
            destination_socket_id,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    Data,
    Control,
}
