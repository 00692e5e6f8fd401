//! Byte-level `Encode`/`Decode` traits shared by the wire codec.
use std::io::{self, Read, Write};
use std::mem;

pub trait Decode: Sized {
    type Error;

    fn decode<R>(reader: R) -> Result<Self, Self::Error>
    where
        R: Read;
}

pub trait Encode {
    type Error;

    fn encode<W>(&self, writer: W) -> Result<(), Self::Error>
    where
        W: Write;

    fn encode_to_vec(&self) -> Result<Vec<u8>, Self::Error> {
        let mut buf = Vec::with_capacity(self.size_hint());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Returns a hint about the expected size of `self` when encoded. Purely advisory.
    #[inline]
    fn size_hint(&self) -> usize {
        0
    }
}

macro_rules! impl_uint_be {
    ($($t:ty),*$(,)?) => {
        $(
            impl Encode for $t {
                type Error = io::Error;

                fn encode<W>(&self, mut writer: W) -> Result<(), Self::Error>
                where
                    W: Write,
                {
                    writer.write_all(&self.to_be_bytes())
                }

                #[inline]
                fn size_hint(&self) -> usize {
                    mem::size_of::<Self>()
                }
            }

            impl Decode for $t {
                type Error = io::Error;

                fn decode<R>(mut reader: R) -> Result<Self, Self::Error>
                where
                    R: Read,
                {
                    let mut buf = [0; mem::size_of::<Self>()];
                    reader.read_exact(&mut buf)?;
                    Ok(Self::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_uint_be! {
    u8,
    u16,
    u32,
    u64,
    u128,
}

impl Encode for [u8] {
    type Error = io::Error;

    fn encode<W>(&self, mut writer: W) -> Result<(), Self::Error>
    where
        W: Write,
    {
        writer.write_all(self)
    }

    fn size_hint(&self) -> usize {
        self.len()
    }
}
