mod reader;
mod writer;

pub use reader::{Reader, ReaderError};
pub use writer::Writer;

use indexmap::IndexSet;
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashSet},
    hash::Hash as StdHash,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

// Binary codec used for the upstream wire frames and the raw ledger payload.
// All integers are written big endian so the encoding is stable across hosts.
pub trait Serializer {
    fn write(&self, writer: &mut Writer);

    fn read(reader: &mut Reader) -> Result<Self, ReaderError>
    where
        Self: Sized;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.bytes()
    }

    fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    fn size(&self) -> usize {
        let mut writer = Writer::new();
        self.write(&mut writer);
        writer.total_write()
    }

    fn from_hex(hex: &str) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        match hex::decode(hex) {
            Ok(bytes) => {
                let mut reader = Reader::new(&bytes);
                Self::read(&mut reader)
            }
            Err(_) => Err(ReaderError::InvalidHex),
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ReaderError>
    where
        Self: Sized,
    {
        let mut reader = Reader::new(bytes);
        Self::read(&mut reader)
    }
}

impl Serializer for u8 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u8()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for u16 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u16(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u16()
    }

    fn size(&self) -> usize {
        2
    }
}

impl Serializer for u32 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u32()
    }

    fn size(&self) -> usize {
        4
    }
}

impl Serializer for u64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_u64()
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for i64 {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&(*self as u64));
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(reader.read_u64()? as i64)
    }

    fn size(&self) -> usize {
        8
    }
}

impl Serializer for bool {
    fn write(&self, writer: &mut Writer) {
        writer.write_bool(*self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_bool()
    }

    fn size(&self) -> usize {
        1
    }
}

impl Serializer for String {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_string()
    }
}

impl<T: Serializer> Serializer for Option<T> {
    fn write(&self, writer: &mut Writer) {
        match self {
            Some(value) => {
                writer.write_bool(true);
                value.write(writer);
            }
            None => writer.write_bool(false),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        if reader.read_bool()? {
            Ok(Some(T::read(reader)?))
        } else {
            Ok(None)
        }
    }

    fn size(&self) -> usize {
        1 + match self {
            Some(value) => value.size(),
            None => 0,
        }
    }
}

impl<T: Serializer> Serializer for Vec<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        // Sanity bound against hostile length prefixes
        if len > reader.size() {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }

    fn size(&self) -> usize {
        4 + self.iter().map(Serializer::size).sum::<usize>()
    }
}

impl<T: Serializer + StdHash + Eq> Serializer for HashSet<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.size() {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = HashSet::with_capacity(len.min(1024));
        for _ in 0..len {
            if !items.insert(T::read(reader)?) {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(items)
    }
}

impl<T: Serializer + StdHash + Eq> Serializer for IndexSet<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.size() {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = IndexSet::with_capacity(len.min(1024));
        for _ in 0..len {
            if !items.insert(T::read(reader)?) {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(items)
    }
}

impl<T: Serializer + Ord> Serializer for BTreeSet<T> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for item in self {
            item.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.size() {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = BTreeSet::new();
        for _ in 0..len {
            if !items.insert(T::read(reader)?) {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(items)
    }
}

impl<K: Serializer + Ord, V: Serializer> Serializer for BTreeMap<K, V> {
    fn write(&self, writer: &mut Writer) {
        writer.write_u32(&(self.len() as u32));
        for (key, value) in self {
            key.write(writer);
            value.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let len = reader.read_u32()? as usize;
        if len > reader.size() {
            return Err(ReaderError::InvalidSize);
        }

        let mut items = BTreeMap::new();
        for _ in 0..len {
            let key = K::read(reader)?;
            let value = V::read(reader)?;
            if items.insert(key, value).is_some() {
                return Err(ReaderError::InvalidValue);
            }
        }
        Ok(items)
    }
}

impl<'a, T: Serializer + Clone> Serializer for Cow<'a, T> {
    fn write(&self, writer: &mut Writer) {
        self.as_ref().write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Cow::Owned(T::read(reader)?))
    }

    fn size(&self) -> usize {
        self.as_ref().size()
    }
}

impl Serializer for IpAddr {
    fn write(&self, writer: &mut Writer) {
        match self {
            IpAddr::V4(addr) => {
                writer.write_u8(0);
                writer.write_bytes(&addr.octets());
            }
            IpAddr::V6(addr) => {
                writer.write_u8(1);
                writer.write_bytes(&addr.octets());
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => {
                let bytes: [u8; 4] = reader
                    .read_bytes(4)?
                    .try_into()
                    .map_err(|_| ReaderError::InvalidSize)?;
                Ok(IpAddr::V4(Ipv4Addr::from(bytes)))
            }
            1 => {
                let bytes: [u8; 16] = reader
                    .read_bytes(16)?
                    .try_into()
                    .map_err(|_| ReaderError::InvalidSize)?;
                Ok(IpAddr::V6(Ipv6Addr::from(bytes)))
            }
            _ => Err(ReaderError::InvalidValue),
        }
    }
}

impl Serializer for SocketAddr {
    fn write(&self, writer: &mut Writer) {
        self.ip().write(writer);
        writer.write_u16(self.port());
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let ip = IpAddr::read(reader)?;
        let port = reader.read_u16()?;
        Ok(SocketAddr::new(ip, port))
    }
}
