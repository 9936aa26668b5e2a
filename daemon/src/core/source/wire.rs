use crate::core::error::PipelineError;
use lumenlake_common::{
    config::{MAX_WIRE_FRAME_SIZE, WIRE_PROTOCOL_VERSION},
    ledger::RawLedger,
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// Frames of the upstream wire: a u32 big-endian length prefix followed by
// the packet body. The server opens with Hello announcing its wire
// version; a version the client does not know is a schema mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Hello { wire_version: u8 },
    Request { start_ledger: u32 },
    Get { sequence: u32 },
    Ledger(RawLedger),
    NotFound { sequence: u32 },
    Error { message: String },
}

impl Packet {
    pub fn hello() -> Self {
        Packet::Hello {
            wire_version: WIRE_PROTOCOL_VERSION,
        }
    }
}

impl Serializer for Packet {
    fn write(&self, writer: &mut Writer) {
        match self {
            Packet::Hello { wire_version } => {
                writer.write_u8(0);
                writer.write_u8(*wire_version);
            }
            Packet::Request { start_ledger } => {
                writer.write_u8(1);
                writer.write_u32(start_ledger);
            }
            Packet::Get { sequence } => {
                writer.write_u8(2);
                writer.write_u32(sequence);
            }
            Packet::Ledger(raw) => {
                writer.write_u8(3);
                raw.write(writer);
            }
            Packet::NotFound { sequence } => {
                writer.write_u8(4);
                writer.write_u32(sequence);
            }
            Packet::Error { message } => {
                writer.write_u8(5);
                writer.write_string(message);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => Packet::Hello {
                wire_version: reader.read_u8()?,
            },
            1 => Packet::Request {
                start_ledger: reader.read_u32()?,
            },
            2 => Packet::Get {
                sequence: reader.read_u32()?,
            },
            3 => Packet::Ledger(RawLedger::read(reader)?),
            4 => Packet::NotFound {
                sequence: reader.read_u32()?,
            },
            5 => Packet::Error {
                message: reader.read_string()?,
            },
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), PipelineError>
where
    W: AsyncWriteExt + Unpin,
{
    let bytes = packet.to_bytes();
    if bytes.len() as u32 > MAX_WIRE_FRAME_SIZE {
        return Err(PipelineError::ConnectionLost(format!(
            "outgoing frame of {} bytes exceeds limit",
            bytes.len()
        )));
    }

    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, PipelineError>
where
    R: AsyncReadExt + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_WIRE_FRAME_SIZE {
        return Err(PipelineError::ConnectionLost(format!(
            "incoming frame of {} bytes exceeds limit",
            len
        )));
    }

    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes).await?;
    Ok(Packet::from_bytes(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenlake_common::crypto::hash;

    #[test]
    fn test_packet_roundtrip() {
        let packets = vec![
            Packet::hello(),
            Packet::Request { start_ledger: 42 },
            Packet::Get { sequence: 7 },
            Packet::Ledger(RawLedger {
                sequence: 7,
                payload: hash(b"payload").as_bytes().to_vec(),
                close_time: 1_700_000_000_000_000,
                protocol: 21,
            }),
            Packet::NotFound { sequence: 9 },
            Packet::Error {
                message: "boom".to_owned(),
            },
        ];

        for packet in packets {
            let restored = Packet::from_bytes(&packet.to_bytes()).unwrap();
            assert_eq!(packet, restored);
        }
    }

    #[tokio::test]
    async fn test_framed_roundtrip() {
        let packet = Packet::Request { start_ledger: 1 };
        let mut buffer = Vec::new();
        write_packet(&mut buffer, &packet).await.unwrap();

        let mut cursor = std::io::Cursor::new(buffer);
        let restored = read_packet(&mut cursor).await.unwrap();
        assert_eq!(packet, restored);
    }
}
