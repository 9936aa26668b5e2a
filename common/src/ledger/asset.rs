use crate::{
    crypto::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};
use std::fmt;

// An asset reference as it appears in operations, trustlines and offers.
// The native asset has no issuer; pool shares are identified by pool id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Native,
    Credit { code: String, issuer: String },
    PoolShare { pool_id: Hash },
}

impl Asset {
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Self {
        Asset::Credit {
            code: code.into(),
            issuer: issuer.into(),
        }
    }

    // Canonical text form used in row columns: "native", "CODE:ISSUER"
    // or "pool:<hex>". Stable across versions, part of natural keys.
    pub fn canonical(&self) -> String {
        match self {
            Asset::Native => "native".to_owned(),
            Asset::Credit { code, issuer } => format!("{}:{}", code, issuer),
            Asset::PoolShare { pool_id } => format!("pool:{}", pool_id),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl Serializer for Asset {
    fn write(&self, writer: &mut Writer) {
        match self {
            Asset::Native => writer.write_u8(0),
            Asset::Credit { code, issuer } => {
                writer.write_u8(1);
                writer.write_string(code);
                writer.write_string(issuer);
            }
            Asset::PoolShare { pool_id } => {
                writer.write_u8(2);
                writer.write_hash(pool_id);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(Asset::Native),
            1 => Ok(Asset::Credit {
                code: reader.read_string()?,
                issuer: reader.read_string()?,
            }),
            2 => Ok(Asset::PoolShare {
                pool_id: reader.read_hash()?,
            }),
            _ => Err(ReaderError::InvalidValue),
        }
    }
}
