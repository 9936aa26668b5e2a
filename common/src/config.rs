use crate::crypto::Hash;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Bytes per KB, to prevent having random 1024 values anywhere
pub const BYTES_PER_KB: usize = 1024;
pub const BYTES_PER_MB: usize = BYTES_PER_KB * BYTES_PER_KB;

// Upstream wire protocol version, bumped on any frame layout change.
// A server announcing a version we don't know fails the stream with
// a schema mismatch instead of decoding garbage.
pub const WIRE_PROTOCOL_VERSION: u8 = 1;

// Maximum wire frame size set to 8 MiB, a raw ledger never comes close
pub const MAX_WIRE_FRAME_SIZE: u32 = 8 * BYTES_PER_MB as u32;

// Default partition boundary: rows land in [R, R + LEDGER_RANGE_SIZE)
// where R = (ledger_sequence / LEDGER_RANGE_SIZE) * LEDGER_RANGE_SIZE.
// Per-dataset override is allowed through the daemon config.
pub const DEFAULT_LEDGER_RANGE_SIZE: u32 = 10_000;

// Root of every provenance chain. The first event of a chain carries this
// as its previous_hash; sha256("lumenlake-pas-genesis").
pub const PAS_GENESIS_HASH: Hash = Hash::new([
    0x3d, 0x18, 0x41, 0x36, 0xa5, 0x43, 0x21, 0xf8, 0xdf, 0xae, 0xba, 0x56, 0x54, 0xc3, 0x40,
    0xba, 0x19, 0x16, 0x27, 0xe3, 0xf1, 0x81, 0xd2, 0xdd, 0x60, 0x38, 0xe1, 0x80, 0x04, 0xeb,
    0x3e, 0x44,
]);
