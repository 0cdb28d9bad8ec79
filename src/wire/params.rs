//! Per-network constants.
//!
//! A [`NetworkParams`] value freezes everything that distinguishes one
//! inchain network from another on the wire: the 4-byte magic that prefixes
//! every frame, the default TCP port, and the protocol-version milestones
//! negotiated during the handshake. One instance is chosen at startup and
//! threaded explicitly to whatever needs it; nothing in this crate reaches
//! for a global.

/// Symbolic protocol milestones, resolved to concrete version numbers by
/// [`NetworkParams::protocol_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Oldest version this node will talk to.
    Minimum,
    /// First version understanding bloom-filtered connections.
    BloomFilter,
    /// First version understanding witness serialization.
    Witness,
    /// Version this node speaks by default.
    Current,
}

/// Frozen description of one inchain network.
#[derive(Debug, PartialEq, Eq)]
pub struct NetworkParams {
    magic: u32,
    port: u16,
    minimum_version: u32,
    bloom_filter_version: u32,
    witness_version: u32,
    current_version: u32,
}

impl NetworkParams {
    /// 4-byte network identifier prefixing every message header.
    ///
    /// Serialized little-endian, so mainnet's `0xC6A5D8E4` appears on the
    /// wire as `E4 D8 A5 C6`. The value doubles as a frame boundary marker
    /// when resynchronizing a damaged stream.
    pub const fn magic(&self) -> u32 {
        self.magic
    }

    /// Default TCP port peers listen on.
    pub const fn default_port(&self) -> u16 {
        self.port
    }

    /// Numeric protocol version for a symbolic milestone.
    pub const fn protocol_version(&self, milestone: ProtocolVersion) -> u32 {
        match milestone {
            ProtocolVersion::Minimum => self.minimum_version,
            ProtocolVersion::BloomFilter => self.bloom_filter_version,
            ProtocolVersion::Witness => self.witness_version,
            ProtocolVersion::Current => self.current_version,
        }
    }
}

/// inchain mainnet.
pub static MAIN_NET: NetworkParams = NetworkParams {
    magic: 0xC6A5_D8E4,
    port: 8632,
    minimum_version: 70000,
    bloom_filter_version: 70000,
    witness_version: 70012,
    current_version: 70012,
};

/// inchain testnet.
pub static TEST_NET: NetworkParams = NetworkParams {
    magic: 0x4B5D_6A7C,
    port: 18632,
    minimum_version: 70000,
    bloom_filter_version: 70000,
    witness_version: 70012,
    current_version: 70012,
};
