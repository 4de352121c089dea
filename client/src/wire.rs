//! Wire-level constants: message tags, configstring layout, entity events.

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: i32 = 34;

/// Server-to-client message tags.
pub mod svc {
    pub const MUZZLE_FLASH: u8 = 1;
    pub const MUZZLE_FLASH2: u8 = 2;
    pub const TEMP_ENTITY: u8 = 3;
    pub const NOP: u8 = 6;
    pub const DISCONNECT: u8 = 7;
    pub const RECONNECT: u8 = 8;
    pub const SOUND: u8 = 9;
    pub const PRINT: u8 = 10;
    pub const STUFFTEXT: u8 = 11;
    pub const SERVERDATA: u8 = 12;
    pub const CONFIGSTRING: u8 = 13;
    pub const SPAWNBASELINE: u8 = 14;
    pub const PLAYERINFO: u8 = 17;
    pub const PACKETENTITIES: u8 = 18;
    pub const FRAME: u8 = 20;
}

/// Client-to-server message tags.
pub mod clc {
    pub const NOP: u8 = 1;
    pub const MOVE: u8 = 2;
    pub const USERINFO: u8 = 3;
    pub const STRINGCMD: u8 = 4;
}

/// Bits of the sound message's flag byte.
pub mod snd {
    pub const VOLUME: u8 = 1;
    pub const ATTENUATION: u8 = 2;
    pub const POS: u8 = 4;
    pub const ENT: u8 = 8;
    pub const OFFSET: u8 = 16;
}

/// Configstring indices this core interprets.
pub mod cs {
    /// Level name.
    pub const NAME: usize = 0;
    /// Server-authoritative air acceleration, parsed into the movement
    /// constants so prediction matches.
    pub const AIR_ACCEL: usize = 29;
    /// Start of the model path table.
    pub const MODELS: usize = 32;
    /// Start of the sound path table.
    pub const SOUNDS: usize = 288;
    /// Entries in each precache table.
    pub const TABLE_LEN: usize = 256;
}

/// Size of the configstring table.
pub const MAX_CONFIGSTRINGS: usize = 2080;

/// Transient entity events.
pub mod ev {
    pub const ITEM_RESPAWN: u8 = 1;
    pub const FOOTSTEP: u8 = 2;
    pub const FALL_SHORT: u8 = 3;
    pub const FALL: u8 = 4;
    pub const FALL_FAR: u8 = 5;
    pub const PLAYER_TELEPORT: u8 = 6;
    pub const OTHER_TELEPORT: u8 = 7;
}
