// Input bounds enforced by the engine.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_ADDRESS_LEN: usize = 512;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_COMMENT_LEN: usize = 4096;
pub const MAX_SEARCH_LEN: usize = 128;

/// Upper bound on wash-windows per facility.
pub const MAX_WINDOWS_PER_FACILITY: u32 = 64;

/// Upper bound on reservations in a single (facility, date, window) partition.
pub const MAX_RESERVATIONS_PER_PARTITION: usize = 1440;

pub const MAX_FACILITIES: usize = 100_000;

/// Largest journal frame payload written or accepted on replay.
pub const MAX_JOURNAL_FRAME_LEN: usize = 1 << 20;
