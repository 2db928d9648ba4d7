/// Longest stay that can be priced or booked.
pub const MAX_STAY_NIGHTS: u32 = 365;
pub const MAX_SEASON_RULES: usize = 64;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CABINS: usize = 1_000;
pub const MAX_RESERVATIONS_PER_CABIN: usize = 50_000;
pub const MAX_GUESTS: u32 = 64;
pub const MAX_CONTACT_FIELD_LEN: usize = 320;
pub const MAX_SPECIAL_REQUESTS_LEN: usize = 4_096;
/// Longest JSON command line the binary accepts.
pub const MAX_COMMAND_LEN: usize = 64 * 1024;
/// Largest WAL frame payload. Longer length prefixes are read as corruption.
pub const MAX_WAL_FRAME_LEN: usize = 4 * 1024 * 1024;
