pub const MAX_VEHICLES: usize = 100_000;
pub const MAX_BOOKINGS_PER_VEHICLE: usize = 10_000;
pub const MAX_BOOKING_DAYS: i64 = 365;
pub const MAX_PAGE_LIMIT: usize = 100;
pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const MAX_TEXT_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_IMAGES: usize = 20;
pub const MAX_SEATS: u32 = 64;
/// Whole currency units.
pub const MAX_PRICE_PER_DAY: i64 = 1_000_000;
