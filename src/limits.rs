/// Upper bound on a shop's seat count.
pub const MAX_SEATS: u32 = 256;

/// Longest bookable service. Multi-day services are not supported.
pub const MAX_MENU_DURATION_MINUTES: u32 = 24 * 60;

/// Reserved reservations a single shop may hold on one calendar day.
pub const MAX_RESERVATIONS_PER_SHOP_DAY: usize = 10_000;

/// Keys a single operation may lock at once.
pub const MAX_LOCK_KEYS: usize = 8;
