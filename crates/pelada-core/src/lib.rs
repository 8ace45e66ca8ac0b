// Pelada core: club records, the day draw, and the post-draw trade window.

pub mod club;
pub mod draw;
pub mod model;
pub mod schedule;
pub mod stats;
pub mod trade;
