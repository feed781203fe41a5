pub mod sky;
pub mod target;
pub mod tile;
pub mod time;

pub use sky::*;
pub use target::*;
pub use tile::*;
pub use time::*;
