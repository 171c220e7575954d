pub mod cases;
pub mod seed;
pub mod serve;
pub mod train;
pub mod util;
