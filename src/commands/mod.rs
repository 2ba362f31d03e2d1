pub mod predict;
pub mod prices;
pub mod status;
pub mod train;
