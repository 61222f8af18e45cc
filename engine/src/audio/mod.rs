pub mod clip;
pub mod codec;
pub mod frames;
