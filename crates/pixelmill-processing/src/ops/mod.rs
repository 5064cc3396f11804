pub mod crop;
pub mod filter;
pub mod orient;
pub mod resize;
pub mod watermark;
