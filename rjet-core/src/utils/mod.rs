pub mod charset;
pub mod glob;
pub mod hash;
