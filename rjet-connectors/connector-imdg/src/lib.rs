#[macro_use]
extern crate log;

pub mod memory;
pub mod sink;
pub mod source;

pub use sink::write_list;
pub use source::{
    read_cache, read_cache_remote, read_list, read_list_remote, read_map, read_map_remote,
};
