mod providers;
mod stores;

pub use providers::*;
pub use stores::*;
