mod youtube;

pub use youtube::*;
