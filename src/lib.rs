pub mod coarse;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod features;
pub mod filters;
pub mod fine;
pub mod io;
pub mod loader;
pub mod pipeline;
pub mod point3d;
pub mod rigid;
pub mod spatial_index;
