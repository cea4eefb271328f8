pub mod comments;
pub mod config;
pub mod emit;
pub mod error_codes;
pub mod font;
pub mod layout;
pub mod paginate;
pub mod pipeline;
pub mod raster;
pub mod reddit;
pub mod speech;
pub mod staging;
pub mod video;
