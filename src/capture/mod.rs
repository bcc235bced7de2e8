pub mod bayer_source;

pub use bayer_source::BayerSource;
