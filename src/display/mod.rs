pub mod rgb_sink;

pub use rgb_sink::RgbSink;
