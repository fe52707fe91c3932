// Headless HLS engine built on reqwest and m3u8-rs

pub mod engine;
pub mod loader;
pub mod playlist;
pub mod sniff;

pub use engine::{HeadlessHlsEngine, HeadlessHlsFactory};
pub use loader::{HttpLoader, ResourceClass, ResourceLoader};
pub use sniff::{FragmentFormat, detect_format};
