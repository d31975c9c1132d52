//! Testing utilities and mock implementations.
//!
//! Mocks for every collaborator of the processor, so whole jobs can run
//! without ffmpeg, network access or a chat platform.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediaforge_core::testing::{MockChat, MockEncoder, MockFetcher, RecordingDelivery};
//!
//! let encoder = MockEncoder::new();
//! encoder.set_default_kind(MediaKind::Video);
//!
//! let fetcher = MockFetcher::new();
//! fetcher.serve("https://cdn.example/clip.mp4", vec![0u8; 64]);
//!
//! let chat = MockChat::new(ChatMessage::new(1).with_attachment("clip.mp4", "https://cdn.example/clip.mp4"));
//! let delivery = RecordingDelivery::new();
//! ```

mod mock_acquire;
mod mock_encoder;
mod recording_delivery;

pub use mock_acquire::{MockChat, MockFetcher, MockResolver};
pub use mock_encoder::MockEncoder;
pub use recording_delivery::{Delivered, RecordingDelivery};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    /// Writes a `width`x`height` PNG with a red top-left pixel.
    pub fn write_png(path: &Path, width: u32, height: u32) -> image::ImageResult<()> {
        let mut img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.save(path)
    }

    /// Encoded bytes of a small PNG, for serving through a fetcher.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .map(|_| out.into_inner())
            .unwrap_or_default()
    }
}
