//! Frame compression for the broadcast channel: JPEG, then base64 text

use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::error::EncodeError;
use crate::{Frame, PixelFormat};

/// One frame ready to send: encoded once, shared by every connection
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub sequence: u64,
    /// Base64 JPEG text; cloning only bumps a reference count
    pub payload: Utf8Bytes,
}

/// Compress a frame to a base64 JPEG message
pub fn encode_frame(frame: &Frame, quality: u8) -> Result<EncodedFrame, EncodeError> {
    let started = Instant::now();

    let mut jpeg = Vec::with_capacity(frame.data().len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);

    match frame.format() {
        PixelFormat::Gray8 => encoder.encode(
            frame.data(),
            frame.width(),
            frame.height(),
            ExtendedColorType::L8,
        )?,
        PixelFormat::Rgb24 => encoder.encode(
            frame.data(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgb8,
        )?,
        PixelFormat::Rgba32 => {
            // JPEG has no alpha channel
            let rgb: Vec<u8> = frame
                .data()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            encoder.encode(&rgb, frame.width(), frame.height(), ExtendedColorType::Rgb8)?
        }
    }

    let payload = Utf8Bytes::from(STANDARD.encode(&jpeg));
    metrics::histogram!("broadcast_encode_time_us").record(started.elapsed().as_micros() as f64);

    Ok(EncodedFrame {
        sequence: frame.sequence(),
        payload,
    })
}
