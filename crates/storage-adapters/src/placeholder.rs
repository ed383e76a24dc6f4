//! Placeholder image served when no locator of an image yields bytes.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};

const SIDE: u32 = 512;
const BORDER: u32 = 8;
const FILL: Rgb<u8> = Rgb([0x2b, 0x2b, 0x33]);
const EDGE: Rgb<u8> = Rgb([0x6c, 0x6c, 0x7a]);

/// Renders a flat grey square with a lighter frame, PNG-encoded.
pub fn render_placeholder() -> anyhow::Result<Bytes> {
    let img = RgbImage::from_fn(SIDE, SIDE, |x, y| {
        let on_edge = x < BORDER || y < BORDER || x >= SIDE - BORDER || y >= SIDE - BORDER;
        if on_edge {
            EDGE
        } else {
            FILL
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(Bytes::from(buf.into_inner()))
}

/// Reads the configured placeholder file, rendering one if it is missing or unreadable.
pub async fn load_or_render(path: Option<&Path>) -> anyhow::Result<Bytes> {
    if let Some(path) = path {
        match tokio::fs::read(path).await {
            Ok(data) if !data.is_empty() => return Ok(Bytes::from(data)),
            Ok(_) => tracing::warn!(path = %path.display(), "placeholder file is empty, rendering one"),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "placeholder file unreadable, rendering one")
            }
        }
    }
    render_placeholder()
}
