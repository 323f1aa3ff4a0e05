//! `screencap -p` output checks
//!
//! adb sometimes prints warnings ahead of the binary stream, and a dropped
//! connection leaves a truncated file. Both are caught here before the image
//! is handed to the client.

use crate::device::ExecutionError;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngInfo {
    pub width: u32,
    pub height: u32,
}

/// Find the PNG in raw `screencap` output and check it is complete
pub fn extract_png(data: &[u8]) -> Result<(&[u8], PngInfo), ExecutionError> {
    let start = data
        .windows(PNG_SIGNATURE.len())
        .position(|w| w == PNG_SIGNATURE)
        .ok_or_else(|| {
            let preview: String = String::from_utf8_lossy(&data[..data.len().min(80)])
                .chars()
                .filter(|c| !c.is_control())
                .collect();
            ExecutionError::InvalidOutput(format!("no PNG data in screencap output: {preview}"))
        })?;

    if start > 0 {
        tracing::warn!(skipped = start, "Stripped text ahead of screencap PNG");
    }
    let png = &data[start..];

    let has_iend = png.windows(4).rev().take(16).any(|w| w == b"IEND");
    if !has_iend {
        return Err(ExecutionError::InvalidOutput(
            "PNG is truncated (no IEND chunk)".to_string(),
        ));
    }

    Ok((png, png_dimensions(png)?))
}

/// Width and height from the IHDR chunk
pub fn png_dimensions(png: &[u8]) -> Result<PngInfo, ExecutionError> {
    if png.len() < 24 || &png[12..16] != b"IHDR" {
        return Err(ExecutionError::InvalidOutput(
            "PNG has no IHDR chunk".to_string(),
        ));
    }
    let width = u32::from_be_bytes([png[16], png[17], png[18], png[19]]);
    let height = u32::from_be_bytes([png[20], png[21], png[22], png[23]]);
    if width == 0 || height == 0 {
        return Err(ExecutionError::InvalidOutput(format!(
            "invalid PNG dimensions {width}x{height}"
        )));
    }
    Ok(PngInfo { width, height })
}
