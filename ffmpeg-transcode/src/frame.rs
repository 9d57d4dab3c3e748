use std::fmt::{Display, Formatter};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

/// Raw picture layouts the core knows how to size. Anything else stays opaque
/// to the core and is handled by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Nv12,
    Rgb24,
    Bgr24,
    Gray8,
}

impl PixelFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Gray8 => "gray",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "yuv420p" => Some(PixelFormat::Yuv420p),
            "yuv422p" => Some(PixelFormat::Yuv422p),
            "yuv444p" => Some(PixelFormat::Yuv444p),
            "nv12" => Some(PixelFormat::Nv12),
            "rgb24" => Some(PixelFormat::Rgb24),
            "bgr24" => Some(PixelFormat::Bgr24),
            "gray" | "gray8" => Some(PixelFormat::Gray8),
            _ => None,
        }
    }

    /// `(bytes per row, rows)` of each plane of a packed picture.
    pub fn planes(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        match self {
            PixelFormat::Yuv420p => vec![(w, h), (cw, ch), (cw, ch)],
            PixelFormat::Yuv422p => vec![(w, h), (cw, h), (cw, h)],
            PixelFormat::Yuv444p => vec![(w, h), (w, h), (w, h)],
            PixelFormat::Nv12 => vec![(w, h), (cw * 2, ch)],
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => vec![(w * 3, h)],
            PixelFormat::Gray8 => vec![(w, h)],
        }
    }

    /// Bytes of one packed picture of this format.
    pub fn picture_size(&self, width: u32, height: u32) -> usize {
        self.planes(width, height)
            .iter()
            .map(|(row, rows)| row * rows)
            .sum()
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Size and layout of a picture; what a scaler converts between.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub format: Option<PixelFormat>,
}

impl Display for FrameGeometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.format {
            Some(format) => write!(f, "{}x{} {}", self.width, self.height, format),
            None => write!(f, "{}x{} unknown", self.width, self.height),
        }
    }
}

/// Decoded picture, packed plane after plane into `data`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: Option<PixelFormat>,
    pub data: BytesMut,
    pub pts: Option<i64>,
    pub key_frame: bool,
    pub quality: i32,
}

impl VideoFrame {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            width: geometry.width,
            height: geometry.height,
            format: geometry.format,
            ..Default::default()
        }
    }

    /// Reset to defaults before the next decode, keeping the data allocation.
    pub fn defaults(&mut self) -> &mut Self {
        self.width = 0;
        self.height = 0;
        self.format = None;
        self.data.clear();
        self.pts = None;
        self.key_frame = false;
        self.quality = 0;
        self
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_names() {
        for format in [
            PixelFormat::Yuv420p,
            PixelFormat::Yuv422p,
            PixelFormat::Yuv444p,
            PixelFormat::Nv12,
            PixelFormat::Rgb24,
            PixelFormat::Bgr24,
            PixelFormat::Gray8,
        ] {
            assert_eq!(PixelFormat::from_name(format.name()), Some(format));
        }
        assert_eq!(PixelFormat::from_name("p010le"), None);
    }

    #[test]
    fn test_picture_size() {
        assert_eq!(PixelFormat::Yuv420p.picture_size(4, 4), 24);
        assert_eq!(PixelFormat::Rgb24.picture_size(2, 2), 12);
        assert_eq!(PixelFormat::Gray8.picture_size(3, 5), 15);
        // odd sizes round chroma up
        assert_eq!(PixelFormat::Yuv420p.picture_size(3, 3), 9 + 2 * 4);
        assert_eq!(PixelFormat::Nv12.planes(5, 3), vec![(5, 3), (6, 2)]);
    }

    #[test]
    fn test_defaults_clears_frame() {
        let mut frame = VideoFrame::new(FrameGeometry {
            width: 4,
            height: 2,
            format: Some(PixelFormat::Gray8),
        });
        frame.data.extend_from_slice(&[1; 8]);
        frame.pts = Some(3);
        frame.key_frame = true;
        frame.defaults();
        assert_eq!(frame, VideoFrame::default());
    }
}
