use ffmpeg_next::software::scaling;

use super::{format_to_pixel, pack_picture, unpack_picture};
use crate::backend::{FrameConverter, ScalerFactory};
use crate::frame::{FrameGeometry, PixelFormat, VideoFrame};
use crate::scaler::ScaleAlgorithm;

fn flags(algorithm: ScaleAlgorithm) -> scaling::Flags {
    match algorithm {
        ScaleAlgorithm::FastBilinear => scaling::Flags::FAST_BILINEAR,
        ScaleAlgorithm::Bilinear => scaling::Flags::BILINEAR,
        ScaleAlgorithm::Bicubic => scaling::Flags::BICUBIC,
        ScaleAlgorithm::Point => scaling::Flags::POINT,
        ScaleAlgorithm::Area => scaling::Flags::AREA,
        ScaleAlgorithm::Gauss => scaling::Flags::GAUSS,
        ScaleAlgorithm::Lanczos => scaling::Flags::LANCZOS,
    }
}

fn known_format(geometry: FrameGeometry) -> anyhow::Result<PixelFormat> {
    geometry
        .format
        .ok_or_else(|| anyhow::anyhow!("cannot scale {}", geometry))
}

pub struct SwsConverter {
    context: scaling::Context,
    dst_format: PixelFormat,
}

impl FrameConverter for SwsConverter {
    fn convert(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> anyhow::Result<()> {
        let input = unpack_picture(src)?;
        let mut output = ffmpeg_next::frame::Video::empty();
        self.context.run(&input, &mut output)?;
        pack_picture(&output, self.dst_format, dst);
        dst.key_frame = src.key_frame;
        Ok(())
    }
}

/// Builds libswscale contexts.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwsScalerFactory;

impl ScalerFactory for SwsScalerFactory {
    fn create(
        &mut self,
        src: FrameGeometry,
        dst: FrameGeometry,
        algorithm: ScaleAlgorithm,
    ) -> anyhow::Result<Box<dyn FrameConverter>> {
        let (src_format, dst_format) = (known_format(src)?, known_format(dst)?);
        let context = scaling::Context::get(
            format_to_pixel(src_format),
            src.width,
            src.height,
            format_to_pixel(dst_format),
            dst.width,
            dst.height,
            flags(algorithm),
        )?;
        log::debug!("scaler created: {} -> {} ({:?})", src, dst, algorithm);
        Ok(Box::new(SwsConverter {
            context,
            dst_format,
        }))
    }
}
