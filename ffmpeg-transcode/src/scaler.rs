use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::{FrameConverter, ScalerFactory};
use crate::error::{Result, TranscodeError};
use crate::format::OutputStreamRef;
use crate::frame::{FrameGeometry, VideoFrame};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAlgorithm {
    FastBilinear,
    Bilinear,
    #[default]
    Bicubic,
    Point,
    Area,
    Gauss,
    Lanczos,
}

/// Converts decoded pictures of one fixed geometry into what an encoder
/// wants. Frames already in the target geometry pass through untouched.
pub struct VideoScaler {
    src: FrameGeometry,
    dst: FrameGeometry,
    converter: Option<Box<dyn FrameConverter>>,
    output: VideoFrame,
}

impl VideoScaler {
    pub fn src(&self) -> FrameGeometry {
        self.src
    }

    pub fn dst(&self) -> FrameGeometry {
        self.dst
    }

    pub fn is_passthrough(&self) -> bool {
        self.converter.is_none()
    }

    pub fn scale<'a>(&'a mut self, frame: &'a VideoFrame) -> Result<&'a VideoFrame> {
        if frame.geometry() != self.src {
            return Err(TranscodeError::unsupported(format!(
                "picture changed from {} to {} mid-stream",
                self.src,
                frame.geometry()
            )));
        }
        let Some(converter) = self.converter.as_mut() else {
            return Ok(frame);
        };
        self.output.defaults();
        self.output.width = self.dst.width;
        self.output.height = self.dst.height;
        self.output.format = self.dst.format;
        converter
            .convert(frame, &mut self.output)
            .map_err(TranscodeError::at("scale video"))?;
        self.output.pts = frame.pts;
        self.output.key_frame = frame.key_frame;
        self.output.quality = frame.quality;
        Ok(&self.output)
    }
}

/// Scalers keyed by (input stream, output stream), built on first use and
/// kept for the life of the job.
pub struct ScalerCache {
    factory: Box<dyn ScalerFactory>,
    algorithm: ScaleAlgorithm,
    scalers: HashMap<(usize, OutputStreamRef), VideoScaler>,
}

impl ScalerCache {
    pub fn new(factory: Box<dyn ScalerFactory>, algorithm: ScaleAlgorithm) -> Self {
        Self {
            factory,
            algorithm,
            scalers: HashMap::new(),
        }
    }

    pub fn algorithm(&self) -> ScaleAlgorithm {
        self.algorithm
    }

    pub fn len(&self) -> usize {
        self.scalers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalers.is_empty()
    }

    pub fn get(&self, input: usize, output: OutputStreamRef) -> Option<&VideoScaler> {
        self.scalers.get(&(input, output))
    }

    /// The scaler for this pair, creating it from `src`/`dst` the first time.
    pub fn acquire(
        &mut self,
        input: usize,
        output: OutputStreamRef,
        src: FrameGeometry,
        dst: FrameGeometry,
    ) -> Result<&mut VideoScaler> {
        use std::collections::hash_map::Entry;

        match self.scalers.entry((input, output)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let converter = if src == dst {
                    None
                } else {
                    Some(
                        self.factory
                            .create(src, dst, self.algorithm)
                            .map_err(TranscodeError::at("create scaler"))?,
                    )
                };
                log::debug!(
                    "scaler {input} -> {output}: {src} to {dst} ({:?}{})",
                    self.algorithm,
                    if converter.is_none() { ", passthrough" } else { "" }
                );
                Ok(entry.insert(VideoScaler {
                    src,
                    dst,
                    converter,
                    output: VideoFrame::new(dst),
                }))
            }
        }
    }
}
