use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::EncoderSettings;
use crate::error::{Result, TranscodeError};
use crate::rational::Rational;
use crate::transcode::TranscodeOptions;

/// A transcode job as read from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub input: String,
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default)]
    pub options: TranscodeOptions,
    pub outputs: Vec<OutputConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub url: String,
    /// Container format name; guessed from the URL when absent.
    #[serde(default)]
    pub format: Option<String>,
    pub streams: Vec<StreamConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Input stream feeding this output stream.
    pub input_index: usize,
    /// Output stream time base; the encoder's when absent.
    #[serde(default)]
    pub time_base: Option<Rational>,
    /// In output time base units; 0 derives it from the input.
    #[serde(default)]
    pub duration: i64,
    #[serde(flatten)]
    pub encoder: EncoderSettings,
}

impl JobConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let job: JobConfig = serde_json::from_str(text)
            .map_err(|e| TranscodeError::configuration(format!("invalid job: {e}")))?;
        job.validate()?;
        Ok(job)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TranscodeError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Structural checks that do not need a backend.
    pub fn validate(&self) -> Result<()> {
        if self.input.is_empty() {
            return Err(TranscodeError::configuration("job has no input"));
        }
        if self.outputs.iter().all(|output| output.streams.is_empty()) {
            return Err(TranscodeError::configuration("job declares no output streams"));
        }
        for output in &self.outputs {
            if output.url.is_empty() {
                return Err(TranscodeError::configuration("output without url"));
            }
            for stream in &output.streams {
                stream.encoder.media_type()?;
                if stream.time_base.is_some_and(|tb| !tb.is_valid()) {
                    return Err(TranscodeError::configuration(format!(
                        "{}: invalid time base for input {}",
                        output.url, stream.input_index
                    )));
                }
            }
        }
        Ok(())
    }

    /// `(output, stream in output, input index)` for every declared stream.
    pub fn routes(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.outputs.iter().enumerate().flat_map(|(o, output)| {
            output
                .streams
                .iter()
                .enumerate()
                .map(move |(s, stream)| (o, s, stream.input_index))
        })
    }
}
