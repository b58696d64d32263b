//! Segmentation model boundary.
//!
//! The model is a black box: it gets an image path and must write a class-id
//! label raster to the output path. The call blocks until the model finishes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::SegmentError;

/// An external segmentation model.
pub trait Segmenter {
    /// Human-readable name for logs.
    fn name(&self) -> String;

    /// Segment `image`, writing a label raster to `output`.
    fn segment(&self, image: &Path, output: &Path) -> Result<(), SegmentError>;
}

/// Runs an external program as `<program> [args..] <image> <output>`.
#[derive(Debug, Clone)]
pub struct CommandSegmenter {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandSegmenter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the image and output paths.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Segmenter from a configured model command; blank means no model.
    pub fn from_config(model: Option<&str>) -> Option<Self> {
        let model = model?.trim();
        if model.is_empty() {
            return None;
        }
        let mut parts = model.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }
}

impl Segmenter for CommandSegmenter {
    fn name(&self) -> String {
        self.program.display().to_string()
    }

    fn segment(&self, image: &Path, output: &Path) -> Result<(), SegmentError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!("Running segmentation model {} on {:?}", self.name(), image);
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .arg(output)
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SegmentError::Segmentation(format!(
                "{} exited with {}: {}",
                self.name(),
                result.status,
                stderr.trim()
            )));
        }
        if !output.is_file() {
            return Err(SegmentError::Segmentation(format!(
                "{} wrote no output to {:?}",
                self.name(),
                output
            )));
        }
        Ok(())
    }
}
