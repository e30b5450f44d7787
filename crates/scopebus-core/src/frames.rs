//! Frame boundary: normalise host frames into a `[T, H, W, C]` float buffer
//!
//! Host frames arrive as 8-bit pixel arrays. Everything downstream works on
//! `f32` values in `[0, 1]`; frames handed back to the host are clamped.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Placement hint forwarded from the host. The core itself computes on the
/// CPU; the hint travels with the batch so the host can place the result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| Error::ConfigError(format!("unknown device: {other}"))),
        }
    }
}

/// Product of `dims`, or `None` if it does not fit in `usize`.
fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn overflow(dims: &[usize]) -> Error {
    Error::InvalidFrame(format!("dimensions {dims:?} overflow"))
}

/// One host frame: `height * width * channels` bytes in row-major HWC order.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(height: usize, width: usize, channels: usize, data: Vec<u8>) -> Result<Self> {
        let dims = [height, width, channels];
        let expected = element_count(&dims).ok_or_else(|| overflow(&dims))?;
        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "{height}x{width}x{channels} frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// A frame with every byte set to `value`.
    pub fn filled(height: usize, width: usize, channels: usize, value: u8) -> Result<Self> {
        let dims = [height, width, channels];
        let len = element_count(&dims).ok_or_else(|| overflow(&dims))?;
        Self::new(height, width, channels, vec![value; len])
    }

    fn dims(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

/// A normalised batch of same-shaped frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameBatch {
    shape: [usize; 4],
    data: Vec<f32>,
    device: Device,
}

impl FrameBatch {
    /// Normalise the host's frame list, failing fast when it is absent.
    pub fn from_input(pipeline: &str, video: Option<&[RawFrame]>, device: Device) -> Result<Self> {
        match video {
            Some(frames) => Self::normalize(frames, device),
            None => Err(Error::missing_input(pipeline)),
        }
    }

    /// Stack frames into `[T, H, W, C]` and scale bytes to `[0, 1]`.
    pub fn normalize(frames: &[RawFrame], device: Device) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| Error::InvalidFrame("empty frame list".into()))?;
        let expected = first.dims();
        let frame_len = element_count(&expected).ok_or_else(|| overflow(&expected))?;
        let total = frame_len
            .checked_mul(frames.len())
            .ok_or_else(|| overflow(&[frames.len(), expected[0], expected[1], expected[2]]))?;

        let mut data = Vec::with_capacity(total);
        for (index, frame) in frames.iter().enumerate() {
            if frame.dims() != expected {
                return Err(Error::ShapeMismatch {
                    index,
                    expected,
                    actual: frame.dims(),
                });
            }
            if frame.data.len() != frame_len {
                return Err(Error::InvalidFrame(format!(
                    "frame {index} has {} bytes, expected {frame_len}",
                    frame.data.len()
                )));
            }
            data.extend(frame.data.iter().map(|&b| f32::from(b) / 255.0));
        }

        Ok(Self {
            shape: [frames.len(), expected[0], expected[1], expected[2]],
            data,
            device,
        })
    }

    /// Wrap an already-normalised buffer.
    pub fn from_normalized(shape: [usize; 4], data: Vec<f32>, device: Device) -> Result<Self> {
        let expected = element_count(&shape).ok_or_else(|| overflow(&shape))?;
        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data,
            device,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.shape[0] == 0
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    fn frame_len(&self) -> usize {
        self.shape[1] * self.shape[2] * self.shape[3]
    }

    /// Values of frame `index` in HWC order.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        let len = self.frame_len();
        self.data.get(index * len..(index + 1) * len)
    }

    /// Clamp every value into `[0, 1]`. NaN becomes 0.
    pub fn clamp(mut self) -> Self {
        for v in &mut self.data {
            *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        }
        self
    }

    /// Frame `index` converted back to bytes, clamped.
    pub fn frame_bytes(&self, index: usize) -> Option<Vec<u8>> {
        self.frame(index).map(|values| {
            values
                .iter()
                .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect()
        })
    }
}
