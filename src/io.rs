//! Raw matrix files and artifact writers
//!
//! Matrices are stored as headerless native-endian `f32` values. By default a `(channels,
//! frames)` recording is stored channel-major, all samples of the first channel, then all
//! samples of the second channel and so on. [`Layout::Multiplexed`] reads and writes the
//! transposed order, where all channels of a frame are adjacent. Sign vectors are written as
//! ASCII, one `-1` or `1` per line.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayBase, Data, Dimension, ShapeBuilder};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{IcaError, Result};
use crate::kurtosis::SourceDensity;
use crate::Float;

const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// Element order of raw matrix files
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Row after row, i.e. all samples of a channel are adjacent
    ChannelMajor,
    /// Column after column, i.e. all channels of a frame are adjacent
    Multiplexed,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::ChannelMajor
    }
}

impl FromStr for Layout {
    type Err = IcaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "channel" | "channelmajor" => Ok(Layout::ChannelMajor),
            "multiplexed" | "frame" => Ok(Layout::Multiplexed),
            other => Err(IcaError::Config(format!(
                "layout must be channel or multiplexed, got `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::ChannelMajor => write!(f, "channel"),
            Layout::Multiplexed => write!(f, "multiplexed"),
        }
    }
}

/// Number of elements of a `(rows, cols)` matrix, failing on overflow
pub fn element_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        IcaError::Config(format!(
            "a {} x {} matrix exceeds the addressable size",
            rows, cols
        ))
    })
}

/// Read a `(rows, cols)` matrix of `f32` values and widen it to `F`
///
/// # Errors
///
/// [`IcaError::Io`] if the file cannot be read, [`IcaError::ElementCount`] if it does not hold
/// exactly `rows * cols` values
pub fn read_matrix<F: Float>(
    path: &Path,
    rows: usize,
    cols: usize,
    layout: Layout,
) -> Result<Array2<F>> {
    let expected = element_count(rows, cols)?;
    let bytes = fs::read(path).map_err(|e| IcaError::io(path, e))?;
    if bytes.len() % ELEMENT_SIZE != 0 || bytes.len() / ELEMENT_SIZE != expected {
        return Err(IcaError::ElementCount {
            path: path.to_path_buf(),
            expected,
            found: bytes.len() / ELEMENT_SIZE,
        });
    }

    let values = bytes
        .chunks_exact(ELEMENT_SIZE)
        .map(|chunk| {
            let mut buf = [0u8; ELEMENT_SIZE];
            buf.copy_from_slice(chunk);
            F::cast(f32::from_ne_bytes(buf))
        })
        .collect::<Vec<F>>();

    log::debug!("read {} elements from {}", expected, path.display());
    let m = match layout {
        Layout::ChannelMajor => Array2::from_shape_vec((rows, cols), values)?,
        Layout::Multiplexed => Array2::from_shape_vec((rows, cols).f(), values)?,
    };
    Ok(m)
}

/// Narrow a matrix or vector to `f32` and write it in the given layout
pub fn write_matrix<F: Float, D: Dimension>(
    path: &Path,
    m: &ArrayBase<impl Data<Elem = F>, D>,
    layout: Layout,
) -> Result<()> {
    let file = File::create(path).map_err(|e| IcaError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut put = |v: &F| {
        let v = v.to_f32().unwrap_or(f32::NAN);
        writer.write_all(&v.to_ne_bytes())
    };
    let written = match layout {
        Layout::ChannelMajor => m.iter().try_for_each(&mut put),
        // the reversed axes iterate in column-major order
        Layout::Multiplexed => m.t().iter().try_for_each(&mut put),
    };
    written
        .and_then(|_| writer.flush())
        .map_err(|e| IcaError::io(path, e))?;

    log::info!("wrote {} elements to {}", m.len(), path.display());
    Ok(())
}

pub fn write_vector<F: Float>(path: &Path, v: &Array1<F>) -> Result<()> {
    write_matrix(path, v, Layout::ChannelMajor)
}

/// Write `-1` for sub-Gaussian and `1` for super-Gaussian components, one per line
pub fn write_signs(path: &Path, signs: &[SourceDensity]) -> Result<()> {
    let file = File::create(path).map_err(|e| IcaError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for sign in signs {
        writeln!(writer, "{}", sign.sign()).map_err(|e| IcaError::io(path, e))?;
    }
    writer.flush().map_err(|e| IcaError::io(path, e))?;

    log::info!("wrote {} signs to {}", signs.len(), path.display());
    Ok(())
}

/// Fail early if an output file cannot be created
///
/// Existing files are left untouched, files that did not exist before are removed again.
pub fn check_writable(path: &Path) -> Result<()> {
    let existed = path.exists();
    OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| IcaError::io(path, e))?;
    if !existed {
        fs::remove_file(path).map_err(|e| IcaError::io(path, e))?;
    }
    Ok(())
}
