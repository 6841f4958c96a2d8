//! PGM reading and writing, and the raw direction dump.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use pcanny::{CannyParams, Raster};

/// Reads an 8-bit single channel image. Other pixel formats are rejected
/// rather than converted.
pub fn read_pgm(path: &Path) -> Result<Raster<u8>> {
    let decoded = ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let gray = match decoded {
        DynamicImage::ImageLuma8(gray) => gray,
        other => bail!(
            "{} is not an 8-bit grayscale image ({:?})",
            path.display(),
            other.color()
        ),
    };
    let (width, height) = gray.dimensions();
    Raster::from_vec(height as usize, width as usize, gray.into_raw())
}

/// Writes a binary (P5) graymap with maxval 255.
pub fn write_pgm(path: &Path, image: &Raster<u8>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let encoder = PnmEncoder::new(BufWriter::new(file))
        .with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary));
    encoder
        .write_image(
            image.as_slice(),
            u32::try_from(image.cols())?,
            u32::try_from(image.rows())?,
            ExtendedColorType::L8,
        )
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Writes `rows * cols` native-endian `f32` values with no header.
pub fn write_fim(path: &Path, direction: &Raster<f32>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for v in direction.as_slice() {
        out.write_all(&v.to_ne_bytes())?;
    }
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

/// `<input>_s_<sigma>_l_<tlow>_h_<thigh>.<extension>`
pub fn output_path(input: &Path, params: &CannyParams, extension: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(format!(
        "_s_{:3.2}_l_{:3.2}_h_{:3.2}.{extension}",
        params.sigma, params.tlow, params.thigh
    ));
    PathBuf::from(name)
}
