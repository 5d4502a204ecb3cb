use image::{DynamicImage, ImageEncoder, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl ExportFormat {
    pub fn as_str(&self) -> &str {
        match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Jpeg => "JPEG",
            ExportFormat::Webp => "WebP",
            ExportFormat::Bmp => "BMP",
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Bmp => "bmp",
        }
    }

    pub fn all() -> Vec<ExportFormat> {
        vec![ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Webp, ExportFormat::Bmp]
    }

    /// Format implied by the file extension, if it is one we write.
    pub fn from_path(path: &Path) -> Option<ExportFormat> {
        let ext: String = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            "bmp" => Some(ExportFormat::Bmp),
            _ => None,
        }
    }
}

/// Writes the composed surface. JPEG has no alpha channel, so it is dropped first.
pub fn export_image(img: &RgbaImage, path: &Path, format: ExportFormat, jpeg_quality: u8) -> Result<()> {
    match format {
        ExportFormat::Jpeg => {
            let rgb: image::RgbImage = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                BufWriter::new(File::create(path)?),
                jpeg_quality.clamp(1, 100),
            );
            encoder.encode_image(&rgb)?;
        }
        ExportFormat::Png => {
            let encoder = image::codecs::png::PngEncoder::new_with_quality(
                BufWriter::new(File::create(path)?),
                image::codecs::png::CompressionType::Default,
                image::codecs::png::FilterType::Adaptive,
            );
            encoder.write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgba8)?;
        }
        ExportFormat::Webp => img.save_with_format(path, image::ImageFormat::WebP)?,
        ExportFormat::Bmp => img.save_with_format(path, image::ImageFormat::Bmp)?,
    }
    tracing::info!("Exported {}x{} {} to {}", img.width(), img.height(), format.as_str(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::path::PathBuf;

    #[test]
    fn format_from_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("out.PNG")), Some(ExportFormat::Png));
        assert_eq!(ExportFormat::from_path(Path::new("a/b.jpeg")), Some(ExportFormat::Jpeg));
        assert_eq!(ExportFormat::from_path(Path::new("x.tiff")), None);
        assert_eq!(ExportFormat::from_path(Path::new("noext")), None);
        for f in ExportFormat::all() {
            assert_eq!(ExportFormat::from_path(Path::new(&format!("f.{}", f.extension()))), Some(f));
        }
    }

    #[test]
    fn writes_every_format() {
        let img: RgbaImage = RgbaImage::from_pixel(8, 6, Rgba([200, 10, 10, 255]));
        for format in ExportFormat::all() {
            let path: PathBuf = std::env::temp_dir().join(format!("overlay_export_{}.{}", std::process::id(), format.extension()));
            export_image(&img, &path, format, 90).unwrap();
            let back: RgbaImage = image::open(&path).unwrap().to_rgba8();
            assert_eq!(back.dimensions(), (8, 6));
            if format != ExportFormat::Jpeg { assert_eq!(back, img); }
            let _ = std::fs::remove_file(&path);
        }
    }
}
