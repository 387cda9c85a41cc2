use crate::error::{Error, Result};
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "ppm"];

pub fn save_frame(path: &Path, frame: &RgbImage) -> Result<()> {
    encode_png(path, frame.as_raw(), frame.width(), frame.height(), ExtendedColorType::Rgb8)
}

pub fn save_mask(path: &Path, mask: &GrayImage) -> Result<()> {
    encode_png(path, mask.as_raw(), mask.width(), mask.height(), ExtendedColorType::L8)
}

fn encode_png(path: &Path, buffer: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Result<()> {
    let output = std::io::BufWriter::new(std::fs::File::create(path)?);
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(buffer, width, height, color)?;
    Ok(())
}

/// Decodes any supported still image into an RGB frame.
pub fn load_frame(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::DeviceUnavailable(format!("{} is not a directory", dir.display())));
    }
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_frame_file(path))
        .collect();
    frames.sort();
    Ok(frames)
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn frame_survives_png_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.png");
        let mut frame = RgbImage::new(12, 7);
        frame.put_pixel(3, 4, Rgb([10, 200, 30]));

        save_frame(&path, &frame).expect("save");
        let loaded = load_frame(&path).expect("load");
        assert_eq!(loaded.dimensions(), (12, 7));
        assert_eq!(*loaded.get_pixel(3, 4), Rgb([10, 200, 30]));
    }

    #[test]
    fn masks_load_back_as_gray_rgb() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mask.png");
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, Luma([255]));

        save_mask(&path, &mask).expect("save");
        let loaded = load_frame(&path).expect("load");
        assert_eq!(*loaded.get_pixel(2, 2), Rgb([255, 255, 255]));
        assert_eq!(*loaded.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn listing_keeps_images_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let frame = RgbImage::new(2, 2);
        for name in ["0002.png", "0001.png", "0010.png"] {
            save_frame(&dir.path().join(name), &frame).expect("save");
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame").expect("write");
        std::fs::create_dir(dir.path().join("nested.png")).expect("mkdir");

        let names: Vec<String> = list_frames(dir.path())
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["0001.png", "0002.png", "0010.png"]);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = list_frames(&dir.path().join("absent")).expect_err("missing");
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }
}
