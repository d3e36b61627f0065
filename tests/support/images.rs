use std::path::{Path, PathBuf};

/// Write a uniformly shaded PNG and return its path.
pub fn write_shaded_png(dir: &Path, name: &str, shade: u8) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(32, 24, image::Rgb([shade, shade, shade]))
        .save(&path)
        .expect("write png");
    path
}

/// PNG whose left `coverage` fraction of columns is white, the rest black.
pub fn write_coverage_png(dir: &Path, name: &str, coverage: f32) -> PathBuf {
    let path = dir.join(name);
    let width = 40u32;
    let lit = (coverage * width as f32).round() as u32;
    image::RgbImage::from_fn(width, 20, |x, _| {
        if x < lit {
            image::Rgb([255, 255, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    })
    .save(&path)
    .expect("write png");
    path
}
