use serde::{Deserialize, Serialize};

/// Interpolation used when bringing an image plane to the canonical size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    Nearest,
    Bilinear,
}

/// Resample a single `f32` plane to `out_w x out_h`.
///
/// Source coordinates follow `src = dst * in / out` (no half-pixel offset), so
/// the first output row and column always sample the first input row and column.
pub(crate) fn resample_plane(
    src: &[f32],
    width: usize,
    height: usize,
    out_w: usize,
    out_h: usize,
    method: ResampleMethod,
) -> Vec<f32> {
    if width == out_w && height == out_h {
        return src.to_vec();
    }
    let scale_x = width as f64 / out_w as f64;
    let scale_y = height as f64 / out_h as f64;
    let mut out = Vec::with_capacity(out_w * out_h);
    for dy in 0..out_h {
        let in_y = dy as f64 * scale_y;
        for dx in 0..out_w {
            let in_x = dx as f64 * scale_x;
            let value = match method {
                ResampleMethod::Nearest => {
                    let x = (in_x.floor() as usize).min(width - 1);
                    let y = (in_y.floor() as usize).min(height - 1);
                    src[y * width + x]
                }
                ResampleMethod::Bilinear => bilinear_at(src, width, height, in_x, in_y),
            };
            out.push(value);
        }
    }
    out
}

fn bilinear_at(src: &[f32], width: usize, height: usize, in_x: f64, in_y: f64) -> f32 {
    let x0 = (in_x.floor() as usize).min(width - 1);
    let y0 = (in_y.floor() as usize).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (in_x - x0 as f64).clamp(0.0, 1.0);
    let fy = (in_y - y0 as f64).clamp(0.0, 1.0);
    let top = src[y0 * width + x0] as f64 * (1.0 - fx) + src[y0 * width + x1] as f64 * fx;
    let bottom = src[y1 * width + x0] as f64 * (1.0 - fx) + src[y1 * width + x1] as f64 * fx;
    (top * (1.0 - fy) + bottom * fy) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_size_is_a_copy() {
        let plane = vec![0.1, 0.2, 0.3, 0.4];
        let out = resample_plane(&plane, 2, 2, 2, 2, ResampleMethod::Bilinear);
        assert_eq!(out, plane);
    }

    #[test]
    fn nearest_downscale_picks_top_left_of_each_block() {
        let plane: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let out = resample_plane(&plane, 4, 4, 2, 2, ResampleMethod::Nearest);
        assert_eq!(out, vec![0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn bilinear_upscale_interpolates_between_neighbours() {
        let plane = vec![0.0, 1.0];
        let out = resample_plane(&plane, 2, 1, 4, 1, ResampleMethod::Bilinear);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
    }
}
