//! Canny edge detector over a single luma plane

/// Hysteresis thresholds on the L1 gradient magnitude
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeThresholds {
    pub low: u16,
    pub high: u16,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self { low: 50, high: 150 }
    }
}

const EDGE: u8 = 255;
const CANDIDATE: u8 = 1;

/// Returns a `width * height` mask with 255 on edge pixels and 0 elsewhere
pub fn canny(gray: &[u8], width: usize, height: usize, thresholds: EdgeThresholds) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    if width < 3 || height < 3 {
        return out;
    }

    let at = |x: usize, y: usize| i32::from(gray[y * width + x]);

    // Sobel gradients, border pixels stay at zero magnitude
    let mut magnitude = vec![0i32; width * height];
    let mut direction = vec![0u8; width * height];
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2 * at(x - 1, y)
                - at(x - 1, y + 1);
            let gy = at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2 * at(x, y - 1)
                - at(x + 1, y - 1);

            let idx = y * width + x;
            magnitude[idx] = gx.abs() + gy.abs();
            direction[idx] = quantize_direction(gx, gy);
        }
    }

    // Non-maximum suppression and double threshold
    let low = i32::from(thresholds.low);
    let high = i32::from(thresholds.high);
    let mut strong = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let (a, b) = match direction[idx] {
                0 => (idx - 1, idx + 1),
                45 => (idx - width + 1, idx + width - 1),
                90 => (idx - width, idx + width),
                _ => (idx - width - 1, idx + width + 1),
            };
            if m < magnitude[a] || m <= magnitude[b] {
                continue;
            }

            if m > high {
                out[idx] = EDGE;
                strong.push(idx);
            } else {
                out[idx] = CANDIDATE;
            }
        }
    }

    // Hysteresis: promote candidates connected to a strong edge
    while let Some(idx) = strong.pop() {
        let (x, y) = (idx % width, idx / width);
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let n = ny * width + nx;
                if out[n] == CANDIDATE {
                    out[n] = EDGE;
                    strong.push(n);
                }
            }
        }
    }

    for px in out.iter_mut() {
        if *px != EDGE {
            *px = 0;
        }
    }
    out
}

/// Gradient direction rounded to 0, 45, 90 or 135 degrees
fn quantize_direction(gx: i32, gy: i32) -> u8 {
    let (ax, ay) = (gx.abs() as f32, gy.abs() as f32);
    // tan(22.5deg) and tan(67.5deg)
    if ay <= ax * 0.414_213_57 {
        0
    } else if ay >= ax * 2.414_213_6 {
        90
    } else if (gx > 0) == (gy > 0) {
        135
    } else {
        45
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_image(width: usize, height: usize) -> Vec<u8> {
        (0..height)
            .flat_map(|_| (0..width).map(move |x| if x < width / 2 { 20 } else { 220 }))
            .collect()
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let gray = vec![128u8; 16 * 16];
        let edges = canny(&gray, 16, 16, EdgeThresholds::default());

        assert!(edges.iter().all(|&px| px == 0));
    }

    #[test]
    fn test_vertical_step_yields_vertical_edge() {
        let (w, h) = (16, 12);
        let edges = canny(&step_image(w, h), w, h, EdgeThresholds::default());

        for y in 1..h - 1 {
            let row = &edges[y * w..(y + 1) * w];
            assert_eq!(row.iter().filter(|&&px| px == 255).count(), 1, "row {y}: {row:?}");
        }
        // Nothing far from the step
        for y in 0..h {
            assert_eq!(edges[y * w + 2], 0);
            assert_eq!(edges[y * w + w - 3], 0);
        }
    }

    #[test]
    fn test_output_is_binary() {
        let (w, h) = (24, 24);
        let gray: Vec<u8> = (0..w * h).map(|i| ((i * 37) % 251) as u8).collect();
        let edges = canny(&gray, w, h, EdgeThresholds::default());

        assert!(edges.iter().all(|&px| px == 0 || px == 255));
    }

    #[test]
    fn test_tiny_images_are_blank() {
        let edges = canny(&[0, 255, 0, 255], 2, 2, EdgeThresholds::default());
        assert_eq!(edges, vec![0; 4]);
    }
}
