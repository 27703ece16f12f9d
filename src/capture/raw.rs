//! Borrowed view over an NV21 capture buffer

use crate::error::TransformError;

/// One NV21 frame as delivered by the capture source.
///
/// Layout: a `width x height` luma plane followed by a `width x height / 2`
/// plane of interleaved V/U samples, one pair per 2x2 block. The buffer is
/// only borrowed for the duration of the driver call.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> RawFrame<'a> {
    /// Bytes an NV21 frame of the given size occupies
    pub fn expected_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, TransformError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(TransformError::InvalidDimensions { width, height });
        }

        let expected = Self::expected_len(width, height);
        if data.len() != expected {
            return Err(TransformError::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma(&self) -> &'a [u8] {
        &self.data[..self.width as usize * self.height as usize]
    }

    /// Interleaved V/U plane
    pub fn chroma(&self) -> &'a [u8] {
        &self.data[self.width as usize * self.height as usize..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_len() {
        assert_eq!(RawFrame::expected_len(4, 2), 12);
        assert_eq!(RawFrame::expected_len(640, 480), 460_800);
    }

    #[test]
    fn test_planes_split_at_luma_size() {
        let data: Vec<u8> = (0..12).collect();
        let raw = RawFrame::new(&data, 4, 2).unwrap();

        assert_eq!(raw.luma(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(raw.chroma(), &[8, 9, 10, 11]);
    }

    #[test]
    fn test_rejects_odd_dimensions() {
        let data = vec![0u8; 100];

        assert_eq!(
            RawFrame::new(&data, 3, 2).unwrap_err(),
            TransformError::InvalidDimensions {
                width: 3,
                height: 2
            }
        );
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let data = vec![0u8; 11];

        assert_eq!(
            RawFrame::new(&data, 4, 2).unwrap_err(),
            TransformError::BufferSize {
                width: 4,
                height: 2,
                expected: 12,
                actual: 11,
            }
        );
    }
}
