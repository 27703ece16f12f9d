//! Render backend without a window, for servers and tests

use crate::display::RenderBackend;
use crate::error::RenderError;

/// Accepts draws and keeps a summary of the last one
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    resources: bool,
    viewport: Option<(u32, u32)>,
    frames_drawn: u64,
    last_size: Option<(u32, u32)>,
    last_checksum: u64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_resources(&self) -> bool {
        self.resources
    }

    pub fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.last_size
    }

    /// Byte sum of the last uploaded image
    pub fn last_checksum(&self) -> u64 {
        self.last_checksum
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_resources(&mut self) -> Result<(), RenderError> {
        self.resources = true;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Some((width, height));
    }

    fn draw_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), RenderError> {
        if !self.resources {
            return Err(RenderError::Draw("resources not created".into()));
        }

        self.frames_drawn += 1;
        self.last_size = Some((width, height));
        self.last_checksum = pixels.iter().map(|&b| u64::from(b)).sum();
        Ok(())
    }

    fn release_resources(&mut self) {
        self.resources = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_requires_resources() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.draw_rgba(&[0; 4], 1, 1).is_err());

        backend.create_resources().unwrap();
        backend.draw_rgba(&[1, 2, 3, 4], 1, 1).unwrap();

        assert_eq!(backend.frames_drawn(), 1);
        assert_eq!(backend.last_size(), Some((1, 1)));
        assert_eq!(backend.last_checksum(), 10);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        backend.release_resources();
        backend.create_resources().unwrap();
        backend.release_resources();
        backend.release_resources();

        assert!(!backend.has_resources());
    }
}
