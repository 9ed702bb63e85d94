/// Configuration for USB camera capture.
///
/// Width, height, and frame rate are requests; the device may negotiate
/// different values, and frame metadata always reports what was actually
/// negotiated.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    device: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
    jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: 640,
            height: 480,
            fps: 30,
            jpeg_quality: 85,
        }
    }
}

impl CameraConfig {
    /// Set an explicit device index (e.g. 0 for /dev/video0). When unset,
    /// `open()` probes ascending indices for the first usable device.
    pub fn with_device(mut self, device: u32) -> Self {
        self.device = Some(device);
        self
    }

    /// Set the requested capture width in pixels.
    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    /// Set the requested capture height in pixels.
    pub fn with_height(mut self, height: u32) -> Self {
        self.height = height;
        self
    }

    /// Set the requested frames per second. Also the pacing rate: `read()`
    /// never captures more often than this.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the JPEG encode quality (1-100).
    pub fn with_jpeg_quality(mut self, jpeg_quality: u8) -> Self {
        self.jpeg_quality = jpeg_quality;
        self
    }

    // Getters
    pub fn device(&self) -> Option<u32> {
        self.device
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}
