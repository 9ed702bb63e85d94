//! V4L2-backed capture port.

use std::collections::HashMap;
use std::fmt;

use iris_capture::{CaptureError, CapturePort, Measurement};
use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::config::CameraConfig;
use crate::convert;
use crate::pace::FramePacer;

/// Number of device indices probed when none is configured.
const PROBE_LIMIT: u32 = 10;
const BUFFER_COUNT: u32 = 4;

/// USB camera driver.
///
/// State machine `Unopened → Opened → Closed`; `Closed` is terminal, so a
/// reopen at a higher layer needs a fresh instance. `read()` paces itself
/// to the configured frame rate and returns JPEG payloads.
pub struct UsbCamera {
    config: CameraConfig,
    state: PortState,
}

enum PortState {
    Unopened,
    Opened(Box<OpenedCamera>),
    Closed,
}

/// Pixel layouts the driver knows how to turn into JPEG.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PixelFormat {
    Mjpg,
    Yuyv,
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" => Some(Self::Mjpg),
            b"YUYV" => Some(Self::Yuyv),
            b"RGB3" => Some(Self::Rgb3),
            _ => None,
        }
    }
}

#[self_referencing]
struct CaptureState {
    device: Device,
    #[borrows(mut device)]
    #[covariant]
    stream: MmapStream<'this, Device>,
}

struct OpenedCamera {
    capture: CaptureState,
    index: u32,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    pacer: FramePacer,
}

impl UsbCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            state: PortState::Unopened,
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Open one index: acquire, negotiate, and verify with a real capture.
    fn open_index(config: &CameraConfig, index: u32) -> Result<OpenedCamera, CaptureError> {
        let device = Device::new(index as usize)
            .map_err(|err| CaptureError::DeviceUnavailable(format!("/dev/video{index}: {err}")))?;

        let mut format = device.format().map_err(|err| {
            CaptureError::DeviceNotReady(format!("/dev/video{index}: query format: {err}"))
        })?;
        format.width = config.width();
        format.height = config.height();
        format.fourcc = FourCC::new(b"YUYV");

        // Best-effort: keep whatever the device negotiates.
        let format = match device.set_format(&format) {
            Ok(negotiated) => negotiated,
            Err(err) => {
                log::warn!("/dev/video{index}: set format refused: {err}");
                device.format().map_err(|err| {
                    CaptureError::DeviceNotReady(format!(
                        "/dev/video{index}: re-read format: {err}"
                    ))
                })?
            }
        };

        let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
            CaptureError::DeviceNotReady(format!(
                "/dev/video{index}: unsupported pixel format {}",
                fourcc_name(format.fourcc)
            ))
        })?;

        if config.fps() > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps());
            if let Err(err) = device.set_params(&params) {
                log::warn!("/dev/video{index}: set frame rate refused: {err}");
            }
        }

        let mut capture = CaptureStateTryBuilder {
            device,
            stream_builder: |device| {
                MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT).map_err(|err| {
                    CaptureError::DeviceNotReady(format!(
                        "/dev/video{index}: create capture stream: {err}"
                    ))
                })
            },
        }
        .try_build()?;

        capture
            .with_stream_mut(|stream| stream.next().map(|_| ()))
            .map_err(|err| {
                CaptureError::DeviceNotReady(format!("/dev/video{index}: verification read: {err}"))
            })?;

        log::info!(
            "camera opened: /dev/video{index} {}x{} {}",
            format.width,
            format.height,
            fourcc_name(format.fourcc)
        );

        Ok(OpenedCamera {
            capture,
            index,
            width: format.width,
            height: format.height,
            pixel_format,
            pacer: FramePacer::new(config.fps()),
        })
    }

    /// Try ascending indices until one opens and delivers a frame.
    fn probe(config: &CameraConfig) -> Result<OpenedCamera, CaptureError> {
        for index in 0..PROBE_LIMIT {
            match Self::open_index(config, index) {
                Ok(opened) => return Ok(opened),
                Err(err) => log::debug!("probe /dev/video{index}: {err}"),
            }
        }
        Err(CaptureError::DeviceUnavailable(format!(
            "no usable camera on indices 0..{PROBE_LIMIT}"
        )))
    }
}

impl CapturePort for UsbCamera {
    fn open(&mut self) -> Result<(), CaptureError> {
        match self.state {
            PortState::Unopened => {}
            PortState::Opened(_) | PortState::Closed => return Err(CaptureError::AlreadyOpen),
        }

        let opened = match self.config.device() {
            Some(index) => Self::open_index(&self.config, index)?,
            None => Self::probe(&self.config)?,
        };
        self.state = PortState::Opened(Box::new(opened));
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Measurement>, CaptureError> {
        let opened = match &mut self.state {
            PortState::Opened(opened) => opened,
            PortState::Unopened | PortState::Closed => return Err(CaptureError::NotOpen),
        };

        opened.pacer.pace();

        let raw = match opened.capture.with_stream_mut(|stream| {
            stream.next().map(|(buf, meta)| {
                let used = (meta.bytesused as usize).min(buf.len());
                buf[..used].to_vec()
            })
        }) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("/dev/video{}: capture failed: {err}", opened.index);
                return Ok(None);
            }
        };

        let payload = match opened.encode(raw, self.config.jpeg_quality()) {
            Some(payload) => payload,
            None => {
                log::warn!("/dev/video{}: frame encode failed", opened.index);
                return Ok(None);
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert("width".to_string(), opened.width.to_string());
        metadata.insert("height".to_string(), opened.height.to_string());
        metadata.insert("format".to_string(), "jpeg".to_string());

        Ok(Some(Measurement::new(payload, metadata)))
    }

    fn close(&mut self) {
        if let PortState::Opened(opened) = &self.state {
            log::info!("camera closed: /dev/video{}", opened.index);
        }
        self.state = PortState::Closed;
    }

    fn device(&self) -> Option<String> {
        match &self.state {
            PortState::Opened(opened) => Some(format!("/dev/video{}", opened.index)),
            PortState::Unopened | PortState::Closed => None,
        }
    }
}

impl OpenedCamera {
    /// Turn one raw capture buffer into JPEG bytes at the actual
    /// negotiated dimensions.
    fn encode(&self, raw: Vec<u8>, quality: u8) -> Option<Vec<u8>> {
        match self.pixel_format {
            PixelFormat::Mjpg => Some(raw),
            PixelFormat::Yuyv => {
                let rgb = convert::yuyv_to_rgb(&raw, self.width, self.height)?;
                convert::encode_jpeg(&rgb, self.width, self.height, quality)
            }
            PixelFormat::Rgb3 => convert::encode_jpeg(&raw, self.width, self.height, quality),
        }
    }
}

fn fourcc_name(fourcc: FourCC) -> String {
    String::from_utf8_lossy(&fourcc.repr).into_owned()
}

impl fmt::Debug for UsbCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PortState::Unopened => "unopened",
            PortState::Opened(_) => "opened",
            PortState::Closed => "closed",
        };
        f.debug_struct("UsbCamera")
            .field("config", &self.config)
            .field("state", &state)
            .finish()
    }
}
