use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use iris_camera::CameraConfig;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_ENABLED: bool = true;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_JPEG_QUALITY: u8 = 85;
const DEFAULT_SETTLE_MS: u64 = 200;

/// Service configuration, read from the environment.
///
/// Recognized variables: `IRIS_BIND`, `CAMERA_DEVICE`, `CAMERA_ENABLED`,
/// `CAMERA_WIDTH`, `CAMERA_HEIGHT`, `CAMERA_FPS`, `CAMERA_JPEG_QUALITY`,
/// `CAMERA_SETTLE_MS`. Malformed values fall back to their defaults with
/// a warning; the service always comes up.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:8000`.
    pub bind: String,
    /// Whether the grabber starts enabled at boot.
    pub enabled: bool,
    /// Capture settings handed to the camera driver.
    pub camera: CameraConfig,
    /// Pause between release and reacquire during a forced reopen.
    pub settle: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut camera = CameraConfig::default()
            .with_width(parse_number(&lookup, "CAMERA_WIDTH", DEFAULT_WIDTH))
            .with_height(parse_number(&lookup, "CAMERA_HEIGHT", DEFAULT_HEIGHT))
            .with_fps(parse_number(&lookup, "CAMERA_FPS", DEFAULT_FPS))
            .with_jpeg_quality(parse_number(&lookup, "CAMERA_JPEG_QUALITY", DEFAULT_JPEG_QUALITY));
        if let Some(device) = parse_device(&lookup) {
            camera = camera.with_device(device);
        }

        Self {
            bind: lookup("IRIS_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            enabled: parse_flag(&lookup, "CAMERA_ENABLED", DEFAULT_ENABLED),
            camera,
            settle: Duration::from_millis(parse_number(
                &lookup,
                "CAMERA_SETTLE_MS",
                DEFAULT_SETTLE_MS,
            )),
        }
    }
}

/// Absent means "probe for the first usable device".
fn parse_device(lookup: &impl Fn(&str) -> Option<String>) -> Option<u32> {
    let raw = lookup("CAMERA_DEVICE")?;
    match raw.trim().parse() {
        Ok(index) => Some(index),
        Err(err) => {
            log::warn!("CAMERA_DEVICE={raw:?} is invalid ({err}), probing instead");
            None
        }
    }
}

fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(err) => {
            log::warn!("{key}={raw:?} is invalid ({err}), using {default}");
            default
        }
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim() {
        "1" | "true" | "True" => true,
        "0" | "false" | "False" => false,
        other => {
            log::warn!("{key}={other:?} is not a boolean, using {default}");
            default
        }
    }
}
