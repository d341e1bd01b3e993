//! TOML configuration for the runtime.
//!
//! Every section is optional; a missing file section falls back to the
//! built-in scene (camera at `(0, 1.2, 2.5)`, three ceiling bulbs).
//!
//! ```toml
//! [stream]
//! endpoint = "ws://localhost:8000/ws"
//! max_attempts = 5
//! base_delay_ms = 2000
//!
//! [dwell]
//! hold_ms = 3000
//!
//! [[targets]]
//! id = "desk-lamp"
//! center = [0.5, 0.9, -0.4]
//! radius = 0.25
//! ```

use std::path::{Path, PathBuf};

use glam::Vec3;
use handray_core::{
    CoreError, DEFAULT_HOLD_MS, DwellPolicy, PerspectiveCamera, ReconnectPolicy,
    SelectableTarget, SelectionConfig, TargetId, TargetSet,
};
use handray_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Target(#[from] CoreError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub stream: StreamSection,
    pub dwell: DwellSection,
    pub camera: CameraSection,
    pub selection: SelectionSection,
    pub targets: Vec<TargetEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream: StreamSection::default(),
            dwell: DwellSection::default(),
            camera: CameraSection::default(),
            selection: SelectionSection::default(),
            targets: default_targets(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamSection {
    pub endpoint: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        let stream = StreamConfig::default();
        Self {
            endpoint: stream.endpoint,
            max_attempts: stream.reconnect.max_attempts,
            base_delay_ms: stream.reconnect.base_delay_ms,
            connect_timeout_ms: stream.connect_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DwellSection {
    pub hold_ms: u64,
}

impl Default for DwellSection {
    fn default() -> Self {
        Self {
            hold_ms: DEFAULT_HOLD_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSection {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraSection {
    fn default() -> Self {
        let camera = PerspectiveCamera::default();
        Self {
            position: camera.position.to_array(),
            look_at: camera.look_at.to_array(),
            fov_y_degrees: camera.fov_y_degrees,
            aspect: camera.aspect,
            near: camera.near,
            far: camera.far,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionSection {
    pub mirror_x: bool,
}

impl Default for SelectionSection {
    fn default() -> Self {
        Self { mirror_x: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    pub id: String,
    pub center: [f32; 3],
    pub radius: f32,
}

/// Hitbox radius of the default bulbs.
const BULB_RADIUS: f32 = 0.35;

fn default_targets() -> Vec<TargetEntry> {
    [[-2.0, 1.8, -1.0], [0.0, 1.8, 0.0], [2.0, 1.8, 1.0]]
        .into_iter()
        .enumerate()
        .map(|(i, center)| TargetEntry {
            id: format!("bulb-{}", i + 1),
            center,
            radius: BULB_RADIUS,
        })
        .collect()
}

impl AppConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.stream.endpoint.as_str();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "stream.endpoint must be a ws:// or wss:// URL, got {endpoint:?}"
            )));
        }
        if self.dwell.hold_ms == 0 {
            return Err(ConfigError::Invalid("dwell.hold_ms must be positive".into()));
        }
        let camera = &self.camera;
        if !(camera.fov_y_degrees > 0.0 && camera.fov_y_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov_y_degrees must be in (0, 180), got {}",
                camera.fov_y_degrees
            )));
        }
        if !(camera.aspect > 0.0 && camera.near > 0.0 && camera.far > camera.near) {
            return Err(ConfigError::Invalid(
                "camera needs aspect > 0 and 0 < near < far".into(),
            ));
        }
        if camera.position == camera.look_at {
            return Err(ConfigError::Invalid(
                "camera.look_at must differ from camera.position".into(),
            ));
        }
        for entry in &self.targets {
            if !(entry.radius > 0.0) {
                return Err(CoreError::InvalidTarget {
                    id: TargetId::new(entry.id.as_str()),
                    detail: format!("radius must be positive, got {}", entry.radius),
                }
                .into());
            }
        }
        self.target_set()?;
        Ok(())
    }

    /// Targets in file order.
    pub fn target_set(&self) -> Result<TargetSet, CoreError> {
        let mut set = TargetSet::new();
        for entry in &self.targets {
            set.register(SelectableTarget::new(
                entry.id.as_str(),
                Vec3::from_array(entry.center),
                entry.radius,
            ))?;
        }
        Ok(set)
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            endpoint: self.stream.endpoint.clone(),
            reconnect: ReconnectPolicy {
                max_attempts: self.stream.max_attempts,
                base_delay_ms: self.stream.base_delay_ms,
            },
            connect_timeout_ms: self.stream.connect_timeout_ms,
        }
    }

    pub fn selection_config(&self) -> SelectionConfig {
        SelectionConfig {
            mirror_x: self.selection.mirror_x,
            dwell: DwellPolicy {
                hold_ms: self.dwell.hold_ms,
            },
        }
    }

    pub fn camera(&self) -> PerspectiveCamera {
        PerspectiveCamera {
            position: Vec3::from_array(self.camera.position),
            look_at: Vec3::from_array(self.camera.look_at),
            up: Vec3::Y,
            fov_y_degrees: self.camera.fov_y_degrees,
            aspect: self.camera.aspect,
            near: self.camera.near,
            far: self.camera.far,
        }
    }
}
