use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::input;
use crate::swipe::Axis;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

/// Which movement axes a surface tracks. Gestures that lock the other
/// axis are left entirely to native handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeMode {
    Horizontal,
    Vertical,
    Both,
}

impl SwipeMode {
    pub fn allows(self, axis: Axis) -> bool {
        match self {
            SwipeMode::Both => true,
            SwipeMode::Horizontal => axis == Axis::Horizontal,
            SwipeMode::Vertical => axis == Axis::Vertical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwipeMode::Horizontal => "horizontal",
            SwipeMode::Vertical => "vertical",
            SwipeMode::Both => "both",
        }
    }
}

/// Recognition thresholds for one surface.
#[derive(Debug, Clone, Deserialize)]
pub struct SwipeTuning {
    pub mode: SwipeMode,
    /// Travel rate (surface fraction per ms) that must be crossed right
    /// before release for a fling.
    pub fling_speed: f32,
    /// Net travel (surface fraction) at release for a swipe.
    pub swipe_distance: f32,
    /// Minimum ms between processed move samples.
    pub sample_interval_ms: u64,
    /// Travel before the gesture locks to the horizontal axis, in the
    /// units of the incoming points (surface fraction for normalized
    /// streams).
    pub x_axis_lock: f32,
    pub y_axis_lock: f32,
}

impl Default for SwipeTuning {
    fn default() -> Self {
        Self {
            mode: SwipeMode::Both,
            fling_speed: 0.005,
            swipe_distance: 0.5,
            sample_interval_ms: 5,
            x_axis_lock: 0.0,
            y_axis_lock: 0.0,
        }
    }
}

/// Partial tuning override; unset fields keep their previous value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TuningPatch {
    pub mode: Option<SwipeMode>,
    pub fling_speed: Option<f32>,
    pub swipe_distance: Option<f32>,
    pub sample_interval_ms: Option<u64>,
    pub x_axis_lock: Option<f32>,
    pub y_axis_lock: Option<f32>,
}

impl SwipeTuning {
    pub fn merged(&self, patch: &TuningPatch) -> SwipeTuning {
        SwipeTuning {
            mode: patch.mode.unwrap_or(self.mode),
            fling_speed: patch.fling_speed.unwrap_or(self.fling_speed),
            swipe_distance: patch.swipe_distance.unwrap_or(self.swipe_distance),
            sample_interval_ms: patch.sample_interval_ms.unwrap_or(self.sample_interval_ms),
            x_axis_lock: patch.x_axis_lock.unwrap_or(self.x_axis_lock),
            y_axis_lock: patch.y_axis_lock.unwrap_or(self.y_axis_lock),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,

    // Partial [swipe] table merged over built-in defaults
    #[serde(default)]
    pub swipe: TuningPatch,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

impl Profile {
    /// Effective tuning: built-in defaults with the profile's overrides
    /// on top.
    pub fn tuning(&self) -> SwipeTuning {
        SwipeTuning::default().merged(&self.swipe)
    }
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("swipe.fling_speed must be positive (surface fraction per ms)")]
    FlingSpeed,
    #[error("swipe.swipe_distance must be in (0, 1]")]
    SwipeDistance,
    #[error("swipe.sample_interval_ms must be at least 1")]
    SampleInterval,
    #[error("swipe.{axis}_axis_lock must be in [0, 1) normalized units")]
    AxisLock { axis: &'static str },
    #[error("empty binding key")]
    EmptyBindingKey,
    #[error("binding '{key}' has empty action")]
    EmptyAction { key: String },
    #[error("binding '{key}' has invalid action '{action}'")]
    InvalidAction { key: String, action: String },
    #[error("binding '{key}' uses cmd: but allow_commands=false")]
    CommandsDisabled { key: String },
}

pub fn validate_profile(p: &Profile) -> std::result::Result<(), ProfileError> {
    let t = p.tuning();
    if !(t.fling_speed > 0.0) {
        return Err(ProfileError::FlingSpeed);
    }
    if !(t.swipe_distance > 0.0 && t.swipe_distance <= 1.0) {
        return Err(ProfileError::SwipeDistance);
    }
    if t.sample_interval_ms == 0 {
        return Err(ProfileError::SampleInterval);
    }
    if !(0.0..1.0).contains(&t.x_axis_lock) {
        return Err(ProfileError::AxisLock { axis: "x" });
    }
    if !(0.0..1.0).contains(&t.y_axis_lock) {
        return Err(ProfileError::AxisLock { axis: "y" });
    }

    for (k, v) in &p.bindings {
        if k.trim().is_empty() {
            return Err(ProfileError::EmptyBindingKey);
        }
        if v.trim().is_empty() {
            return Err(ProfileError::EmptyAction { key: k.clone() });
        }

        let ok = v.starts_with("mouse:")
            || v.starts_with("scroll:")
            || v.starts_with("key:")
            || v == "toggle"
            || v.starts_with("cmd:");
        if !ok {
            return Err(ProfileError::InvalidAction {
                key: k.clone(),
                action: v.clone(),
            });
        }
        if v.starts_with("cmd:") && !p.meta.allow_commands {
            return Err(ProfileError::CommandsDisabled { key: k.clone() });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
    pub detected_devices: Vec<String>,
}

fn config_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    home.join(".config").join("swipectl")
}

fn profiles_dir() -> PathBuf {
    config_dir().join("profiles")
}

fn active_ptr_path() -> PathBuf {
    config_dir().join("active")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir();
        let profdir = profiles_dir();
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path();
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;
        let detected_devices = input::discover_multitouch()
            .into_iter()
            .map(|d| format!("{} ({})", d.name, d.path))
            .collect();

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
            detected_devices,
        })
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir().join(format!("{name}.toml"));
        let txt = fs::read_to_string(&path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        let profile: Profile =
            toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let tuning = self.profile.tuning();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "mode": tuning.mode.as_str(),
            "devices": self.detected_devices,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
            }
        })
    }
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") || line.starts_with("input:x:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}
