//! Input device discovery & absolute-range probing (evdev 0.13.2 compatible)

use evdev::{AbsoluteAxisCode, Device, EventType};
use log::debug;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub x_range: (i32, i32),
    pub y_range: (i32, i32),
}

// used when a device refuses to report its axis ranges
const FALLBACK_RANGE: (i32, i32) = (0, 4096);

pub fn discover_multitouch() -> Vec<DeviceInfo> {
    let mut out = vec![];
    let Ok(rd) = std::fs::read_dir("/dev/input") else {
        return out;
    };
    for e in rd.flatten() {
        let p = e.path();
        let is_event_node = p
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.starts_with("event"))
            .unwrap_or(false);
        if !is_event_node {
            continue;
        }
        let Ok(dev) = Device::open(&p) else {
            continue;
        };
        let has_abs = dev.supported_events().contains(EventType::ABSOLUTE);
        let axes = dev.supported_absolute_axes();
        let has_mt = axes.map_or(false, |a| {
            a.contains(AbsoluteAxisCode::ABS_MT_SLOT)
                && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_X)
                && a.contains(AbsoluteAxisCode::ABS_MT_POSITION_Y)
        });
        if !(has_abs && has_mt) {
            continue;
        }

        let mut x_range = FALLBACK_RANGE;
        let mut y_range = FALLBACK_RANGE;
        if let Ok(infos) = dev.get_absinfo() {
            for (code, info) in infos {
                if code == AbsoluteAxisCode::ABS_MT_POSITION_X {
                    x_range = (info.minimum(), info.maximum());
                } else if code == AbsoluteAxisCode::ABS_MT_POSITION_Y {
                    y_range = (info.minimum(), info.maximum());
                }
            }
        }

        let name = dev.name().unwrap_or("unknown").to_string();
        debug!(
            "multitouch device '{}' at {} (x {:?}, y {:?})",
            name,
            p.display(),
            x_range,
            y_range
        );
        out.push(DeviceInfo {
            path: p.display().to_string(),
            name,
            x_range,
            y_range,
        });
    }
    out
}
