use crate::actions::UinputSink;
use crate::config::Profile;
use crate::swipe::{Axis, Direction, GestureKind, SurfaceId};
use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

/// Binding key for a completed gesture, or None for the snap-back case
/// that maps to nothing.
pub fn binding_key(axis: Axis, direction: Direction, kind: GestureKind) -> Option<&'static str> {
    let key = match (kind, axis, direction) {
        (GestureKind::Swipe, Axis::Horizontal, Direction::Positive) => "swipe.right",
        (GestureKind::Swipe, Axis::Horizontal, Direction::Negative) => "swipe.left",
        (GestureKind::Swipe, Axis::Vertical, Direction::Positive) => "swipe.down",
        (GestureKind::Swipe, Axis::Vertical, Direction::Negative) => "swipe.up",
        (GestureKind::Fling, Axis::Horizontal, Direction::Positive) => "fling.right",
        (GestureKind::Fling, Axis::Horizontal, Direction::Negative) => "fling.left",
        (GestureKind::Fling, Axis::Vertical, Direction::Positive) => "fling.down",
        (GestureKind::Fling, Axis::Vertical, Direction::Negative) => "fling.up",
        _ => return None,
    };
    Some(key)
}

pub fn dispatch_swipe(
    surface: &SurfaceId,
    axis: Axis,
    direction: Direction,
    kind: GestureKind,
    profile_arc: &Arc<Mutex<Profile>>,
    sink: &mut UinputSink,
) -> Result<()> {
    let Some(key) = binding_key(axis, direction, kind) else {
        return Ok(());
    };

    let (action, allow_commands) = {
        let p = profile_arc.lock().unwrap();
        (
            p.bindings.get(key).cloned().unwrap_or_default(),
            p.meta.allow_commands,
        )
    };

    if action.is_empty() {
        debug!("{}: no binding for {key}", surface.0);
        return Ok(());
    }
    info!("{}: {key} -> {action}", surface.0);

    if action == "toggle" {
        let now = !sink.is_enabled();
        sink.set_enabled(now);
        info!("synthetic output {}", if now { "enabled" } else { "disabled" });
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("mouse:") {
        sink.click_mouse(rest.trim())?;
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("scroll:") {
        let (axis_s, steps_s) = rest.split_once('@').unwrap_or((rest, "1"));
        let steps: i32 = steps_s.trim().parse().unwrap_or(1);
        if axis_s.trim().eq_ignore_ascii_case("horizontal") {
            sink.scroll_horizontal(steps)?;
        } else {
            sink.scroll_vertical(steps)?;
        }
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("key:") {
        sink.key_chord(rest.trim())?;
        return Ok(());
    }
    if let Some(rest) = action.strip_prefix("cmd:") {
        // validated against meta.allow_commands at load; re-checked in
        // case the profile changed underneath us
        if allow_commands {
            std::process::Command::new("sh").arg("-c").arg(rest).spawn()?;
        } else {
            warn!("cmd binding for {key} ignored (allow_commands=false)");
        }
        return Ok(());
    }

    Err(anyhow!("unknown action mapping for {key} -> '{action}'"))
}
