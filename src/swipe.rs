//! Swipe/fling recognition for one surface.
//!
//! A `GestureTracker` is fed the press/move/release stream of a single
//! contact and classifies the gesture at release: a fling needs a burst of
//! speed right before the finger lifts, a swipe just needs enough net
//! travel. The first axis whose displacement wins the lock race owns the
//! gesture for its whole lifetime; movement on the other axis is left to
//! native handling.

use anyhow::Result;
use log::trace;

use crate::config::SwipeTuning;
use crate::contact::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Travel direction along the locked axis. Positive is right/down in
/// touch coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Fling,
    Swipe,
    None,
}

/// What the host should do with the move sample it just fed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDisposition {
    /// Native handling keeps the sample (no axis owned, or the locked
    /// axis is not tracked in the current mode).
    Propagate,
    /// The tracker owns the locked axis; the host should swallow the
    /// sample (e.g. grab the device) even if the throttle dropped it.
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceId(pub String);

/// Surface size in the same units as incoming points; travel is reported
/// as a fraction of it.
#[derive(Debug, Clone, Copy)]
pub struct Extent {
    pub width: f32,
    pub height: f32,
}

impl Extent {
    /// For contact streams already normalized to [0,1].
    pub const UNIT: Self = Self {
        width: 1.0,
        height: 1.0,
    };
}

pub type LockListener = Box<dyn FnMut(&SurfaceId, Axis) -> Result<()>>;
pub type UpdateListener = Box<dyn FnMut(&SurfaceId, f32) -> Result<()>>;
pub type CompleteListener = Box<dyn FnMut(&SurfaceId, Direction, GestureKind) -> Result<()>>;

// Per-gesture scratch, alive from press to release.
#[derive(Debug, Clone)]
struct Progress {
    start: Point,
    distance: f32,
    fling_direction: Direction,
    last_sample_ms: u64,
    locked_axis: Option<Axis>,
}

impl Progress {
    fn fresh(start: Point, at_ms: u64) -> Self {
        Self {
            start,
            distance: 0.0,
            fling_direction: Direction::None,
            last_sample_ms: at_ms,
            locked_axis: None,
        }
    }
}

pub struct GestureTracker {
    surface: SurfaceId,
    extent: Extent,
    tuning: SwipeTuning,
    progress: Option<Progress>,
    lock_listeners: Vec<(&'static str, LockListener)>,
    update_listeners: Vec<(&'static str, UpdateListener)>,
    complete_listeners: Vec<(&'static str, CompleteListener)>,
}

impl GestureTracker {
    pub fn new(surface: SurfaceId, extent: Extent, tuning: SwipeTuning) -> Self {
        Self {
            surface,
            extent,
            tuning,
            progress: None,
            lock_listeners: Vec::new(),
            update_listeners: Vec::new(),
            complete_listeners: Vec::new(),
        }
    }

    pub fn surface(&self) -> &SurfaceId {
        &self.surface
    }

    pub fn tuning(&self) -> &SwipeTuning {
        &self.tuning
    }

    /// Replaces the tuning wholesale. Takes effect immediately; a gesture
    /// in flight reads the new values in place (last write wins, no
    /// snapshot per gesture).
    pub fn set_tuning(&mut self, tuning: SwipeTuning) {
        self.tuning = tuning;
    }

    /// Applies a partial override on top of the current tuning. Same
    /// in-place semantics as [`set_tuning`](Self::set_tuning).
    pub fn merge_tuning(&mut self, patch: &crate::config::TuningPatch) {
        self.tuning = self.tuning.merged(patch);
    }

    /// Registers a listener fired once per gesture when an axis is
    /// locked. Returns false (keeping the original registration and its
    /// order slot) if `id` is already registered.
    pub fn on_axis_lock(&mut self, id: &'static str, listener: LockListener) -> bool {
        if self.lock_listeners.iter().any(|(k, _)| *k == id) {
            return false;
        }
        self.lock_listeners.push((id, listener));
        true
    }

    /// Registers a listener fired with the current fractional travel, at
    /// most once per `sample_interval_ms`.
    pub fn on_update(&mut self, id: &'static str, listener: UpdateListener) -> bool {
        if self.update_listeners.iter().any(|(k, _)| *k == id) {
            return false;
        }
        self.update_listeners.push((id, listener));
        true
    }

    /// Registers a listener fired once at release with the classified
    /// gesture.
    pub fn on_complete(&mut self, id: &'static str, listener: CompleteListener) -> bool {
        if self.complete_listeners.iter().any(|(k, _)| *k == id) {
            return false;
        }
        self.complete_listeners.push((id, listener));
        true
    }

    pub fn remove_axis_lock(&mut self, id: &str) -> bool {
        let before = self.lock_listeners.len();
        self.lock_listeners.retain(|(k, _)| *k != id);
        self.lock_listeners.len() != before
    }

    pub fn remove_update(&mut self, id: &str) -> bool {
        let before = self.update_listeners.len();
        self.update_listeners.retain(|(k, _)| *k != id);
        self.update_listeners.len() != before
    }

    pub fn remove_complete(&mut self, id: &str) -> bool {
        let before = self.complete_listeners.len();
        self.complete_listeners.retain(|(k, _)| *k != id);
        self.complete_listeners.len() != before
    }

    /// A contact landed. Opens a fresh gesture; no listener fires.
    pub fn start_touch(&mut self, point: Point, at_ms: u64) {
        self.progress = Some(Progress::fresh(point, at_ms));
    }

    /// The contact moved. Runs the axis-lock race while undecided, then
    /// throttled distance/speed tracking along the locked axis.
    pub fn drag_touch(&mut self, point: Point, at_ms: u64) -> Result<MoveDisposition> {
        let Some(progress) = self.progress.as_mut() else {
            // move without a press: host mis-sequenced, drop it
            return Ok(MoveDisposition::Propagate);
        };

        if let Some(axis) = progress.locked_axis {
            if !self.tuning.mode.allows(axis) {
                return Ok(MoveDisposition::Propagate);
            }
        }

        let axis = match progress.locked_axis {
            Some(axis) => axis,
            None => {
                let x_abs = (point.x - progress.start.x).abs();
                let y_abs = (point.y - progress.start.y).abs();
                let committed = if x_abs > y_abs && x_abs > self.tuning.x_axis_lock {
                    Some(Axis::Horizontal)
                } else if y_abs > x_abs && y_abs > self.tuning.y_axis_lock {
                    Some(Axis::Vertical)
                } else {
                    // tie or below lock distance; the race re-runs on the
                    // next sample
                    None
                };
                let Some(axis) = committed else {
                    return Ok(MoveDisposition::Propagate);
                };
                progress.locked_axis = Some(axis);
                if !self.tuning.mode.allows(axis) {
                    // foreign axis stays native for the whole gesture
                    return Ok(MoveDisposition::Propagate);
                }
                trace!("{}: locked {:?}", self.surface.0, axis);
                fire_lock(&mut self.lock_listeners, &self.surface, axis)?;
                axis
            }
        };

        // From here the gesture owns the sample, processed or not.
        let dt = at_ms.saturating_sub(progress.last_sample_ms);
        if dt == 0 || dt < self.tuning.sample_interval_ms {
            return Ok(MoveDisposition::Suppress);
        }

        let new_distance = match axis {
            Axis::Horizontal => (point.x - progress.start.x) / self.extent.width,
            Axis::Vertical => (point.y - progress.start.y) / self.extent.height,
        };
        // Speed over the delta since the last processed sample, not over
        // the whole gesture: a fast start followed by a slow deliberate
        // stop must not read as a fling.
        let speed = (new_distance - progress.distance).abs() / dt as f32;
        progress.fling_direction = if speed >= self.tuning.fling_speed {
            if new_distance > progress.distance {
                Direction::Positive
            } else {
                Direction::Negative
            }
        } else {
            Direction::None
        };
        progress.distance = new_distance;
        progress.last_sample_ms = at_ms;

        fire_update(&mut self.update_listeners, &self.surface, new_distance)?;
        Ok(MoveDisposition::Suppress)
    }

    /// The contact lifted. Classifies and reports the gesture, then the
    /// tracker is back at its idle baseline no matter what the listeners
    /// did. A fling must agree with the net travel direction to count;
    /// one that reversed before release reports as (None, None).
    pub fn end_touch(&mut self) -> Result<()> {
        let Some(progress) = self.progress.take() else {
            // release without a press
            return Ok(());
        };

        if let Some(axis) = progress.locked_axis {
            if !self.tuning.mode.allows(axis) {
                // the gesture ran its course natively; nothing to report
                return Ok(());
            }
        }

        let swipe_distance = self.tuning.swipe_distance;
        let (direction, kind) = match progress.fling_direction {
            Direction::None => {
                if progress.distance > swipe_distance {
                    (Direction::Positive, GestureKind::Swipe)
                } else if progress.distance < -swipe_distance {
                    (Direction::Negative, GestureKind::Swipe)
                } else {
                    (Direction::None, GestureKind::None)
                }
            }
            Direction::Positive if progress.distance > 0.0 => {
                (Direction::Positive, GestureKind::Fling)
            }
            Direction::Negative if progress.distance < 0.0 => {
                (Direction::Negative, GestureKind::Fling)
            }
            _ => (Direction::None, GestureKind::None),
        };

        fire_complete(&mut self.complete_listeners, &self.surface, direction, kind)
    }
}

fn fire_lock(
    listeners: &mut [(&'static str, LockListener)],
    surface: &SurfaceId,
    axis: Axis,
) -> Result<()> {
    for (_, f) in listeners.iter_mut() {
        f(surface, axis)?;
    }
    Ok(())
}

fn fire_update(
    listeners: &mut [(&'static str, UpdateListener)],
    surface: &SurfaceId,
    distance: f32,
) -> Result<()> {
    for (_, f) in listeners.iter_mut() {
        f(surface, distance)?;
    }
    Ok(())
}

fn fire_complete(
    listeners: &mut [(&'static str, CompleteListener)],
    surface: &SurfaceId,
    direction: Direction,
    kind: GestureKind,
) -> Result<()> {
    for (_, f) in listeners.iter_mut() {
        f(surface, direction, kind)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SwipeMode, TuningPatch};
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tuning(mode: SwipeMode) -> SwipeTuning {
        SwipeTuning {
            mode,
            fling_speed: 0.005,
            swipe_distance: 0.5,
            sample_interval_ms: 5,
            x_axis_lock: 0.0,
            y_axis_lock: 0.0,
        }
    }

    fn tracker(mode: SwipeMode) -> GestureTracker {
        GestureTracker::new(SurfaceId("test".into()), Extent::UNIT, tuning(mode))
    }

    fn pt(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    type Completions = Rc<RefCell<Vec<(Direction, GestureKind)>>>;

    fn record_completions(t: &mut GestureTracker) -> Completions {
        let log: Completions = Rc::new(RefCell::new(Vec::new()));
        let out = log.clone();
        t.on_complete(
            "record",
            Box::new(move |_, d, k| {
                out.borrow_mut().push((d, k));
                Ok(())
            }),
        );
        log
    }

    fn record_locks(t: &mut GestureTracker) -> Rc<RefCell<Vec<Axis>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let out = log.clone();
        t.on_axis_lock(
            "record",
            Box::new(move |_, axis| {
                out.borrow_mut().push(axis);
                Ok(())
            }),
        );
        log
    }

    fn record_updates(t: &mut GestureTracker) -> Rc<RefCell<Vec<f32>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let out = log.clone();
        t.on_update(
            "record",
            Box::new(move |_, d| {
                out.borrow_mut().push(d);
                Ok(())
            }),
        );
        log
    }

    #[test]
    fn slow_wide_drag_completes_as_swipe() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.1, 0.5), 0);
        for (ms, x) in [(50, 0.25), (100, 0.4), (150, 0.55), (200, 0.7)] {
            let disp = t.drag_touch(pt(x, 0.5), ms).unwrap();
            assert_eq!(disp, MoveDisposition::Suppress);
        }
        t.end_touch().unwrap();

        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Positive, GestureKind::Swipe)]
        );
    }

    #[test]
    fn short_fast_drag_completes_as_fling() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.5), 0);
        // 0.15 surface widths in 10ms is well past the speed threshold,
        // while the net travel stays under the swipe distance
        t.drag_touch(pt(0.65, 0.5), 10).unwrap();
        t.end_touch().unwrap();

        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Positive, GestureKind::Fling)]
        );
    }

    #[test]
    fn slow_reversal_clears_earlier_fling() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.5), 0);
        t.drag_touch(pt(0.6, 0.5), 10).unwrap(); // fast: fling positive
        t.drag_touch(pt(0.45, 0.5), 100).unwrap(); // slow pull back past start
        t.end_touch().unwrap();

        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::None, GestureKind::None)]
        );
    }

    #[test]
    fn fling_disagreeing_with_net_travel_is_void() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.5), 0);
        t.drag_touch(pt(0.3, 0.5), 100).unwrap(); // slow drift left
        t.drag_touch(pt(0.45, 0.5), 110).unwrap(); // fast jerk right, still left of start
        t.end_touch().unwrap();

        // last-instant direction is positive but the finger never made it
        // back past the press point
        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::None, GestureKind::None)]
        );
    }

    #[test]
    fn negative_swipe_reports_negative_direction() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.9, 0.5), 0);
        for (ms, x) in [(60, 0.7), (120, 0.5), (180, 0.3)] {
            t.drag_touch(pt(x, 0.5), ms).unwrap();
        }
        t.end_touch().unwrap();

        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Negative, GestureKind::Swipe)]
        );
    }

    #[test]
    fn equal_displacement_locks_nothing() {
        let mut t = tracker(SwipeMode::Both);
        let locks = record_locks(&mut t);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.5), 0);
        let disp = t.drag_touch(pt(0.7, 0.7), 10).unwrap();
        assert_eq!(disp, MoveDisposition::Propagate);
        assert!(locks.borrow().is_empty());

        // a later sample that breaks the tie wins the race
        t.drag_touch(pt(0.9, 0.7), 20).unwrap();
        assert_eq!(locks.borrow().as_slice(), &[Axis::Horizontal]);

        t.end_touch().unwrap();
        assert_eq!(done.borrow().len(), 1);
    }

    #[test]
    fn tie_held_to_release_is_a_noop_completion() {
        let mut t = tracker(SwipeMode::Both);
        let locks = record_locks(&mut t);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.5), 0);
        t.drag_touch(pt(0.7, 0.7), 10).unwrap();
        t.drag_touch(pt(0.3, 0.3), 20).unwrap();
        t.end_touch().unwrap();

        assert!(locks.borrow().is_empty());
        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::None, GestureKind::None)]
        );
    }

    #[test]
    fn lock_is_monotone_within_a_gesture() {
        let mut t = tracker(SwipeMode::Both);
        let locks = record_locks(&mut t);
        let updates = record_updates(&mut t);

        t.start_touch(pt(0.5, 0.5), 0);
        t.drag_touch(pt(0.6, 0.5), 10).unwrap();
        // vertical movement now dwarfs horizontal; the lock must not move
        t.drag_touch(pt(0.6, 0.9), 20).unwrap();
        t.drag_touch(pt(0.6, 0.1), 30).unwrap();

        assert_eq!(locks.borrow().as_slice(), &[Axis::Horizontal]);
        // distances keep reading off the x axis
        for d in updates.borrow().iter() {
            assert!((*d - 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn foreign_axis_gesture_stays_silent_in_horizontal_mode() {
        let mut t = tracker(SwipeMode::Horizontal);
        let locks = record_locks(&mut t);
        let updates = record_updates(&mut t);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.1), 0);
        for (ms, y) in [(10, 0.3), (20, 0.6), (30, 0.9)] {
            let disp = t.drag_touch(pt(0.5, y), ms).unwrap();
            assert_eq!(disp, MoveDisposition::Propagate);
        }
        t.end_touch().unwrap();

        assert!(locks.borrow().is_empty());
        assert!(updates.borrow().is_empty());
        assert!(done.borrow().is_empty());

        // and the tracker is clean for the next gesture
        t.start_touch(pt(0.1, 0.5), 100);
        t.drag_touch(pt(0.8, 0.5), 300).unwrap();
        t.end_touch().unwrap();
        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Positive, GestureKind::Swipe)]
        );
    }

    #[test]
    fn vertical_mode_tracks_vertical_gestures() {
        let mut t = tracker(SwipeMode::Vertical);
        let done = record_completions(&mut t);

        t.start_touch(pt(0.5, 0.1), 0);
        for (ms, y) in [(60, 0.3), (120, 0.5), (180, 0.75)] {
            assert_eq!(
                t.drag_touch(pt(0.5, y), ms).unwrap(),
                MoveDisposition::Suppress
            );
        }
        t.end_touch().unwrap();

        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Positive, GestureKind::Swipe)]
        );
    }

    #[test]
    fn updates_obey_the_sample_interval() {
        let mut t = tracker(SwipeMode::Both);
        let updates = record_updates(&mut t);

        t.start_touch(pt(0.0, 0.5), 0);
        // locks on the first sample but dt=1 is inside the throttle window
        assert_eq!(
            t.drag_touch(pt(0.1, 0.5), 1).unwrap(),
            MoveDisposition::Suppress
        );
        assert!(updates.borrow().is_empty());

        t.drag_touch(pt(0.2, 0.5), 6).unwrap(); // dt=6, processed
        t.drag_touch(pt(0.3, 0.5), 8).unwrap(); // dt=2, dropped
        t.drag_touch(pt(0.4, 0.5), 12).unwrap(); // dt=6, processed

        let seen: Vec<f32> = updates.borrow().clone();
        assert_eq!(seen.len(), 2);
        assert!((seen[0] - 0.2).abs() < 1e-6);
        assert!((seen[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn identical_timestamps_never_divide_by_zero() {
        let mut t = tracker(SwipeMode::Both);
        let updates = record_updates(&mut t);

        t.start_touch(pt(0.0, 0.5), 100);
        assert_eq!(
            t.drag_touch(pt(0.3, 0.5), 100).unwrap(),
            MoveDisposition::Suppress
        );
        assert!(updates.borrow().is_empty());
    }

    #[test]
    fn duplicate_listener_registration_is_a_noop() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        let extra = done.clone();
        let added = t.on_complete(
            "record",
            Box::new(move |_, d, k| {
                extra.borrow_mut().push((d, k));
                Ok(())
            }),
        );
        assert!(!added);

        t.start_touch(pt(0.5, 0.5), 0);
        t.end_touch().unwrap();
        assert_eq!(done.borrow().len(), 1);
    }

    #[test]
    fn removed_listener_stops_firing() {
        let mut t = tracker(SwipeMode::Both);
        let done = record_completions(&mut t);

        assert!(t.remove_complete("record"));
        assert!(!t.remove_complete("record"));

        t.start_touch(pt(0.5, 0.5), 0);
        t.end_touch().unwrap();
        assert!(done.borrow().is_empty());
    }

    #[test]
    fn stray_events_without_a_press_are_noops() {
        let mut t = tracker(SwipeMode::Both);
        let locks = record_locks(&mut t);
        let done = record_completions(&mut t);

        assert_eq!(
            t.drag_touch(pt(0.9, 0.5), 10).unwrap(),
            MoveDisposition::Propagate
        );
        t.end_touch().unwrap();

        assert!(locks.borrow().is_empty());
        assert!(done.borrow().is_empty());
    }

    #[test]
    fn failing_listener_still_resets_the_gesture() {
        let mut t = tracker(SwipeMode::Both);
        t.on_complete("boom", Box::new(|_, _, _| Err(anyhow!("listener exploded"))));

        t.start_touch(pt(0.1, 0.5), 0);
        t.drag_touch(pt(0.8, 0.5), 100).unwrap();
        assert!(t.end_touch().is_err());

        // the failure propagated, but the machine is back at baseline
        t.remove_complete("boom");
        let done = record_completions(&mut t);
        t.start_touch(pt(0.1, 0.5), 200);
        t.drag_touch(pt(0.8, 0.5), 400).unwrap();
        t.end_touch().unwrap();
        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Positive, GestureKind::Swipe)]
        );
    }

    #[test]
    fn completion_resets_even_without_listeners() {
        let mut t = tracker(SwipeMode::Both);

        t.start_touch(pt(0.1, 0.5), 0);
        t.drag_touch(pt(0.8, 0.5), 100).unwrap();
        t.end_touch().unwrap();

        // a fresh press starts from scratch: the old travel is gone
        let done = record_completions(&mut t);
        t.start_touch(pt(0.5, 0.5), 200);
        t.end_touch().unwrap();
        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::None, GestureKind::None)]
        );
    }

    #[test]
    fn merge_tuning_keeps_unset_fields() {
        let mut t = tracker(SwipeMode::Both);
        t.merge_tuning(&TuningPatch {
            swipe_distance: Some(0.25),
            ..TuningPatch::default()
        });
        assert_eq!(t.tuning().swipe_distance, 0.25);
        assert_eq!(t.tuning().sample_interval_ms, 5);
        assert_eq!(t.tuning().mode, SwipeMode::Both);
    }

    #[test]
    fn extent_scales_pixel_input_to_fractions() {
        let mut t = GestureTracker::new(
            SurfaceId("screen".into()),
            Extent {
                width: 1000.0,
                height: 500.0,
            },
            SwipeTuning {
                x_axis_lock: 30.0,
                y_axis_lock: 30.0,
                ..SwipeTuning::default()
            },
        );
        let done = record_completions(&mut t);
        let locks = record_locks(&mut t);

        t.start_touch(pt(100.0, 250.0), 0);
        // 20px is under the lock distance
        assert_eq!(
            t.drag_touch(pt(120.0, 250.0), 10).unwrap(),
            MoveDisposition::Propagate
        );
        assert!(locks.borrow().is_empty());

        t.drag_touch(pt(400.0, 250.0), 100).unwrap();
        t.drag_touch(pt(700.0, 250.0), 200).unwrap();
        t.end_touch().unwrap();

        assert_eq!(locks.borrow().as_slice(), &[Axis::Horizontal]);
        assert_eq!(
            done.borrow().as_slice(),
            &[(Direction::Positive, GestureKind::Swipe)]
        );
    }
}
