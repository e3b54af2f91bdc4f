//! Raw multitouch frames → single-pointer contact stream.
//!
//! Kernel multitouch state arrives as per-slot absolute events between
//! SYN_REPORT frame markers. The tracker follows the first contact that
//! lands (the primary) and emits press/move/release for it alone; any
//! other finger on the surface is ignored until it lifts, so it can
//! never disturb the gesture in flight.

use std::time::Instant;

use log::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactEvent {
    Press { point: Point, at_ms: u64 },
    Move { point: Point, at_ms: u64 },
    Release,
}

#[derive(Debug, Clone)]
struct Slot {
    tracking_id: i32, // -1 = empty
    x_raw: i32,
    y_raw: i32,
    // the kernel only reports coordinates that changed, so a slot has no
    // usable position until each axis has been seen at least once
    seen_x: bool,
    seen_y: bool,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            tracking_id: -1,
            x_raw: 0,
            y_raw: 0,
            seen_x: false,
            seen_y: false,
        }
    }
}

#[derive(Debug)]
pub struct ContactTracker {
    slots: Vec<Slot>,
    cur_slot: usize,
    primary: Option<usize>,
    pressed: bool,
    released_this_frame: bool,
    retouch: Option<usize>,
    last_point: Point,
    // normalization
    x_min: i32,
    x_max: i32,
    y_min: i32,
    y_max: i32,
    start_instant: Instant,
}

impl Default for ContactTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactTracker {
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default(); 10],
            cur_slot: 0,
            primary: None,
            pressed: false,
            released_this_frame: false,
            retouch: None,
            last_point: Point { x: 0.0, y: 0.0 },
            x_min: 0,
            x_max: 4096,
            y_min: 0,
            y_max: 4096,
            start_instant: Instant::now(),
        }
    }

    pub fn set_norm_ranges(&mut self, x_min: i32, x_max: i32, y_min: i32, y_max: i32) {
        self.x_min = x_min;
        self.x_max = x_max.max(x_min + 1);
        self.y_min = y_min;
        self.y_max = y_max.max(y_min + 1);
    }

    fn now_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    pub fn on_slot(&mut self, slot: i32) {
        self.cur_slot = slot.clamp(0, (self.slots.len() as i32) - 1) as usize;
    }

    pub fn on_tracking_id(&mut self, id: i32) {
        let slot = self.cur_slot;
        if id < 0 {
            self.slots[slot].tracking_id = -1;
            if self.primary == Some(slot) {
                self.released_this_frame = true;
            }
            return;
        }

        self.slots[slot].tracking_id = id;
        if self.primary.is_none() {
            self.primary = Some(slot);
        } else if self.primary == Some(slot) {
            // lift + retouch inside a single frame: the old stream closes
            // at the frame boundary and this contact starts a new one
            self.retouch = Some(slot);
        } else {
            trace!("ignoring secondary contact (slot {slot}, id {id})");
        }
    }

    pub fn on_pos_x(&mut self, raw: i32) {
        let s = &mut self.slots[self.cur_slot];
        s.x_raw = raw;
        s.seen_x = true;
    }

    pub fn on_pos_y(&mut self, raw: i32) {
        let s = &mut self.slots[self.cur_slot];
        s.y_raw = raw;
        s.seen_y = true;
    }

    /// Closes the frame and returns the contact events it produced, in
    /// stream order.
    pub fn on_syn_report(&mut self) -> Vec<ContactEvent> {
        let now = self.now_ms();
        let mut out = Vec::new();

        if self.released_this_frame || self.retouch.is_some() {
            if self.pressed {
                out.push(ContactEvent::Release);
            }
            self.pressed = false;
            // a finger that was already down while the primary was being
            // tracked is never adopted; only a same-frame retouch is
            self.primary = self.retouch.take();
            self.released_this_frame = false;
        }

        if let Some(slot) = self.primary {
            let s = &self.slots[slot];
            if s.tracking_id >= 0 && s.seen_x && s.seen_y {
                let point = self.normalize(s.x_raw, s.y_raw);
                if !self.pressed {
                    self.pressed = true;
                    self.last_point = point;
                    out.push(ContactEvent::Press { point, at_ms: now });
                } else if point != self.last_point {
                    self.last_point = point;
                    out.push(ContactEvent::Move { point, at_ms: now });
                }
            }
        }

        out
    }

    fn normalize(&self, x_raw: i32, y_raw: i32) -> Point {
        let nx = (x_raw - self.x_min) as f32 / (self.x_max - self.x_min) as f32;
        let ny = (y_raw - self.y_min) as f32 / (self.y_max - self.y_min) as f32;
        Point {
            x: nx.clamp(0.0, 1.0),
            y: ny.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ContactTracker {
        let mut t = ContactTracker::new();
        t.set_norm_ranges(0, 4000, 0, 2000);
        t
    }

    fn press_at(t: &mut ContactTracker, id: i32, x: i32, y: i32) -> Vec<ContactEvent> {
        t.on_tracking_id(id);
        t.on_pos_x(x);
        t.on_pos_y(y);
        t.on_syn_report()
    }

    #[test]
    fn press_waits_for_both_coordinates() {
        let mut t = tracker();

        t.on_tracking_id(7);
        t.on_pos_x(2000);
        assert!(t.on_syn_report().is_empty());

        t.on_pos_y(1000);
        let evs = t.on_syn_report();
        assert_eq!(evs.len(), 1);
        match evs[0] {
            ContactEvent::Press { point, .. } => {
                assert!((point.x - 0.5).abs() < 1e-6);
                assert!((point.y - 0.5).abs() < 1e-6);
            }
            other => panic!("expected press, got {other:?}"),
        }
    }

    #[test]
    fn position_changes_become_moves() {
        let mut t = tracker();
        press_at(&mut t, 7, 2000, 1000);

        t.on_pos_x(2400);
        let evs = t.on_syn_report();
        assert_eq!(evs.len(), 1);
        match evs[0] {
            ContactEvent::Move { point, .. } => {
                assert!((point.x - 0.6).abs() < 1e-6);
                assert!((point.y - 0.5).abs() < 1e-6);
            }
            other => panic!("expected move, got {other:?}"),
        }

        // a frame with no position change stays silent
        assert!(t.on_syn_report().is_empty());
    }

    #[test]
    fn lift_emits_release() {
        let mut t = tracker();
        press_at(&mut t, 7, 2000, 1000);

        t.on_tracking_id(-1);
        assert_eq!(t.on_syn_report(), vec![ContactEvent::Release]);

        // and nothing more until a new contact lands
        assert!(t.on_syn_report().is_empty());
    }

    #[test]
    fn second_finger_is_invisible() {
        let mut t = tracker();
        press_at(&mut t, 7, 2000, 1000);

        t.on_slot(1);
        t.on_tracking_id(8);
        t.on_pos_x(3000);
        t.on_pos_y(500);
        assert!(t.on_syn_report().is_empty());

        // its movement stays invisible too
        t.on_pos_x(3500);
        assert!(t.on_syn_report().is_empty());

        // the primary keeps streaming
        t.on_slot(0);
        t.on_pos_x(2400);
        let evs = t.on_syn_report();
        assert!(matches!(evs.as_slice(), [ContactEvent::Move { .. }]));
    }

    #[test]
    fn held_second_finger_is_not_adopted_after_release() {
        let mut t = tracker();
        press_at(&mut t, 7, 2000, 1000);

        t.on_slot(1);
        t.on_tracking_id(8);
        t.on_pos_x(3000);
        t.on_pos_y(500);
        t.on_syn_report();

        // primary lifts; the held finger must not start a stream mid-life
        t.on_slot(0);
        t.on_tracking_id(-1);
        assert_eq!(t.on_syn_report(), vec![ContactEvent::Release]);

        t.on_slot(1);
        t.on_pos_x(3200);
        assert!(t.on_syn_report().is_empty());

        // once everything lifts, a fresh contact is tracked again
        t.on_tracking_id(-1);
        assert!(t.on_syn_report().is_empty());
        t.on_slot(0);
        let evs = press_at(&mut t, 9, 1000, 1000);
        assert!(matches!(evs.as_slice(), [ContactEvent::Press { .. }]));
    }

    #[test]
    fn same_frame_retouch_closes_and_reopens_the_stream() {
        let mut t = tracker();
        press_at(&mut t, 7, 2000, 1000);

        t.on_tracking_id(-1);
        t.on_tracking_id(9);
        t.on_pos_x(100);
        t.on_pos_y(100);
        let evs = t.on_syn_report();
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0], ContactEvent::Release);
        assert!(matches!(evs[1], ContactEvent::Press { .. }));
    }

    #[test]
    fn coordinates_clamp_to_the_device_range() {
        let mut t = tracker();
        let evs = press_at(&mut t, 7, 5000, -50);
        match evs[0] {
            ContactEvent::Press { point, .. } => {
                assert_eq!(point.x, 1.0);
                assert_eq!(point.y, 0.0);
            }
            other => panic!("expected press, got {other:?}"),
        }
    }
}
