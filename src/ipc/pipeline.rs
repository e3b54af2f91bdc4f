use anyhow::Result;
use log::{debug, error, trace, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex, mpsc};
use std::{thread, time::Duration};

use evdev::{AbsoluteAxisCode, Device, EventType, SynchronizationCode};

use super::dispatch;
use super::server::DaemonEvent;
use crate::actions::UinputSink;
use crate::config::Profile;
use crate::contact::{ContactEvent, ContactTracker};
use crate::input;
use crate::swipe::{Axis, Extent, GestureTracker, MoveDisposition, SurfaceId};

// One touch device with its contact assembler and recognizer.
struct SurfaceWorker {
    dev: Device,
    contacts: ContactTracker,
    tracker: GestureTracker,
    locked: Rc<Cell<Option<Axis>>>,
    grabbed: bool,
}

pub fn run_pipeline(
    profile: Arc<Mutex<Profile>>,
    tx_evt: mpsc::Sender<DaemonEvent>,
) -> Result<()> {
    let found = input::discover_multitouch();
    if found.is_empty() {
        warn!("no multitouch devices detected; pipeline idle");
        loop {
            thread::sleep(Duration::from_secs(1));
        }
    }

    let sink = Rc::new(RefCell::new(
        UinputSink::new().unwrap_or_else(|_| UinputSink::noop()),
    ));
    let tuning = { profile.lock().unwrap().tuning() };

    let mut workers: Vec<SurfaceWorker> = Vec::new();
    for info in found {
        match Device::open(&info.path) {
            Ok(mut dev) => {
                let _ = dev.set_nonblocking(true);
                let mut contacts = ContactTracker::new();
                contacts.set_norm_ranges(
                    info.x_range.0,
                    info.x_range.1,
                    info.y_range.0,
                    info.y_range.1,
                );
                let surface = SurfaceId(format!("{} ({})", info.name, info.path));
                let mut tracker = GestureTracker::new(surface, Extent::UNIT, tuning.clone());
                let locked = Rc::new(Cell::new(None));
                install_listeners(&mut tracker, &locked, &sink, &profile);
                workers.push(SurfaceWorker {
                    dev,
                    contacts,
                    tracker,
                    locked,
                    grabbed: false,
                });
            }
            Err(e) => warn!("failed to open {}: {e}", info.path),
        }
    }
    if workers.is_empty() {
        warn!("failed to open all detected devices; pipeline idle");
        loop {
            thread::sleep(Duration::from_secs(1));
        }
    }

    let _ = tx_evt.send(DaemonEvent::Log(format!(
        "watching {} touch device(s)",
        workers.len()
    )));

    loop {
        let mut any_event = false;
        let tuning = { profile.lock().unwrap().tuning() };

        for w in workers.iter_mut() {
            // last write wins, even against a gesture in flight
            w.tracker.set_tuning(tuning.clone());

            // grab/ungrab must wait until the event batch is drained
            let mut want_grab: Option<bool> = None;

            if let Ok(events) = w.dev.fetch_events() {
                for ev in events {
                    any_event = true;

                    if ev.event_type() == EventType::ABSOLUTE {
                        match ev.code() {
                            c if c == AbsoluteAxisCode::ABS_MT_SLOT.0 => {
                                w.contacts.on_slot(ev.value());
                            }
                            c if c == AbsoluteAxisCode::ABS_MT_TRACKING_ID.0 => {
                                w.contacts.on_tracking_id(ev.value());
                            }
                            c if c == AbsoluteAxisCode::ABS_MT_POSITION_X.0 => {
                                w.contacts.on_pos_x(ev.value());
                            }
                            c if c == AbsoluteAxisCode::ABS_MT_POSITION_Y.0 => {
                                w.contacts.on_pos_y(ev.value());
                            }
                            _ => {}
                        }
                    } else if ev.event_type() == EventType::SYNCHRONIZATION
                        && ev.code() == SynchronizationCode::SYN_REPORT.0
                    {
                        for contact in w.contacts.on_syn_report() {
                            match contact {
                                ContactEvent::Press { point, at_ms } => {
                                    w.tracker.start_touch(point, at_ms);
                                }
                                ContactEvent::Move { point, at_ms } => {
                                    match w.tracker.drag_touch(point, at_ms) {
                                        Ok(MoveDisposition::Suppress) => {
                                            want_grab = Some(true);
                                        }
                                        Ok(MoveDisposition::Propagate) => {
                                            trace!(
                                                "{}: sample left to native handling",
                                                w.tracker.surface().0
                                            );
                                        }
                                        Err(e) => error!("listener failed during drag: {e}"),
                                    }
                                }
                                ContactEvent::Release => {
                                    if let Err(e) = w.tracker.end_touch() {
                                        error!("listener failed at completion: {e}");
                                    }
                                    w.locked.set(None);
                                    want_grab = Some(false);
                                }
                            }
                        }
                    }
                }
            }

            match want_grab {
                Some(true) if !w.grabbed => {
                    if w.dev.grab().is_ok() {
                        w.grabbed = true;
                        debug!("{}: grabbed for the locked axis", w.tracker.surface().0);
                    }
                }
                Some(false) if w.grabbed => {
                    let _ = w.dev.ungrab();
                    w.grabbed = false;
                    debug!("{}: released", w.tracker.surface().0);
                }
                _ => {}
            }
        }

        if !any_event {
            thread::sleep(Duration::from_millis(4));
        }
    }
}

fn install_listeners(
    tracker: &mut GestureTracker,
    locked: &Rc<Cell<Option<Axis>>>,
    sink: &Rc<RefCell<UinputSink>>,
    profile: &Arc<Mutex<Profile>>,
) {
    // The completion payload carries no axis, so remember it from the
    // lock notification until release.
    let cell = locked.clone();
    tracker.on_axis_lock(
        "axis-memo",
        Box::new(move |surface, axis| {
            cell.set(Some(axis));
            debug!("{}: locked {:?} axis", surface.0, axis);
            Ok(())
        }),
    );

    tracker.on_update(
        "trace",
        Box::new(|surface, distance| {
            trace!("{}: travel {:+.3}", surface.0, distance);
            Ok(())
        }),
    );

    let cell = locked.clone();
    let sink = sink.clone();
    let profile = profile.clone();
    tracker.on_complete(
        "bindings",
        Box::new(move |surface, direction, kind| {
            let Some(axis) = cell.take() else {
                // never locked: a tap or a tie held to release
                return Ok(());
            };
            dispatch::dispatch_swipe(
                surface,
                axis,
                direction,
                kind,
                &profile,
                &mut sink.borrow_mut(),
            )
        }),
    );
}
