//! Controller state engine
//!
//! Single synchronous entry point for raw input. Each event is classified,
//! shaped and applied to the logical pad state, and the resulting output
//! commands are issued to the sink before [`handle`](ControllerStateEngine::handle)
//! returns.
//!
//! # Mode machine
//!
//! ```text
//!              toggle (tertiary release / external)
//! Controller ◄────────────────────────────────────► Passthrough
//!      │                                                 │
//!      └──────────── safety chord (terminal) ◄───────────┘
//! ```
//!
//! # Locking
//!
//! Pad state, mode, curve, pulse timer and sink share one lock. Work under it
//! is constant time per event and nothing awaits while holding it, so key
//! updates queued behind motion shaping wait at most one sample. The key
//! table has its own lock so the safety chord never waits on motion shaping.
//! When both are needed the pad lock is taken first.

use crate::config::{EngineSettings, Settings};
use crate::controller::keys::KeyStateTable;
use crate::controller::mapping::{
    self, Action, Trigger, PULSED_BUTTON, SAFETY_CHORD, STICK_DOWN, STICK_LEFT, STICK_RIGHT,
    STICK_UP,
};
use crate::controller::pulse::{PulseTimer, Scheduler};
use crate::controller::sink::{ControllerSink, SinkError};
use crate::controller::state::{Button, ControllerState, DPad, DPadEdges, Mode};
use crate::curve::CurveProcessor;
use crate::input::{Disposition, KeyCode, MotionAggregator, MotionSample, MouseButton, RawInputEvent};
use chrono::Local;
use glam::Vec2;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

struct PadInner<K, H> {
    mode: Mode,
    controller_available: bool,
    state: ControllerState,
    dpad_edges: DPadEdges,
    pulse_key_held: bool,
    wheel_pulse: bool,
    pulse: PulseTimer<H>,
    curve: CurveProcessor,
    sink: K,
}

/// Owns the logical pad and turns raw input into sink commands
pub struct ControllerStateEngine<K, S>
where
    K: ControllerSink,
    S: Scheduler,
{
    settings: EngineSettings,
    aggregator: MotionAggregator,
    keys: Mutex<KeyStateTable>,
    inner: Mutex<PadInner<K, S::Handle>>,
    scheduler: S,
    mode_sender: watch::Sender<Mode>,
    termination: CancellationToken,
    weak_self: Weak<Self>,
}

fn accepted(result: Result<(), SinkError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Sink did not take update: {}", e);
            false
        }
    }
}

impl<K, H> PadInner<K, H> {
    fn is_controller(&self) -> bool {
        self.mode == Mode::Controller
    }
}

impl<K: ControllerSink, H: Send + 'static> PadInner<K, H> {
    fn set_button(&mut self, button: Button, down: bool) -> bool {
        if !self.state.set_button(button, down) {
            return false;
        }
        accepted(self.sink.set_button(button, down))
    }

    fn set_trigger(&mut self, trigger: Trigger, value: f32) -> bool {
        match trigger {
            Trigger::Left if self.state.left_trigger != value => {
                self.state.left_trigger = value;
                accepted(self.sink.set_left_trigger(value))
            }
            Trigger::Right if self.state.right_trigger != value => {
                self.state.right_trigger = value;
                accepted(self.sink.set_right_trigger(value))
            }
            _ => false,
        }
    }

    fn set_left_stick(&mut self, stick: Vec2) -> bool {
        if self.state.left_stick == stick {
            return false;
        }
        self.state.left_stick = stick;
        accepted(self.sink.set_left_stick(stick.x, stick.y))
    }

    fn set_right_stick(&mut self, stick: Vec2) -> bool {
        if self.state.right_stick == stick {
            return false;
        }
        self.state.right_stick = stick;
        accepted(self.sink.set_right_stick(stick.x, stick.y))
    }

    fn update_dpad(&mut self) -> bool {
        let direction = self.dpad_edges.direction();
        if self.state.dpad == direction {
            return false;
        }
        self.state.dpad = direction;
        accepted(self.sink.set_dpad(direction))
    }

    fn update_pulsed_button(&mut self) -> bool {
        let desired = self.pulse_key_held || self.wheel_pulse;
        self.set_button(PULSED_BUTTON, desired)
    }

    /// Drives every output to neutral regardless of the tracked state.
    fn reset_outputs(&mut self) -> bool {
        self.state = ControllerState::default();
        self.dpad_edges = DPadEdges::empty();

        let mut any = false;
        any |= accepted(self.sink.set_left_stick(0.0, 0.0));
        any |= accepted(self.sink.set_right_stick(0.0, 0.0));
        any |= accepted(self.sink.set_left_trigger(0.0));
        any |= accepted(self.sink.set_right_trigger(0.0));
        for button in Button::ALL {
            any |= accepted(self.sink.set_button(button, false));
        }
        any |= accepted(self.sink.set_dpad(DPad::Neutral));
        any
    }

    fn commit(&mut self, dirty: bool) {
        if !dirty {
            return;
        }
        if let Err(e) = self.sink.submit() {
            debug!("Nothing submitted: {}", e);
        }
    }
}

impl<K, S> ControllerStateEngine<K, S>
where
    K: ControllerSink,
    S: Scheduler,
{
    pub fn new(curve: Settings, settings: EngineSettings, sink: K, scheduler: S) -> Arc<Self> {
        let mode = if settings.start_in_controller_mode {
            Mode::Controller
        } else {
            Mode::Passthrough
        };
        info!(
            "Creating controller state engine in {} mode with settings: {:?}",
            mode, settings
        );
        debug!("Curve settings: {:?}", curve);

        let (mode_sender, _) = watch::channel(mode);

        Arc::new_cyclic(|weak_self| Self {
            settings,
            aggregator: MotionAggregator::new(),
            keys: Mutex::new(KeyStateTable::default()),
            inner: Mutex::new(PadInner {
                mode,
                controller_available: true,
                state: ControllerState::default(),
                dpad_edges: DPadEdges::empty(),
                pulse_key_held: false,
                wheel_pulse: false,
                pulse: PulseTimer::default(),
                curve: CurveProcessor::new(curve),
                sink,
            }),
            scheduler,
            mode_sender,
            termination: CancellationToken::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Processes one raw event to completion.
    ///
    /// Pointer events are consumed while in controller mode; keys always
    /// pass through. After the safety chord fired every event passes through
    /// untouched.
    pub fn handle(&self, event: RawInputEvent) -> Disposition {
        if self.termination.is_cancelled() {
            return Disposition::PassThrough;
        }

        let was_controller = self.mode() == Mode::Controller;
        let pointer_disposition = if was_controller {
            Disposition::Consume
        } else {
            Disposition::PassThrough
        };

        match event {
            RawInputEvent::Motion { dx, dy } => {
                self.on_raw_motion(dx, dy);
                if self.settings.suppress_pointer_motion {
                    pointer_disposition
                } else {
                    Disposition::PassThrough
                }
            }
            RawInputEvent::ButtonDown(button) => {
                self.on_button_event(button, true);
                pointer_disposition
            }
            RawInputEvent::ButtonUp(button) => {
                self.on_button_event(button, false);
                pointer_disposition
            }
            RawInputEvent::Wheel(delta) => {
                self.on_wheel_event(delta);
                pointer_disposition
            }
            RawInputEvent::Key { key, down } => {
                self.on_key_event(key, down);
                Disposition::PassThrough
            }
        }
    }

    fn on_raw_motion(&self, dx: i32, dy: i32) {
        let mut inner = self.inner.lock();
        if !inner.is_controller() {
            return;
        }
        let sample = self.aggregator.add(dx, dy);
        Self::apply_motion(&mut inner, sample);
    }

    /// Shapes an aggregated sample onto the right stick.
    pub fn on_motion(&self, sample: MotionSample) {
        let mut inner = self.inner.lock();
        if !inner.is_controller() {
            return;
        }
        Self::apply_motion(&mut inner, sample);
    }

    fn apply_motion(inner: &mut PadInner<K, S::Handle>, sample: MotionSample) {
        let shaped = inner.curve.process(sample.dx, sample.dy, sample.dt_seconds);
        // screen y grows downwards, stick y grows upwards
        let stick = Vec2::new(shaped.x, -shaped.y);
        trace!("Motion {:?} -> right stick {:?}", sample, stick);

        let dirty = inner.set_right_stick(stick);
        inner.commit(dirty);
    }

    pub fn on_button_event(&self, button: MouseButton, down: bool) {
        let action = mapping::map_mouse_button(button);
        debug!(
            "Button {:?} {} at {} -> {:?}",
            button,
            if down { "down" } else { "up" },
            Local::now().format("%H:%M:%S.%3f"),
            action
        );

        if action == Action::ToggleMode {
            if !down {
                self.toggle_mode();
            }
            return;
        }

        let mut inner = self.inner.lock();
        if !inner.is_controller() {
            return;
        }

        let dirty = match action {
            Action::Trigger(trigger) => inner.set_trigger(trigger, if down { 1.0 } else { 0.0 }),
            Action::Button(button) => inner.set_button(button, down),
            _ => false,
        };
        inner.commit(dirty);
    }

    /// Starts or restarts the pulse window of the wheel button.
    pub fn on_wheel_event(&self, delta: i32) {
        if delta == 0 {
            return;
        }

        let mut inner = self.inner.lock();
        inner.wheel_pulse = true;

        let weak = self.weak_self.clone();
        inner
            .pulse
            .arm(&self.scheduler, self.settings.pulse_duration, move |generation| {
                if let Some(engine) = weak.upgrade() {
                    engine.release_wheel_pulse(generation);
                }
            });
        trace!("Wheel tick {} opened pulse window", delta);

        if inner.is_controller() {
            let dirty = inner.update_pulsed_button();
            inner.commit(dirty);
        }
    }

    fn release_wheel_pulse(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if !inner.pulse.expire(generation) {
            return;
        }
        inner.wheel_pulse = false;
        trace!("Pulse window closed");

        if inner.is_controller() {
            let dirty = inner.update_pulsed_button();
            inner.commit(dirty);
        }
    }

    pub fn on_key_event(&self, key: KeyCode, down: bool) {
        self.keys.lock().set(key, down);

        if mapping::is_chord_key(key) && self.keys.lock().all_down(&SAFETY_CHORD) {
            self.trigger_safety_exit();
            return;
        }

        let mut inner = self.inner.lock();
        if !inner.is_controller() {
            return;
        }

        let Some(action) = mapping::map_key(key) else {
            trace!("No mapping for key {:?}", key);
            return;
        };
        debug!(
            "Key {:?} {} -> {:?}",
            key,
            if down { "down" } else { "up" },
            action
        );

        let dirty = match action {
            Action::Button(button) => inner.set_button(button, down),
            Action::DPad(edge) => {
                inner.dpad_edges.set(edge, down);
                inner.update_dpad()
            }
            Action::PulseKey => {
                inner.pulse_key_held = down;
                inner.update_pulsed_button()
            }
            Action::StickKey => {
                let stick = self.compose_left_stick();
                inner.set_left_stick(stick)
            }
            Action::Trigger(trigger) => {
                inner.set_trigger(trigger, if down { 1.0 } else { 0.0 })
            }
            Action::ToggleMode => false,
        };
        inner.commit(dirty);
    }

    fn compose_left_stick(&self) -> Vec2 {
        let keys = self.keys.lock();
        let axis = |positive: KeyCode, negative: KeyCode| {
            f32::from(u8::from(keys.is_down(positive))) - f32::from(u8::from(keys.is_down(negative)))
        };
        let stick = Vec2::new(axis(STICK_RIGHT, STICK_LEFT), axis(STICK_UP, STICK_DOWN));
        if stick.length_squared() > 1.0 {
            stick.normalize()
        } else {
            stick
        }
    }

    fn trigger_safety_exit(&self) {
        if self.termination.is_cancelled() {
            return;
        }
        error!(
            "Safety chord {:?} held at {}, terminating",
            SAFETY_CHORD,
            Local::now().format("%H:%M:%S.%3f")
        );
        self.termination.cancel();
    }

    /// Flips between controller and passthrough mode and returns the new mode.
    pub fn toggle_mode(&self) -> Mode {
        let mut inner = self.inner.lock();
        if self.termination.is_cancelled() {
            return inner.mode;
        }

        let next = match inner.mode {
            Mode::Controller => Mode::Passthrough,
            Mode::Passthrough => Mode::Controller,
        };
        if next == Mode::Controller && !inner.controller_available {
            warn!("Controller mode unavailable this session, staying in passthrough");
            return inner.mode;
        }

        self.enter_mode(&mut inner, next);
        next
    }

    fn enter_mode(&self, inner: &mut PadInner<K, S::Handle>, mode: Mode) {
        inner.mode = mode;
        match mode {
            Mode::Passthrough => {
                inner.pulse_key_held = false;
                inner.wheel_pulse = false;
                inner.pulse.cancel(&self.scheduler);
                let dirty = inner.reset_outputs();
                inner.commit(dirty);
            }
            Mode::Controller => {
                // a window opened in passthrough never reaches the pad
                inner.wheel_pulse = false;
                inner.pulse.cancel(&self.scheduler);
                inner.curve.reset();
                self.aggregator.reset();
            }
        }

        info!(
            "Mode: {} at {}",
            mode,
            Local::now().format("%H:%M:%S.%3f")
        );
        self.mode_sender.send_replace(mode);
    }

    /// Forces passthrough for the rest of the session after the raw-input
    /// source failed.
    pub fn degrade_to_passthrough(&self, reason: &str) {
        error!("Controller mode disabled: {}", reason);
        let mut inner = self.inner.lock();
        inner.controller_available = false;
        if inner.is_controller() {
            self.enter_mode(&mut inner, Mode::Passthrough);
        }
    }

    /// Neutralizes the pad before teardown.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.pulse.cancel(&self.scheduler);
        inner.wheel_pulse = false;
        inner.pulse_key_held = false;
        let dirty = inner.reset_outputs();
        inner.commit(dirty);
        info!("Controller state engine shut down");
    }

    pub fn mode(&self) -> Mode {
        self.inner.lock().mode
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<Mode> {
        self.mode_sender.subscribe()
    }

    /// Fires once the safety chord was detected.
    pub fn termination(&self) -> CancellationToken {
        self.termination.clone()
    }

    pub fn snapshot(&self) -> ControllerState {
        self.inner.lock().state
    }

    pub fn pressed_keys(&self) -> Vec<KeyCode> {
        self.keys.lock().pressed_keys().collect()
    }

    pub fn with_sink<R>(&self, f: impl FnOnce(&mut K) -> R) -> R {
        f(&mut self.inner.lock().sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::pulse::manual::ManualScheduler;
    use crate::controller::pulse::TokioScheduler;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        LeftStick(f32, f32),
        RightStick(f32, f32),
        LeftTrigger(f32),
        RightTrigger(f32),
        Button(Button, bool),
        DPad(DPad),
        Submit,
    }

    #[derive(Debug)]
    struct RecordingSink {
        connected: bool,
        commands: Vec<Command>,
    }

    impl RecordingSink {
        fn connected() -> Self {
            Self {
                connected: true,
                commands: Vec::new(),
            }
        }

        fn record(&mut self, command: Command) -> Result<(), SinkError> {
            if !self.connected {
                return Err(SinkError::NotConnected);
            }
            self.commands.push(command);
            Ok(())
        }
    }

    impl ControllerSink for RecordingSink {
        fn set_left_stick(&mut self, x: f32, y: f32) -> Result<(), SinkError> {
            self.record(Command::LeftStick(x, y))
        }
        fn set_right_stick(&mut self, x: f32, y: f32) -> Result<(), SinkError> {
            self.record(Command::RightStick(x, y))
        }
        fn set_left_trigger(&mut self, value: f32) -> Result<(), SinkError> {
            self.record(Command::LeftTrigger(value))
        }
        fn set_right_trigger(&mut self, value: f32) -> Result<(), SinkError> {
            self.record(Command::RightTrigger(value))
        }
        fn set_button(&mut self, button: Button, down: bool) -> Result<(), SinkError> {
            self.record(Command::Button(button, down))
        }
        fn set_dpad(&mut self, direction: DPad) -> Result<(), SinkError> {
            self.record(Command::DPad(direction))
        }
        fn submit(&mut self) -> Result<(), SinkError> {
            self.record(Command::Submit)
        }
    }

    type TestEngine = ControllerStateEngine<RecordingSink, ManualScheduler>;

    fn engine() -> (Arc<TestEngine>, ManualScheduler) {
        let scheduler = ManualScheduler::default();
        let engine = ControllerStateEngine::new(
            Settings::default(),
            EngineSettings::default(),
            RecordingSink::connected(),
            scheduler.clone(),
        );
        (engine, scheduler)
    }

    fn submits(engine: &TestEngine) -> usize {
        engine.with_sink(|sink| {
            sink.commands
                .iter()
                .filter(|command| **command == Command::Submit)
                .count()
        })
    }

    fn clear_commands(engine: &TestEngine) {
        engine.with_sink(|sink| sink.commands.clear());
    }

    fn key(engine: &TestEngine, key: KeyCode, down: bool) -> Disposition {
        engine.handle(RawInputEvent::Key { key, down })
    }

    #[test]
    fn motion_drives_right_stick_with_inverted_y() {
        let (engine, _) = engine();
        engine.on_motion(MotionSample {
            dx: 0.0,
            dy: 25.0,
            dt_seconds: 0.01,
        });

        let stick = engine.snapshot().right_stick;
        assert_eq!(stick.x, 0.0);
        assert!((stick.y + 1.0).abs() < 1e-5, "got {:?}", stick);
        assert_eq!(submits(&engine), 1);
    }

    #[test]
    fn unchanged_motion_output_is_not_resubmitted() {
        let (engine, _) = engine();
        let still = MotionSample {
            dx: 0.0,
            dy: 0.0,
            dt_seconds: 0.01,
        };
        engine.on_motion(still);
        engine.on_motion(still);
        assert_eq!(submits(&engine), 0);
    }

    #[test]
    fn pointer_events_are_consumed_only_in_controller_mode() {
        let (engine, _) = engine();
        assert_eq!(
            engine.handle(RawInputEvent::Motion { dx: 4, dy: 1 }),
            Disposition::Consume
        );
        assert_eq!(key(&engine, KeyCode::SPACE, true), Disposition::PassThrough);

        engine.toggle_mode();
        assert_eq!(
            engine.handle(RawInputEvent::ButtonDown(MouseButton::Primary)),
            Disposition::PassThrough
        );
        assert_eq!(engine.snapshot().right_trigger, 0.0);
    }

    #[test]
    fn mouse_buttons_map_to_triggers_and_bumpers() {
        let (engine, _) = engine();
        engine.handle(RawInputEvent::ButtonDown(MouseButton::Primary));
        engine.handle(RawInputEvent::ButtonDown(MouseButton::Secondary));
        engine.handle(RawInputEvent::ButtonDown(MouseButton::Side1));

        let state = engine.snapshot();
        assert_eq!(state.right_trigger, 1.0);
        assert_eq!(state.left_trigger, 1.0);
        assert!(state.button(Button::LeftBumper));

        engine.handle(RawInputEvent::ButtonUp(MouseButton::Primary));
        assert_eq!(engine.snapshot().right_trigger, 0.0);
        assert_eq!(submits(&engine), 4);
    }

    #[test]
    fn tertiary_toggles_on_release_only() {
        let (engine, _) = engine();
        engine.handle(RawInputEvent::ButtonDown(MouseButton::Tertiary));
        assert_eq!(engine.mode(), Mode::Controller);
        engine.handle(RawInputEvent::ButtonUp(MouseButton::Tertiary));
        assert_eq!(engine.mode(), Mode::Passthrough);

        // the toggle button works outside controller mode too
        engine.handle(RawInputEvent::ButtonDown(MouseButton::Tertiary));
        engine.handle(RawInputEvent::ButtonUp(MouseButton::Tertiary));
        assert_eq!(engine.mode(), Mode::Controller);
    }

    #[test]
    fn wheel_pulse_releases_after_window() {
        let (engine, scheduler) = engine();
        engine.handle(RawInputEvent::Wheel(120));
        assert!(engine.snapshot().button(Button::Y));
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_millis(50)]);

        assert_eq!(scheduler.fire_all(), 1);
        assert!(!engine.snapshot().button(Button::Y));
        assert_eq!(submits(&engine), 2);
    }

    #[test]
    fn wheel_retrigger_restarts_single_window() {
        let (engine, scheduler) = engine();
        engine.handle(RawInputEvent::Wheel(120));
        engine.handle(RawInputEvent::Wheel(-120));
        engine.handle(RawInputEvent::Wheel(120));
        assert_eq!(scheduler.pending_count(), 1);
        // button was already down, only the first tick submitted
        assert_eq!(submits(&engine), 1);

        scheduler.fire_all();
        assert!(!engine.snapshot().button(Button::Y));
    }

    #[test]
    fn zero_wheel_delta_is_ignored() {
        let (engine, scheduler) = engine();
        engine.handle(RawInputEvent::Wheel(0));
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!engine.snapshot().button(Button::Y));
    }

    #[test]
    fn pulse_key_holds_button_through_wheel_release() {
        let (engine, scheduler) = engine();
        key(&engine, KeyCode::R, true);
        engine.handle(RawInputEvent::Wheel(120));
        scheduler.fire_all();
        assert!(engine.snapshot().button(Button::Y));

        key(&engine, KeyCode::R, false);
        assert!(!engine.snapshot().button(Button::Y));
    }

    #[test]
    fn wheel_in_passthrough_records_pulse_without_output() {
        let (engine, scheduler) = engine();
        engine.toggle_mode();
        clear_commands(&engine);

        engine.handle(RawInputEvent::Wheel(120));
        assert_eq!(scheduler.pending_count(), 1);
        assert!(!engine.snapshot().button(Button::Y));
        scheduler.fire_all();
        assert_eq!(submits(&engine), 0);
    }

    #[test]
    fn passthrough_wheel_window_is_dropped_on_entering_controller() {
        let (engine, scheduler) = engine();
        engine.toggle_mode();
        engine.handle(RawInputEvent::Wheel(120));
        assert_eq!(scheduler.pending_count(), 1);

        engine.toggle_mode();
        assert_eq!(scheduler.pending_count(), 0);
        key(&engine, KeyCode::R, true);
        assert!(engine.snapshot().button(Button::Y));
        key(&engine, KeyCode::R, false);
        assert!(!engine.snapshot().button(Button::Y));
    }

    #[test]
    fn concurrent_delivery_paths_stay_consistent() {
        let (engine, scheduler) = engine();

        let pointer = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for i in 0..500 {
                    engine.handle(RawInputEvent::Motion { dx: i % 7 - 3, dy: 2 });
                    if i % 50 == 0 {
                        engine.handle(RawInputEvent::Wheel(120));
                    }
                    let button = if i % 2 == 0 {
                        RawInputEvent::ButtonDown(MouseButton::Primary)
                    } else {
                        RawInputEvent::ButtonUp(MouseButton::Primary)
                    };
                    engine.handle(button);
                }
            })
        };
        let keyboard = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let keys = [KeyCode::W, KeyCode::A, KeyCode::S, KeyCode::D, KeyCode::R];
                for i in 0..500 {
                    let key = keys[i % keys.len()];
                    engine.handle(RawInputEvent::Key {
                        key,
                        down: (i / keys.len()) % 2 == 0,
                    });
                }
                // settle on W + D held, R released
                for (key, down) in [
                    (KeyCode::A, false),
                    (KeyCode::S, false),
                    (KeyCode::R, false),
                    (KeyCode::W, true),
                    (KeyCode::D, true),
                ] {
                    engine.handle(RawInputEvent::Key { key, down });
                }
            })
        };
        pointer.join().unwrap();
        keyboard.join().unwrap();

        assert_eq!(engine.pressed_keys(), vec![KeyCode::D, KeyCode::W]);
        let state = engine.snapshot();
        let diagonal = Vec2::new(1.0, 1.0).normalize();
        assert!((state.left_stick - diagonal).length() < 1e-5, "{:?}", state);
        assert_eq!(state.right_trigger, 0.0);
        assert_eq!(state.button(Button::Y), scheduler.pending_count() > 0);

        scheduler.fire_all();
        assert!(!engine.snapshot().button(Button::Y));
    }

    #[test]
    fn diagonal_keys_normalize_left_stick() {
        let (engine, _) = engine();
        key(&engine, KeyCode::W, true);
        assert_eq!(engine.snapshot().left_stick, Vec2::new(0.0, 1.0));

        key(&engine, KeyCode::D, true);
        let stick = engine.snapshot().left_stick;
        assert!((stick.x - 0.70710677).abs() < 1e-5);
        assert!((stick.y - 0.70710677).abs() < 1e-5);

        key(&engine, KeyCode::A, true);
        assert_eq!(engine.snapshot().left_stick, Vec2::new(0.0, 1.0));

        key(&engine, KeyCode::W, false);
        key(&engine, KeyCode::S, true);
        assert_eq!(engine.snapshot().left_stick, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn keys_map_to_buttons_and_dpad() {
        let (engine, _) = engine();
        key(&engine, KeyCode::SPACE, true);
        key(&engine, KeyCode::LEFT_SHIFT, true);
        key(&engine, KeyCode::DIGIT_1, true);
        key(&engine, KeyCode::DIGIT_3, true);

        let state = engine.snapshot();
        assert!(state.button(Button::A));
        assert!(state.button(Button::B));
        assert_eq!(state.dpad, DPad::SouthEast);

        key(&engine, KeyCode::DIGIT_1, false);
        assert_eq!(engine.snapshot().dpad, DPad::East);
    }

    #[test]
    fn unmapped_key_changes_nothing() {
        let (engine, _) = engine();
        key(&engine, KeyCode(0x70), true);
        assert!(engine.snapshot().is_neutral());
        assert_eq!(submits(&engine), 0);
        assert_eq!(engine.pressed_keys(), vec![KeyCode(0x70)]);
    }

    #[test]
    fn key_table_updates_outside_controller_mode() {
        let (engine, _) = engine();
        engine.toggle_mode();
        key(&engine, KeyCode::W, true);
        assert_eq!(engine.pressed_keys(), vec![KeyCode::W]);
        assert!(engine.snapshot().is_neutral());
    }

    #[test]
    fn leaving_controller_mode_neutralizes_with_one_commit() {
        let (engine, _) = engine();
        engine.on_motion(MotionSample {
            dx: 20.0,
            dy: 5.0,
            dt_seconds: 0.01,
        });
        key(&engine, KeyCode::F, true);
        assert_ne!(engine.snapshot().right_stick, Vec2::ZERO);
        clear_commands(&engine);

        assert_eq!(engine.toggle_mode(), Mode::Passthrough);
        assert!(engine.snapshot().is_neutral());
        assert_eq!(submits(&engine), 1);
        engine.with_sink(|sink| {
            assert!(sink.commands.contains(&Command::RightStick(0.0, 0.0)));
            assert!(sink.commands.contains(&Command::Button(Button::X, false)));
            assert_eq!(sink.commands.last(), Some(&Command::Submit));
        });
    }

    #[test]
    fn leaving_controller_mode_cancels_pending_pulse() {
        let (engine, scheduler) = engine();
        engine.handle(RawInputEvent::Wheel(120));
        engine.toggle_mode();
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn mode_changes_are_published() {
        let (engine, _) = engine();
        let mut modes = engine.subscribe_mode();
        assert_eq!(*modes.borrow(), Mode::Controller);
        engine.toggle_mode();
        assert!(modes.has_changed().unwrap());
        assert_eq!(*modes.borrow_and_update(), Mode::Passthrough);
    }

    #[test]
    fn safety_chord_terminates_in_any_mode() {
        let (engine, _) = engine();
        engine.toggle_mode();
        let termination = engine.termination();

        key(&engine, KeyCode::DIGIT_0, true);
        assert!(!termination.is_cancelled());
        key(&engine, KeyCode::DIGIT_1, true);
        assert!(termination.is_cancelled());

        // engine is inert afterwards
        assert_eq!(engine.toggle_mode(), Mode::Passthrough);
        assert_eq!(
            engine.handle(RawInputEvent::ButtonDown(MouseButton::Primary)),
            Disposition::PassThrough
        );
    }

    #[test]
    fn chord_in_controller_mode_skips_dpad_update() {
        let (engine, _) = engine();
        key(&engine, KeyCode::DIGIT_0, true);
        key(&engine, KeyCode::DIGIT_1, true);
        assert!(engine.termination().is_cancelled());
        assert_eq!(engine.snapshot().dpad, DPad::Neutral);
    }

    #[test]
    fn disconnected_sink_never_gets_submit() {
        let scheduler = ManualScheduler::default();
        let engine = ControllerStateEngine::new(
            Settings::default(),
            EngineSettings::default(),
            RecordingSink {
                connected: false,
                commands: Vec::new(),
            },
            scheduler,
        );

        key(&engine, KeyCode::SPACE, true);
        engine.toggle_mode();
        // logical state still follows input
        engine.with_sink(|sink| assert!(sink.commands.is_empty()));
    }

    #[test]
    fn degraded_engine_refuses_controller_mode() {
        let (engine, _) = engine();
        engine.degrade_to_passthrough("raw input unavailable");
        assert_eq!(engine.mode(), Mode::Passthrough);
        assert_eq!(engine.toggle_mode(), Mode::Passthrough);
        engine.handle(RawInputEvent::ButtonUp(MouseButton::Tertiary));
        assert_eq!(engine.mode(), Mode::Passthrough);
    }

    #[test]
    fn entering_controller_mode_resets_motion_state() {
        let (engine, _) = engine();
        engine.handle(RawInputEvent::Motion { dx: 3, dy: 0 });
        engine.toggle_mode();
        engine.toggle_mode();
        let inner = engine.inner.lock();
        assert!(!inner.curve.smoothing_state().has_value);
    }

    #[test]
    fn shutdown_neutralizes_pad() {
        let (engine, scheduler) = engine();
        key(&engine, KeyCode::Q, true);
        engine.handle(RawInputEvent::Wheel(1));
        engine.shutdown();
        assert!(engine.snapshot().is_neutral());
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wheel_pulse_expires_on_tokio_timer() {
        let engine = ControllerStateEngine::new(
            Settings::default(),
            EngineSettings::default(),
            RecordingSink::connected(),
            TokioScheduler::current().expect("inside runtime"),
        );

        engine.handle(RawInputEvent::Wheel(120));
        assert!(engine.snapshot().button(Button::Y));

        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.handle(RawInputEvent::Wheel(120));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(engine.snapshot().button(Button::Y), "window restarted");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!engine.snapshot().button(Button::Y));
    }
}
