//! Interaction state machine driven by the committed hand-state history.
//!
//! Two modes. In light control the user aims at a light to select it,
//! picks a channel with a hand shape, and pinches to drag the channel
//! value up or down; a quick double pinch toggles the light. In
//! placement the user captures two aiming rays that locate a new light.
//! A palm, fist, palm sequence leaves either mode's current focus.
//!
//! Edges are detected on history changes: a tick is "new" when the
//! history differs from the previous tick's snapshot.

use tracing::{debug, info, trace};

use crate::control::drag::DragCalibration;
use crate::control::light::{LightCommand, LightId, LightRegistry};
use crate::control::placement::{PlacementBuffer, PLACEMENT_RAYS};
use crate::control::scene::TargetResolver;
use crate::geometry::{Ray, Vec2};
use crate::hand::{HandSize, HandState};

// ── Modes ──────────────────────────────────────────────────

/// Top-level interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    LightControl,
    Placement,
}

impl ControlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LightControl => "light-control",
            Self::Placement => "placement",
        }
    }
}

/// Light channel that the drag gesture writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlParameter {
    Hue,
    Saturation,
    #[default]
    Value,
}

impl ControlParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Value => "value",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hue" => Some(Self::Hue),
            "saturation" => Some(Self::Saturation),
            "value" => Some(Self::Value),
            _ => None,
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Tuning for drag span and pinch toggling.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Drag span as a multiple of the hand height.
    pub drag_multiplier: f32,
    /// A pinch entry toggles the light when the previous entry was more
    /// than this long ago (ms)...
    pub pinch_toggle_min_ms: f64,
    /// ...and at most this long ago (ms).
    pub pinch_toggle_max_ms: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            drag_multiplier: 1.0,
            pinch_toggle_min_ms: 250.0,
            pinch_toggle_max_ms: 1200.0,
        }
    }
}

// ── Events ─────────────────────────────────────────────────

/// Outputs of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Mode switched.
    Mode(ControlState),
    /// Drag channel switched.
    Parameter(ControlParameter),
    /// Active light changed (`None` when cleared).
    Target(Option<LightId>),
    /// A light's state changed or it should blink.
    Light(LightCommand),
    /// Both placement rays captured.
    PlacementRays([Ray; PLACEMENT_RAYS]),
}

/// Per-tick inputs from the hand pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ControlInput<'a> {
    /// Currently committed hand state.
    pub committed: HandState,
    /// Committed history, oldest first.
    pub history: &'a [HandState],
    pub now_ms: f64,
    /// Wrist position in depth-image UV.
    pub position: Vec2,
    pub hand_size: HandSize,
    /// Index finger pointing ray.
    pub pointing: Ray,
}

/// History entry `n` places before the newest; `None` past the start.
fn back(history: &[HandState], n: usize) -> HandState {
    history
        .len()
        .checked_sub(n + 1)
        .map(|i| history[i])
        .unwrap_or_default()
}

// ── State machine ──────────────────────────────────────────

pub struct GestureStateMachine {
    pub config: ControlConfig,
    state: ControlState,
    parameter: ControlParameter,
    active: Option<LightId>,
    drag: DragCalibration,
    placement: PlacementBuffer,
    previous_history: Vec<HandState>,
    previous_pinch_ms: Option<f64>,
    new_hand_state: bool,
}

impl GestureStateMachine {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            state: ControlState::default(),
            parameter: ControlParameter::default(),
            active: None,
            drag: DragCalibration::default(),
            placement: PlacementBuffer::new(),
            previous_history: Vec::new(),
            previous_pinch_ms: None,
            new_hand_state: false,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn parameter(&self) -> ControlParameter {
        self.parameter
    }

    pub fn active_target(&self) -> Option<LightId> {
        self.active
    }

    pub fn drag(&self) -> &DragCalibration {
        &self.drag
    }

    /// Whether the last tick saw a history change.
    pub fn new_hand_state(&self) -> bool {
        self.new_hand_state
    }

    /// Run one tick and return what changed.
    pub fn tick(
        &mut self,
        input: &ControlInput,
        lights: &mut LightRegistry,
        resolver: &dyn TargetResolver,
    ) -> Vec<ControlEvent> {
        if self.previous_history.len() != input.history.len() {
            self.previous_history = vec![HandState::None; input.history.len()];
        }
        self.new_hand_state = self.previous_history.as_slice() != input.history;

        let mut events = Vec::new();
        match self.state {
            ControlState::LightControl => {
                self.light_control(input, lights, resolver, &mut events)
            }
            ControlState::Placement => self.placement_update(input, &mut events),
        }

        self.previous_history.clear();
        self.previous_history.extend_from_slice(input.history);
        events
    }

    /// Palm, fist, palm at the tail of a freshly changed history.
    fn exit_gesture(&self, history: &[HandState]) -> bool {
        self.new_hand_state
            && back(history, 0) == HandState::Palming
            && back(history, 1) == HandState::Fisting
            && back(history, 2) == HandState::Palming
    }

    fn light_control(
        &mut self,
        input: &ControlInput,
        lights: &mut LightRegistry,
        resolver: &dyn TargetResolver,
        events: &mut Vec<ControlEvent>,
    ) {
        let current = input.committed;

        if current == HandState::DoublePointing {
            self.state = ControlState::Placement;
            self.recalibrate(input, lights);
            info!("entering placement mode");
            events.push(ControlEvent::Mode(self.state));
            return;
        }

        if current == HandState::Pointing {
            if let Some(id) = resolver.resolve(&input.pointing, lights) {
                if self.active != Some(id) {
                    info!(id = id.0, "light selected");
                    if let Some(cmd) = lights.blink(id) {
                        events.push(ControlEvent::Light(cmd));
                    }
                    self.active = Some(id);
                    events.push(ControlEvent::Target(self.active));
                }
            }
        }

        if self.exit_gesture(input.history) && self.active.take().is_some() {
            info!("light deselected");
            events.push(ControlEvent::Target(None));
        }

        let parameter = match current {
            HandState::Fisting => Some(ControlParameter::Value),
            HandState::Grabbing => Some(ControlParameter::Hue),
            HandState::WideHandling => Some(ControlParameter::Saturation),
            _ => None,
        };
        if let Some(parameter) = parameter.filter(|p| *p != self.parameter) {
            debug!(parameter = parameter.as_str(), "control parameter changed");
            self.parameter = parameter;
            events.push(ControlEvent::Parameter(parameter));
        }

        let pinch_entry = self.new_hand_state
            && back(input.history, 1) != HandState::Pinching
            && back(input.history, 0) == HandState::Pinching;
        if pinch_entry {
            self.recalibrate(input, lights);
            if let Some(previous) = self.previous_pinch_ms {
                let since = input.now_ms - previous;
                if since > self.config.pinch_toggle_min_ms
                    && since <= self.config.pinch_toggle_max_ms
                {
                    self.toggle_active(lights, events);
                }
            }
            self.previous_pinch_ms = Some(input.now_ms);
        }

        if current == HandState::Pinching {
            self.write_drag(input, lights, events);
        }
    }

    fn placement_update(&mut self, input: &ControlInput, events: &mut Vec<ControlEvent>) {
        let capture = self.new_hand_state
            && back(input.history, 0) == HandState::DoublePointing
            && back(input.history, 1) == HandState::GunPointing;
        if capture {
            if let Some(pair) = self.placement.push(input.pointing) {
                info!("placement rays captured");
                events.push(ControlEvent::PlacementRays(pair));
            }
        }

        if self.exit_gesture(input.history) {
            self.state = ControlState::LightControl;
            info!("leaving placement mode");
            events.push(ControlEvent::Mode(self.state));
        }
    }

    /// Lay out the drag span around the current position.
    fn recalibrate(&mut self, input: &ControlInput, lights: &LightRegistry) {
        let current = self
            .active
            .and_then(|id| lights.get(id))
            .map(|l| l.channel(self.parameter))
            .unwrap_or(0.5);
        let length = self.config.drag_multiplier * input.hand_size.height;
        self.drag = DragCalibration::calibrate(input.position, length, current);
        debug!(
            top = self.drag.top,
            bottom = self.drag.bottom,
            current,
            "drag calibrated"
        );
    }

    fn toggle_active(&mut self, lights: &mut LightRegistry, events: &mut Vec<ControlEvent>) {
        match self.active.and_then(|id| lights.toggle(id)) {
            Some(cmd) => {
                info!(id = cmd.id.0, on = cmd.on, "light toggled");
                events.push(ControlEvent::Light(cmd));
            }
            None => debug!("pinch toggle without an active light"),
        }
    }

    fn write_drag(
        &mut self,
        input: &ControlInput,
        lights: &mut LightRegistry,
        events: &mut Vec<ControlEvent>,
    ) {
        let Some(id) = self.active else {
            trace!("drag without an active light");
            return;
        };
        let value = self.drag.value_at(input.position.y).clamp(0.0, 1.0);
        let unchanged = lights
            .get(id)
            .map(|l| l.channel(self.parameter) == value)
            .unwrap_or(true);
        if unchanged {
            return;
        }
        if let Some(cmd) = lights.set_channel(id, self.parameter, value) {
            events.push(ControlEvent::Light(cmd));
        }
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let target = self
            .active
            .map(|id| id.to_string())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:mode :{} :parameter :{} :target {} :new-hand-state {} :placement-rays {} :drag {})",
            self.state.as_str(),
            self.parameter.as_str(),
            target,
            if self.new_hand_state { "t" } else { "nil" },
            self.placement.len(),
            self.drag.to_sexp(),
        )
    }
}

impl Default for GestureStateMachine {
    fn default() -> Self {
        Self::new(ControlConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::scene::LightScene;
    use crate::geometry::Vec3;
    use HandState::{
        DoublePointing, Fisting, Grabbing, GunPointing, Palming, Pinching, Pointing,
        WideHandling,
    };

    /// Resolver that always reports a fixed result.
    struct Fixed(Option<LightId>);

    impl TargetResolver for Fixed {
        fn resolve(&self, _ray: &Ray, _lights: &LightRegistry) -> Option<LightId> {
            self.0
        }
    }

    struct Harness {
        machine: GestureStateMachine,
        lights: LightRegistry,
        history: Vec<HandState>,
        position: Vec2,
        pointing: Ray,
    }

    impl Harness {
        fn new() -> Self {
            let mut lights = LightRegistry::new();
            lights.add(Vec3::new(0.0, 0.0, 2.0));
            lights.add(Vec3::new(2.0, 0.0, 2.0));
            Self {
                machine: GestureStateMachine::default(),
                lights,
                history: vec![HandState::None; 5],
                position: Vec2::new(0.5, 0.5),
                pointing: Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)),
            }
        }

        /// Commit a new state onto the history.
        fn commit(&mut self, state: HandState) {
            self.history.remove(0);
            self.history.push(state);
        }

        fn tick_with(&mut self, now_ms: f64, resolver: &dyn TargetResolver) -> Vec<ControlEvent> {
            let committed = *self.history.last().unwrap();
            let input = ControlInput {
                committed,
                history: &self.history,
                now_ms,
                position: self.position,
                hand_size: HandSize {
                    width: 0.1,
                    height: 0.2,
                },
                pointing: self.pointing,
            };
            self.machine.tick(&input, &mut self.lights, resolver)
        }

        fn tick(&mut self, now_ms: f64) -> Vec<ControlEvent> {
            self.tick_with(now_ms, &LightScene::default())
        }

        fn select_first_light(&mut self) {
            self.commit(Pointing);
            self.tick(0.0);
            assert_eq!(self.machine.active_target(), Some(LightId(1)));
        }

        /// Leave and re-enter Pinching, ticking at the entry.
        fn pinch_at(&mut self, now_ms: f64) -> Vec<ControlEvent> {
            self.commit(Fisting);
            self.tick(now_ms - 1.0);
            self.commit(Pinching);
            self.tick(now_ms)
        }

        fn is_on(&self, id: u32) -> bool {
            self.lights.get(LightId(id)).unwrap().on
        }
    }

    #[test]
    fn test_first_tick_is_not_new() {
        let mut h = Harness::new();
        h.tick(0.0);
        assert!(!h.machine.new_hand_state());
        h.tick(16.0);
        assert!(!h.machine.new_hand_state());
    }

    #[test]
    fn test_pointing_selects_and_blinks_once() {
        let mut h = Harness::new();
        h.commit(Pointing);
        let events = h.tick(0.0);
        assert!(events.iter().any(|e| matches!(e, ControlEvent::Light(c) if c.blink)));
        assert!(events.contains(&ControlEvent::Target(Some(LightId(1)))));

        // Still pointing at the same light: no repeat blink
        let events = h.tick(16.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_pointing_miss_keeps_target() {
        let mut h = Harness::new();
        h.select_first_light();
        h.pointing = Ray::new(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0));
        h.tick(16.0);
        assert_eq!(h.machine.active_target(), Some(LightId(1)));
    }

    #[test]
    fn test_pointing_at_other_light_switches() {
        let mut h = Harness::new();
        h.select_first_light();
        let events = h.tick_with(16.0, &Fixed(Some(LightId(2))));
        assert!(events.contains(&ControlEvent::Target(Some(LightId(2)))));
    }

    #[test]
    fn test_exit_gesture_clears_target() {
        let mut h = Harness::new();
        h.select_first_light();
        h.commit(Palming);
        h.tick(100.0);
        h.commit(Fisting);
        h.tick(200.0);
        assert_eq!(h.machine.active_target(), Some(LightId(1)));
        h.commit(Palming);
        let events = h.tick(300.0);
        assert!(events.contains(&ControlEvent::Target(None)));
        assert_eq!(h.machine.active_target(), None);
    }

    #[test]
    fn test_exit_gesture_requires_new_state() {
        let mut h = Harness::new();
        h.history = vec![HandState::None, HandState::None, Palming, Fisting, Palming];
        // Fires here, with nothing selected
        h.tick(0.0);
        h.machine.active = Some(LightId(1));
        // Same history again is not an edge
        h.tick(10.0);
        assert_eq!(h.machine.active_target(), Some(LightId(1)));
    }

    #[test]
    fn test_parameter_mapping() {
        let mut h = Harness::new();
        assert_eq!(h.machine.parameter(), ControlParameter::Value);
        h.commit(Grabbing);
        let events = h.tick(0.0);
        assert!(events.contains(&ControlEvent::Parameter(ControlParameter::Hue)));
        h.commit(WideHandling);
        h.tick(100.0);
        assert_eq!(h.machine.parameter(), ControlParameter::Saturation);
        h.commit(Fisting);
        h.tick(200.0);
        assert_eq!(h.machine.parameter(), ControlParameter::Value);
        // Other states leave it alone
        h.commit(Palming);
        h.tick(300.0);
        assert_eq!(h.machine.parameter(), ControlParameter::Value);
    }

    #[test]
    fn test_pinch_toggle_window() {
        let mut h = Harness::new();
        h.select_first_light();

        // First entry only records the time
        h.pinch_at(1000.0);
        assert!(h.is_on(1));
        // 800 ms later toggles off
        h.pinch_at(1800.0);
        assert!(!h.is_on(1));
        // 50 ms later is too quick
        h.pinch_at(1850.0);
        assert!(!h.is_on(1));
        // 2000 ms later is too slow
        h.pinch_at(3850.0);
        assert!(!h.is_on(1));
    }

    #[test]
    fn test_pinch_toggle_bounds() {
        let mut h = Harness::new();
        h.select_first_light();
        h.pinch_at(1000.0);
        // Exactly 250 ms does not toggle
        h.pinch_at(1250.0);
        assert!(h.is_on(1));
        // Exactly 1200 ms does
        h.pinch_at(2450.0);
        assert!(!h.is_on(1));
    }

    #[test]
    fn test_pinch_toggle_without_target_is_noop() {
        let mut h = Harness::new();
        h.pinch_at(1000.0);
        let events = h.pinch_at(1800.0);
        assert!(events.is_empty());
        assert!(h.lights.iter().all(|l| l.on));
    }

    #[test]
    fn test_pinch_drag_writes_channel() {
        let mut h = Harness::new();
        h.select_first_light();
        h.pinch_at(1000.0);
        // Hand height 0.2, value 0.5: span [0.4, 0.6] around y = 0.5
        let drag = *h.machine.drag();
        assert!((drag.top - 0.4).abs() < 1e-5);
        assert!((drag.bottom - 0.6).abs() < 1e-5);

        h.position = Vec2::new(0.5, 0.4);
        let events = h.tick(1016.0);
        assert_eq!(events.len(), 1);
        assert!((h.lights.get(LightId(1)).unwrap().value - 1.0).abs() < 1e-5);

        h.position = Vec2::new(0.5, 0.9);
        h.tick(1032.0);
        assert!(h.lights.get(LightId(1)).unwrap().value.abs() < 1e-5);

        // Unchanged value emits nothing
        assert!(h.tick(1048.0).is_empty());
    }

    #[test]
    fn test_pinch_drag_uses_current_parameter() {
        let mut h = Harness::new();
        h.select_first_light();
        h.commit(Grabbing);
        h.tick(500.0);
        h.commit(Pinching);
        h.tick(1000.0);
        h.position = Vec2::new(0.5, 0.4);
        h.tick(1016.0);
        let light = h.lights.get(LightId(1)).unwrap();
        assert!((light.hue - 1.0).abs() < 1e-5);
        assert_eq!(light.value, 0.5);
    }

    #[test]
    fn test_drag_without_target_is_noop() {
        let mut h = Harness::new();
        h.pinch_at(1000.0);
        // No target: calibration centres on mid-range
        let drag = *h.machine.drag();
        assert!((drag.value_at(0.5) - 0.5).abs() < 1e-5);
        h.position = Vec2::new(0.5, 0.4);
        assert!(h.tick(1016.0).is_empty());
    }

    #[test]
    fn test_double_pointing_enters_placement() {
        let mut h = Harness::new();
        h.select_first_light();
        h.commit(DoublePointing);
        let events = h.tick(100.0);
        assert_eq!(events, vec![ControlEvent::Mode(ControlState::Placement)]);
        assert_eq!(h.machine.state(), ControlState::Placement);
    }

    #[test]
    fn test_placement_two_captures_emit_and_clear() {
        let mut h = Harness::new();
        h.commit(DoublePointing);
        h.tick(0.0);

        h.commit(GunPointing);
        h.tick(100.0);
        h.commit(DoublePointing);
        assert!(h.tick(200.0).is_empty());
        assert!(h.machine.status_sexp().contains(":placement-rays 1"));

        let second = Ray::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 1.0));
        h.pointing = second;
        h.commit(GunPointing);
        h.tick(300.0);
        h.commit(DoublePointing);
        let events = h.tick(400.0);
        match events.as_slice() {
            [ControlEvent::PlacementRays([a, b])] => {
                assert_eq!(a.direction, Vec3::new(0.0, 0.0, 1.0));
                assert_eq!(*b, second);
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert!(h.machine.status_sexp().contains(":placement-rays 0"));

        // Holding the pose does not capture again
        assert!(h.tick(500.0).is_empty());
    }

    #[test]
    fn test_placement_exit_returns_to_light_control() {
        let mut h = Harness::new();
        h.commit(DoublePointing);
        h.tick(0.0);
        h.commit(Palming);
        h.tick(100.0);
        h.commit(Fisting);
        h.tick(200.0);
        h.commit(Palming);
        let events = h.tick(300.0);
        assert!(events.contains(&ControlEvent::Mode(ControlState::LightControl)));
        assert_eq!(h.machine.state(), ControlState::LightControl);
    }

    #[test]
    fn test_placement_ignores_light_gestures() {
        let mut h = Harness::new();
        h.commit(DoublePointing);
        h.tick(0.0);
        h.commit(Pointing);
        h.tick(100.0);
        assert_eq!(h.machine.active_target(), None);
        h.commit(Grabbing);
        h.tick(200.0);
        assert_eq!(h.machine.parameter(), ControlParameter::Value);
    }

    #[test]
    fn test_status_sexp() {
        let mut h = Harness::new();
        h.select_first_light();
        let s = h.machine.status_sexp();
        assert!(s.starts_with("(:mode :light-control :parameter :value :target 1"));
        assert!(lexpr::from_str(&s).is_ok());
    }
}
