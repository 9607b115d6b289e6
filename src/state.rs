//! Controller state: the central struct holding every subsystem.
//!
//! A single `ControllerState` owns the hand pipeline, the gesture state
//! machine, the lights, and the depth sampler. IPC handlers receive it
//! as `&mut` and run one synchronous tick per message. Events produced
//! by a tick are queued in `outbox` and broadcast by the caller.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::control::{
    BridgeConfig, BridgeThrottle, ClosestApproachSpawner, ControlConfig, ControlEvent,
    ControlInput, GestureStateMachine, LightCommand, LightId, LightRegistry, LightScene,
    RaySpawner,
};
use crate::depth::{
    wrist_to_pixel, wrist_uv, DepthConfig, DepthImage, DepthReading, DepthWindowSampler,
    OverlayMask, PixelCoord,
};
use crate::geometry::Vec3;
use crate::hand::debounce::history_sexp;
use crate::hand::{
    classify_joints, DebounceConfig, FingerJointMap, FingerStates, HandFrame, HandState,
    HandTrackingConfig, HandTrackingState, ProximityConfig, TemporalDebouncer,
};
use crate::ipc::dispatch::format_event;
use crate::ipc::IpcServer;

// ── Clock ──────────────────────────────────────────────────

/// Monotonic clock for frames that carry no timestamp.
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since the controller started.
    pub fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Wall-clock milliseconds since the Unix epoch.
    pub fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// ── Config ─────────────────────────────────────────────────

/// Every tunable, grouped by subsystem.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    pub tracking: HandTrackingConfig,
    pub proximity: ProximityConfig,
    pub debounce: DebounceConfig,
    pub control: ControlConfig,
    pub depth: DepthConfig,
    pub bridge: BridgeConfig,
    /// Selection sphere radius around each light.
    pub light_radius: Option<f32>,
}

impl ControllerConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:min-confidence {:.2} :pinch-factor {:.2} :default-factor {:.2} :grab-factor {:.2} :from-none-ms {:.0} :between-ms {:.0} :drag-multiplier {:.2} :pinch-toggle-min-ms {:.0} :pinch-toggle-max-ms {:.0} :search-radius {} :depth-scale {:.4} :depth-min-confidence {:.2} :bridge-interval-ms {:.0})",
            self.tracking.min_confidence,
            self.proximity.pinch_factor,
            self.proximity.default_factor,
            self.proximity.grab_factor,
            self.debounce.from_none_ms,
            self.debounce.between_ms,
            self.control.drag_multiplier,
            self.control.pinch_toggle_min_ms,
            self.control.pinch_toggle_max_ms,
            self.depth.search_radius,
            self.depth.scale,
            self.depth.min_confidence,
            self.bridge.min_interval_ms,
        )
    }
}

// ── State ──────────────────────────────────────────────────

/// Central controller state.
pub struct ControllerState {
    // Hand pipeline
    pub tracking: HandTrackingState,
    pub finger_map: FingerJointMap,
    pub proximity: ProximityConfig,
    pub debouncer: TemporalDebouncer,
    pub raw_state: HandState,
    pub fingers: FingerStates,

    // Control
    pub gesture: GestureStateMachine,
    pub lights: LightRegistry,
    pub scene: LightScene,
    pub spawner: Box<dyn RaySpawner>,
    pub bridge: BridgeThrottle,

    // Depth
    pub depth: DepthWindowSampler,
    pub depth_resolution: (usize, usize),
    pub overlay: Option<OverlayMask>,

    // IPC
    pub ipc_server: IpcServer,
    /// Events produced since the last broadcast.
    pub outbox: Vec<String>,

    pub clock: Clock,
    pub frames_processed: u64,
    /// Timestamp of the latest hand frame and when it arrived.
    last_frame_at: Option<(f64, Instant)>,

    // Shutdown flag
    pub running: bool,
}

impl ControllerState {
    pub fn new(config: ControllerConfig) -> Self {
        let depth_resolution = (config.depth.default_width, config.depth.default_height);
        let scene = config
            .light_radius
            .map(LightScene::new)
            .unwrap_or_default();

        let mut tracking = HandTrackingState::new();
        tracking.config = config.tracking;

        info!("ControllerState initialized");

        Self {
            tracking,
            finger_map: FingerJointMap::default(),
            proximity: config.proximity,
            debouncer: TemporalDebouncer::new(config.debounce),
            raw_state: HandState::None,
            fingers: FingerStates::default(),
            gesture: GestureStateMachine::new(config.control),
            lights: LightRegistry::new(),
            scene,
            spawner: Box::new(ClosestApproachSpawner),
            bridge: BridgeThrottle::new(config.bridge),
            depth: DepthWindowSampler::new(config.depth),
            depth_resolution,
            overlay: None,
            ipc_server: IpcServer::new(IpcServer::default_socket_path()),
            outbox: Vec::new(),
            clock: Clock::new(),
            frames_processed: 0,
            last_frame_at: None,
            running: true,
        }
    }

    /// Snapshot of the current tunables.
    pub fn config(&self) -> ControllerConfig {
        ControllerConfig {
            tracking: self.tracking.config.clone(),
            proximity: self.proximity.clone(),
            debounce: self.debouncer.config.clone(),
            control: self.gesture.config.clone(),
            depth: self.depth.config.clone(),
            bridge: self.bridge.config.clone(),
            light_radius: Some(self.scene.radius),
        }
    }

    /// Replace every tunable at once. Callers validate first.
    pub fn apply_config(&mut self, config: ControllerConfig) {
        self.tracking.config = config.tracking;
        self.proximity = config.proximity;
        self.debouncer.config = config.debounce;
        self.gesture.config = config.control;
        self.depth.config = config.depth;
        self.bridge.config = config.bridge;
        if let Some(radius) = config.light_radius {
            self.scene.radius = radius;
        }
        debug!("controller config applied");
    }

    /// Take all queued events.
    pub fn drain_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    // ── Hand frames ────────────────────────────────────────

    /// Run one tick of the hand pipeline and gesture state machine.
    pub fn process_frame(&mut self, frame: HandFrame) {
        let now_ms = frame.timestamp_ms;
        self.frames_processed += 1;
        self.last_frame_at = Some((now_ms, Instant::now()));

        if !self.tracking.update(frame) {
            return;
        }
        let Some(frame) = self.tracking.frame.as_ref() else {
            return;
        };

        let classification = classify_joints(&frame.joints, &self.finger_map, &self.proximity);
        self.raw_state = classification.hand;
        self.fingers = classification.fingers;

        if self.debouncer.update(classification.hand, now_ms) {
            let history = history_sexp(self.debouncer.history().iter().copied());
            self.outbox.push(format_event(
                "hand-state",
                &[
                    ("state", &format!(":{}", self.debouncer.committed().as_str())),
                    ("history", &history),
                    ("fingers", &self.fingers.to_sexp()),
                ],
            ));
        }

        let (width, height) = self.depth_resolution;
        let history: Vec<HandState> = self.debouncer.history().iter().copied().collect();
        let input = ControlInput {
            committed: self.debouncer.committed(),
            history: &history,
            now_ms,
            position: wrist_uv(frame.wrist, width, height),
            hand_size: self.tracking.hand_size,
            pointing: crate::hand::joints::pointing_ray(&frame.joints),
        };
        let events = self.gesture.tick(&input, &mut self.lights, &self.scene);
        for event in events {
            self.handle_control_event(event, now_ms);
        }
        self.poll_bridge(now_ms);
    }

    fn handle_control_event(&mut self, event: ControlEvent, now_ms: f64) {
        match event {
            ControlEvent::Mode(mode) => {
                self.outbox.push(format_event(
                    "mode",
                    &[("mode", &format!(":{}", mode.as_str()))],
                ));
            }
            ControlEvent::Parameter(param) => {
                self.outbox.push(format_event(
                    "parameter",
                    &[("parameter", &format!(":{}", param.as_str()))],
                ));
            }
            ControlEvent::Target(target) => {
                let id = target
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "nil".to_string());
                self.outbox.push(format_event("target", &[("id", &id)]));
            }
            ControlEvent::Light(cmd) => {
                for delivered in self.bridge.submit(cmd, now_ms) {
                    self.push_light_state(&delivered);
                }
            }
            ControlEvent::PlacementRays(rays) => {
                self.outbox.push(format_event(
                    "placement-rays",
                    &[("rays", &format!("({} {})", rays[0].to_sexp(), rays[1].to_sexp()))],
                ));
                match self.spawner.spawn(&rays) {
                    Some(position) => {
                        self.add_light(position);
                    }
                    None => warn!("placement rays rejected, no light spawned"),
                }
            }
        }
    }

    fn push_light_state(&mut self, cmd: &LightCommand) {
        let body = cmd.to_sexp();
        // Splice the command plist into the event
        let fields = body
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .unwrap_or(&body);
        self.outbox
            .push(format!("(:type :event :event :light-state {})", fields));
    }

    /// Release throttled light commands whose interval has elapsed.
    pub fn poll_bridge(&mut self, now_ms: f64) {
        for cmd in self.bridge.poll(now_ms) {
            self.push_light_state(&cmd);
        }
    }

    /// Current time on the hand frames' clock: the latest frame timestamp
    /// advanced by the wall time since it arrived.
    pub fn frame_clock_ms(&self) -> f64 {
        match self.last_frame_at {
            Some((ts, at)) => ts + at.elapsed().as_secs_f64() * 1000.0,
            None => self.clock.now_ms(),
        }
    }

    /// Register a light and announce it.
    pub fn add_light(&mut self, position: Vec3) -> LightId {
        let id = self.lights.add(position);
        info!(id = id.0, x = position.x, y = position.y, z = position.z, "light added");
        self.outbox.push(format_event(
            "light-added",
            &[("id", &id.to_string()), ("position", &position.to_sexp())],
        ));
        id
    }

    // ── Depth frames ───────────────────────────────────────

    /// Search a depth image around `target`, or around the projected
    /// wrist of the latest hand frame when no target is given.
    pub fn process_depth(
        &mut self,
        image: &DepthImage,
        target: Option<PixelCoord>,
        confidence: Option<f32>,
    ) -> DepthReading {
        self.depth_resolution = (image.width(), image.height());

        let frame = self.tracking.frame.as_ref();
        let target = target
            .or_else(|| frame.map(|f| wrist_to_pixel(f.wrist, image.width(), image.height())))
            .unwrap_or(PixelCoord::new(
                image.width() as i64 / 2,
                image.height() as i64 / 2,
            ));
        let confidence = confidence
            .or_else(|| frame.map(|f| f.confidence))
            .unwrap_or(0.0);

        let reading = self.depth.sample(image, target, confidence);
        let tracking = confidence >= self.depth.config.min_confidence;
        let mask = OverlayMask::build(
            image.width(),
            image.height(),
            target,
            &reading,
            self.depth.radius(),
            tracking,
        );
        debug!(raw = reading.raw, distance = reading.distance, "depth frame processed");

        self.outbox.push(format_event(
            "depth",
            &[
                ("target", &target.to_sexp()),
                ("reading", &reading.to_sexp()),
                ("overlay", &mask.summary_sexp()),
            ],
        ));
        self.overlay = Some(mask);
        reading
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let overlay = self
            .overlay
            .as_ref()
            .map(|m| m.summary_sexp())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:tracking {} :raw-state :{} :fingers {} :debounce {} :control {} :depth {} :overlay {} :lights {} :pending-light-commands {} :frames {})",
            self.tracking.status_sexp(),
            self.raw_state.as_str(),
            self.fingers.to_sexp(),
            self.debouncer.status_sexp(),
            self.gesture.status_sexp(),
            self.depth.status_sexp(),
            overlay,
            self.lights.len(),
            self.bridge.pending_count(),
            self.frames_processed,
        )
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::test_poses;
    use crate::hand::{Handedness, JOINT_COUNT};

    fn frame(joints: [Vec3; JOINT_COUNT], confidence: f32, t: f64) -> HandFrame {
        HandFrame::from_positions(&joints, None, confidence, Handedness::Right, t).unwrap()
    }

    /// Feed the same pose every 16 ms from `start` for `duration` ms.
    fn hold(state: &mut ControllerState, joints: [Vec3; JOINT_COUNT], start: f64, duration: f64) -> f64 {
        let mut t = start;
        while t <= start + duration {
            state.process_frame(frame(joints, 0.95, t));
            t += 16.0;
        }
        t
    }

    fn events_named(state: &mut ControllerState, name: &str) -> Vec<String> {
        let needle = format!(":event :{}", name);
        state
            .drain_events()
            .into_iter()
            .filter(|e| e.contains(&needle))
            .collect()
    }

    #[test]
    fn test_commit_emits_hand_state_event() {
        let mut state = ControllerState::default();
        hold(&mut state, test_poses::open_hand(), 0.0, 600.0);
        assert_eq!(state.debouncer.committed(), HandState::Palming);
        let events = events_named(&mut state, "hand-state");
        assert_eq!(events.len(), 1);
        assert!(events[0].contains(":state :palming"));
        assert!(lexpr::from_str(&events[0]).is_ok());
    }

    #[test]
    fn test_low_confidence_skips_classification() {
        let mut state = ControllerState::default();
        for i in 0..100 {
            state.process_frame(frame(test_poses::fist(), 0.5, i as f64 * 16.0));
        }
        assert_eq!(state.debouncer.committed(), HandState::None);
        assert_eq!(state.raw_state, HandState::None);
        assert_eq!(state.frames_processed, 100);
    }

    #[test]
    fn test_double_pointing_enters_placement() {
        let mut state = ControllerState::default();
        hold(&mut state, test_poses::double_pointing(), 0.0, 600.0);
        let events = events_named(&mut state, "mode");
        assert_eq!(events.len(), 1);
        assert!(events[0].contains(":mode :placement"));
    }

    #[test]
    fn test_pointing_selects_light_and_blinks() {
        let mut state = ControllerState::default();
        // Index tip at (-0.15, 1.9, 0) pointing along +y
        state.add_light(Vec3::new(-0.15, 3.0, 0.0));
        state.drain_events();

        hold(&mut state, test_poses::pointing(), 0.0, 600.0);
        assert_eq!(state.gesture.active_target(), Some(LightId(1)));
        let events = state.drain_events();
        assert!(events.iter().any(|e| e.contains(":event :target :id 1")));
        assert!(events
            .iter()
            .any(|e| e.contains(":event :light-state") && e.contains(":alert \"select\"")));
    }

    #[test]
    fn test_placement_spawns_light() {
        let mut state = ControllerState::default();
        let mut t = hold(&mut state, test_poses::double_pointing(), 0.0, 600.0);
        for _ in 0..2 {
            t = hold(&mut state, test_poses::gun_pointing(), t, 200.0);
            t = hold(&mut state, test_poses::double_pointing(), t, 200.0);
        }
        let events = state.drain_events();
        // Both captures use the same ray, which is parallel: rejected
        assert!(events.iter().any(|e| e.contains(":event :placement-rays")));
        assert_eq!(state.lights.len(), 0);
    }

    #[test]
    fn test_depth_uses_wrist_projection() {
        let mut state = ControllerState::default();
        let wrist = Vec3::new(0.0, 0.0, 0.0);
        let f = HandFrame::from_positions(
            &test_poses::open_hand(),
            Some(wrist),
            0.95,
            Handedness::Right,
            0.0,
        )
        .unwrap();
        state.process_frame(f);

        let mut samples = vec![0u16; 100 * 80];
        samples[40 * 100 + 50] = 1234;
        let image = DepthImage::new(100, 80, samples).unwrap();
        let reading = state.process_depth(&image, None, None);
        assert_eq!(reading.raw, 1234);
        assert_eq!(reading.pixel, Some(PixelCoord::new(50, 40)));
        assert_eq!(state.depth_resolution, (100, 80));
        let events = events_named(&mut state, "depth");
        assert_eq!(events.len(), 1);
        assert!(lexpr::from_str(&events[0]).is_ok());
    }

    #[test]
    fn test_depth_without_hand_is_sentinel() {
        let mut state = ControllerState::default();
        let image = DepthImage::new(10, 10, vec![500; 100]).unwrap();
        let reading = state.process_depth(&image, None, None);
        assert_eq!(reading, DepthReading::SENTINEL);
        assert_eq!(state.overlay.as_ref().unwrap().visible_count(), 0);
    }

    #[test]
    fn test_status_sexp_parses() {
        let mut state = ControllerState::default();
        hold(&mut state, test_poses::fist(), 0.0, 100.0);
        let s = state.status_sexp();
        assert!(s.contains(":raw-state :fisting"));
        assert!(lexpr::from_str(&s).is_ok());
    }

    #[test]
    fn test_config_snapshot() {
        let mut config = ControllerConfig::default();
        config.depth.search_radius = 10;
        let state = ControllerState::new(config);
        assert_eq!(state.config().depth.search_radius, 10);
        assert!(state.config().config_sexp().contains(":search-radius 10"));
    }
}
