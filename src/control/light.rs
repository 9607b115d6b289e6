//! Controllable lights, the commands they emit, and bridge throttling.
//!
//! The registry owns every light. Each mutation yields a `LightCommand`
//! carrying the full light state; the external light-control process
//! receives these as `light-state` events and forwards the bridge payload.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};

use crate::control::gesture::ControlParameter;
use crate::geometry::Vec3;

// ── Lights ─────────────────────────────────────────────────

/// Bridge-side light identifier, assigned sequentially from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u32);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One controllable light. Channels are normalized to 0.0-1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub id: LightId,
    pub position: Vec3,
    pub on: bool,
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

impl Light {
    pub fn new(id: LightId, position: Vec3) -> Self {
        Self {
            id,
            position,
            on: true,
            hue: 0.5,
            saturation: 0.5,
            value: 0.5,
        }
    }

    /// Current value of one HSV channel.
    pub fn channel(&self, param: ControlParameter) -> f32 {
        match param {
            ControlParameter::Hue => self.hue,
            ControlParameter::Saturation => self.saturation,
            ControlParameter::Value => self.value,
        }
    }

    fn set_channel(&mut self, param: ControlParameter, v: f32) {
        let v = v.clamp(0.0, 1.0);
        match param {
            ControlParameter::Hue => self.hue = v,
            ControlParameter::Saturation => self.saturation = v,
            ControlParameter::Value => self.value = v,
        }
    }

    fn command(&self, blink: bool) -> LightCommand {
        LightCommand {
            id: self.id,
            on: self.on,
            hue: self.hue,
            saturation: self.saturation,
            value: self.value,
            blink,
        }
    }

    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :position {} :on {} :hue {:.4} :saturation {:.4} :value {:.4})",
            self.id,
            self.position.to_sexp(),
            if self.on { "t" } else { "nil" },
            self.hue,
            self.saturation,
            self.value,
        )
    }
}

/// Full light state to push to the bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightCommand {
    pub id: LightId,
    pub on: bool,
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
    /// One-shot selection blink.
    pub blink: bool,
}

impl LightCommand {
    /// Bridge-scaled payload.
    pub fn payload(&self) -> BridgePayload {
        BridgePayload {
            on: self.on,
            sat: (self.saturation * 255.0) as i32,
            bri: (self.value * 255.0) as i32,
            hue: (self.hue * 65536.0) as i32,
            alert: if self.blink { "select" } else { "none" },
        }
    }

    pub fn to_sexp(&self) -> String {
        format!(
            "(:id {} :on {} :hue {:.4} :saturation {:.4} :value {:.4} :blink {} :bridge {})",
            self.id,
            if self.on { "t" } else { "nil" },
            self.hue,
            self.saturation,
            self.value,
            if self.blink { "t" } else { "nil" },
            self.payload().to_sexp(),
        )
    }
}

/// Light state in the bridge's integer units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgePayload {
    pub on: bool,
    /// Saturation, 0-255.
    pub sat: i32,
    /// Brightness, 0-255.
    pub bri: i32,
    /// Hue, 0-65536.
    pub hue: i32,
    /// `"select"` for a blink, else `"none"`.
    pub alert: &'static str,
}

impl BridgePayload {
    pub fn to_sexp(&self) -> String {
        format!(
            "(:on {} :sat {} :bri {} :hue {} :alert \"{}\")",
            if self.on { "t" } else { "nil" },
            self.sat,
            self.bri,
            self.hue,
            self.alert,
        )
    }
}

// ── Registry ───────────────────────────────────────────────

/// Owner of all lights known to the controller.
#[derive(Debug, Default)]
pub struct LightRegistry {
    lights: Vec<Light>,
}

impl LightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a light at `position` with default state.
    pub fn add(&mut self, position: Vec3) -> LightId {
        let id = LightId(self.lights.len() as u32 + 1);
        self.lights.push(Light::new(id, position));
        debug!(id = id.0, "light registered");
        id
    }

    pub fn get(&self, id: LightId) -> Option<&Light> {
        self.lights.iter().find(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    fn get_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.iter_mut().find(|l| l.id == id)
    }

    /// Flip a light on or off.
    pub fn toggle(&mut self, id: LightId) -> Option<LightCommand> {
        let light = self.get_mut(id)?;
        light.on = !light.on;
        Some(light.command(false))
    }

    /// Write one channel (clamped to 0.0-1.0).
    pub fn set_channel(
        &mut self,
        id: LightId,
        param: ControlParameter,
        v: f32,
    ) -> Option<LightCommand> {
        let light = self.get_mut(id)?;
        light.set_channel(param, v);
        Some(light.command(false))
    }

    /// Selection blink with the light's current state.
    pub fn blink(&self, id: LightId) -> Option<LightCommand> {
        self.get(id).map(|l| l.command(true))
    }

    pub fn list_sexp(&self) -> String {
        if self.lights.is_empty() {
            return "nil".to_string();
        }
        let items: Vec<String> = self.lights.iter().map(|l| l.to_sexp()).collect();
        format!("({})", items.join(" "))
    }
}

// ── Bridge throttling ──────────────────────────────────────

/// Rate limit toward the light bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Minimum interval between deliveries (ms).
    pub min_interval_ms: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 200.0,
        }
    }
}

/// Per-bridge delivery throttle.
///
/// Non-blink commands arriving within the interval are held, one per
/// light, newest wins. Blinks always go out immediately.
#[derive(Debug, Default)]
pub struct BridgeThrottle {
    pub config: BridgeConfig,
    last_delivery_ms: Option<f64>,
    pending: BTreeMap<LightId, LightCommand>,
}

impl BridgeThrottle {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            last_delivery_ms: None,
            pending: BTreeMap::new(),
        }
    }

    /// Submit a command. Returns the commands to deliver now.
    pub fn submit(&mut self, cmd: LightCommand, now_ms: f64) -> Vec<LightCommand> {
        if cmd.blink {
            // The blink carries the newest state for this light
            self.pending.remove(&cmd.id);
            self.last_delivery_ms = Some(now_ms);
            return vec![cmd];
        }
        if self.pending.insert(cmd.id, cmd).is_some() {
            trace!(id = cmd.id.0, "pending light command replaced");
        }
        self.poll(now_ms)
    }

    /// Release pending commands once the interval has elapsed.
    pub fn poll(&mut self, now_ms: f64) -> Vec<LightCommand> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let ready = match self.last_delivery_ms {
            Some(last) => now_ms - last >= self.config.min_interval_ms,
            None => true,
        };
        if !ready {
            return Vec::new();
        }
        self.last_delivery_ms = Some(now_ms);
        std::mem::take(&mut self.pending).into_values().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ── Tests ──────────────────────────────────────────────────
