//! IPC message dispatch: parse s-expressions and route to handlers.

use crate::depth::{DepthImage, PixelCoord, MAX_SEARCH_RADIUS};
use crate::error::FrameError;
use crate::geometry::Vec3;
use crate::hand::{HandFrame, Handedness, JOINT_COUNT};
use crate::state::ControllerState;
use lexpr::Value;
use tracing::{debug, warn};

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut ControllerState, client_id: u64, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    // Check authentication (hello must be first message)
    let is_authenticated = state
        .ipc_server
        .clients
        .get(&client_id)
        .map(|c| c.authenticated)
        .unwrap_or(false);

    match msg_type.as_deref() {
        Some("hello") => handle_hello(state, client_id, msg_id, &value),
        _ if !is_authenticated => Some(error_response(msg_id, "hello handshake required")),
        Some(_) => dispatch_authenticated(state, client_id, msg_id, &value),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

/// Route a message that needs no handshake. Used by replay mode, where
/// the input file is trusted.
pub fn handle_trusted(state: &mut ControllerState, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };
    let msg_id = get_int(&value, "id").unwrap_or(0);
    dispatch_authenticated(state, 0, msg_id, &value)
}

fn dispatch_authenticated(
    state: &mut ControllerState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    match get_keyword(value, "type").as_deref() {
        Some("ping") => handle_ping(state, msg_id, value),
        Some("frame") => handle_frame(state, msg_id, value),
        Some("depth-frame") => handle_depth_frame(state, msg_id, value),
        Some("status") => handle_status(state, msg_id),
        Some("config") => handle_config(state, msg_id, value),
        Some("light-add") => handle_light_add(state, msg_id, value),
        Some("light-list") => handle_light_list(state, msg_id),
        Some("ipc-client-info") => handle_ipc_client_info(state, client_id, msg_id),
        Some("ipc-rate-limit") => handle_ipc_rate_limit(state, client_id, msg_id, value),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_hello(
    state: &mut ControllerState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let version = get_int(value, "version").unwrap_or(0);
    if version != 1 {
        return Some(error_response(
            msg_id,
            &format!("unsupported protocol version: {version}"),
        ));
    }

    // SO_PEERCRED: only the controller's own user may connect.
    if let Some(client) = state.ipc_server.clients.get(&client_id) {
        if let Some(peer_uid) = client.peer.uid {
            let our_uid = unsafe { libc::getuid() };
            if peer_uid != our_uid {
                warn!(
                    client_id,
                    peer_uid,
                    our_uid,
                    "rejecting client: UID mismatch"
                );
                return Some(error_response(msg_id, "authentication failed: UID mismatch"));
            }
        }
    }

    let client_name = get_string(value, "client").unwrap_or_default();
    debug!(client_id, client_name, "hello handshake (authenticated)");

    let peer_pid = state
        .ipc_server
        .clients
        .get(&client_id)
        .and_then(|c| c.peer.pid);
    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.authenticated = true;
    }

    let pid_field = peer_pid
        .map(|p| format!(" :peer-pid {}", p))
        .unwrap_or_default();
    Some(format!(
        "(:type :hello :id {} :version 1 :server \"handlight\" :features (:depth t :lights {}){})",
        msg_id,
        state.lights.len(),
        pid_field
    ))
}

fn handle_ping(state: &mut ControllerState, msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = state.clock.unix_millis();

    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    ))
}

fn handle_frame(state: &mut ControllerState, msg_id: i64, value: &Value) -> Option<String> {
    let now = state.clock.now_ms();
    let frame = match parse_hand_frame(value, now) {
        Ok(f) => f,
        Err(e) => {
            debug!("rejected hand frame: {}", e);
            return Some(error_response(msg_id, &e.to_string()));
        }
    };
    state.process_frame(frame);

    let target = state
        .gesture
        .active_target()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "nil".to_string());
    Some(format!(
        "(:type :response :id {} :status :ok :tracking {} :raw-state :{} :hand-state :{} :mode :{} :parameter :{} :target {})",
        msg_id,
        if state.tracking.tracking_active { "t" } else { "nil" },
        state.raw_state.as_str(),
        state.debouncer.committed().as_str(),
        state.gesture.state().as_str(),
        state.gesture.parameter().as_str(),
        target,
    ))
}

fn handle_depth_frame(state: &mut ControllerState, msg_id: i64, value: &Value) -> Option<String> {
    let image = match parse_depth_image(value) {
        Ok(img) => img,
        Err(e) => {
            debug!("rejected depth frame: {}", e);
            return Some(error_response(msg_id, &e.to_string()));
        }
    };
    let target = match get_value(value, "target") {
        None => None,
        Some(v) if is_nil(v) => None,
        Some(v) => match parse_pixel(v) {
            Some(p) => Some(p),
            None => return Some(error_response(msg_id, "invalid :target, expected (x y)")),
        },
    };
    let confidence = get_float(value, "confidence").map(|c| c as f32);

    let reading = state.process_depth(&image, target, confidence);
    Some(format!(
        "(:type :response :id {} :status :ok :reading {})",
        msg_id,
        reading.to_sexp()
    ))
}

fn handle_status(state: &mut ControllerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :controller {})",
        msg_id,
        state.status_sexp()
    ))
}

fn handle_config(state: &mut ControllerState, msg_id: i64, value: &Value) -> Option<String> {
    // Build the full new config first so a rejected field changes nothing
    let mut next = state.config();

    if let Some(c) = get_float(value, "min-confidence") {
        if !(0.0..=1.0).contains(&c) {
            return Some(error_response(msg_id, "min-confidence must be 0.0-1.0"));
        }
        next.tracking.min_confidence = c as f32;
    }
    if let Some(c) = get_float(value, "depth-min-confidence") {
        if !(0.0..=1.0).contains(&c) {
            return Some(error_response(msg_id, "depth-min-confidence must be 0.0-1.0"));
        }
        next.depth.min_confidence = c as f32;
    }
    if let Some(r) = get_int(value, "search-radius") {
        if !(0..=MAX_SEARCH_RADIUS).contains(&r) {
            return Some(error_response(
                msg_id,
                &format!("search-radius must be 0-{MAX_SEARCH_RADIUS}"),
            ));
        }
        next.depth.search_radius = r;
    }
    if let Some(ms) = get_float(value, "pinch-toggle-min-ms") {
        next.control.pinch_toggle_min_ms = ms;
    }
    if let Some(ms) = get_float(value, "pinch-toggle-max-ms") {
        next.control.pinch_toggle_max_ms = ms;
    }
    if next.control.pinch_toggle_min_ms > next.control.pinch_toggle_max_ms {
        return Some(error_response(msg_id, "pinch toggle window is empty"));
    }

    if let Some(enabled) = get_bool(value, "enabled") {
        next.tracking.enabled = enabled;
    }
    if let Some(f) = get_float(value, "pinch-factor") {
        next.proximity.pinch_factor = f as f32;
    }
    if let Some(f) = get_float(value, "default-factor") {
        next.proximity.default_factor = f as f32;
    }
    if let Some(f) = get_float(value, "grab-factor") {
        next.proximity.grab_factor = f as f32;
    }
    if let Some(ms) = get_float(value, "from-none-ms") {
        next.debounce.from_none_ms = ms.max(0.0);
    }
    if let Some(ms) = get_float(value, "between-ms") {
        next.debounce.between_ms = ms.max(0.0);
    }
    if let Some(m) = get_float(value, "drag-multiplier") {
        next.control.drag_multiplier = m as f32;
    }
    if let Some(s) = get_float(value, "depth-scale") {
        next.depth.scale = s as f32;
    }
    if let Some(ms) = get_float(value, "bridge-interval-ms") {
        next.bridge.min_interval_ms = ms.max(0.0);
    }

    state.apply_config(next);
    debug!("controller config updated");
    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.config().config_sexp()
    ))
}

fn handle_light_add(state: &mut ControllerState, msg_id: i64, value: &Value) -> Option<String> {
    let position = match get_value(value, "position").and_then(parse_vec3) {
        Some(p) if p.is_finite() => p,
        _ => return Some(error_response(msg_id, "missing or invalid :position (x y z)")),
    };
    let id = state.add_light(position);
    Some(format!(
        "(:type :response :id {} :status :ok :light {})",
        msg_id, id
    ))
}

fn handle_light_list(state: &mut ControllerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :lights {})",
        msg_id,
        state.lights.list_sexp()
    ))
}

fn handle_ipc_client_info(
    state: &mut ControllerState,
    client_id: u64,
    msg_id: i64,
) -> Option<String> {
    if let Some(client) = state.ipc_server.clients.get(&client_id) {
        let uid = client.peer.uid.map(|u| u.to_string()).unwrap_or_else(|| "nil".to_string());
        let pid = client.peer.pid.map(|p| p.to_string()).unwrap_or_else(|| "nil".to_string());
        let rate = client.rate_limiter.max_per_second;
        Some(format!(
            "(:type :response :id {} :status :ok :client-id {} :peer-uid {} :peer-pid {} :authenticated t :rate-limit {})",
            msg_id, client_id, uid, pid, rate
        ))
    } else {
        Some(error_response(msg_id, "client not found"))
    }
}

fn handle_ipc_rate_limit(
    state: &mut ControllerState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let new_limit = match get_int(value, "limit") {
        Some(n) if n > 0 && n <= 10000 => n as u32,
        Some(_) => return Some(error_response(msg_id, "limit must be 1-10000")),
        None => return Some(error_response(msg_id, "missing :limit parameter")),
    };

    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.rate_limiter.max_per_second = new_limit;
        debug!(client_id, new_limit, "rate limit updated");
    }
    Some(ok_response(msg_id))
}

// ── Frame parsing ──────────────────────────────────────────

/// Build a hand frame from a `frame` message.
///
/// `:joints` holds 21 `(x y z)` triples or 63 flat numbers. `:wrist`
/// defaults to the wrist joint and `:timestamp` to `now_ms`.
pub fn parse_hand_frame(value: &Value, now_ms: f64) -> Result<HandFrame, FrameError> {
    let joints = get_value(value, "joints").ok_or(FrameError::Field("joints"))?;
    let coords = numbers(joints).ok_or(FrameError::Field("joints"))?;
    if coords.len() % 3 != 0 {
        return Err(FrameError::Field("joints"));
    }
    let positions: Vec<Vec3> = coords
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32))
        .collect();
    if positions.len() != JOINT_COUNT {
        return Err(FrameError::joint_count(JOINT_COUNT, positions.len()));
    }

    let confidence = get_float(value, "confidence").ok_or(FrameError::Field("confidence"))?;
    let handedness = match get_keyword(value, "handedness") {
        Some(h) => Handedness::parse(&h).ok_or(FrameError::Field("handedness"))?,
        None => Handedness::Right,
    };
    let wrist = match get_value(value, "wrist") {
        Some(v) if !is_nil(v) => Some(parse_vec3(v).ok_or(FrameError::Field("wrist"))?),
        _ => None,
    };
    let timestamp = get_float(value, "timestamp").unwrap_or(now_ms);

    HandFrame::from_positions(&positions, wrist, confidence as f32, handedness, timestamp)
}

/// Build a depth image from a `depth-frame` message. Samples may be a
/// list or a `#(...)` vector; vectors are preferred for large frames.
pub fn parse_depth_image(value: &Value) -> Result<DepthImage, FrameError> {
    let width = get_int(value, "width")
        .filter(|w| *w >= 0)
        .ok_or(FrameError::Field("width"))? as usize;
    let height = get_int(value, "height")
        .filter(|h| *h >= 0)
        .ok_or(FrameError::Field("height"))? as usize;
    let samples = get_value(value, "samples")
        .and_then(numbers)
        .ok_or(FrameError::Field("samples"))?;
    let samples = samples
        .into_iter()
        .map(|s| {
            if (0.0..=f64::from(u16::MAX)).contains(&s) {
                Ok(s as u16)
            } else {
                Err(FrameError::Field("samples"))
            }
        })
        .collect::<Result<Vec<u16>, _>>()?;
    DepthImage::new(width, height, samples)
}

fn parse_vec3(value: &Value) -> Option<Vec3> {
    match numbers(value)?.as_slice() {
        [x, y, z] => Some(Vec3::new(*x as f32, *y as f32, *z as f32)),
        _ => None,
    }
}

fn parse_pixel(value: &Value) -> Option<PixelCoord> {
    match numbers(value)?.as_slice() {
        [x, y] => Some(PixelCoord::new(x.floor() as i64, y.floor() as i64)),
        _ => None,
    }
}

/// All leaves of a list or vector as numbers; `None` if any is not numeric.
fn numbers(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Vector(items) => items.iter().map(Value::as_f64).collect(),
        Value::Cons(_) => flatten_list(value).into_iter().map(Value::as_f64).collect(),
        _ => None,
    }
}

fn is_nil(value: &Value) -> bool {
    match value {
        Value::Null | Value::Nil => true,
        Value::Symbol(s) => s.as_ref() == "nil",
        _ => false,
    }
}

// ── Helpers ────────────────────────────────────────────────

pub(crate) fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

pub(crate) fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Find the raw value following `:key` in an s-expression plist.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

/// Extract a keyword value from an s-expression plist as a string.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let val = get_value(value, key)?;
    match val {
        Value::Keyword(v) => Some(v.to_string()),
        Value::Symbol(v) => {
            let s = v.to_string();
            Some(s.strip_prefix(':').unwrap_or(&s).to_string())
        }
        Value::String(v) => Some(v.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
        Value::Null => Some("nil".to_string()),
        _ => Some(val.to_string()),
    }
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract a string value from an s-expression plist.
fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// Extract a boolean value from an s-expression plist.
/// Treats "t" as true, "nil" as false.
fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

/// Extract a floating-point value from an s-expression plist.
fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Flatten a possibly nested list into a Vec of leaf values.
/// List spines are walked iteratively so long sample lists are safe.
fn flatten_list(value: &Value) -> Vec<&Value> {
    let mut result = Vec::new();
    fn walk<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
        let mut current = v;
        loop {
            match current {
                Value::Cons(pair) => {
                    match pair.car() {
                        nested @ Value::Cons(_) => walk(nested, out),
                        Value::Null => {}
                        leaf => out.push(leaf),
                    }
                    current = pair.cdr();
                }
                Value::Null => break,
                other => {
                    out.push(other);
                    break;
                }
            }
        }
    }
    walk(value, &mut result);
    result
}

/// Format an IPC event s-expression.
pub fn format_event(event_type: &str, fields: &[(&str, &str)]) -> String {
    let mut s = format!("(:type :event :event :{}", event_type);
    for (key, val) in fields {
        s.push_str(&format!(" :{} {}", key, val));
    }
    s.push(')');
    s
}
