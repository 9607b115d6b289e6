//! Light control: the gesture state machine and the lights it drives.

pub mod drag;
pub mod gesture;
pub mod light;
pub mod placement;
pub mod scene;

pub use drag::DragCalibration;
pub use gesture::{
    ControlConfig, ControlEvent, ControlInput, ControlParameter, ControlState,
    GestureStateMachine,
};
pub use light::{
    BridgeConfig, BridgePayload, BridgeThrottle, Light, LightCommand, LightId, LightRegistry,
};
pub use placement::{ClosestApproachSpawner, PlacementBuffer, RaySpawner};
pub use scene::{LightScene, TargetResolver};
