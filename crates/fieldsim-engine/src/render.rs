//! Read-only views of the world for display
//!
//! A frame never fails as a whole: an object whose position or velocity
//! cannot be evaluated carries [`Display::Error`] for that quantity.

use fieldsim_core::{Identified, Identifier, Value, Vector};
use fieldsim_world::{ObjectKind, TimeStep, World};
use serde::Serialize;

/// A displayed quantity, or why it could not be computed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Display<T = Vector> {
    Value(T),
    Error(String),
}

impl<T: Copy> Display<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Display::Value(v) => Some(*v),
            Display::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Display::Error(_))
    }
}

/// One object as drawn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectFrame {
    pub id: Identifier,
    pub name: String,
    pub kind: ObjectKind,
    pub position: Display,
    pub velocity: Display,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<Display<f64>>,
    pub style: serde_json::Value,
}

/// Every object in the world at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub time: f64,
    pub objects: Vec<ObjectFrame>,
}

impl RenderFrame {
    /// Read every object's state at `clock`
    pub fn capture(world: &World, clock: TimeStep) -> Self {
        let runtime = clock.runtime();
        let read = |id: &Identifier| world.variables().evaluate(id, &runtime);
        let vector = |id: &Identifier| match read(id).and_then(|v| Ok(v.expect_vector()?)) {
            Ok(v) => Display::Value(v),
            Err(e) => Display::Error(e.to_string()),
        };
        let scalar = |id: &Identifier| match read(id) {
            Ok(Value::Scalar(s)) => Display::Value(s),
            Ok(other) => Display::Error(format!("expected scalar, got {}", other.type_name())),
            Err(e) => Display::Error(e.to_string()),
        };

        let objects = world
            .objects()
            .map(|object| ObjectFrame {
                id: object.id().clone(),
                name: object.display_name.clone(),
                kind: object.kind(),
                position: vector(object.position_var()),
                velocity: vector(object.velocity_var()),
                radius: object.radius_var().map(scalar),
                style: object.style.clone(),
            })
            .collect();

        Self {
            time: clock.time,
            objects,
        }
    }

    pub fn object(&self, id: &Identifier) -> Option<&ObjectFrame> {
        self.objects.iter().find(|o| &o.id == id)
    }
}

/// Receiver of frames after every visible change
pub trait RenderSink {
    fn render(&mut self, frame: &RenderFrame);
}

/// Keeps every frame
impl RenderSink for Vec<RenderFrame> {
    fn render(&mut self, frame: &RenderFrame) {
        self.push(frame.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsim_world::{ObjectInit, Quantity};

    #[test]
    fn test_capture_reads_state() {
        let mut world = World::new();
        let ball = world
            .add_object(
                ObjectKind::Rigidbody,
                ObjectInit::new()
                    .with_position([1.0, 2.0])
                    .with_radius(0.5)
                    .with_style(serde_json::json!({ "color": "red" })),
            )
            .unwrap();

        let frame = RenderFrame::capture(&world, TimeStep::new(0.5, 0.01));
        assert_eq!(frame.time, 0.5);
        // anchor plus the ball
        assert_eq!(frame.objects.len(), 2);

        let drawn = frame.object(&ball).unwrap();
        assert_eq!(drawn.position, Display::Value([1.0, 2.0]));
        assert_eq!(drawn.velocity.value(), Some([0.0, 0.0]));
        assert_eq!(drawn.radius, Some(Display::Value(0.5)));
        assert_eq!(drawn.style["color"], "red");
    }

    #[test]
    fn test_capture_substitutes_errors() {
        let mut world = World::new();
        let ball = world
            .add_object(
                ObjectKind::Particle,
                ObjectInit::new()
                    .with_position(Quantity::formula("[time, missing]"))
                    .with_velocity(Quantity::formula("3")),
            )
            .unwrap();

        let frame = RenderFrame::capture(&world, TimeStep::new(1.0, 0.01));
        let drawn = frame.object(&ball).unwrap();
        assert!(drawn.position.is_error());
        assert!(matches!(&drawn.velocity, Display::Error(msg) if msg.contains("vector")));
        assert!(drawn.radius.is_none());
    }

    #[test]
    fn test_formula_position_uses_clock() {
        let mut world = World::new();
        let ball = world
            .add_object(
                ObjectKind::Basic,
                ObjectInit::new().with_position(Quantity::formula("[time * 2, dt]")),
            )
            .unwrap();
        let frame = RenderFrame::capture(&world, TimeStep::new(1.5, 0.25));
        assert_eq!(frame.object(&ball).unwrap().position, Display::Value([3.0, 0.25]));
    }
}
