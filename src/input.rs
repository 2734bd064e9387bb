//! Translation of winit window events into placement input.
//!
//! The placement core never sees raw window events. [`InputTranslator`] keeps the
//! little state needed to interpret them (modifier held, last cursor position) and
//! maps screen positions to world positions through a host-supplied pick closure.

use cgmath::Vector3;
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// Pixel scroll is folded into line units using this many pixels per line.
const PIXELS_PER_LINE: f64 = 120.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditorInput {
    /// The drag modifier (shift) was pressed or released.
    ModifierChanged(bool),
    PointerPressed(PointerButton),
    PointerReleased(PointerButton),
    /// The pointer moved onto a new world position.
    PointerMoved(Vector3<f32>),
    /// Scroll amount in lines, positive away from the user.
    Scroll(f32),
    /// Escape or an equivalent abort.
    Cancel,
}

impl EditorInput {
    pub fn from_mouse(button: MouseButton, state: ElementState) -> Option<Self> {
        let button = match button {
            MouseButton::Left => PointerButton::Primary,
            MouseButton::Right => PointerButton::Secondary,
            _ => return None,
        };
        Some(match state {
            ElementState::Pressed => EditorInput::PointerPressed(button),
            ElementState::Released => EditorInput::PointerReleased(button),
        })
    }

    pub fn from_scroll(delta: MouseScrollDelta) -> Self {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
        };
        EditorInput::Scroll(lines)
    }

    fn from_key(event: &KeyEvent) -> Option<Self> {
        match (event.physical_key, event.state) {
            (PhysicalKey::Code(KeyCode::Escape), ElementState::Pressed) => Some(EditorInput::Cancel),
            _ => None,
        }
    }
}

pub struct InputTranslator<F>
where
    F: FnMut(PhysicalPosition<f64>) -> Option<Vector3<f32>>,
{
    pick: F,
    modifier: bool,
    cursor: Option<PhysicalPosition<f64>>,
}

impl<F> InputTranslator<F>
where
    F: FnMut(PhysicalPosition<f64>) -> Option<Vector3<f32>>,
{
    pub fn new(pick: F) -> Self {
        Self {
            pick,
            modifier: false,
            cursor: None,
        }
    }

    pub fn modifier_held(&self) -> bool {
        self.modifier
    }

    pub fn cursor(&self) -> Option<PhysicalPosition<f64>> {
        self.cursor
    }

    pub fn translate(&mut self, event: &WindowEvent) -> Option<EditorInput> {
        match event {
            WindowEvent::ModifiersChanged(modifiers) => {
                let held = modifiers.state().shift_key();
                if held == self.modifier {
                    return None;
                }
                self.modifier = held;
                Some(EditorInput::ModifierChanged(held))
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some(*position);
                (self.pick)(*position).map(EditorInput::PointerMoved)
            }
            WindowEvent::MouseInput { state, button, .. } => EditorInput::from_mouse(*button, *state),
            WindowEvent::MouseWheel { delta, .. } => Some(EditorInput::from_scroll(*delta)),
            WindowEvent::KeyboardInput { event, .. } => EditorInput::from_key(event),
            _ => None,
        }
    }
}

