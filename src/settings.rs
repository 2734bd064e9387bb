//! Editor settings and the key/value provider the placement core reads from.
//!
//! Settings are a plain struct with defaults. Lookup by string key goes through a
//! compile-time table of [`SettingDescriptor`]s so that inspector panels can list,
//! read and write every setting without runtime reflection.

use anyhow::{anyhow, bail};
use log::debug;

/// String keys understood by [`EditorSettings`].
pub mod keys {
    pub const OPTIMIZED_PLACEMENT: &str = "optimized_placement";
    pub const ADD_COLLISIONS: &str = "add_collisions";
    pub const PUSH_TO_SCENE: &str = "push_to_scene";
    pub const ALLOW_MULTI_DROP: &str = "allow_multi_drop";
    pub const FOCUS_ON_PLACE: &str = "focus_on_place";
    pub const DRAG_SIZE_OFFSET: &str = "drag_size_offset";
    pub const COLLISION_BOX: &str = "collision_box";
    pub const COLLISION_SPHERE: &str = "collision_sphere";
    pub const COLLISION_CONVEX: &str = "collision_convex";
    pub const COLLISION_CONCAVE: &str = "collision_concave";
    pub const CONVEX_CLEAN: &str = "convex_clean";
    pub const CONVEX_SIMPLIFY: &str = "convex_simplify";
    pub const SNAP_ENABLED: &str = "snap_enabled";
    pub const SNAP_NEAREST: &str = "snap_nearest";
    pub const SNAP_DISABLE_X: &str = "snap_disable_x";
    pub const SNAP_DISABLE_Z: &str = "snap_disable_z";
    pub const SNAP_OFFSET_X: &str = "snap_offset_x";
    pub const SNAP_OFFSET_Z: &str = "snap_offset_z";
    pub const GRID_SNAP: &str = "grid_snap";
    pub const GRID_STEP: &str = "grid_step";
}

/// Read/write access to settings by key, as consumed by the placement core.
pub trait SettingsProvider {
    fn get_bool(&self, key: &str) -> Option<bool>;

    fn get_float(&self, key: &str) -> Option<f32>;

    fn set_bool(&mut self, key: &str, value: bool) -> anyhow::Result<()>;

    fn set_float(&mut self, key: &str, value: f32) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Float(f32),
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingValue::Bool(_) => SettingKind::Bool,
            SettingValue::Float(_) => SettingKind::Float,
        }
    }
}

/// One row of the settings table: name, kind and typed accessors.
pub struct SettingDescriptor {
    pub name: &'static str,
    pub kind: SettingKind,
    pub get: fn(&EditorSettings) -> SettingValue,
    pub set: fn(&mut EditorSettings, SettingValue),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    pub optimized_placement: bool,
    pub add_collisions: bool,
    pub push_to_scene: bool,
    pub allow_multi_drop: bool,
    pub focus_on_place: bool,
    pub drag_size_offset: f32,
    pub collision_box: bool,
    pub collision_sphere: bool,
    pub collision_convex: bool,
    pub collision_concave: bool,
    pub convex_clean: bool,
    pub convex_simplify: bool,
    pub snap_enabled: bool,
    pub snap_nearest: bool,
    pub snap_disable_x: bool,
    pub snap_disable_z: bool,
    pub snap_offset_x: f32,
    pub snap_offset_z: f32,
    pub grid_snap: bool,
    pub grid_step: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            optimized_placement: false,
            add_collisions: false,
            push_to_scene: true,
            allow_multi_drop: true,
            focus_on_place: true,
            drag_size_offset: 0.0,
            collision_box: true,
            collision_sphere: false,
            collision_convex: false,
            collision_concave: false,
            convex_clean: false,
            convex_simplify: false,
            snap_enabled: true,
            snap_nearest: false,
            snap_disable_x: false,
            snap_disable_z: false,
            snap_offset_x: 0.0,
            snap_offset_z: 0.0,
            grid_snap: false,
            grid_step: 1.0,
        }
    }
}

macro_rules! bool_setting {
    ($key:expr, $field:ident) => {
        SettingDescriptor {
            name: $key,
            kind: SettingKind::Bool,
            get: |s| SettingValue::Bool(s.$field),
            set: |s, v| {
                if let SettingValue::Bool(b) = v {
                    s.$field = b;
                }
            },
        }
    };
}

macro_rules! float_setting {
    ($key:expr, $field:ident) => {
        SettingDescriptor {
            name: $key,
            kind: SettingKind::Float,
            get: |s| SettingValue::Float(s.$field),
            set: |s, v| {
                if let SettingValue::Float(f) = v {
                    s.$field = f;
                }
            },
        }
    };
}

pub static DESCRIPTORS: &[SettingDescriptor] = &[
    bool_setting!(keys::OPTIMIZED_PLACEMENT, optimized_placement),
    bool_setting!(keys::ADD_COLLISIONS, add_collisions),
    bool_setting!(keys::PUSH_TO_SCENE, push_to_scene),
    bool_setting!(keys::ALLOW_MULTI_DROP, allow_multi_drop),
    bool_setting!(keys::FOCUS_ON_PLACE, focus_on_place),
    float_setting!(keys::DRAG_SIZE_OFFSET, drag_size_offset),
    bool_setting!(keys::COLLISION_BOX, collision_box),
    bool_setting!(keys::COLLISION_SPHERE, collision_sphere),
    bool_setting!(keys::COLLISION_CONVEX, collision_convex),
    bool_setting!(keys::COLLISION_CONCAVE, collision_concave),
    bool_setting!(keys::CONVEX_CLEAN, convex_clean),
    bool_setting!(keys::CONVEX_SIMPLIFY, convex_simplify),
    bool_setting!(keys::SNAP_ENABLED, snap_enabled),
    bool_setting!(keys::SNAP_NEAREST, snap_nearest),
    bool_setting!(keys::SNAP_DISABLE_X, snap_disable_x),
    bool_setting!(keys::SNAP_DISABLE_Z, snap_disable_z),
    float_setting!(keys::SNAP_OFFSET_X, snap_offset_x),
    float_setting!(keys::SNAP_OFFSET_Z, snap_offset_z),
    bool_setting!(keys::GRID_SNAP, grid_snap),
    float_setting!(keys::GRID_STEP, grid_step),
];

impl EditorSettings {
    pub fn descriptors() -> &'static [SettingDescriptor] {
        DESCRIPTORS
    }

    pub fn descriptor(key: &str) -> Option<&'static SettingDescriptor> {
        DESCRIPTORS.iter().find(|d| d.name == key)
    }

    pub fn get(&self, key: &str) -> Option<SettingValue> {
        Self::descriptor(key).map(|d| (d.get)(self))
    }

    pub fn set(&mut self, key: &str, value: SettingValue) -> anyhow::Result<()> {
        let descriptor =
            Self::descriptor(key).ok_or_else(|| anyhow!("unknown setting `{}`", key))?;
        if descriptor.kind != value.kind() {
            bail!(
                "setting `{}` expects {:?}, got {:?}",
                key,
                descriptor.kind,
                value.kind()
            );
        }
        debug!("setting {} = {:?}", key, value);
        (descriptor.set)(self, value);
        Ok(())
    }
}

impl SettingsProvider for EditorSettings {
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            SettingValue::Bool(b) => Some(b),
            SettingValue::Float(_) => None,
        }
    }

    fn get_float(&self, key: &str) -> Option<f32> {
        match self.get(key)? {
            SettingValue::Float(f) => Some(f),
            SettingValue::Bool(_) => None,
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) -> anyhow::Result<()> {
        self.set(key, SettingValue::Bool(value))
    }

    fn set_float(&mut self, key: &str, value: f32) -> anyhow::Result<()> {
        self.set(key, SettingValue::Float(value))
    }
}

/// Reads a flag, warning and falling back to `false` when the key is missing.
pub(crate) fn flag(settings: &dyn SettingsProvider, key: &str) -> bool {
    settings.get_bool(key).unwrap_or_else(|| {
        log::warn!("setting `{}` is not available, assuming false", key);
        false
    })
}

/// Reads a float, warning and falling back to `default` when the key is missing.
pub(crate) fn float(settings: &dyn SettingsProvider, key: &str, default: f32) -> f32 {
    settings.get_float(key).unwrap_or_else(|| {
        log::warn!("setting `{}` is not available, assuming {}", key, default);
        default
    })
}
