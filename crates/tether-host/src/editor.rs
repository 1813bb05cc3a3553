//! In-memory editor model.
//!
//! The stand-in for the live host application's state: a scene graph of
//! named objects, an asset catalog, and a play state. Every method here
//! must be called on the privileged context — the bridge handlers get at
//! the model only through closures submitted to
//! [`crate::dispatch::MainThreadDispatch`], which serializes all access.

use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A deterministic 1×1 PNG used as the captured frame.
const PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Play mode of the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    /// Not running; the scene is editable.
    Editing,
    /// Running.
    Playing,
    /// Running but suspended.
    Paused,
}

/// One object in the scene graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObject {
    /// Unique object name.
    pub name: String,
    /// Parent object name, if parented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Attached component type names.
    pub components: Vec<String>,
    /// Free-form properties (position, tags, ...).
    pub properties: Map<String, Value>,
    /// Whether the object is active in the scene.
    pub active: bool,
}

impl SceneObject {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            components: vec!["Transform".into()],
            properties: Map::new(),
            active: true,
        }
    }
}

/// One entry in the asset catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset name.
    pub name: String,
    /// Project-relative path.
    pub path: String,
    /// Asset kind (`prefab`, `material`, ...).
    pub kind: String,
}

/// The editor's live, stateful world.
#[derive(Debug)]
pub struct EditorModel {
    scene_name: String,
    play_state: PlayState,
    objects: BTreeMap<String, SceneObject>,
    assets: Vec<Asset>,
    selection: Option<String>,
    frame: u64,
}

impl EditorModel {
    /// Create a model with the default scene contents.
    #[must_use]
    pub fn new(scene_name: impl Into<String>) -> Self {
        let mut objects = BTreeMap::new();
        for name in ["Main Camera", "Directional Light"] {
            let _ = objects.insert(name.to_owned(), SceneObject::new(name));
        }
        Self {
            scene_name: scene_name.into(),
            play_state: PlayState::Editing,
            objects,
            assets: Vec::new(),
            selection: None,
            frame: 0,
        }
    }

    /// Register an asset in the catalog.
    pub fn add_asset(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    /// Number of objects in the scene.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Scene summary for the `getState` command.
    #[must_use]
    pub fn state(&self) -> Value {
        let objects: Vec<Value> = self
            .objects
            .values()
            .map(|o| {
                json!({
                    "name": o.name,
                    "parent": o.parent,
                    "active": o.active,
                })
            })
            .collect();
        json!({
            "sceneName": self.scene_name,
            "playState": self.play_state,
            "isPlaying": self.play_state == PlayState::Playing,
            "frame": self.frame,
            "selection": self.selection,
            "objectCount": self.objects.len(),
            "assetCount": self.assets.len(),
            "objects": objects,
        })
    }

    /// Full description of one object.
    pub fn object_details(&self, name: &str) -> Result<Value, String> {
        let object = self
            .objects
            .get(name)
            .ok_or_else(|| format!("no object named '{name}'"))?;
        let children: Vec<&str> = self
            .objects
            .values()
            .filter(|o| o.parent.as_deref() == Some(name))
            .map(|o| o.name.as_str())
            .collect();
        let mut details = serde_json::to_value(object).map_err(|e| e.to_string())?;
        details["children"] = json!(children);
        Ok(details)
    }

    /// Apply a `manipulateScene` action.
    pub fn manipulate(&mut self, action: &str, name: &str, details: &Value) -> Result<Value, String> {
        match action {
            "create" => self.create_object(name, details),
            "delete" => self.delete_object(name),
            "rename" => {
                let to = required_str(details, "to")?;
                self.rename_object(name, to)
            }
            "reparent" => {
                let parent = details.get("parent").and_then(Value::as_str);
                self.reparent_object(name, parent)
            }
            "setProperty" => {
                let key = required_str(details, "key")?;
                let value = details.get("value").cloned().unwrap_or(Value::Null);
                self.set_property(name, key, value)
            }
            "setActive" => {
                let active = details
                    .get("active")
                    .and_then(Value::as_bool)
                    .ok_or("'active' boolean required")?;
                self.set_active(name, active)
            }
            other => Err(format!("unknown scene action '{other}'")),
        }
    }

    fn create_object(&mut self, name: &str, details: &Value) -> Result<Value, String> {
        if self.objects.contains_key(name) {
            return Err(format!("object '{name}' already exists"));
        }
        let mut object = SceneObject::new(name);
        if let Some(parent) = details.get("parent").and_then(Value::as_str) {
            if !self.objects.contains_key(parent) {
                return Err(format!("no object named '{parent}'"));
            }
            object.parent = Some(parent.to_owned());
        }
        if let Some(components) = details.get("components").and_then(Value::as_array) {
            object.components.extend(
                components
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned),
            );
        }
        let _ = self.objects.insert(name.to_owned(), object);
        Ok(json!({"success": true, "name": name}))
    }

    fn delete_object(&mut self, name: &str) -> Result<Value, String> {
        if self.objects.remove(name).is_none() {
            return Err(format!("no object named '{name}'"));
        }
        // Orphans move to the scene root.
        for object in self.objects.values_mut() {
            if object.parent.as_deref() == Some(name) {
                object.parent = None;
            }
        }
        if self.selection.as_deref() == Some(name) {
            self.selection = None;
        }
        Ok(json!({"success": true, "name": name}))
    }

    fn rename_object(&mut self, name: &str, to: &str) -> Result<Value, String> {
        if self.objects.contains_key(to) {
            return Err(format!("object '{to}' already exists"));
        }
        let Some(mut object) = self.objects.remove(name) else {
            return Err(format!("no object named '{name}'"));
        };
        object.name = to.to_owned();
        let _ = self.objects.insert(to.to_owned(), object);
        for other in self.objects.values_mut() {
            if other.parent.as_deref() == Some(name) {
                other.parent = Some(to.to_owned());
            }
        }
        if self.selection.as_deref() == Some(name) {
            self.selection = Some(to.to_owned());
        }
        Ok(json!({"success": true, "name": to}))
    }

    fn reparent_object(&mut self, name: &str, parent: Option<&str>) -> Result<Value, String> {
        if let Some(parent) = parent {
            if parent == name {
                return Err(format!("cannot parent '{name}' to itself"));
            }
            if !self.objects.contains_key(parent) {
                return Err(format!("no object named '{parent}'"));
            }
        }
        let object = self
            .objects
            .get_mut(name)
            .ok_or_else(|| format!("no object named '{name}'"))?;
        object.parent = parent.map(str::to_owned);
        Ok(json!({"success": true, "name": name, "parent": parent}))
    }

    fn set_property(&mut self, name: &str, key: &str, value: Value) -> Result<Value, String> {
        let object = self
            .objects
            .get_mut(name)
            .ok_or_else(|| format!("no object named '{name}'"))?;
        let _ = object.properties.insert(key.to_owned(), value);
        Ok(json!({"success": true, "name": name, "key": key}))
    }

    fn set_active(&mut self, name: &str, active: bool) -> Result<Value, String> {
        let object = self
            .objects
            .get_mut(name)
            .ok_or_else(|| format!("no object named '{name}'"))?;
        object.active = active;
        Ok(json!({"success": true, "name": name, "active": active}))
    }

    /// Apply a `manageAssets` action.
    pub fn manage_assets(&mut self, action: &str, filter: &str) -> Result<Value, String> {
        match action {
            "list" | "find" => {
                let matches: Vec<&Asset> = self
                    .assets
                    .iter()
                    .filter(|a| filter.is_empty() || a.name.contains(filter) || a.path.contains(filter))
                    .collect();
                Ok(json!({"success": true, "assets": matches}))
            }
            "instantiate" => {
                let asset = self
                    .assets
                    .iter()
                    .find(|a| a.name == filter)
                    .cloned()
                    .ok_or_else(|| format!("no asset named '{filter}'"))?;
                let mut name = asset.name.clone();
                let mut counter = 1;
                while self.objects.contains_key(&name) {
                    name = format!("{} ({counter})", asset.name);
                    counter += 1;
                }
                let created = self.create_object(&name, &json!({}))?;
                Ok(json!({
                    "success": true,
                    "asset": asset.name,
                    "instance": created["name"],
                }))
            }
            other => Err(format!("unknown asset action '{other}'")),
        }
    }

    /// Interpret an `executeCommand` code string.
    pub fn execute(&mut self, code: &str) -> Result<Value, String> {
        let mut words = code.split_whitespace();
        let verb = words.next().ok_or("empty command")?;
        match verb {
            "play" => {
                self.play_state = PlayState::Playing;
                Ok(json!({"success": true, "playState": self.play_state}))
            }
            "pause" => {
                if self.play_state != PlayState::Playing {
                    return Err("not playing".into());
                }
                self.play_state = PlayState::Paused;
                Ok(json!({"success": true, "playState": self.play_state}))
            }
            "stop" => {
                self.play_state = PlayState::Editing;
                self.frame = 0;
                Ok(json!({"success": true, "playState": self.play_state}))
            }
            "step" => {
                if self.play_state == PlayState::Editing {
                    return Err("not playing".into());
                }
                self.frame += 1;
                Ok(json!({"success": true, "frame": self.frame}))
            }
            "select" => {
                let name = words.next().ok_or("select requires an object name")?;
                if !self.objects.contains_key(name) {
                    return Err(format!("no object named '{name}'"));
                }
                self.selection = Some(name.to_owned());
                Ok(json!({"success": true, "selection": name}))
            }
            "count" => match words.next() {
                Some("objects") => Ok(json!({"success": true, "count": self.objects.len()})),
                Some("assets") => Ok(json!({"success": true, "count": self.assets.len()})),
                _ => Err("count requires 'objects' or 'assets'".into()),
            },
            other => Err(format!("unknown command '{other}'")),
        }
    }

    /// Capture the current frame as base64 PNG bytes.
    #[must_use]
    pub fn screenshot(&self) -> Value {
        let data = base64::engine::general_purpose::STANDARD.encode(PIXEL_PNG);
        json!({
            "data": data,
            "format": "png",
            "width": 1,
            "height": 1,
            "frame": self.frame,
        })
    }
}

fn required_str<'a>(details: &'a Value, key: &str) -> Result<&'a str, String> {
    details
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("'{key}' string required"))
}
