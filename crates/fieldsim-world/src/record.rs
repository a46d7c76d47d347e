//! Saving and loading
//!
//! Worlds serialize as `{ anchor, id_seed, objects, variables, force_fields }`
//! with every entity under its own id. Loading re-reserves every id and
//! re-validates the variable graph, so a saved world with a duplicate id or a
//! dependency loop is rejected.
//!
//! `id_seed` is the id generator's state at save time; a loaded world carries
//! on issuing the ids the saved one would have issued. Documents without it
//! seed from a hash of their ids.

use fieldsim_core::{IdRegistry, Identified, Identifier};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::{Error, ForceField, ObjectKind, PhysicsObject, Result, Variable, World};

/// JSON conversion for any serializable entity
pub trait JsonRecord: Serialize + DeserializeOwned {
    fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_json(json: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(json)?)
    }
}

impl JsonRecord for Variable {
    fn to_json(&self) -> Result<serde_json::Value> {
        check_json_number(self)?;
        Ok(serde_json::to_value(self)?)
    }
}

impl JsonRecord for PhysicsObject {}
impl JsonRecord for ForceField {}

impl JsonRecord for World {
    fn to_json(&self) -> Result<serde_json::Value> {
        self.check_json_numbers()?;
        Ok(serde_json::to_value(self)?)
    }
}

// JSON has no NaN or infinity; serde_json would write `null` and the value
// would load back as Undefined.
fn check_json_number(var: &Variable) -> Result<()> {
    match var.literal_value() {
        Some(value) if !value.is_finite() => Err(Error::Serialization(format!(
            "variable {} holds {value:?}, which JSON cannot represent",
            var.id()
        ))),
        _ => Ok(()),
    }
}

#[derive(Serialize)]
struct WorldRecordRef<'a> {
    anchor: &'a Identifier,
    id_seed: Option<u64>,
    objects: Vec<&'a PhysicsObject>,
    variables: Vec<&'a Variable>,
    force_fields: Vec<&'a ForceField>,
}

#[derive(Deserialize)]
struct WorldRecord {
    anchor: Identifier,
    #[serde(default)]
    id_seed: Option<u64>,
    #[serde(default)]
    objects: Vec<PhysicsObject>,
    #[serde(default)]
    variables: Vec<Variable>,
    #[serde(default)]
    force_fields: Vec<ForceField>,
}

impl Serialize for World {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WorldRecordRef {
            anchor: &self.anchor,
            id_seed: Some(self.registry.rng_state()),
            objects: self.objects.values().collect(),
            variables: self.variables.iter().collect(),
            force_fields: self.force_fields.values().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for World {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let record = WorldRecord::deserialize(deserializer)?;
        World::from_record(record).map_err(serde::de::Error::custom)
    }
}

impl World {
    fn from_record(record: WorldRecord) -> Result<Self> {
        let seed = record.id_seed.unwrap_or_else(|| seed_from_ids(&record));
        let mut world = World::empty(IdRegistry::with_seed(seed));

        for mut var in record.variables {
            world.registry.reserve(var.id())?;
            var.attach();
            world.variables.insert(var);
        }
        world.variables.validate()?;

        for object in record.objects {
            world.registry.reserve(object.id())?;
            for var in object.core_vars() {
                if !world.variables.contains(var) {
                    return Err(Error::VariableNotFound(var.clone()));
                }
            }
            world.objects.insert(object.id().clone(), object);
        }

        for ff in record.force_fields {
            world.registry.reserve(ff.id())?;
            if let Some(owner) = ff.owner() {
                if !world.objects.contains_key(owner) {
                    return Err(Error::ObjectNotFound(owner.clone()));
                }
            }
            world.force_fields.insert(ff.id().clone(), ff);
        }

        match world.objects.get(&record.anchor) {
            Some(obj) if obj.kind() == ObjectKind::WorldAnchor => {}
            _ => {
                return Err(Error::Serialization(format!(
                    "anchor {} is not a world anchor object",
                    record.anchor
                )))
            }
        }
        world.anchor = record.anchor;
        debug!(
            objects = world.objects.len(),
            variables = world.variables.len(),
            force_fields = world.force_fields.len(),
            "world loaded"
        );
        Ok(world)
    }
}

// FNV-1a over every id in document order
fn seed_from_ids(record: &WorldRecord) -> u64 {
    let ids = std::iter::once(&record.anchor)
        .chain(record.variables.iter().map(|v| v.id()))
        .chain(record.objects.iter().map(|o| o.id()))
        .chain(record.force_fields.iter().map(|f| f.id()));
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for id in ids {
        for byte in id.as_str().bytes().chain(std::iter::once(0)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    hash
}

impl World {
    fn check_json_numbers(&self) -> Result<()> {
        self.variables.iter().try_for_each(check_json_number)
    }

    /// Pretty-printed JSON document
    ///
    /// Fails if a Literal variable holds a NaN or infinite component; RON
    /// keeps those.
    pub fn to_json_string(&self) -> Result<String> {
        self.check_json_numbers()?;
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a world from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pretty-printed RON document
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Load a world from a RON document
    pub fn from_ron(source: &str) -> Result<Self> {
        Ok(ron::from_str(source)?)
    }
}
