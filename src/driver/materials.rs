//! Material property lookup for the `getMaterialProperties` tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Properties of one material, SI units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Pa
    pub youngs_modulus: f64,
    /// Pa
    pub yield_strength: f64,
    /// Pa
    pub ultimate_strength: f64,
    /// kg/m^3
    pub density: f64,
    pub poissons_ratio: f64,
    /// 1/K
    pub thermal_expansion: f64,
    #[serde(rename = "class", default)]
    pub material_class: String,
}

impl Material {
    #[allow(clippy::too_many_arguments)]
    fn new(
        name: &str,
        youngs_modulus: f64,
        yield_strength: f64,
        ultimate_strength: f64,
        density: f64,
        poissons_ratio: f64,
        thermal_expansion: f64,
        material_class: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            youngs_modulus,
            yield_strength,
            ultimate_strength,
            density,
            poissons_ratio,
            thermal_expansion,
            material_class: material_class.to_string(),
        }
    }
}

/// Materials keyed by lowercase lookup name.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDatabase {
    materials: BTreeMap<String, Material>,
}

impl Default for MaterialDatabase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MaterialDatabase {
    /// Steel, aluminum, titanium and a carbon-fibre composite.
    pub fn builtin() -> Self {
        let materials = [
            (
                "steel",
                Material::new("Steel (AISI 1020)", 200e9, 350e6, 420e6, 7850.0, 0.3, 12e-6, "metal"),
            ),
            (
                "aluminum",
                Material::new("Aluminum 6061", 69e9, 276e6, 310e6, 2700.0, 0.33, 23e-6, "metal"),
            ),
            (
                "titanium",
                Material::new("Titanium Grade 5", 110e9, 880e6, 950e6, 4500.0, 0.34, 8.6e-6, "metal"),
            ),
            (
                "composite",
                Material::new(
                    "Carbon Fiber Composite",
                    70e9,
                    600e6,
                    800e6,
                    1600.0,
                    0.3,
                    2e-6,
                    "composite",
                ),
            ),
        ];
        Self {
            materials: materials
                .into_iter()
                .map(|(key, material)| (key.to_string(), material))
                .collect(),
        }
    }

    /// Parses a JSON object of `{key: material}`; keys are lowercased.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Material> = serde_json::from_str(content)?;
        Ok(Self {
            materials: raw
                .into_iter()
                .map(|(key, material)| (key.to_lowercase(), material))
                .collect(),
        })
    }

    /// Loads a material file, replacing the built-in set.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| ConfigError::Materials {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// The file at `path` if given, otherwise the built-in set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let database = Self::from_file(path)?;
                tracing::info!(path = %path.display(), count = database.len(), "Loaded material database");
                Ok(database)
            }
            None => Ok(Self::builtin()),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.get(&name.trim().to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.materials.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
