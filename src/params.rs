// Copyright 2025 Lars Brubaker
// License: MIT
//
// Parameter sets: named, versioned, ordered parameter mappings selecting one
// organ + species variant. A ParameterSet is immutable once a build starts;
// editing parameters means building a fresh scaffold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScaffoldError};
use crate::geom::Real;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Organ {
    Bladder,
    Brainstem,
    Colon,
    Esophagus,
    Heart,
    Lung,
    SmallIntestine,
    Stomach,
    Uterus,
    VagusNerve,
}

impl Organ {
    pub const ALL: [Organ; 10] = [
        Organ::Bladder,
        Organ::Brainstem,
        Organ::Colon,
        Organ::Esophagus,
        Organ::Heart,
        Organ::Lung,
        Organ::SmallIntestine,
        Organ::Stomach,
        Organ::Uterus,
        Organ::VagusNerve,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Organ::Bladder => "bladder",
            Organ::Brainstem => "brainstem",
            Organ::Colon => "colon",
            Organ::Esophagus => "esophagus",
            Organ::Heart => "heart",
            Organ::Lung => "lung",
            Organ::SmallIntestine => "small intestine",
            Organ::Stomach => "stomach",
            Organ::Uterus => "uterus",
            Organ::VagusNerve => "vagus nerve",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Species {
    Human,
    Mouse,
    Pig,
    Rat,
    Sheep,
}

impl Species {
    pub const ALL: [Species; 5] = [
        Species::Human,
        Species::Mouse,
        Species::Pig,
        Species::Rat,
        Species::Sheep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Species::Human => "human",
            Species::Mouse => "mouse",
            Species::Pig => "pig",
            Species::Rat => "rat",
            Species::Sheep => "sheep",
        }
    }
}

/// One parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(Real),
    FloatList(Vec<Real>),
}

/// Named, versioned parameter mapping for one organ + species variant.
/// Keys are ordered (BTreeMap) so serialization and fingerprints are stable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSet {
    pub name: String,
    pub version: u32,
    pub organ: Organ,
    pub species: Species,
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn new(name: impl Into<String>, organ: Organ, species: Species) -> Self {
        ParameterSet {
            name: name.into(),
            version: 1,
            organ,
            species,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: ParamValue) -> &mut Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn with(mut self, key: &str, value: ParamValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ParamValue::Bool(b)) => *b,
            _ => default,
        }
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(ParamValue::Int(i)) => *i,
            _ => default,
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        let v = self.get_int(key, default as i64);
        if v < 0 {
            default
        } else {
            v as usize
        }
    }

    pub fn get_float(&self, key: &str, default: Real) -> Real {
        match self.values.get(key) {
            Some(ParamValue::Float(f)) => *f,
            Some(ParamValue::Int(i)) => *i as Real,
            _ => default,
        }
    }

    pub fn get_float_list(&self, key: &str) -> Option<&[Real]> {
        match self.values.get(key) {
            Some(ParamValue::FloatList(list)) => Some(list),
            _ => None,
        }
    }

    /// Serialize to a JSON object string.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialize from JSON produced by [`ParameterSet::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ScaffoldError::InvalidInput(format!("parameter set JSON: {e}")))
    }

    /// The topology-affecting subset of this parameter set: every count,
    /// layer option and boolean feature flag, but no continuous geometry
    /// (diameters, ratios). Two scaffolds are merge-compatible only if these
    /// agree.
    pub fn topology_fingerprint(&self) -> TopologyFingerprint {
        let mut entries = BTreeMap::new();
        for (key, value) in &self.values {
            match value {
                ParamValue::Bool(b) => {
                    entries.insert(key.clone(), if *b { 1 } else { 0 });
                }
                ParamValue::Int(i) => {
                    entries.insert(key.clone(), *i);
                }
                // continuous values do not affect topology
                ParamValue::Float(_) | ParamValue::FloatList(_) => {}
            }
        }
        TopologyFingerprint {
            organ: self.organ,
            species: self.species,
            entries,
        }
    }
}

/// Discrete fingerprint of every topology-affecting parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyFingerprint {
    pub organ: Organ,
    pub species: Species,
    entries: BTreeMap<String, i64>,
}

impl TopologyFingerprint {
    /// Describe the first difference from other, if any.
    pub fn first_difference(&self, other: &TopologyFingerprint) -> Option<String> {
        if self.organ != other.organ {
            return Some(format!(
                "organ {} vs {}",
                self.organ.name(),
                other.organ.name()
            ));
        }
        if self.species != other.species {
            return Some(format!(
                "species {} vs {}",
                self.species.name(),
                other.species.name()
            ));
        }
        for key in self.entries.keys().chain(other.entries.keys()) {
            let a = self.entries.get(key);
            let b = other.entries.get(key);
            if a != b {
                return Some(format!("parameter '{key}': {a:?} vs {b:?}"));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let params = ParameterSet::new("colon human 1", Organ::Colon, Species::Human)
            .with("elements count around", ParamValue::Int(12))
            .with("wall thickness", ParamValue::Float(0.08))
            .with(
                "layer fractions",
                ParamValue::FloatList(vec![0.35, 0.15, 0.35, 0.15]),
            );
        let json = params.to_json();
        let back = ParameterSet::from_json(&json).unwrap();
        assert_eq!(back.organ, Organ::Colon);
        assert_eq!(back.get_int("elements count around", 0), 12);
        assert_eq!(back.get_float("wall thickness", 0.0), 0.08);
    }

    #[test]
    fn fingerprint_ignores_continuous_values() {
        let a = ParameterSet::new("a", Organ::Colon, Species::Human)
            .with("elements count around", ParamValue::Int(12))
            .with("wall thickness", ParamValue::Float(0.08));
        let b = ParameterSet::new("b", Organ::Colon, Species::Human)
            .with("elements count around", ParamValue::Int(12))
            .with("wall thickness", ParamValue::Float(0.99));
        assert_eq!(a.topology_fingerprint(), b.topology_fingerprint());
    }

    #[test]
    fn fingerprint_reports_count_difference() {
        let a = ParameterSet::new("a", Organ::Colon, Species::Human)
            .with("elements count around", ParamValue::Int(12));
        let b = ParameterSet::new("b", Organ::Colon, Species::Human)
            .with("elements count around", ParamValue::Int(16));
        let diff = a
            .topology_fingerprint()
            .first_difference(&b.topology_fingerprint());
        assert!(diff.unwrap().contains("elements count around"));
    }
}
