// organ-scaffold: parametric anatomical organ scaffolds
// Copyright 2025 Lars Brubaker
// License: MIT

pub mod annotation;
pub mod error;
pub mod fields;
pub mod geom;
pub mod interp;
pub mod params;
pub mod path;
pub mod profile;
pub mod refine;
pub mod scaffold;
pub mod segmentation;
pub mod terms;
pub mod topology;

pub use error::{Result, ScaffoldError};
pub use fields::{FieldData, FieldKind, NodeFieldValue};
pub use params::{Organ, ParamValue, ParameterSet, Species};
pub use path::{CentralPath, PathNode};
pub use scaffold::{default_parameters, BuildState, Scaffold};
pub use segmentation::SegmentationInput;
pub use topology::{ElementIdx, NodeIdx, Topology};
