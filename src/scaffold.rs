// Copyright 2025 Lars Brubaker
// License: MIT
//
// The scaffold build pipeline.
//
// One generic pipeline builds every organ; per-organ behaviour is data (an
// OrganRecipe: profile shape, topology rule, annotation tables), selected by
// the Organ tag. A build runs Unbuilt -> TopologyBuilt -> FieldsSynthesized
// -> AnnotationsAssigned -> [Refined] -> Ready, each transition one-way; a
// parameter change means discarding the scaffold and building a fresh one.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::annotation::{AnnotationRegistry, AnnotationTerm, ClosureViolation, MarkerPoint};
use crate::error::{Result, ScaffoldError};
use crate::fields::{
    synthesize_flat, synthesize_geometric, synthesize_material, synthesize_split,
    synthesize_straight, FieldData, FieldKind, PartGeometry,
};
use crate::geom::Real;
use crate::params::{Organ, ParamValue, ParameterSet, Species};
use crate::path::{CentralPath, PathNode};
use crate::profile::{CrossSectionProfile, ProfileShape};
use crate::refine::{refine, RefinedMesh};
use crate::segmentation::SegmentationInput;
use crate::terms::{self, find_term, EntitySelector};
use crate::topology::{
    BranchAttachment, BranchRecord, ElementIdx, FaceKey, NodeIdx, Seam, SeamKind, Topology,
};

/// Build progress of one scaffold. Transitions are one-way per build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Unbuilt,
    TopologyBuilt,
    FieldsSynthesized,
    AnnotationsAssigned,
    Refined,
    Ready,
}

// ─────────────────────────── organ recipes ────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub enum ShapeSpec {
    Ellipse { axis_ratio: Real },
    Superellipse { axis_ratio: Real, exponent: Real },
}

/// One independently-meshed part of a multi-part organ.
#[derive(Clone, Copy, Debug)]
pub struct PartSpec {
    pub term: &'static str,
    /// Path origin offset in organ-radius units, in the (x, y) plane.
    pub offset: [Real; 2],
    /// Part radius as a fraction of the organ radius.
    pub scale: Real,
    /// Where the part's path begins, as a fraction of the organ length.
    pub origin_along: Real,
    /// Part length as a fraction of the organ length.
    pub length: Real,
    pub seam: Option<SeamSpec>,
}

#[derive(Clone, Copy, Debug)]
pub struct SeamSpec {
    pub other_part: usize,
    /// End-to-end junction instead of a longitudinal fissure line.
    pub transverse: bool,
    pub around_self_percent: u8,
    pub around_other_percent: u8,
    /// Responds to the "open fissure" flag.
    pub openable: bool,
}

/// One branch of a branching organ.
#[derive(Clone, Copy, Debug)]
pub struct BranchSpec {
    pub term: &'static str,
    /// Attachment point as a fraction along the trunk.
    pub attach_fraction: Real,
    /// Departure direction in the trunk local (d2, d3, d1) frame.
    pub direction: [Real; 3],
    pub length_fraction: Real,
    pub radius_fraction: Real,
    pub elements_along: usize,
}

/// Through-wall tissue layer vocabulary for 4-layer walls, innermost first,
/// plus the combined muscularis group spanning both muscle layers.
#[derive(Clone, Copy, Debug)]
pub struct LayerTerms {
    pub layers: [&'static str; 4],
    pub combined_muscle: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct SurfaceTerms {
    pub serosa: &'static str,
    pub luminal: &'static str,
}

/// Everything that varies per organ, as data.
#[derive(Clone, Copy, Debug)]
pub struct OrganRecipe {
    pub organ_term: &'static str,
    pub supported_layer_counts: &'static [usize],
    pub elements_around: usize,
    pub elements_along: usize,
    pub wall_thickness: Real,
    pub layer_fractions4: [Real; 4],
    pub shape: ShapeSpec,
    pub capped: bool,
    /// Multi-part organs; empty means a single tube part named organ_term.
    pub parts: &'static [PartSpec],
    /// Aggregate groups unioning several parts: (term, part indices).
    pub aggregates: &'static [(&'static str, &'static [usize])],
    pub branches: &'static [BranchSpec],
    /// Longitudinal regions: (term, cumulative percent along).
    pub segments: &'static [(&'static str, u8)],
    pub layer_terms: Option<LayerTerms>,
    pub surface_terms: Option<SurfaceTerms>,
    pub fields: &'static [FieldKind],
    /// Around percents of the split field's margin columns.
    pub split_margin: Option<[u8; 2]>,
    /// Base physical size (length, radius) for the human variant.
    pub base_length: Real,
    pub base_radius: Real,
    /// Fraction of lateral bend in the default path.
    pub bend: Real,
}

const TUBE_LAYER_FRACTIONS: [Real; 4] = [0.35, 0.15, 0.35, 0.15];

const COLON_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "colon",
    supported_layer_counts: &[1, 4],
    elements_around: 12,
    elements_along: 8,
    wall_thickness: 0.12,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 1.0 },
    capped: false,
    parts: &[],
    aggregates: &[],
    branches: &[],
    segments: &[],
    layer_terms: Some(LayerTerms {
        layers: [
            "mucosa of colon",
            "submucosa of colon",
            "circular muscle layer of colon",
            "longitudinal muscle layer of colon",
        ],
        combined_muscle: "muscularis externa of colon",
    }),
    surface_terms: Some(SurfaceTerms {
        serosa: "serosa of colon",
        luminal: "luminal surface of colon",
    }),
    fields: &[FieldKind::Geometric, FieldKind::Material, FieldKind::Flat],
    split_margin: None,
    base_length: 1500.0,
    base_radius: 25.0,
    bend: 0.2,
};

const ESOPHAGUS_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "esophagus",
    supported_layer_counts: &[1, 4],
    elements_around: 8,
    elements_along: 8,
    wall_thickness: 0.15,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 0.9 },
    capped: false,
    parts: &[],
    aggregates: &[],
    branches: &[],
    segments: &[
        ("cervical part of esophagus", 33),
        ("thoracic part of esophagus", 71),
        ("abdominal part of esophagus", 100),
    ],
    layer_terms: Some(LayerTerms {
        layers: [
            "esophagus mucosa",
            "submucosa of esophagus",
            "esophagus smooth muscle circular layer",
            "esophagus smooth muscle longitudinal layer",
        ],
        combined_muscle: "muscularis externa of esophagus",
    }),
    surface_terms: Some(SurfaceTerms {
        serosa: "serosa of esophagus",
        luminal: "luminal surface of esophagus",
    }),
    fields: &[FieldKind::Geometric, FieldKind::Material, FieldKind::Flat],
    split_margin: None,
    base_length: 250.0,
    base_radius: 10.0,
    bend: 0.1,
};

const SMALL_INTESTINE_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "small intestine",
    supported_layer_counts: &[1, 4],
    elements_around: 8,
    elements_along: 12,
    wall_thickness: 0.12,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 1.0 },
    capped: false,
    parts: &[],
    aggregates: &[],
    branches: &[],
    segments: &[("duodenum", 20), ("jejunum", 60), ("ileum", 100)],
    layer_terms: Some(LayerTerms {
        layers: [
            "mucosa of small intestine",
            "submucosa of small intestine",
            "circular muscle layer of small intestine",
            "longitudinal muscle layer of small intestine",
        ],
        combined_muscle: "muscularis externa of small intestine",
    }),
    surface_terms: Some(SurfaceTerms {
        serosa: "serosa of small intestine",
        luminal: "luminal surface of duodenum",
    }),
    fields: &[FieldKind::Geometric, FieldKind::Material, FieldKind::Flat],
    split_margin: None,
    base_length: 5000.0,
    base_radius: 15.0,
    bend: 0.3,
};

const STOMACH_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "stomach",
    supported_layer_counts: &[1, 4],
    elements_around: 12,
    elements_along: 8,
    wall_thickness: 0.1,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Superellipse {
        axis_ratio: 0.8,
        exponent: 2.5,
    },
    capped: false,
    parts: &[],
    aggregates: &[],
    branches: &[],
    segments: &[
        ("cardia of stomach", 10),
        ("fundus of stomach", 30),
        ("body of stomach", 65),
        ("pyloric antrum", 88),
        ("pylorus", 100),
    ],
    layer_terms: Some(LayerTerms {
        layers: [
            "mucosa of stomach",
            "submucosa of stomach",
            "circular muscle layer of stomach",
            "longitudinal muscle layer of stomach",
        ],
        combined_muscle: "muscularis externa of stomach",
    }),
    surface_terms: Some(SurfaceTerms {
        serosa: "serosa of stomach",
        luminal: "luminal surface of stomach",
    }),
    fields: &[
        FieldKind::Geometric,
        FieldKind::Material,
        FieldKind::Flat,
        FieldKind::Split,
    ],
    split_margin: Some([0, 50]),
    base_length: 300.0,
    base_radius: 50.0,
    bend: 0.35,
};

const BLADDER_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "urinary bladder",
    supported_layer_counts: &[1],
    elements_around: 8,
    elements_along: 6,
    wall_thickness: 0.1,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 0.9 },
    capped: true,
    parts: &[],
    aggregates: &[],
    branches: &[
        BranchSpec {
            term: "left ureter",
            attach_fraction: 0.55,
            direction: [0.7, 0.5, -0.5],
            length_fraction: 0.8,
            radius_fraction: 0.08,
            elements_along: 4,
        },
        BranchSpec {
            term: "right ureter",
            attach_fraction: 0.55,
            direction: [-0.7, 0.5, -0.5],
            length_fraction: 0.8,
            radius_fraction: 0.08,
            elements_along: 4,
        },
    ],
    segments: &[("neck of urinary bladder", 30), ("dome of the bladder", 100)],
    layer_terms: None,
    surface_terms: Some(SurfaceTerms {
        serosa: "serosa of urinary bladder",
        luminal: "lumen of urinary bladder",
    }),
    fields: &[FieldKind::Geometric, FieldKind::Material],
    split_margin: None,
    base_length: 80.0,
    base_radius: 40.0,
    bend: 0.0,
};

const UTERUS_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "uterus",
    supported_layer_counts: &[1],
    elements_around: 8,
    elements_along: 6,
    wall_thickness: 0.25,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 0.8 },
    capped: false,
    parts: &[],
    aggregates: &[],
    branches: &[
        BranchSpec {
            term: "left uterine horn",
            attach_fraction: 0.95,
            direction: [0.8, 0.2, 0.6],
            length_fraction: 1.2,
            radius_fraction: 0.35,
            elements_along: 6,
        },
        BranchSpec {
            term: "right uterine horn",
            attach_fraction: 0.95,
            direction: [-0.8, 0.2, 0.6],
            length_fraction: 1.2,
            radius_fraction: 0.35,
            elements_along: 6,
        },
    ],
    segments: &[("uterine cervix", 30), ("body of uterus", 100)],
    layer_terms: None,
    surface_terms: Some(SurfaceTerms {
        serosa: "serosa of uterus",
        luminal: "uterine lumen",
    }),
    fields: &[FieldKind::Geometric, FieldKind::Material],
    split_margin: None,
    base_length: 75.0,
    base_radius: 25.0,
    bend: 0.1,
};

// Lobes stack base-to-apex along each lung's axis; the fissures are the
// shared rings between consecutive lobes, openable into disjoint meshes.
const LUNG_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "lung",
    supported_layer_counts: &[1],
    elements_around: 8,
    elements_along: 4,
    wall_thickness: 0.4,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 0.7 },
    capped: false,
    parts: &[
        PartSpec {
            term: "lower lobe of left lung",
            offset: [1.5, 0.0],
            scale: 1.0,
            origin_along: 0.0,
            length: 0.5,
            seam: None,
        },
        PartSpec {
            term: "upper lobe of left lung",
            offset: [1.5, 0.0],
            scale: 1.0,
            origin_along: 0.5,
            length: 0.5,
            seam: Some(SeamSpec {
                other_part: 0,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: true,
            }),
        },
        PartSpec {
            term: "lower lobe of right lung",
            offset: [-1.5, 0.0],
            scale: 0.9,
            origin_along: 0.0,
            length: 0.35,
            seam: None,
        },
        PartSpec {
            term: "middle lobe of right lung",
            offset: [-1.5, 0.0],
            scale: 0.9,
            origin_along: 0.35,
            length: 0.3,
            seam: Some(SeamSpec {
                other_part: 2,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: true,
            }),
        },
        PartSpec {
            term: "upper lobe of right lung",
            offset: [-1.5, 0.0],
            scale: 0.9,
            origin_along: 0.65,
            length: 0.35,
            seam: Some(SeamSpec {
                other_part: 3,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: true,
            }),
        },
        PartSpec {
            term: "right lung accessory lobe",
            offset: [-0.6, 1.2],
            scale: 0.4,
            origin_along: 0.1,
            length: 0.3,
            seam: None,
        },
    ],
    aggregates: &[("left lung", &[0, 1]), ("right lung", &[2, 3, 4, 5])],
    branches: &[],
    segments: &[],
    layer_terms: None,
    surface_terms: None,
    fields: &[FieldKind::Geometric, FieldKind::Material],
    split_margin: None,
    base_length: 250.0,
    base_radius: 60.0,
    bend: 0.0,
};

// Ventricles are independent side-by-side tubes (the septum is an angular
// strip of the left ventricle wall); each atrium continues its ventricle
// through a shared transverse ring at the base.
const HEART_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "heart",
    supported_layer_counts: &[1],
    elements_around: 8,
    elements_along: 4,
    wall_thickness: 0.35,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 0.9 },
    capped: false,
    parts: &[
        PartSpec {
            term: "left ventricle myocardium",
            offset: [0.8, 0.0],
            scale: 1.0,
            origin_along: 0.0,
            length: 0.6,
            seam: None,
        },
        PartSpec {
            term: "right ventricle myocardium",
            offset: [-0.8, 0.0],
            scale: 0.9,
            origin_along: 0.0,
            length: 0.6,
            seam: None,
        },
        PartSpec {
            term: "left atrium myocardium",
            offset: [0.8, 0.0],
            scale: 1.0,
            origin_along: 0.6,
            length: 0.35,
            seam: Some(SeamSpec {
                other_part: 0,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: false,
            }),
        },
        PartSpec {
            term: "right atrium myocardium",
            offset: [-0.8, 0.0],
            scale: 0.9,
            origin_along: 0.6,
            length: 0.35,
            seam: Some(SeamSpec {
                other_part: 1,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: false,
            }),
        },
    ],
    aggregates: &[
        ("heart left ventricle", &[0]),
        ("heart right ventricle", &[1]),
    ],
    branches: &[],
    segments: &[],
    layer_terms: None,
    surface_terms: None,
    fields: &[FieldKind::Geometric, FieldKind::Material],
    split_margin: None,
    base_length: 120.0,
    base_radius: 40.0,
    bend: 0.0,
};

const BRAINSTEM_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "brainstem",
    supported_layer_counts: &[1],
    elements_around: 8,
    elements_along: 4,
    wall_thickness: 0.45,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 0.75 },
    capped: false,
    parts: &[
        PartSpec {
            term: "medulla oblongata",
            offset: [0.0, 0.0],
            scale: 1.0,
            origin_along: 0.0,
            length: 0.35,
            seam: None,
        },
        PartSpec {
            term: "pons",
            offset: [0.0, 0.0],
            scale: 1.0,
            origin_along: 0.35,
            length: 0.35,
            seam: Some(SeamSpec {
                other_part: 0,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: false,
            }),
        },
        PartSpec {
            term: "midbrain",
            offset: [0.0, 0.0],
            scale: 1.0,
            origin_along: 0.7,
            length: 0.3,
            seam: Some(SeamSpec {
                other_part: 1,
                transverse: true,
                around_self_percent: 0,
                around_other_percent: 0,
                openable: false,
            }),
        },
    ],
    aggregates: &[],
    branches: &[],
    segments: &[],
    layer_terms: None,
    surface_terms: None,
    fields: &[FieldKind::Geometric, FieldKind::Material],
    split_margin: None,
    base_length: 70.0,
    base_radius: 15.0,
    bend: 0.0,
};

const VAGUS_RECIPE: OrganRecipe = OrganRecipe {
    organ_term: "vagus nerve",
    supported_layer_counts: &[1],
    elements_around: 8,
    elements_along: 12,
    wall_thickness: 0.4,
    layer_fractions4: TUBE_LAYER_FRACTIONS,
    shape: ShapeSpec::Ellipse { axis_ratio: 1.0 },
    capped: false,
    parts: &[],
    aggregates: &[],
    branches: &[
        BranchSpec {
            term: "pharyngeal branch of vagus nerve",
            attach_fraction: 0.08,
            direction: [0.8, 0.3, 0.2],
            length_fraction: 0.1,
            radius_fraction: 0.4,
            elements_along: 3,
        },
        BranchSpec {
            term: "superior laryngeal nerve",
            attach_fraction: 0.15,
            direction: [0.7, -0.4, 0.3],
            length_fraction: 0.12,
            radius_fraction: 0.5,
            elements_along: 3,
        },
        BranchSpec {
            term: "recurrent laryngeal nerve",
            attach_fraction: 0.45,
            direction: [0.2, 0.5, -0.8],
            length_fraction: 0.25,
            radius_fraction: 0.5,
            elements_along: 4,
        },
        BranchSpec {
            term: "superior cardiac branch of vagus nerve",
            attach_fraction: 0.55,
            direction: [-0.5, 0.6, 0.4],
            length_fraction: 0.15,
            radius_fraction: 0.35,
            elements_along: 3,
        },
    ],
    segments: &[],
    layer_terms: None,
    surface_terms: None,
    fields: &[
        FieldKind::Geometric,
        FieldKind::Material,
        FieldKind::Straight,
    ],
    split_margin: None,
    base_length: 500.0,
    base_radius: 2.0,
    bend: 0.15,
};

/// The recipe for an organ.
pub fn recipe(organ: Organ) -> &'static OrganRecipe {
    match organ {
        Organ::Bladder => &BLADDER_RECIPE,
        Organ::Brainstem => &BRAINSTEM_RECIPE,
        Organ::Colon => &COLON_RECIPE,
        Organ::Esophagus => &ESOPHAGUS_RECIPE,
        Organ::Heart => &HEART_RECIPE,
        Organ::Lung => &LUNG_RECIPE,
        Organ::SmallIntestine => &SMALL_INTESTINE_RECIPE,
        Organ::Stomach => &STOMACH_RECIPE,
        Organ::Uterus => &UTERUS_RECIPE,
        Organ::VagusNerve => &VAGUS_RECIPE,
    }
}

fn species_scale(species: Species) -> Real {
    match species {
        Species::Human => 1.0,
        Species::Pig => 0.8,
        Species::Sheep => 0.75,
        Species::Rat => 0.12,
        Species::Mouse => 0.06,
    }
}

/// Default parameter set for an organ + species variant.
pub fn default_parameters(organ: Organ, species: Species) -> ParameterSet {
    let recipe = recipe(organ);
    let scale = species_scale(species);
    let layer_count = *recipe.supported_layer_counts.iter().max().unwrap_or(&1);
    let mut params = ParameterSet::new(
        format!("{} {} 1", organ.name(), species.name()),
        organ,
        species,
    );
    params
        .set(
            "elements count around",
            ParamValue::Int(recipe.elements_around as i64),
        )
        .set(
            "elements count along",
            ParamValue::Int(recipe.elements_along as i64),
        )
        .set("wall layer count", ParamValue::Int(layer_count as i64))
        .set("wall thickness", ParamValue::Float(recipe.wall_thickness))
        .set("length", ParamValue::Float(recipe.base_length * scale))
        .set("radius", ParamValue::Float(recipe.base_radius * scale));
    if layer_count == 4 {
        params.set(
            "layer fractions",
            ParamValue::FloatList(recipe.layer_fractions4.to_vec()),
        );
    }
    params
}

// ─────────────────────────── the scaffold ─────────────────────────────────

/// A fully built scaffold: topology, coordinate fields, annotations, and an
/// optional refined overlay. Immutable once built.
#[derive(Debug)]
pub struct Scaffold {
    pub params: ParameterSet,
    pub topology: Topology,
    pub parts_geometry: Vec<PartGeometry>,
    pub fields: BTreeMap<FieldKind, FieldData>,
    pub annotations: AnnotationRegistry,
    pub closure_violations: Vec<ClosureViolation>,
    pub refined: Option<RefinedMesh>,
    state: BuildState,
}

impl Scaffold {
    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn field(&self, kind: FieldKind) -> Option<&FieldData> {
        self.fields.get(&kind)
    }

    pub fn geometric(&self) -> &FieldData {
        self.fields
            .get(&FieldKind::Geometric)
            .expect("every built scaffold has a geometric field")
    }

    /// Build a scaffold from an immutable parameter set, optionally guided
    /// by subject-specific segmentation data (nerve scaffolds).
    pub fn build(
        params: ParameterSet,
        segmentation: Option<&SegmentationInput>,
    ) -> Result<Scaffold> {
        let recipe = recipe(params.organ);
        let mut state = BuildState::Unbuilt;
        let builder = ScaffoldBuilder::prepare(&params, recipe, segmentation)?;

        let (topology, parts_geometry, markers) = builder.build_topology()?;
        state = advance(state, BuildState::TopologyBuilt);

        let fields = builder.synthesize_fields(&topology, &parts_geometry)?;
        state = advance(state, BuildState::FieldsSynthesized);

        let (annotations, violations) =
            builder.assign_annotations(&topology, markers);
        state = advance(state, BuildState::AnnotationsAssigned);

        let mut scaffold = Scaffold {
            params,
            topology,
            parts_geometry,
            fields,
            annotations,
            closure_violations: violations,
            refined: None,
            state,
        };

        if scaffold.params.get_bool("refine", false) {
            let counts = [
                scaffold.params.get_usize("refine count around", 1),
                scaffold.params.get_usize("refine count along", 1),
                scaffold.params.get_usize("refine count through wall", 1),
            ];
            let refined = scaffold.refine(counts)?;
            scaffold.refined = Some(refined);
            scaffold.state = advance(scaffold.state, BuildState::Refined);
        }
        scaffold.state = advance(scaffold.state, BuildState::Ready);
        Ok(scaffold)
    }

    /// Refine uniformly. Side-effect free: returns a derived overlay that
    /// must be discarded whenever this scaffold is rebuilt.
    pub fn refine(&self, counts: [usize; 3]) -> Result<RefinedMesh> {
        refine(
            &self.topology,
            self.geometric(),
            &self.annotations,
            counts,
            None,
        )
    }

    /// Refine with per-part counts; non-uniform counts across a shared
    /// boundary yield a non-conformant (warned, not failed) result.
    pub fn refine_per_part(&self, part_counts: &[[usize; 3]]) -> Result<RefinedMesh> {
        refine(
            &self.topology,
            self.geometric(),
            &self.annotations,
            [1, 1, 1],
            Some(part_counts),
        )
    }

    /// Merge another scaffold onto this one's distal end: the other's first
    /// part starts where this one's first part ends. Junction counts must
    /// agree or the merge fails before any id allocation.
    pub fn merge(&self, other: &Scaffold) -> Result<Scaffold> {
        let a = &self.topology.parts[0];
        let b = &other.topology.parts[0];
        if self.params.species != other.params.species {
            return Err(ScaffoldError::MergeIncompatible(format!(
                "species {} vs {}",
                self.params.species.name(),
                other.params.species.name()
            )));
        }
        if a.around_count != b.around_count || a.wall_count != b.wall_count {
            return Err(ScaffoldError::MergeIncompatible(format!(
                "junction counts {}x{} vs {}x{}",
                a.around_count, a.wall_count, b.around_count, b.wall_count
            )));
        }

        let mut junction: Vec<(NodeIdx, NodeIdx)> = Vec::new();
        for wall in 0..=a.wall_count {
            for around in 0..a.around_count {
                junction.push((
                    b.node(0, wall, around),
                    a.node(a.along_count, wall, around),
                ));
            }
        }
        let (topology, remap) = self.topology.concatenate(&other.topology, &junction);

        // fields defined in both scaffolds carry over; junction nodes keep
        // this scaffold's values
        let mut fields = BTreeMap::new();
        for (kind, field) in &self.fields {
            let Some(other_field) = other.fields.get(kind) else {
                continue;
            };
            let mut merged = FieldData::undefined(*kind, topology.node_count());
            for n in 0..field.node_count() as NodeIdx {
                if let Some(v) = field.value(n) {
                    merged.set(n, *v);
                }
            }
            for n in 0..other_field.node_count() as NodeIdx {
                let target = remap[n as usize];
                if merged.is_defined(target) {
                    continue;
                }
                if let Some(v) = other_field.value(n) {
                    merged.set(target, *v);
                }
            }
            for (&node, &value) in &field.seam_alternates {
                merged.seam_alternates.insert(node, value);
            }
            for (&node, &value) in &other_field.seam_alternates {
                merged
                    .seam_alternates
                    .entry(remap[node as usize])
                    .or_insert(value);
            }
            fields.insert(*kind, merged);
        }

        let element_offset = self.topology.element_count() as ElementIdx;
        let mut annotations = self.annotations.clone();
        for group in other.annotations.groups() {
            let target = annotations.find_or_create(group.term.clone());
            for &e in &group.elements {
                target.elements.insert(e + element_offset);
            }
            for face in &group.faces {
                let mut mapped = [0; 4];
                for (i, &n) in face.iter().enumerate() {
                    mapped[i] = remap[n as usize];
                }
                target.faces.insert(crate::topology::face_key(mapped));
            }
            for &n in &group.nodes {
                target.nodes.insert(remap[n as usize]);
            }
            for marker in &group.markers {
                target.markers.push(MarkerPoint {
                    name: marker.name.clone(),
                    element: marker.element + element_offset,
                    xi: marker.xi,
                });
            }
        }

        let mut parts_geometry = self.parts_geometry.clone();
        parts_geometry.extend(other.parts_geometry.iter().cloned());

        let violations = annotations.validate_closure(&topology);
        Ok(Scaffold {
            params: self.params.clone(),
            topology,
            parts_geometry,
            fields,
            annotations,
            closure_violations: violations,
            refined: None,
            state: BuildState::Ready,
        })
    }
}

fn advance(from: BuildState, to: BuildState) -> BuildState {
    debug_assert!(from < to, "build state may only move forward");
    to
}

// ─────────────────────────── builder internals ────────────────────────────

struct ScaffoldBuilder<'a> {
    params: &'a ParameterSet,
    recipe: &'static OrganRecipe,
    elements_around: usize,
    elements_along: usize,
    layer_count: usize,
    layer_fractions: Vec<Real>,
    wall_thickness: Real,
    length: Real,
    radius: Real,
    open_fissure: bool,
    /// Trunk path override from segmentation input.
    subject_path: Option<CentralPath>,
    subject_branches: Vec<(String, CentralPath, Real)>,
    subject_landmarks: Vec<(String, Real)>,
}

impl<'a> ScaffoldBuilder<'a> {
    fn prepare(
        params: &'a ParameterSet,
        recipe: &'static OrganRecipe,
        segmentation: Option<&SegmentationInput>,
    ) -> Result<ScaffoldBuilder<'a>> {
        let layer_count = params.get_usize("wall layer count", 1);
        if !recipe.supported_layer_counts.contains(&layer_count) {
            return Err(ScaffoldError::Configuration(format!(
                "{}: unsupported wall layer count {layer_count} (supported: {:?})",
                params.organ.name(),
                recipe.supported_layer_counts
            )));
        }
        let layer_fractions = match params.get_float_list("layer fractions") {
            Some(list) if layer_count > 1 => list.to_vec(),
            _ if layer_count == 4 => recipe.layer_fractions4.to_vec(),
            _ => vec![1.0],
        };
        if layer_fractions.len() != layer_count {
            return Err(ScaffoldError::Configuration(format!(
                "{} layer fractions for wall layer count {layer_count}",
                layer_fractions.len()
            )));
        }

        let mut builder = ScaffoldBuilder {
            params,
            recipe,
            elements_around: params.get_usize("elements count around", recipe.elements_around),
            elements_along: params.get_usize("elements count along", recipe.elements_along),
            layer_count,
            layer_fractions,
            wall_thickness: params.get_float("wall thickness", recipe.wall_thickness),
            length: params.get_float("length", recipe.base_length),
            radius: params.get_float("radius", recipe.base_radius),
            open_fissure: params.get_bool("open fissure", false),
            subject_path: None,
            subject_branches: Vec::new(),
            subject_landmarks: Vec::new(),
        };
        if let Some(input) = segmentation {
            builder.prepare_subject(input)?;
        }
        Ok(builder)
    }

    /// Digest segmentation input: trunk path from the digitized contour,
    /// branches from recognized groups, landmark fractions along the trunk.
    fn prepare_subject(&mut self, input: &SegmentationInput) -> Result<()> {
        let validated = input.validate(self.params.organ)?;
        let points = &input.trunk.points;
        let default_radius = self.radius;
        let radius_at = |i: usize| -> Real {
            input.trunk.radii.get(i).copied().unwrap_or(default_radius)
        };
        let mut nodes = Vec::with_capacity(points.len());
        for (i, &x) in points.iter().enumerate() {
            let d1 = if i == 0 {
                points[1] - points[0]
            } else if i == points.len() - 1 {
                points[i] - points[i - 1]
            } else {
                (points[i + 1] - points[i - 1]) * 0.5
            };
            let side = pick_side(d1);
            let d2 = crate::geom::set_magnitude(side, radius_at(i));
            let d3 = crate::geom::set_magnitude(d1.cross(side), radius_at(i));
            nodes.push(PathNode::new(x, d1, d2, d3));
        }
        let mut path = CentralPath::new(nodes)?;
        path.smooth_derivatives();
        path.make_side_derivatives_normal();
        path.smooth_side_cross_derivatives();

        // landmark fractions by nearest trunk point
        for landmark in &validated.recognized_landmarks {
            let mut best = (Real::MAX, 0usize);
            for (i, &p) in points.iter().enumerate() {
                let d = (p - landmark.x).length();
                if d < best.0 {
                    best = (d, i);
                }
            }
            let fraction = best.1 as Real / (points.len() - 1) as Real;
            self.subject_landmarks
                .push((landmark.name.clone(), fraction));
        }

        for branch in &validated.recognized_branches {
            if branch.points.len() < 2 {
                continue;
            }
            let branch_radius = branch.radii.first().copied().unwrap_or(default_radius * 0.5);
            let mut branch_nodes = Vec::with_capacity(branch.points.len());
            for (i, &x) in branch.points.iter().enumerate() {
                let d1 = if i == 0 {
                    branch.points[1] - branch.points[0]
                } else if i == branch.points.len() - 1 {
                    branch.points[i] - branch.points[i - 1]
                } else {
                    (branch.points[i + 1] - branch.points[i - 1]) * 0.5
                };
                let side = pick_side(d1);
                let d2 = crate::geom::set_magnitude(side, branch_radius);
                let d3 = crate::geom::set_magnitude(d1.cross(side), branch_radius);
                branch_nodes.push(PathNode::new(x, d1, d2, d3));
            }
            let mut branch_path = CentralPath::new(branch_nodes)?;
            branch_path.smooth_derivatives();
            branch_path.make_side_derivatives_normal();
            // attachment fraction: nearest trunk point to the branch root
            let root = branch.points[0];
            let mut best = (Real::MAX, 0usize);
            for (i, &p) in points.iter().enumerate() {
                let d = (p - root).length();
                if d < best.0 {
                    best = (d, i);
                }
            }
            let fraction = best.1 as Real / (points.len() - 1) as Real;
            self.subject_branches
                .push((branch.name.clone(), branch_path, fraction));
        }
        self.subject_path = Some(path);
        Ok(())
    }

    fn profile_shape(&self) -> ProfileShape {
        match self.recipe.shape {
            ShapeSpec::Ellipse { axis_ratio } => ProfileShape::Ellipse {
                a: 1.0,
                b: axis_ratio,
            },
            ShapeSpec::Superellipse {
                axis_ratio,
                exponent,
            } => ProfileShape::Superellipse {
                a: 1.0,
                b: axis_ratio,
                exponent,
            },
        }
    }

    fn make_profile(&self) -> Result<CrossSectionProfile> {

        CrossSectionProfile::new(
            self.profile_shape(),
            self.elements_around,
            self.wall_thickness,
            self.layer_fractions.clone(),
            self.recipe.supported_layer_counts,
        )
    }

    /// The default central path: along +z from `origin`, bent laterally by
    /// the recipe's bend fraction (zero bend at both endpoints, so stacked
    /// parts join exactly), derivatives smoothed.
    fn default_path(&self, length: Real, radius: Real, origin: DVec3) -> Result<CentralPath> {
        let elements = 4usize;
        let dz = length / elements as Real;
        let bend = self.recipe.bend * length;
        let mut nodes = Vec::with_capacity(elements + 1);
        for i in 0..=elements {
            let s = i as Real / elements as Real;
            let x = origin
                + DVec3::new(
                    bend * (std::f64::consts::PI * s).sin() * 0.5,
                    0.0,
                    length * s,
                );
            nodes.push(PathNode::new(
                x,
                DVec3::new(0.0, 0.0, dz),
                DVec3::new(radius, 0.0, 0.0),
                DVec3::new(0.0, radius, 0.0),
            ));
        }
        let mut path = CentralPath::new(nodes)?;
        path.smooth_derivatives();
        path.make_side_derivatives_normal();
        path.smooth_side_cross_derivatives();
        Ok(path)
    }

    /// Build the element/node graph plus per-part geometry and any marker
    /// points discovered during construction.
    fn build_topology(
        &self,
    ) -> Result<(Topology, Vec<PartGeometry>, Vec<(String, MarkerPoint)>)> {
        let mut topology = Topology::new();
        let mut parts_geometry: Vec<PartGeometry> = Vec::new();
        let mut markers: Vec<(String, MarkerPoint)> = Vec::new();
        let wall_count = self.layer_count;

        if self.recipe.parts.is_empty() {
            // single trunk part
            let path = match &self.subject_path {
                Some(path) => path.clone(),
                None => self.default_path(self.length, self.radius, DVec3::ZERO)?,
            };
            topology.add_part(
                self.recipe.organ_term,
                self.elements_along,
                wall_count,
                self.elements_around,
                None,
                self.recipe.capped,
            )?;
            parts_geometry.push(PartGeometry {
                path,
                profile: self.make_profile()?,
            });
        } else {
            for spec in self.recipe.parts {
                if !terms::rule_applies(self.params.organ, spec.term, self.params) {
                    continue;
                }
                // seams may reference skipped parts; re-index
                let seam = match spec.seam {
                    None => None,
                    Some(seam_spec) => {
                        let other_term = self.recipe.parts[seam_spec.other_part].term;
                        let Some(other_index) = topology.part_index(other_term) else {
                            return Err(ScaffoldError::Configuration(format!(
                                "part '{}' seams onto absent part '{other_term}'",
                                spec.term
                            )));
                        };
                        let kind = if seam_spec.transverse {
                            SeamKind::Transverse
                        } else {
                            SeamKind::Longitudinal {
                                around_self: percent_to_index(
                                    seam_spec.around_self_percent,
                                    self.elements_around,
                                ),
                                around_other: percent_to_index(
                                    seam_spec.around_other_percent,
                                    self.elements_around,
                                ),
                            }
                        };
                        let open = seam_spec.openable && self.open_fissure;
                        Some((
                            Seam {
                                other_part: other_index,
                                kind,
                            },
                            open,
                        ))
                    }
                };
                topology.add_part(
                    spec.term,
                    self.elements_along,
                    wall_count,
                    self.elements_around,
                    seam,
                    false,
                )?;
                let origin = DVec3::new(
                    spec.offset[0] * self.radius,
                    spec.offset[1] * self.radius,
                    spec.origin_along * self.length,
                );
                parts_geometry.push(PartGeometry {
                    path: self.default_path(
                        self.length * spec.length,
                        self.radius * spec.scale,
                        origin,
                    )?,
                    profile: self.make_profile()?,
                });
            }
        }

        // branches: recipe-driven, gated by the conditional table, or
        // subject-specific from segmentation
        if self.subject_branches.is_empty() {
            for spec in self.recipe.branches {
                if !terms::rule_applies(self.params.organ, spec.term, self.params) {
                    continue;
                }
                self.add_branch(
                    &mut topology,
                    &mut parts_geometry,
                    spec.term,
                    spec.attach_fraction,
                    DVec3::from_array(spec.direction),
                    self.length * spec.length_fraction,
                    self.radius * spec.radius_fraction,
                    spec.elements_along,
                    None,
                )?;
            }
        } else {
            for (name, branch_path, fraction) in &self.subject_branches {
                let radius = branch_path.nodes()[0].d2.length();
                let length = branch_path.length();
                self.add_branch(
                    &mut topology,
                    &mut parts_geometry,
                    name,
                    *fraction,
                    DVec3::new(0.6, 0.4, 0.3),
                    length,
                    radius,
                    4,
                    Some(branch_path.clone()),
                )?;
            }
        }

        // subject landmarks become marker points on the trunk
        for (name, fraction) in &self.subject_landmarks {
            let trunk = &topology.parts[0];
            let (segment, xi) = fraction_to_segment(*fraction, trunk.along_count);
            let element = trunk.element_start
                + ((segment * trunk.wall_count) * trunk.around_count) as u32;
            markers.push((
                name.clone(),
                MarkerPoint {
                    name: name.clone(),
                    element,
                    xi: [0.0, xi, 1.0],
                },
            ));
        }

        Ok((topology, parts_geometry, markers))
    }

    #[allow(clippy::too_many_arguments)]
    fn add_branch(
        &self,
        topology: &mut Topology,
        parts_geometry: &mut Vec<PartGeometry>,
        term: &str,
        attach_fraction: Real,
        direction: DVec3,
        length: Real,
        radius: Real,
        elements_along: usize,
        subject_path: Option<CentralPath>,
    ) -> Result<()> {
        let trunk = &topology.parts[0];
        let trunk_geometry = &parts_geometry[0];
        let (segment, xi_along) = fraction_to_segment(attach_fraction, trunk.along_count);
        // outermost layer, first sector; the attachment lives on the
        // outer surface at xi3 = 1
        let parent_element = trunk.element_start
            + ((segment * trunk.wall_count + (trunk.wall_count - 1)) * trunk.around_count) as u32;
        let attachment = BranchAttachment {
            parent_part: 0,
            parent_element,
            xi: [0.0, xi_along, 1.0],
            direction,
        };

        // geometric branch path: resolved from the trunk's parametric frame
        // at the attachment, the embedding contract
        let path = match subject_path {
            Some(path) => path,
            None => {
                let t = attach_fraction.clamp(0.0, 1.0) * trunk_geometry.path.length();
                let sample = trunk_geometry.path.sample(t)?;
                let d1_hat = sample.d1.normalize_or_zero();
                let d2_hat = sample.d2.normalize_or_zero();
                let d3_hat = sample.d3.normalize_or_zero();
                let axis =
                    (d2_hat * direction.x + d3_hat * direction.y + d1_hat * direction.z)
                        .normalize_or_zero();
                // root the branch on the parent surface in the departure
                // direction
                let origin = sample.x + axis * sample.d2.length();
                let side = crate::geom::reject_from(d1_hat, axis).normalize_or_zero();
                let side = if side == DVec3::ZERO { d2_hat } else { side };
                let n = elements_along.max(1);
                let step = length / n as Real;
                let nodes = (0..=n)
                    .map(|i| {
                        PathNode::new(
                            origin + axis * (step * i as Real),
                            axis * step,
                            side * radius,
                            axis.cross(side) * radius,
                        )
                    })
                    .collect();
                CentralPath::new(nodes)?
            }
        };

        let part = topology.add_part(
            term,
            elements_along,
            self.layer_count,
            self.elements_around,
            None,
            false,
        )?;
        topology.branches.push(BranchRecord {
            name: term.to_string(),
            part,
            attachment,
            length: path.length(),
        });
        parts_geometry.push(PartGeometry {
            path,
            profile: self.make_profile()?,
        });
        Ok(())
    }

    fn synthesize_fields(
        &self,
        topology: &Topology,
        parts_geometry: &[PartGeometry],
    ) -> Result<BTreeMap<FieldKind, FieldData>> {
        let mut fields = BTreeMap::new();
        let geometric = synthesize_geometric(topology, parts_geometry)?;
        for &kind in self.recipe.fields {
            match kind {
                FieldKind::Geometric => {}
                FieldKind::Material => {
                    fields.insert(kind, synthesize_material(topology));
                }
                FieldKind::Flat => {
                    fields.insert(kind, synthesize_flat(topology, &geometric, 0)?);
                }
                FieldKind::Straight => {
                    fields.insert(kind, synthesize_straight(topology, parts_geometry)?);
                }
                FieldKind::Split => {
                    let margin = self.recipe.split_margin.unwrap_or([0, 50]);
                    let margin = [
                        percent_to_index(margin[0], self.elements_around),
                        percent_to_index(margin[1], self.elements_around),
                    ];
                    fields.insert(kind, synthesize_split(topology, &geometric, 0, margin));
                }
            }
        }
        fields.insert(FieldKind::Geometric, geometric);
        Ok(fields)
    }

    fn assign_annotations(
        &self,
        topology: &Topology,
        markers: Vec<(String, MarkerPoint)>,
    ) -> (AnnotationRegistry, Vec<ClosureViolation>) {
        let organ = self.params.organ;
        let mut registry = AnnotationRegistry::new();
        for (a, b) in terms::OVERLAP_ALLOWED {
            registry.allow_overlap(a, b);
        }

        let term_of = |name: &str| -> AnnotationTerm {
            match find_term(organ, name) {
                Some(term) => term.into(),
                None => {
                    log::warn!("term '{name}' missing from {} vocabulary", organ.name());
                    AnnotationTerm {
                        name: name.to_string(),
                        id: None,
                    }
                }
            }
        };

        // whole-organ group
        let all: Vec<ElementIdx> = (0..topology.element_count() as u32).collect();
        registry.add_group(term_of(self.recipe.organ_term), &all);

        // per-part groups for multi-part organs
        if !self.recipe.parts.is_empty() {
            for part in &topology.parts {
                let elements: Vec<ElementIdx> = part.elements().collect();
                registry.add_group(term_of(&part.name), &elements);
            }
        }
        // aggregates union the parts that were actually built
        for (term, part_specs) in self.recipe.aggregates {
            let mut elements = Vec::new();
            for &spec_index in part_specs.iter() {
                let part_term = self.recipe.parts[spec_index].term;
                if let Some(part_index) = topology.part_index(part_term) {
                    elements.extend(topology.parts[part_index].elements());
                }
            }
            if !elements.is_empty() {
                registry.add_group(term_of(term), &elements);
            }
        }

        // branch groups
        for branch in &topology.branches {
            let elements: Vec<ElementIdx> = topology.parts[branch.part].elements().collect();
            registry.add_group(term_of(&branch.name), &elements);
        }

        // longitudinal segments of the trunk: consecutive half-open ranges
        // of path segments, rounded once so regions never overlap
        let trunk = &topology.parts[0];
        let mut start = 0usize;
        for &(term, end_percent) in self.recipe.segments {
            let end = ((trunk.along_count * end_percent as usize) + 50) / 100;
            let end = end.clamp(start + 1, trunk.along_count);
            let elements: Vec<ElementIdx> = trunk
                .elements()
                .filter(|&e| {
                    let segment = topology.elements[e as usize].origin.segment;
                    segment >= start && segment < end
                })
                .collect();
            if !elements.is_empty() {
                registry.add_group(term_of(term), &elements);
            }
            start = end;
        }

        // through-wall layer groups, plus the combined muscularis
        if self.layer_count == 4 {
            if let Some(layer_terms) = &self.recipe.layer_terms {
                for (layer, term) in layer_terms.layers.iter().enumerate() {
                    let elements: Vec<ElementIdx> = element_filter(topology, |origin| {
                        origin.layer == layer
                    });
                    registry.add_group(term_of(term), &elements);
                }
                let muscle: Vec<ElementIdx> = element_filter(topology, |origin| {
                    origin.layer == 2 || origin.layer == 3
                });
                registry.add_group(term_of(layer_terms.combined_muscle), &muscle);
            }
        }

        // serosa / luminal surfaces of the trunk
        if let Some(surfaces) = &self.recipe.surface_terms {
            let serosa = registry.find_or_create(term_of(surfaces.serosa));
            for e in trunk.elements() {
                let element = &topology.elements[e as usize];
                if element.shape != crate::topology::ElementShape::Hexahedron {
                    continue;
                }
                if element.origin.layer == trunk.wall_count - 1 {
                    serosa.faces.insert(outer_face(element));
                }
            }
            let luminal = registry.find_or_create(term_of(surfaces.luminal));
            for e in trunk.elements() {
                let element = &topology.elements[e as usize];
                if element.shape != crate::topology::ElementShape::Hexahedron {
                    continue;
                }
                if element.origin.layer == 0 {
                    luminal.faces.insert(inner_face(element));
                }
            }
        }

        // table-driven conditional overlays
        for rule in terms::GROUP_RULES {
            if rule.organ != organ
                || !terms::rule_applies(organ, rule.term, self.params)
            {
                continue;
            }
            match rule.selector {
                // structural selectors were handled by part/branch creation
                EntitySelector::Part | EntitySelector::Branch => {}
                EntitySelector::OuterLayerStrip {
                    sector_fraction_percent,
                } => {
                    let sector =
                        percent_to_index(sector_fraction_percent, trunk.around_count);
                    let elements: Vec<ElementIdx> = trunk
                        .elements()
                        .filter(|&e| {
                            let origin = &topology.elements[e as usize].origin;
                            origin.layer == trunk.wall_count - 1 && origin.sector == sector
                        })
                        .collect();
                    registry.add_group(term_of(rule.term), &elements);
                }
                EntitySelector::TransverseRing {
                    along_fraction_percent,
                } => {
                    let (segment, _) = fraction_to_segment(
                        along_fraction_percent as Real / 100.0,
                        trunk.along_count,
                    );
                    let elements: Vec<ElementIdx> = trunk
                        .elements()
                        .filter(|&e| topology.elements[e as usize].origin.segment == segment)
                        .collect();
                    registry.add_group(term_of(rule.term), &elements);
                }
            }
        }

        // fissure surfaces and the apex marker
        if organ == Organ::Lung {
            self.add_fissure_groups(topology, &mut registry);
            if let Some(part) = topology.part_index("upper lobe of left lung") {
                let grid = &topology.parts[part];
                let apex_element = grid.element_start
                    + (((grid.along_count - 1) * grid.wall_count) * grid.around_count) as u32;
                registry
                    .find_or_create(term_of("apex of left lung"))
                    .markers
                    .push(MarkerPoint {
                        name: "apex of left lung".to_string(),
                        element: apex_element,
                        xi: [0.0, 1.0, 1.0],
                    });
            }
        }
        if organ == Organ::Heart {
            self.add_septum_group(topology, &mut registry);
            self.add_atrial_surfaces(topology, &mut registry);
        }

        // marker points from the build (subject landmarks); level markers
        // bind to the landmark vocabulary, not the organ's structure terms
        for (name, marker) in markers {
            let term = terms::VAGUS_LEVEL_TERMS
                .iter()
                .find(|t| t.name == name)
                .map(AnnotationTerm::from)
                .unwrap_or_else(|| term_of(&name));
            registry.find_or_create(term).markers.push(marker);
        }

        let violations = registry.validate_closure(topology);
        (registry, violations)
    }

    /// Fissure surfaces: the start-ring faces of the upper lobe of each
    /// fissure pair. With the fissure open these faces belong only to the
    /// duplicated side.
    fn add_fissure_groups(&self, topology: &Topology, registry: &mut AnnotationRegistry) {
        let fissure_terms: &[(&str, &str)] = &[
            ("upper lobe of left lung", "oblique fissure of left lung"),
            ("middle lobe of right lung", "oblique fissure of right lung"),
            ("upper lobe of right lung", "horizontal fissure of right lung"),
        ];
        for &(upper_part, fissure_term) in fissure_terms {
            let Some(part) = topology.part_index(upper_part) else {
                continue;
            };
            let grid = &topology.parts[part];
            let term = match find_term(self.params.organ, fissure_term) {
                Some(t) => t.into(),
                None => continue,
            };
            let group = registry.find_or_create(term);
            for wall in 0..grid.wall_count {
                for around in 0..grid.around_count {
                    group.faces.insert(crate::topology::face_key([
                        grid.node(0, wall, around),
                        grid.node(0, wall, around + 1),
                        grid.node(0, wall + 1, around),
                        grid.node(0, wall + 1, around + 1),
                    ]));
                }
            }
        }
    }

    /// The interventricular septum: the angular strip of left ventricle
    /// wall facing the right ventricle.
    fn add_septum_group(&self, topology: &Topology, registry: &mut AnnotationRegistry) {
        let Some(lv) = topology.part_index("left ventricle myocardium") else {
            return;
        };
        let Some(term) = find_term(self.params.organ, "interventricular septum") else {
            return;
        };
        let grid = &topology.parts[lv];
        let half = grid.around_count / 2;
        let facing = [(half + grid.around_count - 1) % grid.around_count, half];
        let elements: Vec<ElementIdx> = grid
            .elements()
            .filter(|&e| {
                let origin = &topology.elements[e as usize].origin;
                facing.contains(&origin.sector)
            })
            .collect();
        registry.add_group(term.into(), &elements);
    }

    /// Atrial luminal surfaces; their distal rings legitimately overlap the
    /// adjoining vessel groups.
    fn add_atrial_surfaces(&self, topology: &Topology, registry: &mut AnnotationRegistry) {
        let pairs: &[(&str, &str, &str)] = &[
            (
                "left atrium myocardium",
                "luminal surface of left atrium",
                "pulmonary vein",
            ),
            (
                "right atrium myocardium",
                "luminal surface of right atrium",
                "superior vena cava",
            ),
        ];
        for &(part_term, luminal_term, vessel_term) in pairs {
            let Some(part) = topology.part_index(part_term) else {
                continue;
            };
            let grid = &topology.parts[part];
            let mut luminal_faces: Vec<FaceKey> = Vec::new();
            for e in grid.elements() {
                let element = &topology.elements[e as usize];
                if element.origin.layer == 0 {
                    luminal_faces.push(inner_face(element));
                }
            }
            if let Some(term) = find_term(self.params.organ, luminal_term) {
                let group = registry.find_or_create(term.into());
                group.faces.extend(luminal_faces.iter().copied());
            }
            // the vessel group: the luminal faces of the distal ring
            if let Some(term) = find_term(self.params.organ, vessel_term) {
                let group = registry.find_or_create(term.into());
                for e in grid.elements() {
                    let element = &topology.elements[e as usize];
                    if element.origin.layer == 0
                        && element.origin.segment == grid.along_count - 1
                    {
                        group.faces.insert(inner_face(element));
                    }
                }
            }
        }
    }
}

fn element_filter(
    topology: &Topology,
    mut predicate: impl FnMut(&crate::topology::ElementOrigin) -> bool,
) -> Vec<ElementIdx> {
    topology
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| predicate(&e.origin))
        .map(|(i, _)| i as ElementIdx)
        .collect()
}

/// The element's xi3 = 0 face (innermost wall surface).
fn inner_face(element: &crate::topology::Element) -> FaceKey {
    let n = &element.nodes;
    crate::topology::face_key([n[0], n[1], n[2], n[3]])
}

/// The element's xi3 = 1 face (outermost wall surface).
fn outer_face(element: &crate::topology::Element) -> FaceKey {
    let n = &element.nodes;
    crate::topology::face_key([n[4], n[5], n[6], n[7]])
}

fn percent_to_index(percent: u8, count: usize) -> usize {
    ((percent as usize * count) / 100) % count
}

/// Map a fraction along the trunk to (element segment, xi within it).
fn fraction_to_segment(fraction: Real, along_count: usize) -> (usize, Real) {
    let scaled = fraction.clamp(0.0, 1.0) * along_count as Real;
    let segment = (scaled as usize).min(along_count - 1);
    (segment, scaled - segment as Real)
}

fn pick_side(d1: DVec3) -> DVec3 {
    let axis = if d1.x.abs() < 0.9 * d1.length() {
        DVec3::X
    } else {
        DVec3::Y
    };
    crate::geom::reject_from(axis, d1).normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_to_segment_covers_range() {
        assert_eq!(fraction_to_segment(0.0, 4), (0, 0.0));
        let (segment, xi) = fraction_to_segment(0.5, 4);
        assert_eq!(segment, 2);
        assert!(xi.abs() < 1e-12);
        let (segment, xi) = fraction_to_segment(1.0, 4);
        assert_eq!(segment, 3);
        assert!((xi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn percent_to_index_wraps() {
        assert_eq!(percent_to_index(0, 8), 0);
        assert_eq!(percent_to_index(50, 8), 4);
        assert_eq!(percent_to_index(100, 8), 0);
    }

    #[test]
    fn every_recipe_term_is_in_vocabulary() {
        for organ in Organ::ALL {
            let recipe = recipe(organ);
            let mut names: Vec<&str> = vec![recipe.organ_term];
            names.extend(recipe.parts.iter().map(|p| p.term));
            names.extend(recipe.branches.iter().map(|b| b.term));
            names.extend(recipe.segments.iter().map(|(t, _)| *t));
            names.extend(recipe.aggregates.iter().map(|(t, _)| *t));
            if let Some(layers) = &recipe.layer_terms {
                names.extend(layers.layers.iter().copied());
                names.push(layers.combined_muscle);
            }
            if let Some(surfaces) = &recipe.surface_terms {
                names.push(surfaces.serosa);
                names.push(surfaces.luminal);
            }
            for name in names {
                assert!(
                    find_term(organ, name).is_some(),
                    "{:?} recipe term '{name}' missing from vocabulary",
                    organ
                );
            }
        }
    }

    #[test]
    fn default_build_reaches_ready() {
        let params = default_parameters(Organ::Colon, Species::Human);
        let scaffold = Scaffold::build(params, None).unwrap();
        assert_eq!(scaffold.state(), BuildState::Ready);
        assert!(scaffold.field(FieldKind::Geometric).is_some());
        assert!(scaffold.field(FieldKind::Material).is_some());
    }

    #[test]
    fn unsupported_layer_count_aborts_before_build() {
        let params = default_parameters(Organ::Colon, Species::Human)
            .with("wall layer count", ParamValue::Int(3));
        assert!(matches!(
            Scaffold::build(params, None),
            Err(ScaffoldError::Configuration(_))
        ));
    }

    #[test]
    fn param_driven_refinement_populates_overlay() {
        let params = default_parameters(Organ::Brainstem, Species::Human)
            .with("refine", ParamValue::Bool(true))
            .with("refine count around", ParamValue::Int(2))
            .with("refine count along", ParamValue::Int(2))
            .with("refine count through wall", ParamValue::Int(2));
        let scaffold = Scaffold::build(params, None).unwrap();
        let refined = scaffold.refined.as_ref().unwrap();
        assert_eq!(
            refined.topology.element_count(),
            scaffold.topology.element_count() * 8
        );
    }
}
