// Copyright 2025 Lars Brubaker
// License: MIT
//
// Controlled anatomical vocabulary and the static species-conditional
// annotation tables.
//
// Convention per term: preferred name, then preferred ontology id
// (UBERON/ILX/FMA) where one exists. Per-species inclusion is table data,
// not builder branching: the topology builder asks this module which volume
// region groups apply to an (organ, species, options) combination.

use crate::params::{Organ, ParameterSet, Species};

/// One controlled-vocabulary term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Term {
    pub name: &'static str,
    pub id: Option<&'static str>,
}

macro_rules! term {
    ($name:literal) => {
        Term {
            name: $name,
            id: None,
        }
    };
    ($name:literal, $id:literal) => {
        Term {
            name: $name,
            id: Some($id),
        }
    };
}

pub const BLADDER_TERMS: &[Term] = &[
    term!("urinary bladder", "UBERON:0001255"),
    term!("neck of urinary bladder", "UBERON:0001258"),
    term!("dome of the bladder", "ILX:0738433"),
    term!("left ureter", "UBERON:0001223"),
    term!("right ureter", "UBERON:0001222"),
    term!("lumen of urinary bladder", "ILX:0793722"),
    term!("serosa of urinary bladder", "ILX:0793699"),
];

pub const BRAINSTEM_TERMS: &[Term] = &[
    term!("brainstem", "UBERON:0002298"),
    term!("medulla oblongata", "UBERON:0001896"),
    term!("pons", "UBERON:0000988"),
    term!("midbrain", "UBERON:0001891"),
];

pub const COLON_TERMS: &[Term] = &[
    term!("colon", "UBERON:0001155"),
    term!("mucosa of colon", "UBERON:0000346"),
    term!("submucosa of colon", "UBERON:0003331"),
    term!("circular muscle layer of colon", "ILX:0772428"),
    term!("longitudinal muscle layer of colon", "ILX:0775554"),
    term!("muscularis externa of colon", "ILX:0793088"),
    term!("serosa of colon", "UBERON:0003335"),
    term!("luminal surface of colon", "ILX:0793083"),
    term!("taenia coli", "UBERON:0012419"),
    term!("mesenteric zone"),
    term!("non-mesenteric zone"),
];

pub const ESOPHAGUS_TERMS: &[Term] = &[
    term!("esophagus", "UBERON:0001043"),
    term!("cervical part of esophagus", "UBERON:0035450"),
    term!("thoracic part of esophagus", "UBERON:0035216"),
    term!("abdominal part of esophagus", "UBERON:0035177"),
    term!("esophagus mucosa", "UBERON:0002469"),
    term!("submucosa of esophagus", "UBERON:0001972"),
    term!("esophagus smooth muscle circular layer", "UBERON:0009960"),
    term!("esophagus smooth muscle longitudinal layer", "UBERON:0009961"),
    term!("muscularis externa of esophagus", "ILX:0793086"),
    term!("serosa of esophagus", "UBERON:0001975"),
    term!("luminal surface of esophagus", "ILX:0793122"),
];

pub const HEART_TERMS: &[Term] = &[
    term!("heart", "UBERON:0000948"),
    term!("heart left ventricle", "UBERON:0002084"),
    term!("heart right ventricle", "UBERON:0002080"),
    term!("left ventricle myocardium", "UBERON:0006566"),
    term!("right ventricle myocardium", "UBERON:0006567"),
    term!("interventricular septum", "UBERON:0002094"),
    term!("left atrium myocardium", "UBERON:0003379"),
    term!("right atrium myocardium", "UBERON:0003378"),
    term!("luminal surface of left atrium", "ILX:0793535"),
    term!("luminal surface of right atrium", "ILX:0793536"),
    term!("pulmonary vein", "UBERON:0002016"),
    term!("superior vena cava", "UBERON:0001585"),
    term!("endocardium of left ventricle", "UBERON:0009713"),
    term!("endocardium of right ventricle", "UBERON:0009712"),
];

pub const LUNG_TERMS: &[Term] = &[
    term!("lung", "UBERON:0002048"),
    term!("left lung", "UBERON:0002168"),
    term!("right lung", "UBERON:0002167"),
    term!("upper lobe of left lung", "UBERON:0008952"),
    term!("lower lobe of left lung", "UBERON:0008953"),
    term!("upper lobe of right lung", "UBERON:0002170"),
    term!("middle lobe of right lung", "UBERON:0002174"),
    term!("lower lobe of right lung", "UBERON:0002171"),
    term!("right lung accessory lobe", "UBERON:0004890"),
    term!("oblique fissure of left lung", "UBERON:0008944"),
    term!("oblique fissure of right lung", "UBERON:0005471"),
    term!("horizontal fissure of right lung", "ILX:0746327"),
    term!("apex of left lung", "ILX:0778112"),
    term!("apex of right lung", "ILX:0778113"),
];

pub const SMALL_INTESTINE_TERMS: &[Term] = &[
    term!("small intestine", "UBERON:0002108"),
    term!("duodenum", "UBERON:0002114"),
    term!("jejunum", "UBERON:0002115"),
    term!("ileum", "UBERON:0002116"),
    term!("mucosa of small intestine", "UBERON:0001204"),
    term!("submucosa of small intestine", "UBERON:0001205"),
    term!("circular muscle layer of small intestine", "ILX:0772669"),
    term!("longitudinal muscle layer of small intestine", "ILX:0772125"),
    term!("muscularis externa of small intestine", "ILX:0793092"),
    term!("serosa of small intestine", "UBERON:0001206"),
    term!("luminal surface of duodenum", "ILX:0793121"),
];

pub const STOMACH_TERMS: &[Term] = &[
    term!("stomach", "UBERON:0000945"),
    term!("fundus of stomach", "UBERON:0001160"),
    term!("body of stomach", "UBERON:0001161"),
    term!("pyloric antrum", "UBERON:0001165"),
    term!("pylorus", "UBERON:0001166"),
    term!("cardia of stomach", "UBERON:0001162"),
    term!("forestomach-glandular stomach junction", "UBERON:0012270"),
    term!("mucosa of stomach", "UBERON:0001199"),
    term!("submucosa of stomach", "UBERON:0001200"),
    term!("circular muscle layer of stomach", "ILX:0774731"),
    term!("longitudinal muscle layer of stomach", "ILX:0772619"),
    term!("muscularis externa of stomach", "ILX:0793087"),
    term!("serosa of stomach", "UBERON:0001201"),
    term!("luminal surface of stomach", "ILX:0793123"),
];

pub const UTERUS_TERMS: &[Term] = &[
    term!("uterus", "UBERON:0000995"),
    term!("body of uterus", "UBERON:0009853"),
    term!("uterine cervix", "UBERON:0000002"),
    term!("fundus of uterus", "ILX:0743898"),
    term!("left uterine horn", "UBERON:0009020"),
    term!("right uterine horn", "UBERON:0009022"),
    term!("myometrium", "UBERON:0001296"),
    term!("endometrium", "UBERON:0001295"),
    term!("serosa of uterus", "UBERON:0001297"),
    term!("uterine wall", "UBERON:0000459"),
    term!("uterine lumen", "UBERON:0013769"),
];

pub const VAGUS_TERMS: &[Term] = &[
    term!("vagus nerve", "UBERON:0001759"),
    term!("left vagus nerve", "ILX:0785628"),
    term!("right vagus nerve", "ILX:0789705"),
    term!("superior laryngeal nerve", "UBERON:0011326"),
    term!("recurrent laryngeal nerve", "UBERON:0011767"),
    term!("pharyngeal branch of vagus nerve", "UBERON:0000929"),
    term!("superior cardiac branch of vagus nerve", "ILX:0794853"),
    term!("vagus fascicle", "ILX:0794941"),
    term!("epineurium", "UBERON:0000124"),
    term!("perineurium", "UBERON:0000122"),
];

/// Recognized landmark level markers for subject-specific vagus builds.
pub const VAGUS_LEVEL_TERMS: &[Term] = &[
    term!(
        "level of superior border of jugular foramen on the vagus nerve",
        "ILX:0794617"
    ),
    term!(
        "level of inferior border of jugular foramen on the vagus nerve",
        "ILX:0794620"
    ),
    term!(
        "level of inferior border of cranium on the vagus nerve",
        "ILX:0794623"
    ),
    term!("level of C1 transverse process on the vagus nerve", "ILX:0794626"),
    term!("level of greater horn of hyoid on the vagus nerve", "ILX:0794629"),
    term!("level of laryngeal prominence on the vagus nerve", "ILX:0794632"),
    term!("level of carotid bifurcation on the vagus nerve", "ILX:0794638"),
    term!("level of superior border of the clavicle on the vagus nerve", "ILX:0794641"),
    term!("level of jugular notch on the vagus nerve", "ILX:0794644"),
    term!("level of sternal angle on the vagus nerve", "ILX:0794647"),
    term!("level of esophageal hiatus on the vagus nerve", "ILX:0794653"),
    term!("level of aortic hiatus on the vagus nerve", "ILX:0794656"),
];

/// The eight-direction orientation vocabulary for segmentation inputs.
pub const ORIENTATION_DIRECTIONS: &[&str] = &[
    "orientation anterior",
    "orientation posterior",
    "orientation left",
    "orientation right",
    "orientation left anterior",
    "orientation right anterior",
    "orientation left posterior",
    "orientation right posterior",
];

/// All term tables by organ.
pub fn organ_terms(organ: Organ) -> &'static [Term] {
    match organ {
        Organ::Bladder => BLADDER_TERMS,
        Organ::Brainstem => BRAINSTEM_TERMS,
        Organ::Colon => COLON_TERMS,
        Organ::Esophagus => ESOPHAGUS_TERMS,
        Organ::Heart => HEART_TERMS,
        Organ::Lung => LUNG_TERMS,
        Organ::SmallIntestine => SMALL_INTESTINE_TERMS,
        Organ::Stomach => STOMACH_TERMS,
        Organ::Uterus => UTERUS_TERMS,
        Organ::VagusNerve => VAGUS_TERMS,
    }
}

/// Find a term by name within an organ's vocabulary.
pub fn find_term(organ: Organ, name: &str) -> Option<&'static Term> {
    organ_terms(organ).iter().find(|t| t.name == name)
}

/// How a conditional group's entities materialize in the built topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntitySelector {
    /// Elements of the dedicated part built for this term.
    Part,
    /// Elements of the dedicated branch built for this term.
    Branch,
    /// A strip of outermost-layer elements at one angular position.
    OuterLayerStrip { sector_fraction_percent: u8 },
    /// One transverse ring of elements at a fraction along the organ.
    TransverseRing { along_fraction_percent: u8 },
}

/// One row of the species-conditional volume-region table: a group applies
/// when the species matches and the gating boolean option (if any) is set.
/// The builder consults this table both for structural decisions (whether a
/// conditional part or branch is built at all) and for overlay groups.
#[derive(Clone, Copy, Debug)]
pub struct GroupRule {
    pub organ: Organ,
    pub term: &'static str,
    /// Species for which this group exists; empty slice means every species.
    pub species: &'static [Species],
    /// Boolean parameter that must be true for the group to exist.
    pub requires_flag: Option<&'static str>,
    pub selector: EntitySelector,
}

const RODENTS: &[Species] = &[Species::Mouse, Species::Rat];
const NON_HUMAN: &[Species] = &[Species::Mouse, Species::Pig, Species::Rat, Species::Sheep];
const TAENIA_SPECIES: &[Species] = &[Species::Human, Species::Pig];

/// Species-conditional volume-region groups beyond the common per-organ set.
/// Common groups (whole organ, longitudinal segments, wall layers, lobes,
/// branches) come from the organ recipe; this table holds the variations.
pub const GROUP_RULES: &[GroupRule] = &[
    GroupRule {
        organ: Organ::Colon,
        term: "taenia coli",
        species: TAENIA_SPECIES,
        requires_flag: None,
        selector: EntitySelector::OuterLayerStrip {
            sector_fraction_percent: 0,
        },
    },
    GroupRule {
        organ: Organ::Lung,
        term: "right lung accessory lobe",
        species: NON_HUMAN,
        requires_flag: None,
        selector: EntitySelector::Part,
    },
    GroupRule {
        organ: Organ::Stomach,
        term: "forestomach-glandular stomach junction",
        species: RODENTS,
        requires_flag: None,
        selector: EntitySelector::TransverseRing {
            along_fraction_percent: 40,
        },
    },
    GroupRule {
        organ: Organ::Uterus,
        term: "left uterine horn",
        species: NON_HUMAN,
        requires_flag: None,
        selector: EntitySelector::Branch,
    },
    GroupRule {
        organ: Organ::Uterus,
        term: "right uterine horn",
        species: NON_HUMAN,
        requires_flag: None,
        selector: EntitySelector::Branch,
    },
    GroupRule {
        organ: Organ::Uterus,
        term: "fundus of uterus",
        species: &[Species::Human],
        requires_flag: None,
        selector: EntitySelector::TransverseRing {
            along_fraction_percent: 95,
        },
    },
    GroupRule {
        organ: Organ::Bladder,
        term: "left ureter",
        species: &[],
        requires_flag: Some("include ureters"),
        selector: EntitySelector::Branch,
    },
    GroupRule {
        organ: Organ::Bladder,
        term: "right ureter",
        species: &[],
        requires_flag: Some("include ureters"),
        selector: EntitySelector::Branch,
    },
];

/// The rule for one (organ, term), if the table has one.
pub fn rule_for(organ: Organ, term: &str) -> Option<&'static GroupRule> {
    GROUP_RULES
        .iter()
        .find(|rule| rule.organ == organ && rule.term == term)
}

/// True when the rule (if any) for this term admits the parameter set's
/// species and options; terms without a rule are unconditional.
pub fn rule_applies(organ: Organ, term: &str, params: &ParameterSet) -> bool {
    match rule_for(organ, term) {
        None => true,
        Some(rule) => {
            (rule.species.is_empty() || rule.species.contains(&params.species))
                && match rule.requires_flag {
                    Some(flag) => params.get_bool(flag, false),
                    None => true,
                }
        }
    }
}

/// Conditional groups applying to one (organ, species, options) combination.
pub fn conditional_groups(params: &ParameterSet) -> Vec<&'static Term> {
    GROUP_RULES
        .iter()
        .filter(|rule| rule.organ == params.organ)
        .filter(|rule| rule.species.is_empty() || rule.species.contains(&params.species))
        .filter(|rule| match rule.requires_flag {
            Some(flag) => params.get_bool(flag, false),
            None => true,
        })
        .filter_map(|rule| find_term(rule.organ, rule.term))
        .collect()
}

/// Group pairs whose 2-D members may legitimately overlap: atrial luminal
/// surfaces meet the adjoining vessel groups.
pub const OVERLAP_ALLOWED: &[(&str, &str)] = &[
    ("luminal surface of left atrium", "pulmonary vein"),
    ("luminal surface of right atrium", "superior vena cava"),
];
