//! Anatomical structure identifiers used by brain-model and parcel axes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CiftiError;

const CIFTI_PREFIX: &str = "CIFTI_STRUCTURE_";

/// Anatomical structure a surface or voxel model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Structure {
    CortexLeft,
    CortexRight,
    Cerebellum,
    AccumbensLeft,
    AccumbensRight,
    All,
    AllGreyMatter,
    AllWhiteMatter,
    AmygdalaLeft,
    AmygdalaRight,
    BrainStem,
    CaudateLeft,
    CaudateRight,
    CerebellarWhiteMatterLeft,
    CerebellarWhiteMatterRight,
    CerebellumLeft,
    CerebellumRight,
    CerebralWhiteMatterLeft,
    CerebralWhiteMatterRight,
    Cortex,
    DiencephalonVentralLeft,
    DiencephalonVentralRight,
    HippocampusLeft,
    HippocampusRight,
    Invalid,
    Other,
    OtherGreyMatter,
    OtherWhiteMatter,
    PallidumLeft,
    PallidumRight,
    PutamenLeft,
    PutamenRight,
    SubcorticalWhiteMatterLeft,
    SubcorticalWhiteMatterRight,
    ThalamusLeft,
    ThalamusRight,
}

impl Structure {
    pub const ALL: [Structure; 36] = [
        Structure::CortexLeft,
        Structure::CortexRight,
        Structure::Cerebellum,
        Structure::AccumbensLeft,
        Structure::AccumbensRight,
        Structure::All,
        Structure::AllGreyMatter,
        Structure::AllWhiteMatter,
        Structure::AmygdalaLeft,
        Structure::AmygdalaRight,
        Structure::BrainStem,
        Structure::CaudateLeft,
        Structure::CaudateRight,
        Structure::CerebellarWhiteMatterLeft,
        Structure::CerebellarWhiteMatterRight,
        Structure::CerebellumLeft,
        Structure::CerebellumRight,
        Structure::CerebralWhiteMatterLeft,
        Structure::CerebralWhiteMatterRight,
        Structure::Cortex,
        Structure::DiencephalonVentralLeft,
        Structure::DiencephalonVentralRight,
        Structure::HippocampusLeft,
        Structure::HippocampusRight,
        Structure::Invalid,
        Structure::Other,
        Structure::OtherGreyMatter,
        Structure::OtherWhiteMatter,
        Structure::PallidumLeft,
        Structure::PallidumRight,
        Structure::PutamenLeft,
        Structure::PutamenRight,
        Structure::SubcorticalWhiteMatterLeft,
        Structure::SubcorticalWhiteMatterRight,
        Structure::ThalamusLeft,
        Structure::ThalamusRight,
    ];

    /// Short name, e.g. `CORTEX_LEFT`.
    pub fn name(self) -> &'static str {
        match self {
            Structure::CortexLeft => "CORTEX_LEFT",
            Structure::CortexRight => "CORTEX_RIGHT",
            Structure::Cerebellum => "CEREBELLUM",
            Structure::AccumbensLeft => "ACCUMBENS_LEFT",
            Structure::AccumbensRight => "ACCUMBENS_RIGHT",
            Structure::All => "ALL",
            Structure::AllGreyMatter => "ALL_GREY_MATTER",
            Structure::AllWhiteMatter => "ALL_WHITE_MATTER",
            Structure::AmygdalaLeft => "AMYGDALA_LEFT",
            Structure::AmygdalaRight => "AMYGDALA_RIGHT",
            Structure::BrainStem => "BRAIN_STEM",
            Structure::CaudateLeft => "CAUDATE_LEFT",
            Structure::CaudateRight => "CAUDATE_RIGHT",
            Structure::CerebellarWhiteMatterLeft => "CEREBELLAR_WHITE_MATTER_LEFT",
            Structure::CerebellarWhiteMatterRight => "CEREBELLAR_WHITE_MATTER_RIGHT",
            Structure::CerebellumLeft => "CEREBELLUM_LEFT",
            Structure::CerebellumRight => "CEREBELLUM_RIGHT",
            Structure::CerebralWhiteMatterLeft => "CEREBRAL_WHITE_MATTER_LEFT",
            Structure::CerebralWhiteMatterRight => "CEREBRAL_WHITE_MATTER_RIGHT",
            Structure::Cortex => "CORTEX",
            Structure::DiencephalonVentralLeft => "DIENCEPHALON_VENTRAL_LEFT",
            Structure::DiencephalonVentralRight => "DIENCEPHALON_VENTRAL_RIGHT",
            Structure::HippocampusLeft => "HIPPOCAMPUS_LEFT",
            Structure::HippocampusRight => "HIPPOCAMPUS_RIGHT",
            Structure::Invalid => "INVALID",
            Structure::Other => "OTHER",
            Structure::OtherGreyMatter => "OTHER_GREY_MATTER",
            Structure::OtherWhiteMatter => "OTHER_WHITE_MATTER",
            Structure::PallidumLeft => "PALLIDUM_LEFT",
            Structure::PallidumRight => "PALLIDUM_RIGHT",
            Structure::PutamenLeft => "PUTAMEN_LEFT",
            Structure::PutamenRight => "PUTAMEN_RIGHT",
            Structure::SubcorticalWhiteMatterLeft => "SUBCORTICAL_WHITE_MATTER_LEFT",
            Structure::SubcorticalWhiteMatterRight => "SUBCORTICAL_WHITE_MATTER_RIGHT",
            Structure::ThalamusLeft => "THALAMUS_LEFT",
            Structure::ThalamusRight => "THALAMUS_RIGHT",
        }
    }

    /// Name as it appears in CIFTI headers, e.g. `CIFTI_STRUCTURE_CORTEX_LEFT`.
    pub fn cifti_name(self) -> String {
        format!("{}{}", CIFTI_PREFIX, self.name())
    }

    /// Parse either the short or the `CIFTI_STRUCTURE_` prefixed name.
    pub fn from_name(name: &str) -> Option<Structure> {
        let short = name.strip_prefix(CIFTI_PREFIX).unwrap_or(name);
        Structure::ALL.iter().copied().find(|s| s.name() == short)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Structure {
    type Err = CiftiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Structure::from_name(s).ok_or_else(|| CiftiError::UnsupportedStructure(s.to_string()))
    }
}
