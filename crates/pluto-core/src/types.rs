//! Run parameters and the deterministic names derived from them.
//!
//! Every table, feature class and published workspace name the pipeline
//! creates is built here, from the release, the variant and the run date.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};

use crate::error::{ConfigError, Result};

/// Working workspace holding the typed table and the water-included parcels.
pub const WATER_WORKSPACE: &str = "MapPLUTO_WaterArea.gdb";
/// Working workspace holding the shoreline-clipped parcels.
pub const CLIP_WORKSPACE: &str = "MapPLUTO_ShorelineClip.gdb";
/// All-text staging table.
pub const STAGING_TABLE: &str = "MapPLUTO_intermediary";
/// Typed table.
pub const TYPED_TABLE: &str = "MapPLUTO_final";
/// Rows that cannot be mapped to a parcel polygon.
pub const UNMAPPABLES: &str = "UNMAPPABLES";
/// Index on the water-included key.
pub const WATER_INDEX: &str = "BBL_Water";
/// Index on the shoreline-clipped key.
pub const SHORE_INDEX: &str = "BBL_Shore";
/// Published name of the unmappable table next to the clipped parcels.
pub const NOT_MAPPED_LOTS: &str = "NOT_MAPPED_LOTS";
/// Published name of the unmappable table next to the water-included parcels.
pub const NOT_MAPPED_LOTS_UNCLIPPED: &str = "NOT_MAPPED_LOTS_UNCLIPPED";

const DATE_FORMAT: &str = "%m_%d_%Y";

/// Which release workflow is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseVariant {
    /// Original export, embedded schema unless a schema path is configured
    Original,
    /// Export carrying the correction flag field, schema from file
    Corrected,
}

impl ReleaseVariant {
    /// Label embedded in published names (`Original` / `Corrected`).
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ReleaseVariant::Original => "Original",
            ReleaseVariant::Corrected => "Corrected",
        }
    }

    /// Output directory under `<x_path>/<release>/output`.
    #[must_use]
    pub fn output_dir(&self) -> &'static str {
        match self {
            ReleaseVariant::Original => "originals",
            ReleaseVariant::Corrected => "corrections",
        }
    }

    /// Suffix appended to published feature class names.
    #[must_use]
    pub fn published_suffix(&self) -> &'static str {
        match self {
            ReleaseVariant::Original => "",
            ReleaseVariant::Corrected => "_Corrected",
        }
    }
}

impl fmt::Display for ReleaseVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseVariant::Original => f.write_str("original"),
            ReleaseVariant::Corrected => f.write_str("corrected"),
        }
    }
}

impl FromStr for ReleaseVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "original" | "originals" => Ok(ReleaseVariant::Original),
            "corrected" | "corrections" => Ok(ReleaseVariant::Corrected),
            other => Err(ConfigError::InvalidOption {
                option: "variant".to_string(),
                message: format!("'{other}' is not one of original, corrected"),
            }),
        }
    }
}

/// Borough subset of the extract; `All` for the citywide release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Borough {
    /// All five boroughs
    #[default]
    All,
    /// Manhattan
    Manhattan,
    /// The Bronx
    Bronx,
    /// Brooklyn
    Brooklyn,
    /// Queens
    Queens,
    /// Staten Island
    StatenIsland,
}

impl Borough {
    /// Bare name used in path templates; empty for all boroughs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Borough::All => "",
            Borough::Manhattan => "manhattan",
            Borough::Bronx => "bronx",
            Borough::Brooklyn => "brooklyn",
            Borough::Queens => "queens",
            Borough::StatenIsland => "statenisland",
        }
    }

    /// Suffix used in file names, e.g. `_staten_island`; empty for all boroughs.
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        match self {
            Borough::All => "",
            Borough::Manhattan => "_manhattan",
            Borough::Bronx => "_bronx",
            Borough::Brooklyn => "_brooklyn",
            Borough::Queens => "_queens",
            Borough::StatenIsland => "_staten_island",
        }
    }
}

impl FromStr for Borough {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "" | "all" => Ok(Borough::All),
            "manhattan" | "mn" => Ok(Borough::Manhattan),
            "bronx" | "bx" => Ok(Borough::Bronx),
            "brooklyn" | "bk" => Ok(Borough::Brooklyn),
            "queens" | "qn" => Ok(Borough::Queens),
            "staten-island" | "statenisland" | "si" => Ok(Borough::StatenIsland),
            other => Err(ConfigError::InvalidOption {
                option: "borough".to_string(),
                message: format!("'{other}' is not a borough"),
            }),
        }
    }
}

/// Date stamped into every dated artifact, rendered `MM_DD_YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunDate(NaiveDate);

impl RunDate {
    /// Today's local date.
    #[must_use]
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// Wrap a calendar date.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse `MM_DD_YYYY`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for any other shape.
    pub fn parse(text: &str) -> Result<Self> {
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Self)
            .map_err(|e| {
                ConfigError::InvalidOption {
                    option: "date".to_string(),
                    message: format!("'{text}' is not MM_DD_YYYY: {e}"),
                }
                .into()
            })
    }

    /// The calendar date.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

/// Explicit parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    /// Release version, e.g. `19v2`
    pub release: String,
    /// Which workflow to run
    pub variant: ReleaseVariant,
    /// Borough subset
    pub borough: Borough,
    /// Date stamped into artifact names
    pub date: RunDate,
    /// Dissolve the join geometry by key before joining
    pub dissolve: bool,
    /// Rebuild an already published release
    pub force: bool,
}

impl RunParameters {
    /// Parameters for a citywide run dated today.
    #[must_use]
    pub fn new(release: impl Into<String>, variant: ReleaseVariant) -> Self {
        Self {
            release: release.into(),
            variant,
            borough: Borough::All,
            date: RunDate::today(),
            dissolve: false,
            force: false,
        }
    }

    /// Water-included feature class, `MapPLUTO_<date>_Water_Included`.
    #[must_use]
    pub fn water_included(&self) -> String {
        format!("MapPLUTO_{}_Water_Included", self.date)
    }

    /// Shoreline-clipped feature class, `MapPLUTO_<date>_Shoreline_Clipped`.
    #[must_use]
    pub fn shoreline_clipped(&self) -> String {
        format!("MapPLUTO_{}_Shoreline_Clipped", self.date)
    }

    /// Published copy of the water-included workspace.
    #[must_use]
    pub fn published_water_workspace(&self) -> String {
        format!("MapPLUTO_WaterArea_{}_{}.gdb", self.variant.label(), self.date)
    }

    /// Published copy of the shoreline-clipped workspace.
    #[must_use]
    pub fn published_clip_workspace(&self) -> String {
        format!("MapPLUTO_ShorelineClip_{}_{}.gdb", self.variant.label(), self.date)
    }

    /// Publish manifest file name.
    #[must_use]
    pub fn publish_manifest(&self) -> String {
        format!("publish_{}_{}.json", self.variant.label(), self.date)
    }
}
