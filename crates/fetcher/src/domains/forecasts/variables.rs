use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Default pressure level (hPa) for isobaric variables when a request omits one.
pub const DEFAULT_ISOBARIC_LEVEL: u16 = 850;

/// Isobaric levels (hPa) published in the GFS 0.25° pressure-level files.
pub const ISOBARIC_LEVELS_HPA: [u16; 33] = [
    1000, 975, 950, 925, 900, 850, 800, 750, 700, 650, 600, 550, 500, 450, 400, 350, 300, 250,
    200, 150, 100, 70, 50, 40, 30, 20, 15, 10, 7, 5, 3, 2, 1,
];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum VariableError {
    #[error("unknown variable: {0}")]
    Unknown(String),
    #[error("{variable} has no {level} mb level")]
    UnsupportedLevel { variable: Variable, level: u16 },
}

/// The physical quantities the map can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Wind,
    Precip,
    Cloud,
    Refc,
    SfcTemp,
    Vvel,
    Cape,
    Cin,
    Divergence,
}

impl Variable {
    pub const ALL: [Variable; 9] = [
        Variable::Wind,
        Variable::Precip,
        Variable::Cloud,
        Variable::Refc,
        Variable::SfcTemp,
        Variable::Vvel,
        Variable::Cape,
        Variable::Cin,
        Variable::Divergence,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Variable::Wind => "wind",
            Variable::Precip => "precip",
            Variable::Cloud => "cloud",
            Variable::Refc => "refc",
            Variable::SfcTemp => "sfc_temp",
            Variable::Vvel => "vvel",
            Variable::Cape => "cape",
            Variable::Cin => "cin",
            Variable::Divergence => "divergence",
        }
    }

    /// Whether the request's level selects a pressure surface for this variable.
    pub fn is_isobaric(&self) -> bool {
        matches!(
            self,
            Variable::Wind | Variable::Vvel | Variable::Divergence
        )
    }

    /// Minimum forecast hour at which the field exists.
    ///
    /// Accumulated precipitation and averaged cloud cover are not part of the
    /// analysis (f000) files, so they are always read from a 6 hour lead.
    pub fn min_lead_hours(&self) -> u16 {
        match self {
            Variable::Precip | Variable::Cloud => 6,
            _ => 0,
        }
    }

    /// Level to read for this variable; `requested` only matters for isobaric ones.
    pub fn level(&self, requested: Option<u16>) -> Result<Level, VariableError> {
        match self {
            Variable::Wind | Variable::Vvel | Variable::Divergence => {
                let hpa = requested.unwrap_or(DEFAULT_ISOBARIC_LEVEL);
                if !ISOBARIC_LEVELS_HPA.contains(&hpa) {
                    return Err(VariableError::UnsupportedLevel {
                        variable: *self,
                        level: hpa,
                    });
                }
                Ok(Level::Isobaric(hpa))
            }
            Variable::Precip | Variable::Cape | Variable::Cin => Ok(Level::Surface),
            Variable::SfcTemp => Ok(Level::HeightAboveGround(2)),
            Variable::Cloud | Variable::Refc => Ok(Level::EntireAtmosphere),
        }
    }

    /// GRIB fields that have to be downloaded to build this variable.
    pub fn sources(&self) -> &'static [Parameter] {
        match self {
            Variable::Wind | Variable::Divergence => &[UGRD, VGRD],
            Variable::Precip => &[APCP],
            Variable::Cloud => &[TCDC],
            Variable::Refc => &[REFC],
            Variable::SfcTemp => &[TMP],
            Variable::Vvel => &[VVEL],
            Variable::Cape => &[CAPE],
            Variable::Cin => &[CIN],
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = VariableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Variable::ALL
            .into_iter()
            .find(|v| v.name() == wanted)
            .ok_or_else(|| VariableError::Unknown(s.to_string()))
    }
}

/// Vertical level of a GRIB field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Isobaric(u16),
    Surface,
    HeightAboveGround(u16),
    EntireAtmosphere,
}

impl Level {
    /// Level text as it appears in the NOAA `.idx` inventory.
    pub fn idx_text(&self) -> String {
        match self {
            Level::Isobaric(hpa) => format!("{} mb", hpa),
            Level::Surface => "surface".to_string(),
            Level::HeightAboveGround(m) => format!("{} m above ground", m),
            Level::EntireAtmosphere => "entire atmosphere".to_string(),
        }
    }

    /// Short form used in cache file names.
    pub fn descriptor(&self) -> String {
        match self {
            Level::Isobaric(hpa) => format!("{}mb", hpa),
            Level::Surface => "surface".to_string(),
            Level::HeightAboveGround(m) => format!("{}m", m),
            Level::EntireAtmosphere => "atmos".to_string(),
        }
    }

    /// GRIB2 code table 4.5 fixed surface type.
    pub fn surface_type(&self) -> u8 {
        match self {
            Level::Isobaric(_) => 100,
            Level::Surface => 1,
            Level::HeightAboveGround(_) => 103,
            Level::EntireAtmosphere => 10,
        }
    }

    pub fn surface_type_name(&self) -> &'static str {
        match self {
            Level::Isobaric(_) => "Isobaric surface",
            Level::Surface => "Ground or water surface",
            Level::HeightAboveGround(_) => "Specified height level above ground",
            Level::EntireAtmosphere => "Entire atmosphere (considered as a single layer)",
        }
    }

    pub fn surface_value(&self) -> i64 {
        match self {
            Level::Isobaric(hpa) => i64::from(*hpa),
            Level::HeightAboveGround(m) => i64::from(*m),
            Level::Surface | Level::EntireAtmosphere => 0,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// GRIB2 product identification (discipline 0, meteorological products).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    /// Abbreviation used in the `.idx` inventory
    pub idx_name: &'static str,
    pub category: u8,
    pub category_name: &'static str,
    pub number: u16,
    pub number_name: &'static str,
    /// Unit as written in GRIB2 tables
    pub unit: &'static str,
    /// Unit shown by the map legend
    pub display_unit: &'static str,
}

pub const UGRD: Parameter = Parameter {
    idx_name: "UGRD",
    category: 2,
    category_name: "Momentum",
    number: 2,
    number_name: "U-component_of_wind",
    unit: "m.s-1",
    display_unit: "m/s",
};

pub const VGRD: Parameter = Parameter {
    idx_name: "VGRD",
    category: 2,
    category_name: "Momentum",
    number: 3,
    number_name: "V-component_of_wind",
    unit: "m.s-1",
    display_unit: "m/s",
};

pub const APCP: Parameter = Parameter {
    idx_name: "APCP",
    category: 1,
    category_name: "Moisture",
    number: 8,
    number_name: "Total_precipitation",
    unit: "kg.m-2",
    display_unit: "mm",
};

pub const TCDC: Parameter = Parameter {
    idx_name: "TCDC",
    category: 6,
    category_name: "Cloud",
    number: 1,
    number_name: "Total_cloud_cover",
    unit: "%",
    display_unit: "%",
};

pub const REFC: Parameter = Parameter {
    idx_name: "REFC",
    category: 16,
    category_name: "Forecast Radar Imagery",
    number: 196,
    number_name: "Composite_reflectivity",
    unit: "dB",
    display_unit: "dBZ",
};

pub const TMP: Parameter = Parameter {
    idx_name: "TMP",
    category: 0,
    category_name: "Temperature",
    number: 0,
    number_name: "Temperature",
    unit: "K",
    display_unit: "K",
};

pub const VVEL: Parameter = Parameter {
    idx_name: "VVEL",
    category: 2,
    category_name: "Momentum",
    number: 8,
    number_name: "Vertical_velocity_pressure",
    unit: "Pa.s-1",
    display_unit: "Pa/s",
};

pub const CAPE: Parameter = Parameter {
    idx_name: "CAPE",
    category: 7,
    category_name: "Thermodynamic Stability indices",
    number: 6,
    number_name: "Convective_available_potential_energy",
    unit: "J.kg-1",
    display_unit: "J/kg",
};

pub const CIN: Parameter = Parameter {
    idx_name: "CIN",
    category: 7,
    category_name: "Thermodynamic Stability indices",
    number: 7,
    number_name: "Convective_inhibition",
    unit: "J.kg-1",
    display_unit: "J/kg",
};

/// Derived from UGRD/VGRD, GFS does not publish it, so there is no
/// inventory name to search for; only the header fields are used.
pub const DIVERGENCE: Parameter = Parameter {
    idx_name: "",
    category: 2,
    category_name: "Momentum",
    number: 13,
    number_name: "Relative_divergence",
    unit: "s-1",
    display_unit: "1/s",
};
