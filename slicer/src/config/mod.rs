//! # Slicing Configuration
//!
//! Every tunable the slicer understands lives in one declarative table,
//! [`SCHEMA`]: option groups of typed entries with defaults, ranges, and
//! descriptions. Parsing, validation, help text, display, and persistence
//! are all driven from that table so the option list exists exactly once.
//!
//! Values are parsed from `key=value` strings. Out-of-range or mistyped
//! values are rejected and the previous value is retained; callers log the
//! rejection and continue, since a bad option should degrade a run, not
//! abort it.
//!
//! The persisted config file is plain `key=value` lines with `#` comment
//! headers per group, stored at the platform config directory.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from configuration parsing and persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config option: {0}")]
    UnknownOption(String),

    #[error("bad value for {key}: {value:?} ({expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("unknown material: {0}")]
    UnknownMaterial(String),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The value type and permitted range of one option.
#[derive(Debug, Clone, Copy)]
pub enum OptionKind {
    Bool,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Choice { options: &'static [&'static str] },
}

impl OptionKind {
    /// Short type name used in help output.
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionKind::Bool => "bool",
            OptionKind::Int { .. } => "int",
            OptionKind::Float { .. } => "float",
            OptionKind::Choice { .. } => "opt",
        }
    }

    /// Human-readable description of the accepted values.
    pub fn range_text(&self) -> String {
        match self {
            OptionKind::Bool => "True/False".to_string(),
            OptionKind::Int { min, max } => format!("{} ... {}", min, max),
            OptionKind::Float { min, max } => format!("{} ... {}", min, max),
            OptionKind::Choice { options } => options.join(", "),
        }
    }
}

/// One configured value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(true) => write!(f, "True"),
            OptionValue::Bool(false) => write!(f, "False"),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// One schema row: name, type/range, default, description.
#[derive(Debug, Clone, Copy)]
pub struct ConfigEntry {
    pub name: &'static str,
    pub kind: OptionKind,
    pub default: OptionValue,
    pub descr: &'static str,
}

/// A titled group of schema rows.
#[derive(Debug, Clone, Copy)]
pub struct ConfigGroup {
    pub name: &'static str,
    pub entries: &'static [ConfigEntry],
}

macro_rules! entry {
    ($name:literal, bool, $default:literal, $descr:literal) => {
        ConfigEntry {
            name: $name,
            kind: OptionKind::Bool,
            default: OptionValue::Bool($default),
            descr: $descr,
        }
    };
    ($name:literal, int, $default:literal, ($min:literal, $max:literal), $descr:literal) => {
        ConfigEntry {
            name: $name,
            kind: OptionKind::Int { min: $min, max: $max },
            default: OptionValue::Int($default),
            descr: $descr,
        }
    };
    ($name:literal, float, $default:literal, ($min:literal, $max:literal), $descr:literal) => {
        ConfigEntry {
            name: $name,
            kind: OptionKind::Float { min: $min, max: $max },
            default: OptionValue::Float($default),
            descr: $descr,
        }
    };
    ($name:literal, choice, $default:literal, $options:expr, $descr:literal) => {
        ConfigEntry {
            name: $name,
            kind: OptionKind::Choice { options: $options },
            default: OptionValue::Str($default),
            descr: $descr,
        }
    };
}

/// Per-material print presets applied by `--filament`.
struct Material {
    prefix: &'static str,
    label: &'static str,
    bed_temp: i64,
    hotend_temp: i64,
    max_speed: f64,
}

const MATERIALS: &[Material] = &[
    Material { prefix: "abs", label: "ABS", bed_temp: 90, hotend_temp: 230, max_speed: 75.0 },
    Material { prefix: "hips", label: "dissolvable HIPS", bed_temp: 100, hotend_temp: 230, max_speed: 30.0 },
    Material { prefix: "nylon", label: "Nylon", bed_temp: 70, hotend_temp: 255, max_speed: 75.0 },
    Material { prefix: "pc", label: "Polycarbonate", bed_temp: 130, hotend_temp: 290, max_speed: 75.0 },
    Material { prefix: "pet", label: "PETG/PETT", bed_temp: 70, hotend_temp: 230, max_speed: 75.0 },
    Material { prefix: "pla", label: "PLA", bed_temp: 45, hotend_temp: 205, max_speed: 75.0 },
    Material { prefix: "pp", label: "Polypropylene", bed_temp: 110, hotend_temp: 250, max_speed: 75.0 },
    Material { prefix: "pva", label: "dissolvable PVA", bed_temp: 60, hotend_temp: 220, max_speed: 30.0 },
    Material { prefix: "softpla", label: "flexible SoftPLA", bed_temp: 30, hotend_temp: 230, max_speed: 30.0 },
    Material { prefix: "tpe", label: "flexible TPE", bed_temp: 30, hotend_temp: 220, max_speed: 30.0 },
    Material { prefix: "tpu", label: "flexible TPU", bed_temp: 50, hotend_temp: 250, max_speed: 30.0 },
];

const QUALITY_ENTRIES: &[ConfigEntry] = &[
    entry!("layer_height", float, 0.2, (0.01, 0.5), "Slice layer height in mm."),
    entry!("shell_count", int, 2, (1, 10), "Number of outer shells to print."),
    entry!("random_starts", bool, true, "Enable randomizing of perimeter starts."),
    entry!("top_layers", int, 3, (0, 10), "Number of layers to print on the top side of the object."),
    entry!("bottom_layers", int, 3, (0, 10), "Number of layers to print on the bottom side of the object."),
    entry!("infill_type", choice, "Triangles", &["Lines", "Triangles", "Grid", "Hexagons"], "Pattern that the infill will be printed in."),
    entry!("infill_density", float, 25.0, (0.0, 100.0), "Infill density in percent."),
    entry!("infill_overlap", float, 1.0, (0.0, 10.0), "Amount, in mm that infill will overlap with perimeter extrusions."),
    entry!("feed_rate", int, 100, (1, 300), "Speed while extruding. (mm/s)"),
    entry!("travel_rate_xy", int, 100, (1, 300), "Travel motion speed. (mm/s)"),
    entry!("travel_rate_z", float, 50.0, (0.1, 100.0), "Z-axis motion speed. (mm/s)"),
];

const SUPPORT_ENTRIES: &[ConfigEntry] = &[
    entry!("support_type", choice, "None", &["None", "External", "Everywhere"], "What kind of support structure to add."),
    entry!("support_outset", float, 0.5, (0.0, 10.0), "How far support structures should be printed away from model, horizontally."),
    entry!("support_density", float, 33.0, (0.0, 100.0), "Density of support structure internals."),
    entry!("overhang_angle", int, 45, (0, 90), "Angle from vertical that support structures should be printed for."),
];

const ADHESION_ENTRIES: &[ConfigEntry] = &[
    entry!("adhesion_type", choice, "None", &["None", "Brim", "Raft"], "What kind of base adhesion structure to add."),
    entry!("brim_width", float, 0.0, (0.0, 20.0), "Width of brim to print on first layer to help with part adhesion."),
    entry!("raft_layers", int, 1, (1, 5), "Number of layers to use in making the raft."),
    entry!("raft_outset", float, 5.0, (0.0, 50.0), "How much bigger raft should be than the model footprint."),
    entry!("skirt_outset", float, 0.0, (0.0, 20.0), "How far the skirt should be printed away from model."),
    entry!("skirt_layers", int, 0, (0, 1000), "Number of layers to print the skirt on."),
    entry!("prime_length", float, 10.0, (0.0, 1000.0), "Length of filament to extrude when priming hotends."),
];

const RETRACTION_ENTRIES: &[ConfigEntry] = &[
    entry!("retract_enable", bool, true, "Enable filament retraction."),
    entry!("retract_speed", float, 50.0, (0.0, 200.0), "Speed to retract filament at. (mm/s)"),
    entry!("retract_dist", float, 5.0, (0.0, 20.0), "Distance to retract filament between extrusion moves. (mm)"),
    entry!("retract_extruder", float, 5.0, (0.0, 50.0), "Distance to retract filament on extruder change. (mm)"),
    entry!("retract_lift", float, 0.0, (0.0, 10.0), "Distance to lift the extruder head during retracted moves. (mm)"),
];

/// The complete option schema, in display and persistence order. The
/// Materials and Machine groups are flattened from [`MATERIALS`] and the
/// four nozzle blocks at first use.
pub fn schema() -> &'static [ConfigGroup] {
    use std::sync::OnceLock;
    static SCHEMA: OnceLock<Vec<ConfigGroup>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            vec![
                ConfigGroup { name: "Quality", entries: QUALITY_ENTRIES },
                ConfigGroup { name: "Support", entries: SUPPORT_ENTRIES },
                ConfigGroup { name: "Adhesion", entries: ADHESION_ENTRIES },
                ConfigGroup { name: "Retraction", entries: RETRACTION_ENTRIES },
                ConfigGroup { name: "Materials", entries: material_entries() },
                ConfigGroup { name: "Machine", entries: machine_entries() },
            ]
        })
        .as_slice()
}

fn material_entries() -> &'static [ConfigEntry] {
    use std::sync::OnceLock;
    static ENTRIES: OnceLock<Vec<ConfigEntry>> = OnceLock::new();
    ENTRIES
        .get_or_init(|| {
            MATERIALS
                .iter()
                .flat_map(|mat| {
                    [
                        ConfigEntry {
                            name: leak(format!("{}_bed_temp", mat.prefix)),
                            kind: OptionKind::Int { min: 0, max: 150 },
                            default: OptionValue::Int(mat.bed_temp),
                            descr: leak(format!(
                                "The bed temperature to use for {} filament. (C)",
                                mat.label
                            )),
                        },
                        ConfigEntry {
                            name: leak(format!("{}_hotend_temp", mat.prefix)),
                            kind: OptionKind::Int { min: 150, max: 300 },
                            default: OptionValue::Int(mat.hotend_temp),
                            descr: leak(format!(
                                "The extruder temperature to use for {} filament. (C)",
                                mat.label
                            )),
                        },
                        ConfigEntry {
                            name: leak(format!("{}_max_speed", mat.prefix)),
                            kind: OptionKind::Float { min: 0.0, max: 150.0 },
                            default: OptionValue::Float(mat.max_speed),
                            descr: leak(format!(
                                "The maximum speed when extruding {} filament. (mm/s)",
                                mat.label
                            )),
                        },
                    ]
                })
                .collect()
        })
        .as_slice()
}

fn machine_entries() -> &'static [ConfigEntry] {
    use std::sync::OnceLock;
    static ENTRIES: OnceLock<Vec<ConfigEntry>> = OnceLock::new();
    ENTRIES
        .get_or_init(|| {
            let mut entries = vec![
                entry!("bed_geometry", choice, "Rectangular", &["Rectangular", "Cylindrical"], "The shape of the build volume cross-section."),
                entry!("bed_size_x", float, 200.0, (0.0, 2000.0), "The X-axis size of the build platform bed."),
                entry!("bed_size_y", float, 200.0, (0.0, 2000.0), "The Y-axis size of the build platform bed."),
                entry!("bed_center_x", float, 100.0, (0.0, 2000.0), "The X coordinate of the center of the bed."),
                entry!("bed_center_y", float, 100.0, (0.0, 2000.0), "The Y coordinate of the center of the bed."),
                entry!("bed_temp", int, 70, (0, 150), "The temperature to set the heated bed to."),
                entry!("extruder_count", int, 1, (1, 4), "The number of extruders this machine has."),
                entry!("default_nozzle", int, 0, (0, 3), "The default extruder used for printing."),
                entry!("infill_nozzle", int, -1, (-1, 3), "The extruder used for infill material.  -1 means use default nozzle."),
                entry!("support_nozzle", int, -1, (-1, 3), "The extruder used for support material.  -1 means use default nozzle."),
            ];
            let offsets: [(f64, f64); 4] = [(0.0, 0.0), (25.0, 0.0), (-25.0, 0.0), (0.0, 25.0)];
            for (n, (xoff, yoff)) in offsets.iter().enumerate() {
                let max_speed = if n == 0 { 100.0 } else { 75.0 };
                entries.extend([
                    ConfigEntry {
                        name: leak(format!("nozzle_{}_temp", n)),
                        kind: OptionKind::Int { min: 150, max: 250 },
                        default: OptionValue::Int(190),
                        descr: leak(format!("The temperature of the nozzle for extruder {}. (C)", n)),
                    },
                    ConfigEntry {
                        name: leak(format!("nozzle_{}_filament", n)),
                        kind: OptionKind::Float { min: 1.0, max: 3.5 },
                        default: OptionValue::Float(1.75),
                        descr: leak(format!("The diameter of the filament for extruder {}. (mm)", n)),
                    },
                    ConfigEntry {
                        name: leak(format!("nozzle_{}_diam", n)),
                        kind: OptionKind::Float { min: 0.1, max: 1.5 },
                        default: OptionValue::Float(0.4),
                        descr: leak(format!("The diameter of the nozzle for extruder {}. (mm)", n)),
                    },
                    ConfigEntry {
                        name: leak(format!("nozzle_{}_xoff", n)),
                        kind: OptionKind::Float { min: -100.0, max: 100.0 },
                        default: OptionValue::Float(*xoff),
                        descr: leak(format!("The X positional offset for extruder {}. (mm)", n)),
                    },
                    ConfigEntry {
                        name: leak(format!("nozzle_{}_yoff", n)),
                        kind: OptionKind::Float { min: -100.0, max: 100.0 },
                        default: OptionValue::Float(*yoff),
                        descr: leak(format!("The Y positional offset for extruder {}. (mm)", n)),
                    },
                    ConfigEntry {
                        name: leak(format!("nozzle_{}_max_speed", n)),
                        kind: OptionKind::Float { min: 0.0, max: 200.0 },
                        default: OptionValue::Float(max_speed),
                        descr: leak(format!("The maximum speed when using extruder {}. (mm/s)", n)),
                    },
                ]);
            }
            entries
        })
        .as_slice()
}

fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

/// Looks up one schema entry by option name.
pub fn schema_entry(key: &str) -> Option<&'static ConfigEntry> {
    schema()
        .iter()
        .flat_map(|group| group.entries.iter())
        .find(|entry| entry.name == key)
}

/// The live option set: schema defaults plus any overrides.
#[derive(Debug, Clone)]
pub struct SlicerConfig {
    values: HashMap<&'static str, OptionValue>,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SlicerConfig {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        for group in schema() {
            for entry in group.entries {
                values.insert(entry.name, entry.default);
            }
        }
        Self { values }
    }

    /// Parses and validates one `key`, `value` pair against the schema.
    /// On error the previous value is retained.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        let value = value.trim();
        let entry = schema_entry(key).ok_or_else(|| ConfigError::UnknownOption(key.to_string()))?;
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: match entry.kind {
                OptionKind::Bool => "value should be either True or False".to_string(),
                OptionKind::Int { min, max } => {
                    format!("value should be between {} and {}, inclusive", min, max)
                }
                OptionKind::Float { min, max } => {
                    format!("value should be between {} and {}, inclusive", min, max)
                }
                OptionKind::Choice { options } => {
                    format!("valid options are: {}", options.join(", "))
                }
            },
        };
        let parsed = match entry.kind {
            OptionKind::Bool => match value {
                "True" => OptionValue::Bool(true),
                "False" => OptionValue::Bool(false),
                _ => return Err(invalid()),
            },
            OptionKind::Int { min, max } => {
                let v: i64 = value.parse().map_err(|_| invalid())?;
                if v < min || v > max {
                    return Err(invalid());
                }
                OptionValue::Int(v)
            }
            OptionKind::Float { min, max } => {
                let v: f64 = value.parse().map_err(|_| invalid())?;
                if !v.is_finite() || v < min || v > max {
                    return Err(invalid());
                }
                OptionValue::Float(v)
            }
            OptionKind::Choice { options } => {
                let v = options.iter().find(|opt| **opt == value).ok_or_else(invalid)?;
                OptionValue::Str(v)
            }
        };
        self.values.insert(entry.name, parsed);
        Ok(())
    }

    /// Parses a pair, logging and ignoring failures (bad options degrade a
    /// run, they do not abort it).
    pub fn set_lenient(&mut self, key: &str, value: &str) {
        if let Err(err) = self.set(key, value) {
            warn!("ignoring configuration: {}", err);
        }
    }

    pub fn get(&self, key: &str) -> Option<OptionValue> {
        self.values.get(key).copied()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(OptionValue::Bool(true)))
    }

    pub fn get_int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(OptionValue::Int(v)) => *v,
            Some(OptionValue::Float(v)) => *v as i64,
            _ => 0,
        }
    }

    pub fn get_float(&self, key: &str) -> f64 {
        match self.values.get(key) {
            Some(OptionValue::Float(v)) => *v,
            Some(OptionValue::Int(v)) => *v as f64,
            _ => 0.0,
        }
    }

    pub fn get_str(&self, key: &str) -> &'static str {
        match self.values.get(key) {
            Some(OptionValue::Str(v)) => v,
            _ => "",
        }
    }

    /// Configures the extruders for a list of filament materials: the bed
    /// temperature becomes the hottest material's bed temperature, and each
    /// extruder in order takes its material's hotend temperature and speed
    /// limit.
    pub fn apply_materials(&mut self, materials: &[String]) -> Result<(), ConfigError> {
        for material in materials {
            if schema_entry(&format!("{}_hotend_temp", material)).is_none() {
                return Err(ConfigError::UnknownMaterial(material.clone()));
            }
        }
        let bed_temp = materials
            .iter()
            .map(|m| self.get_int(&format!("{}_bed_temp", m)))
            .max()
            .unwrap_or(0);
        self.set("bed_temp", &bed_temp.to_string())?;
        for (extruder, material) in materials.iter().enumerate() {
            info!("configuring extruder{} for {}", extruder, material);
            let hotend = self.get_int(&format!("{}_hotend_temp", material));
            let speed = self.get_float(&format!("{}_max_speed", material));
            self.set(&format!("nozzle_{}_temp", extruder), &hotend.to_string())?;
            self.set(&format!("nozzle_{}_max_speed", extruder), &speed.to_string())?;
        }
        Ok(())
    }

    /// The platform-appropriate persisted config path.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "Lamina").map(|dirs| dirs.config_dir().join("lamina.conf"))
    }

    /// Loads `key=value` lines, tolerating blank and `#`-prefixed lines.
    /// Invalid values are warned about and skipped.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let file = fs::File::open(path)?;
        info!("loading configs from {}", path.display());
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => self.set_lenient(key, value),
                None => warn!("ignoring malformed config line: {:?}", line),
            }
        }
        Ok(())
    }

    /// Writes every option grouped under `#` section headers.
    pub fn save_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        for group in schema() {
            writeln!(file, "# {}", group.name)?;
            for entry in group.entries {
                let value = self.values.get(entry.name).copied().unwrap_or(entry.default);
                writeln!(file, "{}={}", entry.name, value)?;
            }
            writeln!(file)?;
        }
        info!("saved configs to {}", path.display());
        Ok(())
    }

    /// Formats option help or current values. With a `key` only that option
    /// is shown; with `values_only` the type/range/description lines are
    /// suppressed.
    pub fn describe(&self, key: Option<&str>, values_only: bool) -> String {
        let mut out = String::new();
        for group in schema() {
            if key.is_none() && !values_only {
                out.push_str(&format!("{}:\n", group.name));
            }
            for entry in group.entries {
                if let Some(key) = key {
                    if key != entry.name {
                        continue;
                    }
                }
                let value = self.values.get(entry.name).copied().unwrap_or(entry.default);
                out.push_str(&format!("  {} = {}\n", entry.name, value));
                if !values_only {
                    out.push_str(&format!(
                        "          Type: {}  ({})\n",
                        entry.kind.type_name(),
                        entry.kind.range_text()
                    ));
                    out.push_str(&format!("          {}\n", entry.descr));
                }
            }
        }
        out
    }
}
