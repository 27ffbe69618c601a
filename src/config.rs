//! Run configuration: a nested, serde-mapped record plus the validation
//! that turns malformed setups into a [`crate::error::SimError::Configuration`]
//! before a single ion is simulated.

use crate::error::{SimError, SimResult};
use crate::xs::Screening;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SimulationType {
    FullCascade,
    IonsOnly,
    CascadesOnly,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ElectronicStoppingModel {
    Off,
    Srim96,
    Srim13,
    Dpass22,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StragglingModel {
    Off,
    Bohr,
    Chu,
    Yang,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NrtCalculation {
    Element,
    Average,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlightPathType {
    Constant,
    Variable,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub simulation_type: SimulationType,
    pub screening_type: Screening,
    pub electronic_stopping: ElectronicStoppingModel,
    pub electronic_straggling: StragglingModel,
    pub nrt_calculation: NrtCalculation,
    pub intra_cascade_recombination: bool,
    pub time_ordered_cascades: bool,
    pub correlated_recombination: bool,
    pub move_recoil: bool,
    pub recoil_sub_ed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    pub flight_path_type: FlightPathType,
    /// Used when `flight_path_type == Constant`, units of `Rat`.
    pub flight_path_const: f32,
    /// Per-ion cutoff energy, eV.
    pub min_energy: f32,
    pub min_recoil_energy: f32,
    pub min_scattering_angle: f32,
    pub max_rel_eloss: f32,
    pub mfp_range: (f32, f32),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DistributionKind {
    SingleValue,
    Uniform,
    Gaussian,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Distribution {
    pub kind: DistributionKind,
    /// Mean (`SingleValue`/`Gaussian`) or lower bound (`Uniform`).
    pub a: f32,
    /// Unused for `SingleValue`; std-dev (`Gaussian`) or upper bound (`Uniform`).
    pub b: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IonBeamConfig {
    pub atomic_number: u8,
    pub mass: f32,
    pub energy_distribution: Distribution,
    pub angular_distribution: Distribution,
    pub spatial_distribution: Distribution,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionConfig {
    pub material_name: String,
    pub origin: [f32; 3],
    pub size: [f32; 3],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub name: String,
    pub element_symbols: Vec<String>,
    pub fractions: Vec<f32>,
    pub density: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetConfig {
    pub origin: [f32; 3],
    pub size: [f32; 3],
    pub cell_count: [usize; 3],
    pub periodic_bc: [bool; 3],
    pub materials: Vec<MaterialConfig>,
    pub regions: Vec<RegionConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub max_no_ions: u64,
    pub max_cpu_time: Option<f64>,
    pub threads: usize,
    pub seed: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    pub title: String,
    pub file_name: String,
    pub storage_interval: u64,
    pub store_exit_events: bool,
    pub store_pka_events: bool,
    pub store_damage_events: bool,
    pub store_dedx: bool,
}

/// A single user-defined histogram request; the binning engine itself is a
/// collaborator this crate doesn't implement, so only the declaration is
/// validated and carried through.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserTallySpec {
    pub id: String,
    pub description: String,
    pub event: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub transport: TransportConfig,
    pub ion_beam: IonBeamConfig,
    pub target: TargetConfig,
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub user_tallies: Vec<UserTallySpec>,
}

impl Config {
    pub fn from_json(s: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_toml(s: &str) -> SimResult<Self> {
        toml::from_str(s).map_err(|e| SimError::Configuration(e.to_string()))
    }

    /// Raise `SimError::Configuration` for every malformed setup this crate
    /// is responsible for catching before a run starts.
    pub fn validate(&self) -> SimResult<()> {
        for region in &self.target.regions {
            if region.size.iter().any(|&s| s <= 0.0) {
                return Err(SimError::Configuration(format!(
                    "region with non-positive size: {:?}",
                    region.size
                )));
            }
            let region_hi = [
                region.origin[0] + region.size[0],
                region.origin[1] + region.size[1],
                region.origin[2] + region.size[2],
            ];
            let target_hi = [
                self.target.origin[0] + self.target.size[0],
                self.target.origin[1] + self.target.size[1],
                self.target.origin[2] + self.target.size[2],
            ];
            let outside = (0..3).any(|axis| {
                region_hi[axis] <= self.target.origin[axis] || region.origin[axis] >= target_hi[axis]
            });
            if outside {
                return Err(SimError::Configuration(format!(
                    "region '{}' lies fully outside the target volume",
                    region.material_name
                )));
            }
            if !self.target.materials.iter().any(|m| m.name == region.material_name) {
                return Err(SimError::Configuration(format!(
                    "region references unknown material '{}'",
                    region.material_name
                )));
            }
        }

        if self.target.cell_count.iter().any(|&n| n == 0) {
            return Err(SimError::Configuration("cell_count must be nonzero on every axis".into()));
        }

        for material in &self.target.materials {
            if material.element_symbols.len() != material.fractions.len() {
                return Err(SimError::Configuration(format!(
                    "material '{}' has mismatched element/fraction counts",
                    material.name
                )));
            }
            if material.density <= 0.0 {
                return Err(SimError::Configuration(format!(
                    "material '{}' has non-positive density",
                    material.name
                )));
            }
        }

        let source_energy_is_zero = match self.ion_beam.energy_distribution.kind {
            DistributionKind::SingleValue => self.ion_beam.energy_distribution.a == 0.0,
            DistributionKind::Uniform | DistributionKind::Gaussian => {
                self.ion_beam.energy_distribution.a == 0.0 && self.ion_beam.energy_distribution.b == 0.0
            }
        };
        if source_energy_is_zero {
            return Err(SimError::Configuration("source ion energy distribution is identically zero".into()));
        }

        if self.run.threads == 0 {
            return Err(SimError::Configuration("run.threads must be at least 1".into()));
        }
        if self.run.max_no_ions == 0 {
            return Err(SimError::Configuration("run.max_no_ions must be at least 1".into()));
        }

        Ok(())
    }
}
