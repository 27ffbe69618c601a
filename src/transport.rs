//! The per-ion transport loop: flight-path sampling, boundary propagation,
//! electronic stopping, elastic scattering, recoil spawning and tallying.
//! This is the routine the driver's workers call once per queued ion.

use crate::cascade::{CascadeEngine, Defect, DefectKind};
use crate::config::{Config, SimulationType};
use crate::dedx::{apply_stopping, ElectronicStopping, StoppingSource, StragglingInterpolator};
use crate::error::SimResult;
use crate::flight_path::{FlightPathMode, FlightPathTables};
use crate::geometry::BoundaryCrossing;
use crate::ion::{IonHandle, IonQueue, IonState};
use crate::random_vars;
use crate::tally::{Tally, TallyEvent};
use crate::target::{Material, Target};
use crate::units::S_ERG_TO_TIME_CONST;
use crate::xs::{LabScatteringCalc, ScatteringTable};
use rand::Rng;
use std::collections::HashMap;
use ultraviolet::Vec3;

/// Every physics table the transport loop needs, keyed by the relevant
/// (moving atom id, struck/material) pair and built once at `Driver::init`.
pub struct PhysicsTables {
    lab_calc: HashMap<(u16, u16), LabScatteringCalc>,
    stopping: HashMap<(u16, usize), ElectronicStopping>,
    straggling: Option<HashMap<(u16, usize), StragglingInterpolator>>,
    flight_path: HashMap<(u16, usize), FlightPathTables>,
}

impl PhysicsTables {
    pub fn build(config: &Config, target: &Target, source: &dyn StoppingSource) -> SimResult<Self> {
        let scattering_table = ScatteringTable::build(config.simulation.screening_type);
        let n_atoms = target.n_atoms();

        let mut lab_calc = HashMap::new();
        for moving in 0..n_atoms {
            let m1 = &target.atoms[moving];
            for struck in 1..n_atoms {
                let m2 = &target.atoms[struck];
                lab_calc.insert(
                    (moving as u16, struck as u16),
                    LabScatteringCalc::new(&scattering_table, m1.z, m1.m, m2.z, m2.m),
                );
            }
        }

        let mut stopping = HashMap::new();
        let mut straggling_map = HashMap::new();
        let mut flight_path = HashMap::new();
        let straggling_on = config.simulation.electronic_straggling != crate::config::StragglingModel::Off;

        for (mat_idx, material) in target.materials.iter().enumerate() {
            if material.is_vacuum() {
                continue;
            }
            let atoms_z: Vec<u8> = material.atom_ids.iter().map(|&id| target.atom(id).z).collect();
            for moving in 0..n_atoms {
                let moving_id = moving as u16;
                let z1 = target.atoms[moving].z;
                let se = ElectronicStopping::build(source, z1, material, &atoms_z);

                let strag = if straggling_on {
                    Some(StragglingInterpolator::build(source, z1, material, &atoms_z))
                } else {
                    None
                };

                let scatter_calcs: Vec<(u16, &LabScatteringCalc)> = material
                    .atom_ids
                    .iter()
                    .map(|&atom_id| (atom_id, lab_calc.get(&(moving_id, atom_id)).expect("scattering calc built above")))
                    .collect();

                let mode = match config.transport.flight_path_type {
                    crate::config::FlightPathType::Constant => {
                        FlightPathMode::Constant { ell0: config.transport.flight_path_const }
                    }
                    crate::config::FlightPathType::Variable => FlightPathMode::Variable {
                        max_rel_eloss: config.transport.max_rel_eloss,
                        t_min: config.transport.min_recoil_energy,
                        mfp_lo: config.transport.mfp_range.0,
                        mfp_hi: config.transport.mfp_range.1,
                    },
                };

                let fp_table = FlightPathTables::build(mode, material, &scatter_calcs, config.transport.min_scattering_angle, &se);

                if let Some(s) = strag {
                    straggling_map.insert((moving_id, mat_idx), s);
                }
                stopping.insert((moving_id, mat_idx), se);
                flight_path.insert((moving_id, mat_idx), fp_table);
            }
        }

        Ok(Self {
            lab_calc,
            stopping,
            straggling: if straggling_on { Some(straggling_map) } else { None },
            flight_path,
        })
    }

    fn lab_calc(&self, moving: u16, struck: u16) -> &LabScatteringCalc {
        self.lab_calc.get(&(moving, struck)).expect("lab scattering calc must be built for every species pair")
    }

    pub(crate) fn stopping(&self, moving: u16, material_idx: usize) -> &ElectronicStopping {
        self.stopping.get(&(moving, material_idx)).expect("stopping table must be built for every (atom, material)")
    }

    pub(crate) fn straggling(&self, moving: u16, material_idx: usize) -> Option<&StragglingInterpolator> {
        self.straggling.as_ref().and_then(|m| m.get(&(moving, material_idx)))
    }

    fn flight_path(&self, moving: u16, material_idx: usize) -> &FlightPathTables {
        self.flight_path.get(&(moving, material_idx)).expect("flight-path table must be built for every (atom, material)")
    }
}

/// Rotate `dir` by the local deflection `(sinTheta*cosPhi, sinTheta*sinPhi,
/// cosTheta)`, i.e. the rotation mapping `z` onto `dir`.
pub fn deflect(dir: Vec3, sin_theta: f32, cos_theta: f32, cos_phi: f32, sin_phi: f32) -> Vec3 {
    let nz = dir.z;
    if (1.0 - nz.abs()) < 1e-8 {
        let sign = nz.signum();
        return Vec3::new(sin_theta * cos_phi, sin_theta * sin_phi * sign, cos_theta * sign);
    }
    let k = (1.0 - nz * nz).sqrt();
    let x = dir.x * cos_theta + sin_theta / k * (dir.x * nz * cos_phi - dir.y * sin_phi);
    let y = dir.y * cos_theta + sin_theta / k * (dir.y * nz * cos_phi + dir.x * sin_phi);
    let z = nz * cos_theta - k * sin_theta * cos_phi;
    Vec3::new(x, y, z).normalized()
}

fn pick_target_atom<R: Rng + ?Sized>(material: &Material, rng: &mut R) -> u16 {
    let u: f32 = rng.random();
    let mut cum = 0.0;
    for (id, frac) in material.atom_ids.iter().zip(material.fractions.iter()) {
        cum += frac;
        if u < cum {
            return *id;
        }
    }
    *material.atom_ids.last().expect("material must have at least one atom")
}

/// Outcome of running one queued ion (and its children) to completion.
pub struct Transport<'a> {
    pub target: &'a Target,
    pub tables: &'a PhysicsTables,
    pub config: &'a Config,
}

impl<'a> Transport<'a> {
    /// Run a single ion/recoil from the queue to its end (stop, exit, or
    /// replacement), spawning further recoils and vacancy/interstitial
    /// defects into `queue`/`cascade` as it goes.
    pub fn run_ion<R: Rng + ?Sized>(
        &self,
        handle: IonHandle,
        queue: &mut IonQueue,
        cascade: &mut dyn CascadeEngine,
        tally: &mut Tally,
        rng: &mut R,
    ) {
        let cascades_enabled = self.config.simulation.simulation_type != SimulationType::IonsOnly;

        loop {
            let cell_id = queue.get(handle).cell_id;
            if cell_id < 0 {
                return;
            }

            if queue.get(handle).energy < self.config.transport.min_energy {
                tally.record(TallyEvent::IonStop, queue.get_mut(handle), self.target);
                if cascades_enabled {
                    self.push_interstitial(cascade, queue.get(handle));
                }
                return;
            }

            let material_idx = match self.target.material_index_at(cell_id) {
                Some(idx) => idx,
                None => return,
            };
            let material = &self.target.materials[material_idx];

            if material.is_vacuum() {
                let (crossing, _) = self.advance(handle, queue, 1e30);
                match crossing {
                    BoundaryCrossing::Internal => {
                        tally.record(TallyEvent::BoundaryCrossing, queue.get_mut(handle), self.target);
                    }
                    BoundaryCrossing::External => {
                        tally.record(TallyEvent::IonExit, queue.get_mut(handle), self.target);
                        return;
                    }
                    BoundaryCrossing::None | BoundaryCrossing::InternalPBC => {}
                }
                continue;
            }

            let atom_ref = queue.get(handle).atom_ref;
            let energy = queue.get(handle).energy;

            let sample = self.tables.flight_path(atom_ref, material_idx).sample(energy, rng);
            let (crossing, dx_travelled) = self.advance(handle, queue, sample.dx);

            let stopping = self.tables.stopping(atom_ref, material_idx);
            let straggling = self.tables.straggling(atom_ref, material_idx);
            let new_energy = apply_stopping(stopping, straggling, queue.get(handle).energy, dx_travelled, rng);
            let d_e = queue.get(handle).energy - new_energy;
            queue.get_mut(handle).deposit_ionization(d_e);

            let mut collide = sample.collide;
            match crossing {
                BoundaryCrossing::Internal => {
                    tally.record(TallyEvent::BoundaryCrossing, queue.get_mut(handle), self.target);
                    collide = false;
                }
                BoundaryCrossing::InternalPBC => {
                    collide = false;
                }
                BoundaryCrossing::External => {
                    tally.record(TallyEvent::IonExit, queue.get_mut(handle), self.target);
                    return;
                }
                BoundaryCrossing::None => {}
            }

            if !collide {
                continue;
            }

            let target_atom_id = pick_target_atom(material, rng);
            let lab_calc = self.tables.lab_calc(atom_ref, target_atom_id);
            let (t, sin_theta, cos_theta) = lab_calc.scatter(queue.get(handle).energy, sample.impact_parameter);

            let dir0 = queue.get(handle).dir;
            let new_dir = deflect(dir0, sin_theta, cos_theta, sample.azimuth.0, sample.azimuth.1);
            {
                let ion = queue.get_mut(handle);
                ion.dir = new_dir;
                ion.counters.ncoll += 1;
            }

            let struck = self.target.atom(target_atom_id);
            if t >= struck.ed {
                queue.get_mut(handle).deposit_recoil(t);
                let e_after = queue.get(handle).energy;

                let b = if t > 0.0 { e_after / t } else { 0.0 };
                let w = (b / (1.0 + b)).sqrt();
                let mut recoil_dir = dir0 - new_dir * w;
                if recoil_dir.mag_sq() < 1e-20 {
                    recoil_dir = new_dir;
                } else {
                    recoil_dir.normalize();
                }

                let parent = queue.get(handle);
                let recoil_id = parent.recoil_id + 1;
                let history_id = parent.history_id;
                let pos = parent.pos;
                let cell_index = parent.cell_index;

                let mut recoil = IonState::new(pos, recoil_dir, t, cell_index, cell_id, target_atom_id);
                recoil.recoil_id = recoil_id;
                recoil.history_id = history_id;

                if cascades_enabled {
                    if self.config.simulation.move_recoil {
                        let grid = &self.target.grid;
                        let mut rpos = recoil.pos;
                        let mut rcell = recoil.cell_id;
                        grid.propagate(struck.rc, &mut rpos, recoil.dir, &mut rcell);
                        recoil.pos = rpos;
                        recoil.cell_id = rcell;
                        let e_before = recoil.energy;
                        let moved = apply_stopping(
                            self.tables.stopping(target_atom_id, material_idx),
                            self.tables.straggling(target_atom_id, material_idx),
                            recoil.energy,
                            struck.rc,
                            rng,
                        );
                        recoil.energy = moved;
                        if self.config.simulation.recoil_sub_ed {
                            let de = (e_before - moved) + struck.ed - t;
                            recoil.deposit_phonon(de.max(0.0));
                        }
                    }

                    let handle_uid = queue.get(handle).uid;
                    let recoil_pos = recoil.pos;
                    let recoil_cell_id = recoil.cell_id;
                    let recoil_time = recoil.time;
                    let recoil_handle = queue.allocate(recoil);
                    if recoil_id == 1 {
                        queue.pka.push_back(recoil_handle);
                    } else {
                        queue.recoil.push_back(recoil_handle);
                    }

                    let same_species = self.target.atom(atom_ref).z == struck.z;
                    if same_species && e_after < struck.er {
                        // Replacement: the projectile stays in the lattice in place of
                        // the struck atom; the recoil carries the projectile's history
                        // forward instead of leaving a Frenkel pair behind.
                        tally.record(TallyEvent::Replacement { replaced_atom_id: target_atom_id }, queue.get_mut(handle), self.target);
                        queue.get_mut(recoil_handle).uid = handle_uid;
                        return;
                    }

                    let recoil_uid = queue.get(recoil_handle).uid;
                    let vacancy = Defect {
                        kind: DefectKind::Vacancy,
                        history_id,
                        recoil_id,
                        cell_id: recoil_cell_id,
                        time: recoil_time,
                        pos: recoil_pos,
                        atom_id: target_atom_id,
                        pair_id: recoil_uid,
                    };
                    cascade.push_vacancy(vacancy);
                } else {
                    let same_species = self.target.atom(atom_ref).z == struck.z;
                    if same_species && e_after < struck.er {
                        tally.record(TallyEvent::Replacement { replaced_atom_id: target_atom_id }, queue.get_mut(handle), self.target);
                        return;
                    }
                }
            } else {
                queue.get_mut(handle).deposit_phonon(t);
            }
        }
    }

    /// Advance the ion by `dx`, updating path/time counters; returns the
    /// boundary classification from [`crate::geometry::Grid::propagate`]
    /// together with the distance actually travelled (clamped at a boundary).
    fn advance(&self, handle: IonHandle, queue: &mut IonQueue, dx: f32) -> (BoundaryCrossing, f32) {
        let ion = queue.get_mut(handle);
        let mass = self.target.atom(ion.atom_ref).m;
        let mut pos = ion.pos;
        let dir = ion.dir;
        let prev_cell = ion.cell_id;
        let mut cell_index = ion.cell_id;
        let crossing = self.target.grid.propagate(dx, &mut pos, dir, &mut cell_index);
        let travelled = (pos - ion.pos).mag();
        ion.pos = pos;
        ion.prev_cell_id = prev_cell;
        ion.cell_id = cell_index;
        ion.counters.path += travelled;
        ion.time += travelled * mass.sqrt() * S_ERG_TO_TIME_CONST / ion.energy.max(1e-6).sqrt();
        (crossing, travelled)
    }

    fn push_interstitial(&self, cascade: &mut dyn CascadeEngine, ion: &IonState) {
        cascade.push_interstitial(Defect {
            kind: DefectKind::Interstitial,
            history_id: ion.history_id,
            recoil_id: ion.recoil_id,
            cell_id: ion.cell_id,
            time: ion.time,
            pos: ion.pos,
            atom_id: ion.atom_ref,
            pair_id: ion.uid,
        });
    }
}
