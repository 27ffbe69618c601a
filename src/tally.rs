//! Per-(atom, cell) accumulators scored as ions cross cell boundaries, stop,
//! exit, or complete a cascade, plus the running total/total-of-squares used
//! for per-history statistical error estimation.

use crate::arrays::ArrayND;
use crate::ion::IonState;
use crate::target::Target;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum TallyChannel {
    Vacancies = 0,
    Implantations,
    Replacements,
    Recombinations,
    Displacements,
    Ionization,
    Lattice,
    Stored,
    Lost,
    IonExits,
    Pka,
    PkaEnergy,
    Tdam,
    TdamLss,
    Vnrt,
    VnrtLss,
    FlightPath,
    Collisions,
}

const N_CHANNELS: usize = 18;

const ALL_CHANNELS: [TallyChannel; N_CHANNELS] = [
    TallyChannel::Vacancies,
    TallyChannel::Implantations,
    TallyChannel::Replacements,
    TallyChannel::Recombinations,
    TallyChannel::Displacements,
    TallyChannel::Ionization,
    TallyChannel::Lattice,
    TallyChannel::Stored,
    TallyChannel::Lost,
    TallyChannel::IonExits,
    TallyChannel::Pka,
    TallyChannel::PkaEnergy,
    TallyChannel::Tdam,
    TallyChannel::TdamLss,
    TallyChannel::Vnrt,
    TallyChannel::VnrtLss,
    TallyChannel::FlightPath,
    TallyChannel::Collisions,
];

impl TallyChannel {
    pub fn name(self) -> &'static str {
        match self {
            TallyChannel::Vacancies => "Vacancies",
            TallyChannel::Implantations => "Implantations",
            TallyChannel::Replacements => "Replacements",
            TallyChannel::Recombinations => "Recombinations",
            TallyChannel::Displacements => "Displacements",
            TallyChannel::Ionization => "Ionization",
            TallyChannel::Lattice => "Lattice",
            TallyChannel::Stored => "Stored",
            TallyChannel::Lost => "Lost",
            TallyChannel::IonExits => "IonExits",
            TallyChannel::Pka => "Pka",
            TallyChannel::PkaEnergy => "Pka_energy",
            TallyChannel::Tdam => "Tdam",
            TallyChannel::TdamLss => "Tdam_LSS",
            TallyChannel::Vnrt => "Vnrt",
            TallyChannel::VnrtLss => "Vnrt_LSS",
            TallyChannel::FlightPath => "Flight_path",
            TallyChannel::Collisions => "Collisions",
        }
    }
}

/// Events recognized by [`Tally::record`], one per reason an ion's segment
/// counters get flushed into the accumulators.
pub enum TallyEvent {
    BoundaryCrossing,
    /// A moving ion replaced a lattice atom; `replaced_atom_id` identifies
    /// the species it displaced.
    Replacement { replaced_atom_id: u16 },
    IonStop,
    IonExit,
    /// A cascade finished; carries the PKA's initial recoil energy and the
    /// damage-energy/NRT-vacancy estimates (direct and LSS).
    CascadeComplete { pka_energy: f32, tdam: f32, tdam_lss: f32, vnrt: f32, vnrt_lss: f32 },
}

/// `(n_atoms, n_cells)`-shaped accumulators, one `ArrayND` per channel.
#[derive(Clone)]
pub struct Tally {
    n_atoms: usize,
    n_cells: usize,
    channels: Vec<ArrayND>,
}

impl Tally {
    pub fn new(n_atoms: usize, n_cells: usize) -> Self {
        Self {
            n_atoms,
            n_cells,
            channels: (0..N_CHANNELS).map(|_| ArrayND::zeros(&[n_atoms, n_cells])).collect(),
        }
    }

    pub fn clear(&mut self) {
        for c in &mut self.channels {
            c.zero();
        }
    }

    pub fn get(&self, channel: TallyChannel, atom_id: usize, cell_id: usize) -> f64 {
        self.channels[channel as usize].get(&[atom_id, cell_id])
    }

    /// Total of one channel across every atom/cell, used by the driver to
    /// read back a per-cascade scratch tally's accumulated electronic loss.
    pub fn channel_sum(&self, channel: TallyChannel) -> f64 {
        self.channels[channel as usize].as_slice().iter().sum()
    }

    fn add(&mut self, channel: TallyChannel, atom_id: usize, cell_id: usize, value: f64) {
        if cell_id >= self.n_cells || atom_id >= self.n_atoms {
            return;
        }
        *self.channels[channel as usize].get_mut(&[atom_id, cell_id]) += value;
    }

    fn inc(&mut self, channel: TallyChannel, atom_id: usize, cell_id: usize) {
        self.add(channel, atom_id, cell_id, 1.0);
    }

    fn dec(&mut self, channel: TallyChannel, atom_id: usize, cell_id: usize) {
        self.add(channel, atom_id, cell_id, -1.0);
    }

    /// Score one event for `ion`, flushing and clearing its segment counters.
    pub fn record(&mut self, event: TallyEvent, ion: &mut IonState, target: &Target) {
        let iid = ion.atom_ref as usize;
        let cid = ion.cell_id.max(0) as usize;
        let pid = ion.prev_cell_id.max(0) as usize;
        let cid0 = ion.cell_id0.max(0) as usize;
        let el = target.atom(ion.atom_ref).el;

        match event {
            TallyEvent::BoundaryCrossing => {
                self.add(TallyChannel::Collisions, iid, pid, ion.counters.ncoll as f64);
                self.add(TallyChannel::FlightPath, iid, pid, ion.counters.path as f64);
                self.add(TallyChannel::Lattice, iid, pid, ion.counters.phonon as f64);
                self.add(TallyChannel::Ionization, iid, pid, ion.counters.ionization as f64);
            }
            TallyEvent::Replacement { replaced_atom_id } => {
                let replaced = replaced_atom_id as usize;
                self.inc(TallyChannel::Replacements, iid, cid);
                self.dec(TallyChannel::Vacancies, replaced, cid);
                let el_replaced = target.atom(replaced_atom_id).el;
                self.add(TallyChannel::Stored, replaced, cid, -(el_replaced as f64) / 2.0);
                self.add(TallyChannel::Lattice, replaced, cid, el_replaced as f64 / 2.0);
                if ion.recoil_id != 0 {
                    self.inc(TallyChannel::Displacements, iid, cid0);
                    self.inc(TallyChannel::Vacancies, iid, cid0);
                    self.add(TallyChannel::Stored, iid, cid0, el as f64 / 2.0);
                    self.add(TallyChannel::Lattice, iid, cid, el as f64 / 2.0);
                }
                self.add(TallyChannel::Collisions, iid, cid, ion.counters.ncoll as f64);
                self.add(TallyChannel::FlightPath, iid, cid, ion.counters.path as f64);
                self.add(TallyChannel::Ionization, iid, cid, ion.counters.ionization as f64);
                self.add(TallyChannel::Lattice, iid, cid, (ion.energy + ion.counters.phonon) as f64);
            }
            TallyEvent::IonStop => {
                self.inc(TallyChannel::Implantations, iid, cid);
                if ion.recoil_id != 0 {
                    self.inc(TallyChannel::Displacements, iid, cid0);
                    self.inc(TallyChannel::Vacancies, iid, cid0);
                    self.add(TallyChannel::Stored, iid, cid0, el as f64 / 2.0);
                    self.add(TallyChannel::Stored, iid, cid, el as f64 / 2.0);
                }
                self.add(TallyChannel::Collisions, iid, cid, ion.counters.ncoll as f64);
                self.add(TallyChannel::FlightPath, iid, cid, ion.counters.path as f64);
                self.add(TallyChannel::Ionization, iid, cid, ion.counters.ionization as f64);
                self.add(TallyChannel::Lattice, iid, cid, (ion.energy + ion.counters.phonon) as f64);
            }
            TallyEvent::IonExit => {
                self.inc(TallyChannel::IonExits, iid, pid);
                if ion.recoil_id != 0 {
                    self.inc(TallyChannel::Displacements, iid, cid0);
                    self.inc(TallyChannel::Vacancies, iid, cid0);
                    self.add(TallyChannel::Stored, iid, cid0, el as f64 / 2.0);
                    self.add(TallyChannel::Lattice, iid, cid, el as f64 / 2.0);
                }
                self.add(TallyChannel::Collisions, iid, pid, ion.counters.ncoll as f64);
                self.add(TallyChannel::FlightPath, iid, pid, ion.counters.path as f64);
                self.add(TallyChannel::Ionization, iid, pid, ion.counters.ionization as f64);
                self.add(TallyChannel::Lattice, iid, pid, ion.counters.phonon as f64);
                self.add(TallyChannel::Lost, iid, pid, ion.energy as f64);
            }
            TallyEvent::CascadeComplete { pka_energy, tdam, tdam_lss, vnrt, vnrt_lss } => {
                self.inc(TallyChannel::Pka, iid, cid);
                self.add(TallyChannel::PkaEnergy, iid, cid, pka_energy as f64);
                self.add(TallyChannel::TdamLss, iid, cid, tdam_lss as f64);
                self.add(TallyChannel::VnrtLss, iid, cid, vnrt_lss as f64);
                self.add(TallyChannel::Tdam, iid, cid, tdam as f64);
                self.add(TallyChannel::Vnrt, iid, cid, vnrt as f64);
            }
        }
        ion.counters.reset();
    }

    /// Record one recombination event (per [`crate::cascade::CascadeEngine::count_riv`]).
    pub fn record_recombination(&mut self, atom_id: u16, cell_id: i32) {
        if cell_id < 0 {
            return;
        }
        self.inc(TallyChannel::Recombinations, atom_id as usize, cell_id as usize);
    }

    /// Flatten every channel to a plain `Vec<f64>`, for a save/load
    /// collaborator that doesn't know about `ArrayND`.
    pub fn to_vecs(&self) -> Vec<Vec<f64>> {
        self.channels.iter().map(|c| c.as_slice().to_vec()).collect()
    }

    /// Rebuild a `Tally` from [`Tally::to_vecs`]'s output.
    pub fn from_vecs(n_atoms: usize, n_cells: usize, data: Vec<Vec<f64>>) -> Self {
        let mut tally = Self::new(n_atoms, n_cells);
        for (c, values) in tally.channels.iter_mut().zip(data.into_iter()) {
            c.as_mut_slice().copy_from_slice(&values);
        }
        tally
    }

    pub fn add_assign(&mut self, other: &Tally) {
        for c in ALL_CHANNELS {
            self.channels[c as usize].add_assign(&other.channels[c as usize]);
        }
    }

    pub fn add_assign_squared(&mut self, other: &Tally) {
        for c in ALL_CHANNELS {
            self.channels[c as usize].add_assign_squared(&other.channels[c as usize]);
        }
    }
}

/// Running total and total-of-squares across histories, for per-channel
/// mean and standard error.
pub struct TallyAccumulator {
    pub total: Tally,
    pub total_sq: Tally,
    pub histories: u64,
}

impl TallyAccumulator {
    pub fn new(n_atoms: usize, n_cells: usize) -> Self {
        Self { total: Tally::new(n_atoms, n_cells), total_sq: Tally::new(n_atoms, n_cells), histories: 0 }
    }

    /// Fold one history's scratch tally (`tion`) into the running totals.
    pub fn add_history(&mut self, tion: &Tally) {
        self.total.add_assign(tion);
        self.total_sq.add_assign_squared(tion);
        self.histories += 1;
    }

    /// Merge another accumulator's totals into this one (worker merge).
    pub fn merge(&mut self, other: &TallyAccumulator) {
        self.total.add_assign(&other.total);
        self.total_sq.add_assign(&other.total_sq);
        self.histories += other.histories;
    }

    /// Mean and standard error of the mean for one channel/cell/atom:
    /// `Var[mean] = (sum_sq/N - mean^2) / (N-1)`.
    pub fn mean_and_stderr(&self, channel: TallyChannel, atom_id: usize, cell_id: usize) -> (f64, f64) {
        if self.histories == 0 {
            return (0.0, 0.0);
        }
        let n = self.histories as f64;
        let sum = self.total.get(channel, atom_id, cell_id);
        let sum_sq = self.total_sq.get(channel, atom_id, cell_id);
        let mean = sum / n;
        if self.histories == 1 {
            return (mean, 0.0);
        }
        let var_of_mean = (((sum_sq / n) - mean * mean) / (n - 1.0)).max(0.0);
        (mean, var_of_mean.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CellCoord, Grid};
    use crate::target::{Atom, Material, Region, Target};
    use ultraviolet::Vec3;

    fn target() -> Target {
        let edges = vec![0.0f32, 1.0, 2.0];
        let grid = Grid::new(edges.clone(), edges.clone(), edges, [false, false, false]);
        let materials = vec![Material {
            name: "Si".into(),
            atom_ids: vec![1],
            fractions: vec![1.0],
            density: 50.0,
            color: [0.5, 0.5, 0.5],
        }];
        let regions = vec![Region { id: 0, material_id: 0, origin: [0.0, 0.0, 0.0], size: [2.0, 2.0, 2.0] }];
        let atoms = vec![
            Atom { id: 0, z: 18, m: 40.0, symbol: "Ar".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.0, material_ref: 0 },
            Atom { id: 1, z: 14, m: 28.0, symbol: "Si".into(), ed: 15.0, el: 2.0, es: 4.7, er: 4.7, rc: 0.3, material_ref: 0 },
        ];
        Target::new(grid, materials, regions, atoms).unwrap()
    }

    fn ion() -> IonState {
        let mut ion = IonState::new(Vec3::zero(), Vec3::unit_z(), 1000.0, CellCoord([0, 0, 0]), 0, 0);
        ion.counters.ncoll = 3;
        ion.counters.path = 1.5;
        ion
    }

    #[test]
    fn ion_stop_increments_implantation_and_resets_counters() {
        let tgt = target();
        let mut tally = Tally::new(tgt.n_atoms(), tgt.grid.total_cells());
        let mut i = ion();
        tally.record(TallyEvent::IonStop, &mut i, &tgt);
        assert_eq!(tally.get(TallyChannel::Implantations, 0, 0), 1.0);
        assert_eq!(tally.get(TallyChannel::Collisions, 0, 0), 3.0);
        assert_eq!(i.counters.ncoll, 0);
    }

    #[test]
    fn recoil_ion_stop_adds_a_displacement_and_vacancy_pair() {
        let tgt = target();
        let mut tally = Tally::new(tgt.n_atoms(), tgt.grid.total_cells());
        let mut i = ion();
        i.recoil_id = 7;
        i.atom_ref = 1;
        tally.record(TallyEvent::IonStop, &mut i, &tgt);
        assert_eq!(tally.get(TallyChannel::Displacements, 1, 0), 1.0);
        assert_eq!(tally.get(TallyChannel::Vacancies, 1, 0), 1.0);
    }

    #[test]
    fn accumulator_tracks_mean_and_nonzero_stderr_across_histories() {
        let tgt = target();
        let mut acc = TallyAccumulator::new(tgt.n_atoms(), tgt.grid.total_cells());
        for v in [1.0, 2.0, 3.0] {
            let mut tion = Tally::new(tgt.n_atoms(), tgt.grid.total_cells());
            *tion.channels[TallyChannel::Implantations as usize].get_mut(&[0, 0]) = v;
            acc.add_history(&tion);
        }
        let (mean, stderr) = acc.mean_and_stderr(TallyChannel::Implantations, 0, 0);
        assert!((mean - 2.0).abs() < 1e-9);
        assert!(stderr > 0.0);
    }
}
