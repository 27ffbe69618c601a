//! Per-cascade vacancy/interstitial bookkeeping and intra-cascade
//! recombination, in time-ordered or unordered variants sharing one
//! `CascadeEngine` interface.

use crate::geometry::Grid;
use crate::target::Atom;
use ultraviolet::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefectKind {
    Vacancy,
    Interstitial,
}

#[derive(Clone, Debug)]
pub struct Defect {
    pub kind: DefectKind,
    pub history_id: u64,
    pub recoil_id: u32,
    pub cell_id: i32,
    pub time: f32,
    pub pos: Vec3,
    pub atom_id: u16,
    pub pair_id: u64,
}

/// One recombined interstitial/vacancy pair.
#[derive(Clone, Debug)]
pub struct FrenkelPair {
    pub interstitial: Defect,
    pub vacancy: Defect,
}

impl FrenkelPair {
    pub fn is_correlated(&self) -> bool {
        self.interstitial.pair_id == self.vacancy.pair_id
    }
}

fn distance(grid: &Grid, a: Vec3, b: Vec3) -> f32 {
    let mut d = b - a;
    for axis in 0..3 {
        if grid.is_periodic(axis) {
            let span = grid.size()[axis];
            let mut delta = d[axis];
            delta -= span * (delta / span).round();
            d[axis] = delta;
        }
    }
    d.mag()
}

/// Find, among `candidates` of the same species within `rc`, the closest
/// one to `defect`, returning its index.
fn find_partner(grid: &Grid, defect: &Defect, candidates: &[Defect], rc: f32) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, d)| d.atom_id == defect.atom_id)
        .map(|(i, d)| (i, distance(grid, defect.pos, d.pos)))
        .filter(|(_, dist)| *dist < rc)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
        .map(|(i, _)| i)
}

/// Shared behaviour of the time-ordered and unordered cascade engines.
pub trait CascadeEngine {
    fn push_vacancy(&mut self, d: Defect);
    fn push_interstitial(&mut self, d: Defect);
    fn recombine(&mut self, grid: &Grid, atoms: &[Atom]);
    fn remaining_vacancies(&self) -> &[Defect];
    fn remaining_interstitials(&self) -> &[Defect];
    fn recombined_pairs(&self) -> &[FrenkelPair];
    fn clear(&mut self);

    /// Per-atom-species recombination counts: total and correlated.
    fn count_riv(&self, n_atoms: usize) -> (Vec<u32>, Vec<u32>) {
        let mut total = vec![0u32; n_atoms];
        let mut correlated = vec![0u32; n_atoms];
        for pair in self.recombined_pairs() {
            let idx = pair.interstitial.atom_id as usize - 1;
            total[idx] += 1;
            if pair.is_correlated() {
                correlated[idx] += 1;
            }
        }
        (total, correlated)
    }
}

/// Vacancies and interstitials are merged into one time-ordered stream and
/// recombination attempted as each is popped, oldest first.
#[derive(Default)]
pub struct TimeOrderedCascade {
    pending: Vec<Defect>,
    vacancies: Vec<Defect>,
    interstitials: Vec<Defect>,
    pairs: Vec<FrenkelPair>,
}

impl TimeOrderedCascade {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CascadeEngine for TimeOrderedCascade {
    fn push_vacancy(&mut self, d: Defect) {
        self.pending.push(d);
    }

    fn push_interstitial(&mut self, d: Defect) {
        self.pending.push(d);
    }

    fn recombine(&mut self, grid: &Grid, atoms: &[Atom]) {
        self.pending.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());
        for d in self.pending.drain(..) {
            let rc = atoms[d.atom_id as usize].rc;
            match d.kind {
                DefectKind::Vacancy => match find_partner(grid, &d, &self.interstitials, rc) {
                    Some(idx) => {
                        let i = self.interstitials.remove(idx);
                        self.pairs.push(FrenkelPair { interstitial: i, vacancy: d });
                    }
                    None => self.vacancies.push(d),
                },
                DefectKind::Interstitial => match find_partner(grid, &d, &self.vacancies, rc) {
                    Some(idx) => {
                        let v = self.vacancies.remove(idx);
                        self.pairs.push(FrenkelPair { interstitial: d, vacancy: v });
                    }
                    None => self.interstitials.push(d),
                },
            }
        }
    }

    fn remaining_vacancies(&self) -> &[Defect] {
        &self.vacancies
    }

    fn remaining_interstitials(&self) -> &[Defect] {
        &self.interstitials
    }

    fn recombined_pairs(&self) -> &[FrenkelPair] {
        &self.pairs
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.vacancies.clear();
        self.interstitials.clear();
        self.pairs.clear();
    }
}

/// Interstitials are loaded first, then each vacancy searches them in
/// arrival order rather than time order.
#[derive(Default)]
pub struct UnorderedCascade {
    vacancies_in: Vec<Defect>,
    interstitials: Vec<Defect>,
    vacancies: Vec<Defect>,
    pairs: Vec<FrenkelPair>,
}

impl UnorderedCascade {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CascadeEngine for UnorderedCascade {
    fn push_vacancy(&mut self, d: Defect) {
        self.vacancies_in.push(d);
    }

    fn push_interstitial(&mut self, d: Defect) {
        self.interstitials.push(d);
    }

    fn recombine(&mut self, grid: &Grid, atoms: &[Atom]) {
        for d in self.vacancies_in.drain(..) {
            let rc = atoms[d.atom_id as usize].rc;
            match find_partner(grid, &d, &self.interstitials, rc) {
                Some(idx) => {
                    let i = self.interstitials.remove(idx);
                    self.pairs.push(FrenkelPair { interstitial: i, vacancy: d });
                }
                None => self.vacancies.push(d),
            }
        }
    }

    fn remaining_vacancies(&self) -> &[Defect] {
        &self.vacancies
    }

    fn remaining_interstitials(&self) -> &[Defect] {
        &self.interstitials
    }

    fn recombined_pairs(&self) -> &[FrenkelPair] {
        &self.pairs
    }

    fn clear(&mut self) {
        self.vacancies_in.clear();
        self.interstitials.clear();
        self.vacancies.clear();
        self.pairs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        let edges = vec![0.0f32, 10.0];
        Grid::new(edges.clone(), edges.clone(), edges, [false, false, false])
    }

    fn atoms() -> Vec<Atom> {
        vec![
            Atom { id: 0, z: 18, m: 40.0, symbol: "Ar".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.0, material_ref: 0 },
            Atom { id: 1, z: 14, m: 28.0, symbol: "Si".into(), ed: 15.0, el: 2.0, es: 4.7, er: 4.7, rc: 0.5, material_ref: 0 },
        ]
    }

    fn defect(kind: DefectKind, pos: Vec3, pair_id: u64, time: f32) -> Defect {
        Defect { kind, history_id: 0, recoil_id: 0, cell_id: 0, time, pos, atom_id: 1, pair_id }
    }

    #[test]
    fn close_pairs_recombine_as_correlated() {
        let mut cascade = TimeOrderedCascade::new();
        cascade.push_vacancy(defect(DefectKind::Vacancy, Vec3::new(1.0, 1.0, 1.0), 42, 0.0));
        cascade.push_interstitial(defect(DefectKind::Interstitial, Vec3::new(1.1, 1.0, 1.0), 42, 1.0));
        cascade.recombine(&grid(), &atoms());
        assert_eq!(cascade.recombined_pairs().len(), 1);
        assert!(cascade.recombined_pairs()[0].is_correlated());
    }

    #[test]
    fn distant_defects_survive_unrecombined() {
        let mut cascade = TimeOrderedCascade::new();
        cascade.push_vacancy(defect(DefectKind::Vacancy, Vec3::new(1.0, 1.0, 1.0), 1, 0.0));
        cascade.push_interstitial(defect(DefectKind::Interstitial, Vec3::new(9.0, 9.0, 9.0), 2, 1.0));
        cascade.recombine(&grid(), &atoms());
        assert!(cascade.recombined_pairs().is_empty());
        assert_eq!(cascade.remaining_vacancies().len(), 1);
        assert_eq!(cascade.remaining_interstitials().len(), 1);
    }

    #[test]
    fn count_riv_matches_recombined_pairs() {
        let mut cascade = UnorderedCascade::new();
        cascade.push_interstitial(defect(DefectKind::Interstitial, Vec3::new(1.0, 1.0, 1.0), 7, 0.0));
        cascade.push_vacancy(defect(DefectKind::Vacancy, Vec3::new(1.05, 1.0, 1.0), 7, 0.0));
        cascade.recombine(&grid(), &atoms());
        let (total, correlated) = cascade.count_riv(2);
        assert_eq!(total[0], 1);
        assert_eq!(correlated[0], 1);
    }
}
