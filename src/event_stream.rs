//! Per-worker, append-only binary event records. Each worker owns one
//! in-memory stream per event kind; the driver concatenates them at
//! `wait()` rather than writing through to disk itself.

use serde::{Deserialize, Serialize};

/// One exiting-ion record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ExitEvent {
    pub history_id: u64,
    pub atom_id: u16,
    pub cell_id: i32,
    pub energy: f32,
    pub pos: [f32; 3],
    pub dir: [f32; 3],
}

/// One vacancy/interstitial creation record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DamageEvent {
    pub history_id: u64,
    pub recoil_id: u32,
    pub atom_id: u16,
    pub is_interstitial: bool,
    pub pos: [f32; 3],
}

/// A PKA cascade's accumulated outcome: created once the PKA is spawned and
/// filled in as the cascade is transported and recombined.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PkaEvent {
    pub ion_id: u64,
    pub atom_id: u16,
    pub pos: [f32; 3],
    pub recoil_energy: f32,
    pub tdam: f32,
    pub tdam_lss: f32,
    pub nrt: f32,
    pub nrt_lss: f32,
    /// Per-target-atom `[vacancies, implantations, recombinations, correlated_recombinations]`.
    pub per_atom: Vec<[f32; 4]>,
}

impl PkaEvent {
    pub fn new(ion_id: u64, atom_id: u16, pos: [f32; 3], recoil_energy: f32, n_atoms: usize) -> Self {
        Self {
            ion_id,
            atom_id,
            pos,
            recoil_energy,
            tdam: 0.0,
            tdam_lss: 0.0,
            nrt: 0.0,
            nrt_lss: 0.0,
            per_atom: vec![[0.0; 4]; n_atoms],
        }
    }
}

/// An append-only, in-memory buffer of fixed-layout records of type `T`,
/// owned by one worker and merged into another stream at the end of a run.
#[derive(Clone, Debug, Default)]
pub struct EventStream<T> {
    records: Vec<T>,
}

impl<T> EventStream<T> {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn push(&mut self, event: T) {
        self.records.push(event);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn merge(&mut self, other: EventStream<T>) {
        self.records.extend(other.records);
    }
}

impl<T: Serialize> EventStream<T> {
    /// Serialize every record, length-prefixed, for handoff to a persistence
    /// collaborator.
    pub fn to_bincode(&self) -> crate::error::SimResult<Vec<u8>> {
        let mut out = Vec::new();
        for record in &self.records {
            let bytes = bincode::serialize(record)
                .map_err(|e| crate::error::SimError::TableGeneration(e.to_string()))?;
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }
}
