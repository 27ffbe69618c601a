//! The run orchestrator: owns a dedicated thread pool, dispenses history
//! ids, and drives one worker loop per thread that sources a primary ion,
//! transports it and every recoil/PKA it spawns, folds the history's scratch
//! tally into the shared accumulator, and repeats until `max_no_ions` or an
//! abort request is reached.

use crate::cascade::{CascadeEngine, TimeOrderedCascade, UnorderedCascade};
use crate::config::{Config, NrtCalculation, SimulationType};
use crate::dedx::{apply_stopping, StoppingSource};
use crate::error::{SimError, SimResult};
use crate::event_stream::{DamageEvent, EventStream, ExitEvent, PkaEvent};
use crate::ion::IonQueue;
use crate::nrt::{lss_damage_energy, nrt_vacancies};
use crate::source::source_ion;
use crate::tally::{Tally, TallyAccumulator, TallyChannel, TallyEvent};
use crate::target::Target;
use crate::transport::{PhysicsTables, Transport};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The projectile species always occupies atom index 0 in the target's atom
/// table; target species are appended starting at 1.
const PROJECTILE_ATOM_REF: u16 = 0;

fn material_average_ed(target: &Target, material_idx: usize) -> f32 {
    let material = &target.materials[material_idx];
    material
        .atom_ids
        .iter()
        .zip(material.fractions.iter())
        .map(|(id, frac)| target.atom(*id).ed * frac)
        .sum()
}

/// A point-in-time snapshot logged every `output.storage_interval` histories,
/// for throughput reporting and resumed-run continuity checks.
#[derive(Clone, Copy, Debug)]
pub struct RunHistoryEntry {
    pub ion_count: u64,
    pub elapsed_secs: f64,
}

/// Progress snapshot handed to the caller's callback during `exec`.
#[derive(Clone, Copy, Debug)]
pub struct RunStatus {
    pub ions_run: u64,
    pub max_no_ions: u64,
    pub elapsed_secs: f64,
    pub running: bool,
}

/// A serializable copy of the running tally totals, for `save`/`load`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TallySnapshot {
    n_atoms: usize,
    n_cells: usize,
    histories: u64,
    total: Vec<Vec<f64>>,
    total_sq: Vec<Vec<f64>>,
}

/// Owns the immutable run inputs (target, physics tables, config), the
/// dedicated worker pool, and every piece of mutable run state: the ion
/// counter, the abort flag, the merged tally and event streams.
pub struct Driver {
    config: Config,
    target: Target,
    tables: PhysicsTables,
    pool: rayon::ThreadPool,
    accumulator: Mutex<TallyAccumulator>,
    exit_stream: Mutex<EventStream<ExitEvent>>,
    pka_stream: Mutex<EventStream<PkaEvent>>,
    damage_stream: Mutex<EventStream<DamageEvent>>,
    ion_counter: AtomicU64,
    abort_flag: AtomicBool,
    history: Mutex<Vec<RunHistoryEntry>>,
    started_at: Mutex<Option<Instant>>,
}

impl Driver {
    /// Validate `config`, build every physics table against `source`, and
    /// stand up a thread pool sized to `config.run.threads`.
    pub fn init(config: Config, target: Target, source: &dyn StoppingSource) -> SimResult<Self> {
        config.validate()?;
        let tables = PhysicsTables::build(&config, &target, source)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.run.threads)
            .build()
            .map_err(|e| SimError::Configuration(format!("failed to build worker thread pool: {e}")))?;

        info!(threads = config.run.threads, max_no_ions = config.run.max_no_ions, "driver initialized");
        let n_atoms = target.n_atoms();
        let n_cells = target.grid.total_cells();
        Ok(Self {
            config,
            target,
            tables,
            pool,
            accumulator: Mutex::new(TallyAccumulator::new(n_atoms, n_cells)),
            exit_stream: Mutex::new(EventStream::new()),
            pka_stream: Mutex::new(EventStream::new()),
            damage_stream: Mutex::new(EventStream::new()),
            ion_counter: AtomicU64::new(0),
            abort_flag: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            started_at: Mutex::new(None),
        })
    }

    /// Spawn `config.run.threads` workers on the dedicated pool and block
    /// until every history is run (or `abort()` is called). `progress_cb` is
    /// polled on a separate monitor thread roughly every `poll_interval_ms`.
    pub fn exec<F: Fn(RunStatus) + Send + Sync>(&self, progress_cb: F, poll_interval_ms: u64) -> SimResult<()> {
        self.abort_flag.store(false, Ordering::SeqCst);
        *self.started_at.lock() = Some(Instant::now());
        self.history.lock().clear();
        info!(threads = self.config.run.threads, "starting run");

        let n_threads = self.config.run.threads;
        let active = AtomicUsize::new(n_threads);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                while active.load(Ordering::Acquire) > 0 {
                    progress_cb(self.status());
                    std::thread::sleep(Duration::from_millis(poll_interval_ms.max(1)));
                }
                progress_cb(self.status());
            });

            self.pool.scope(|pool_scope| {
                for worker in 0..n_threads {
                    let active = &active;
                    pool_scope.spawn(move |_| {
                        self.worker_loop(worker as u64);
                        active.fetch_sub(1, Ordering::AcqRel);
                    });
                }
            });
        });

        let status = self.status();
        info!(ions_run = status.ions_run, elapsed_secs = status.elapsed_secs, "run finished");
        Ok(())
    }

    pub fn abort(&self) {
        warn!("abort requested");
        self.abort_flag.store(true, Ordering::SeqCst);
    }

    /// `exec` already blocks until every worker finishes; this exists for
    /// API parity with callers that run `exec` on a background thread of
    /// their own and need something to join on.
    pub fn wait(&self) -> SimResult<()> {
        Ok(())
    }

    pub fn status(&self) -> RunStatus {
        let ions_run = self.ion_counter.load(Ordering::Relaxed).min(self.config.run.max_no_ions);
        RunStatus {
            ions_run,
            max_no_ions: self.config.run.max_no_ions,
            elapsed_secs: self.elapsed_secs(),
            running: ions_run < self.config.run.max_no_ions && !self.abort_flag.load(Ordering::Relaxed),
        }
    }

    pub fn history(&self) -> Vec<RunHistoryEntry> {
        self.history.lock().clone()
    }

    fn elapsed_secs(&self) -> f64 {
        self.started_at.lock().map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }

    pub fn mean_and_stderr(&self, channel: TallyChannel, atom_id: usize, cell_id: usize) -> (f64, f64) {
        self.accumulator.lock().mean_and_stderr(channel, atom_id, cell_id)
    }

    pub fn exit_events(&self) -> EventStream<ExitEvent> {
        self.exit_stream.lock().clone()
    }

    pub fn pka_events(&self) -> EventStream<PkaEvent> {
        self.pka_stream.lock().clone()
    }

    pub fn damage_events(&self) -> EventStream<DamageEvent> {
        self.damage_stream.lock().clone()
    }

    pub fn tally_snapshot(&self) -> TallySnapshot {
        let acc = self.accumulator.lock();
        TallySnapshot {
            n_atoms: self.target.n_atoms(),
            n_cells: self.target.grid.total_cells(),
            histories: acc.histories,
            total: acc.total.to_vecs(),
            total_sq: acc.total_sq.to_vecs(),
        }
    }

    /// Restore a previously saved tally and resume the ion counter from
    /// where it left off, so a follow-up `exec` extends the same run.
    pub fn restore_tally(&self, snapshot: TallySnapshot) {
        let mut acc = self.accumulator.lock();
        acc.total = Tally::from_vecs(snapshot.n_atoms, snapshot.n_cells, snapshot.total);
        acc.total_sq = Tally::from_vecs(snapshot.n_atoms, snapshot.n_cells, snapshot.total_sq);
        acc.histories = snapshot.histories;
        self.ion_counter.store(snapshot.histories, Ordering::SeqCst);
    }

    fn new_cascade_engine(&self) -> Box<dyn CascadeEngine> {
        if self.config.simulation.time_ordered_cascades {
            Box::new(TimeOrderedCascade::new())
        } else {
            Box::new(UnorderedCascade::new())
        }
    }

    /// One worker's share of the run: repeatedly claim the next history id,
    /// source and transport a primary ion plus every PKA/recoil it spawns,
    /// and fold the result into the shared accumulator.
    fn worker_loop(&self, worker_idx: u64) {
        debug!(worker_idx, "worker started");
        let mut rng = SmallRng::seed_from_u64(self.config.run.seed.wrapping_add(worker_idx));
        let mut cascade = self.new_cascade_engine();
        let transport = Transport { target: &self.target, tables: &self.tables, config: &self.config };
        let n_atoms = self.target.n_atoms();
        let n_cells = self.target.grid.total_cells();
        let mut tion = Tally::new(n_atoms, n_cells);
        let mut queue = IonQueue::new();

        let mut local_exit = EventStream::new();
        let mut local_pka = EventStream::new();
        let mut local_damage = EventStream::new();

        loop {
            if self.abort_flag.load(Ordering::Relaxed) {
                break;
            }
            if let Some(max_cpu_time) = self.config.run.max_cpu_time {
                if self.elapsed_secs() > max_cpu_time {
                    warn!(max_cpu_time, "cpu time budget exceeded, stopping run");
                    self.abort_flag.store(true, Ordering::Relaxed);
                    break;
                }
            }
            let history_id = self.ion_counter.fetch_add(1, Ordering::Relaxed);
            if history_id >= self.config.run.max_no_ions {
                break;
            }

            tion.clear();
            cascade.clear();

            self.run_one_history(
                history_id,
                &transport,
                &mut queue,
                cascade.as_mut(),
                &mut tion,
                &mut rng,
                &mut local_exit,
                &mut local_pka,
                &mut local_damage,
            );

            self.accumulator.lock().add_history(&tion);

            let interval = self.config.output.storage_interval.max(1);
            if history_id % interval == 0 {
                self.history.lock().push(RunHistoryEntry { ion_count: history_id + 1, elapsed_secs: self.elapsed_secs() });
            }
        }

        if !local_exit.is_empty() {
            self.exit_stream.lock().merge(local_exit);
        }
        if !local_pka.is_empty() {
            self.pka_stream.lock().merge(local_pka);
        }
        if !local_damage.is_empty() {
            self.damage_stream.lock().merge(local_damage);
        }
        debug!(worker_idx, "worker finished");
    }

    #[allow(clippy::too_many_arguments)]
    fn run_one_history<R: rand::Rng + ?Sized>(
        &self,
        history_id: u64,
        transport: &Transport,
        queue: &mut IonQueue,
        cascade: &mut dyn CascadeEngine,
        tion: &mut Tally,
        rng: &mut R,
        local_exit: &mut EventStream<ExitEvent>,
        local_pka: &mut EventStream<PkaEvent>,
        local_damage: &mut EventStream<DamageEvent>,
    ) {
        let mut primary = source_ion(&self.config.ion_beam, &self.target.grid, PROJECTILE_ATOM_REF, rng);
        primary.history_id = history_id;

        if self.config.simulation.simulation_type == SimulationType::CascadesOnly {
            self.source_as_pka(&mut primary, rng);
            if primary.energy >= self.target.atom(PROJECTILE_ATOM_REF).ed {
                let handle = queue.allocate(primary);
                queue.pka.push_back(handle);
            }
        } else {
            let handle = queue.allocate(primary);
            transport.run_ion(handle, queue, cascade, tion, rng);
            if self.config.output.store_exit_events && queue.get(handle).cell_id < 0 {
                let ion = queue.get(handle);
                local_exit.push(ExitEvent {
                    history_id,
                    atom_id: ion.atom_ref,
                    cell_id: ion.prev_cell_id,
                    energy: ion.energy,
                    pos: [ion.pos.x, ion.pos.y, ion.pos.z],
                    dir: [ion.dir.x, ion.dir.y, ion.dir.z],
                });
            }
            queue.free(handle);
        }

        while let Some(handle) = queue.pka.pop_front() {
            let pka_initial = queue.get(handle).clone();
            let ionization_before = tion.channel_sum(TallyChannel::Ionization);

            transport.run_ion(handle, queue, cascade, tion, rng);
            while let Some(recoil_handle) = queue.recoil.pop_front() {
                transport.run_ion(recoil_handle, queue, cascade, tion, rng);
                queue.free(recoil_handle);
            }
            queue.free(handle);

            let ionization_after = tion.channel_sum(TallyChannel::Ionization);
            let delta_ionization = (ionization_after - ionization_before) as f32;
            let atom = self.target.atom(pka_initial.atom_ref);
            let tdam = (pka_initial.energy - delta_ionization).max(0.0);
            let ed = match self.config.simulation.nrt_calculation {
                NrtCalculation::Element => atom.ed,
                NrtCalculation::Average => self
                    .target
                    .material_index_at(pka_initial.cell_id)
                    .map(|idx| material_average_ed(&self.target, idx))
                    .unwrap_or(atom.ed),
            };
            let tdam_lss = lss_damage_energy(pka_initial.energy, atom.z, atom.m);
            let vnrt = nrt_vacancies(tdam, ed);
            let vnrt_lss = nrt_vacancies(tdam_lss, ed);

            let mut cascade_complete_ion = pka_initial.clone();
            tion.record(
                TallyEvent::CascadeComplete { pka_energy: pka_initial.energy, tdam, tdam_lss, vnrt, vnrt_lss },
                &mut cascade_complete_ion,
                &self.target,
            );

            if self.config.output.store_pka_events {
                let mut event = PkaEvent::new(
                    history_id,
                    pka_initial.atom_ref,
                    [pka_initial.pos.x, pka_initial.pos.y, pka_initial.pos.z],
                    pka_initial.energy,
                    self.target.n_atoms(),
                );
                event.tdam = tdam;
                event.tdam_lss = tdam_lss;
                event.nrt = vnrt;
                event.nrt_lss = vnrt_lss;
                local_pka.push(event);
            }
        }

        if self.config.simulation.intra_cascade_recombination {
            cascade.recombine(&self.target.grid, &self.target.atoms);
            for pair in cascade.recombined_pairs() {
                if !self.config.simulation.correlated_recombination || pair.is_correlated() {
                    tion.record_recombination(pair.vacancy.atom_id, pair.vacancy.cell_id);
                }
                if self.config.output.store_damage_events {
                    let v = &pair.vacancy;
                    local_damage.push(DamageEvent {
                        history_id,
                        recoil_id: v.recoil_id,
                        atom_id: v.atom_id,
                        is_interstitial: false,
                        pos: [v.pos.x, v.pos.y, v.pos.z],
                    });
                }
            }
        }

        if self.config.output.store_damage_events {
            for d in cascade.remaining_vacancies() {
                local_damage.push(DamageEvent {
                    history_id,
                    recoil_id: d.recoil_id,
                    atom_id: d.atom_id,
                    is_interstitial: false,
                    pos: [d.pos.x, d.pos.y, d.pos.z],
                });
            }
            for d in cascade.remaining_interstitials() {
                local_damage.push(DamageEvent {
                    history_id,
                    recoil_id: d.recoil_id,
                    atom_id: d.atom_id,
                    is_interstitial: true,
                    pos: [d.pos.x, d.pos.y, d.pos.z],
                });
            }
        }
    }

    /// `CascadesOnly`: the source emits the PKA itself rather than a
    /// transportable projectile, so the lattice binding energy is paid up
    /// front and, optionally, the PKA is nudged out to its recombination
    /// radius before entering the PKA queue.
    fn source_as_pka<R: rand::Rng + ?Sized>(&self, pka: &mut crate::ion::IonState, rng: &mut R) {
        let atom = self.target.atom(PROJECTILE_ATOM_REF);
        let t0 = pka.energy;
        pka.energy = (pka.energy - atom.el).max(0.0);
        pka.recoil_id = 1;

        if self.config.simulation.move_recoil {
            let grid = &self.target.grid;
            let mut pos = pka.pos;
            let mut cell = pka.cell_id;
            grid.propagate(atom.rc, &mut pos, pka.dir, &mut cell);
            pka.pos = pos;
            pka.cell_id = cell;

            if let Some(material_idx) = self.target.material_index_at(cell) {
                let stopping = self.tables.stopping(PROJECTILE_ATOM_REF, material_idx);
                let straggling = self.tables.straggling(PROJECTILE_ATOM_REF, material_idx);
                let e_before = pka.energy;
                let moved = apply_stopping(stopping, straggling, pka.energy, atom.rc, rng);
                pka.energy = moved;
                if self.config.simulation.recoil_sub_ed {
                    let de = (e_before - moved) + atom.ed - t0;
                    pka.deposit_phonon(de.max(0.0));
                }
            }
        }
    }

}
