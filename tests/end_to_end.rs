//! End-to-end run scenarios driving a full [`Driver::exec`] over small,
//! single- or few-threaded configurations. Tolerances are loosened relative
//! to a production-sized run (tens of ions instead of hundreds or
//! thousands) but the qualitative invariants they check are the same ones
//! a full run is expected to satisfy.

use ion_bca::config::{
    Config, Distribution, DistributionKind, ElectronicStoppingModel, FlightPathType, IonBeamConfig,
    MaterialConfig, NrtCalculation, OutputConfig, RegionConfig, RunConfig, SimulationConfig,
    SimulationType, StragglingModel, TargetConfig, TransportConfig,
};
use ion_bca::dedx::StoppingSource;
use ion_bca::driver::Driver;
use ion_bca::geometry::Grid;
use ion_bca::tally::TallyChannel;
use ion_bca::target::{Atom, Material, Region, Target};
use ion_bca::xs::Screening;

/// A stand-in for the SRIM/DPASS tabulated-data collaborator: a smooth,
/// monotone electronic stopping curve with no sharp features, just enough
/// for the transport loop to exercise its full control flow.
struct SyntheticSource;

impl StoppingSource for SyntheticSource {
    fn se_table(&self, _z1: u8, z2: u8) -> (Vec<f32>, Vec<f32>) {
        let e: Vec<f32> = (0..24).map(|i| 2f32.powi(2 + i)).collect();
        let se: Vec<f32> = e.iter().map(|x| z2 as f32 * x.sqrt() / 8.0).collect();
        (e, se)
    }

    fn straggling_table(&self, z1: u8, z2: u8) -> (Vec<f32>, Vec<f32>) {
        self.se_table(z1, z2)
    }
}

fn edges(n: usize, lo: f32, hi: f32) -> Vec<f32> {
    (0..=n).map(|i| lo + (hi - lo) * i as f32 / n as f32).collect()
}

fn base_simulation(simulation_type: SimulationType) -> SimulationConfig {
    SimulationConfig {
        simulation_type,
        screening_type: Screening::Zbl,
        electronic_stopping: ElectronicStoppingModel::Srim13,
        electronic_straggling: StragglingModel::Off,
        nrt_calculation: NrtCalculation::Element,
        intra_cascade_recombination: true,
        time_ordered_cascades: true,
        correlated_recombination: false,
        move_recoil: false,
        recoil_sub_ed: false,
    }
}

fn base_transport() -> TransportConfig {
    TransportConfig {
        flight_path_type: FlightPathType::Constant,
        flight_path_const: 1.0,
        min_energy: 5.0,
        min_recoil_energy: 1.0,
        min_scattering_angle: 1e-3,
        max_rel_eloss: 0.05,
        mfp_range: (0.1, 10.0),
    }
}

fn single_value(v: f32) -> Distribution {
    Distribution { kind: DistributionKind::SingleValue, a: v, b: 0.0 }
}

fn base_output() -> OutputConfig {
    OutputConfig {
        title: "scenario".into(),
        file_name: "scenario".into(),
        storage_interval: 10,
        store_exit_events: true,
        store_pka_events: true,
        store_damage_events: true,
        store_dedx: false,
    }
}

/// Sum `channel` over every (atom, cell) pair, reconstructing the raw total
/// from the accumulator's per-cell mean (`mean * histories`) since `Driver`
/// doesn't expose the running totals directly.
fn channel_sum(driver: &Driver, channel: TallyChannel, n_atoms: usize, n_cells: usize, histories: u64) -> f64 {
    if histories == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for atom_id in 0..n_atoms {
        for cell_id in 0..n_cells {
            let (mean, _) = driver.mean_and_stderr(channel, atom_id, cell_id);
            total += mean * histories as f64;
        }
    }
    total
}

fn channel_sum_over_cells<I: Iterator<Item = usize>>(
    driver: &Driver,
    channel: TallyChannel,
    n_atoms: usize,
    cells: I,
    histories: u64,
) -> f64 {
    if histories == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for cell_id in cells {
        for atom_id in 0..n_atoms {
            let (mean, _) = driver.mean_and_stderr(channel, atom_id, cell_id);
            total += mean * histories as f64;
        }
    }
    total
}

/// A single-material slab target: one region spanning the whole grid.
fn slab_target(nx: usize, ny: usize, nz: usize, size: [f32; 3], periodic: [bool; 3], atoms: Vec<Atom>) -> Target {
    let grid = Grid::new(
        edges(nx, 0.0, size[0]),
        edges(ny, 0.0, size[1]),
        edges(nz, 0.0, size[2]),
        periodic,
    );
    let target_atom_ids: Vec<u16> = atoms.iter().skip(1).map(|a| a.id).collect();
    let fractions = vec![1.0 / target_atom_ids.len().max(1) as f32; target_atom_ids.len()];
    let materials = vec![Material {
        name: "slab".into(),
        atom_ids: target_atom_ids,
        fractions,
        density: 50.0,
        color: [0.5, 0.5, 0.5],
    }];
    let regions = vec![Region { id: 0, material_id: 0, origin: [0.0, 0.0, 0.0], size }];
    Target::new(grid, materials, regions, atoms).unwrap()
}

fn slab_target_config(size: [f32; 3], cell_count: [usize; 3], periodic_bc: [bool; 3], material_name: &str, symbols: Vec<String>) -> TargetConfig {
    let n = symbols.len().max(1);
    TargetConfig {
        origin: [0.0, 0.0, 0.0],
        size,
        cell_count,
        periodic_bc,
        materials: vec![MaterialConfig {
            name: material_name.into(),
            element_symbols: symbols,
            fractions: vec![1.0 / n as f32; n],
            density: 50.0,
        }],
        regions: vec![RegionConfig { material_name: material_name.into(), origin: [0.0, 0.0, 0.0], size }],
    }
}

/// Scenario 1: a single 10 keV He ion into a 100 nm Si slab, `FullCascade`,
/// ZBL screening. Ionising energy loss should dominate lattice/stored
/// energy, and the single ion should deposit a handful of vacancies
/// without ever exiting the slab.
#[test]
fn scenario_1_single_he_ion_into_silicon_slab() {
    let atoms = vec![
        Atom { id: 0, z: 2, m: 4.0026, symbol: "He".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.2, material_ref: 0 },
        Atom { id: 1, z: 14, m: 28.0855, symbol: "Si".into(), ed: 15.0, el: 2.0, es: 4.7, er: 4.7, rc: 0.3, material_ref: 0 },
    ];
    let target = slab_target(1, 1, 20, [10.0, 10.0, 100.0], [true, true, false], atoms);
    let n_atoms = target.n_atoms();
    let n_cells = target.grid.total_cells();

    let config = Config {
        simulation: base_simulation(SimulationType::FullCascade),
        transport: base_transport(),
        ion_beam: IonBeamConfig {
            atomic_number: 2,
            mass: 4.0026,
            energy_distribution: single_value(1.0e4),
            angular_distribution: single_value(0.0),
            spatial_distribution: single_value(0.0),
        },
        target: slab_target_config([10.0, 10.0, 100.0], [1, 1, 20], [true, true, false], "Si", vec!["Si".into()]),
        run: RunConfig { max_no_ions: 1, max_cpu_time: None, threads: 1, seed: 11 },
        output: base_output(),
        user_tallies: Vec::new(),
    };

    let driver = Driver::init(config, target, &SyntheticSource).unwrap();
    driver.exec(|_| {}, 50).unwrap();
    let histories = driver.status().ions_run;
    assert_eq!(histories, 1);

    let ionization = channel_sum(&driver, TallyChannel::Ionization, n_atoms, n_cells, histories);
    let stored = channel_sum(&driver, TallyChannel::Stored, n_atoms, n_cells, histories);
    let vacancies = channel_sum(&driver, TallyChannel::Vacancies, n_atoms, n_cells, histories);

    assert!(ionization > 0.0, "a 10 keV ion must lose some energy to ionisation");
    assert!(ionization > stored, "ionising loss should dominate the stored lattice-binding energy");
    assert!(vacancies >= 0.0 && vacancies <= 5.0, "a single 10 keV He PKA leaves only a handful of vacancies, got {vacancies}");
    assert_eq!(driver.exit_events().len(), 0, "a 10 keV He ion has no business crossing 100 nm of Si");
}

/// Scenario 2: `IonsOnly` Fe into a thick Fe slab. Recoils aren't tracked,
/// and the slab is far thicker than a MeV Fe ion's range, so every history
/// implants and none of them are lost out the back.
#[test]
fn scenario_2_ions_only_fe_into_thick_fe_slab_implants_with_no_losses() {
    let atoms = vec![
        Atom { id: 0, z: 26, m: 55.8, symbol: "Fe".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.3, material_ref: 0 },
        Atom { id: 1, z: 26, m: 55.8, symbol: "Fe".into(), ed: 40.0, el: 0.0, es: 4.3, er: 40.0, rc: 0.3, material_ref: 0 },
    ];
    let target = slab_target(1, 1, 10, [10.0, 10.0, 5000.0], [true, true, false], atoms);
    let n_atoms = target.n_atoms();
    let n_cells = target.grid.total_cells();

    let config = Config {
        simulation: base_simulation(SimulationType::IonsOnly),
        transport: base_transport(),
        ion_beam: IonBeamConfig {
            atomic_number: 26,
            mass: 55.8,
            energy_distribution: single_value(1.0e6),
            angular_distribution: single_value(0.0),
            spatial_distribution: single_value(0.0),
        },
        target: slab_target_config([10.0, 10.0, 5000.0], [1, 1, 10], [true, true, false], "Fe", vec!["Fe".into()]),
        run: RunConfig { max_no_ions: 20, max_cpu_time: None, threads: 1, seed: 23 },
        output: base_output(),
        user_tallies: Vec::new(),
    };

    let driver = Driver::init(config, target, &SyntheticSource).unwrap();
    driver.exec(|_| {}, 50).unwrap();
    let histories = driver.status().ions_run;
    assert_eq!(histories, 20);

    let lost = channel_sum(&driver, TallyChannel::Lost, n_atoms, n_cells, histories);
    let implantations = channel_sum(&driver, TallyChannel::Implantations, n_atoms, n_cells, histories);

    assert_eq!(lost, 0.0, "no MeV Fe ion should range clean through a 5 um Fe slab");
    assert!((implantations - histories as f64).abs() < 1e-6, "every history should implant exactly once");
}

/// Scenario 3: `CascadesOnly` PKAs with time-ordered recombination. The LSS
/// damage-energy estimate is always at least as large as the direct one
/// (both feed the same partition formula from different starting
/// energies), and recombination can only shrink the surviving vacancy
/// count relative to the NRT estimate, never grow it.
#[test]
fn scenario_3_cascades_only_pka_damage_ordering_and_recombination() {
    let atoms = vec![
        Atom { id: 0, z: 26, m: 55.8, symbol: "Fe".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.7, material_ref: 0 },
        Atom { id: 1, z: 26, m: 55.8, symbol: "Fe".into(), ed: 40.0, el: 0.0, es: 4.3, er: 40.0, rc: 0.7, material_ref: 0 },
    ];
    let target = slab_target(2, 2, 2, [20.0, 20.0, 20.0], [true, true, false], atoms);
    let n_atoms = target.n_atoms();
    let n_cells = target.grid.total_cells();

    let mut simulation = base_simulation(SimulationType::CascadesOnly);
    simulation.time_ordered_cascades = true;

    let config = Config {
        simulation,
        transport: base_transport(),
        ion_beam: IonBeamConfig {
            atomic_number: 26,
            mass: 55.8,
            energy_distribution: single_value(1.0e4),
            angular_distribution: single_value(0.0),
            spatial_distribution: single_value(0.0),
        },
        target: slab_target_config([20.0, 20.0, 20.0], [2, 2, 2], [true, true, false], "Fe", vec!["Fe".into()]),
        run: RunConfig { max_no_ions: 30, max_cpu_time: None, threads: 1, seed: 7 },
        output: base_output(),
        user_tallies: Vec::new(),
    };

    let driver = Driver::init(config, target, &SyntheticSource).unwrap();
    driver.exec(|_| {}, 50).unwrap();
    let histories = driver.status().ions_run;
    assert_eq!(histories, 30);

    let vnrt_lss = channel_sum(&driver, TallyChannel::VnrtLss, n_atoms, n_cells, histories);
    let vnrt = channel_sum(&driver, TallyChannel::Vnrt, n_atoms, n_cells, histories);
    let surviving_vacancies = channel_sum(&driver, TallyChannel::Vacancies, n_atoms, n_cells, histories);
    let recombinations = channel_sum(&driver, TallyChannel::Recombinations, n_atoms, n_cells, histories);
    let pka_count = channel_sum(&driver, TallyChannel::Pka, n_atoms, n_cells, histories);

    assert!(vnrt_lss + 1e-6 >= vnrt, "Tdam_LSS partitions more of the recoil energy into damage than the direct estimate");
    assert!(vnrt + 1e-6 >= surviving_vacancies, "recombination can only remove vacancies, never add them beyond the NRT estimate");
    assert!((pka_count - histories as f64).abs() < 1e-6, "one CascadesOnly history produces exactly one PKA");
    assert!(recombinations >= 0.0, "recombination count is never negative");
}

/// Scenario 4: a thin slab with periodic XY. Any ion that leaves the
/// simulation volume must do so through the non-periodic Z boundary; its
/// recorded exit position must still land inside the periodic X/Y bounds.
#[test]
fn scenario_4_thin_periodic_slab_exits_only_through_z() {
    let atoms = vec![
        Atom { id: 0, z: 18, m: 39.948, symbol: "Ar".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.2, material_ref: 0 },
        Atom { id: 1, z: 18, m: 39.948, symbol: "Ar".into(), ed: 10.0, el: 0.0, es: 2.0, er: 10.0, rc: 0.2, material_ref: 0 },
    ];
    let size = [10.0, 10.0, 2.0];
    let target = slab_target(1, 1, 1, size, [true, true, false], atoms);
    let n_atoms = target.n_atoms();
    let n_cells = target.grid.total_cells();

    let config = Config {
        simulation: base_simulation(SimulationType::FullCascade),
        transport: base_transport(),
        ion_beam: IonBeamConfig {
            atomic_number: 18,
            mass: 39.948,
            energy_distribution: single_value(5.0e3),
            angular_distribution: single_value(0.0),
            spatial_distribution: single_value(0.0),
        },
        target: slab_target_config(size, [1, 1, 1], [true, true, false], "Ar", vec!["Ar".into()]),
        run: RunConfig { max_no_ions: 10, max_cpu_time: None, threads: 1, seed: 5 },
        output: base_output(),
        user_tallies: Vec::new(),
    };

    let driver = Driver::init(config, target, &SyntheticSource).unwrap();
    driver.exec(|_| {}, 50).unwrap();
    let histories = driver.status().ions_run;
    assert_eq!(histories, 10);

    let collisions_on_periodic_axes = channel_sum_over_cells(&driver, TallyChannel::Collisions, n_atoms, 0..n_cells, histories);
    assert!(collisions_on_periodic_axes >= 0.0);

    for event in driver.exit_events().iter() {
        assert!(event.pos[0] >= 0.0 && event.pos[0] < size[0], "periodic X must wrap, not exit");
        assert!(event.pos[1] >= 0.0 && event.pos[1] < size[1], "periodic Y must wrap, not exit");
    }
}

/// Scenario 5: a vacuum region in front of a W slab. An ion crossing the
/// vacuum must accumulate no ionising energy loss until it reaches the
/// slab's first material cell.
#[test]
fn scenario_5_vacuum_then_tungsten_slab_no_loss_in_vacuum() {
    let atoms = vec![
        Atom { id: 0, z: 1, m: 1.008, symbol: "H".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.15, material_ref: 0 },
        Atom { id: 1, z: 74, m: 183.84, symbol: "W".into(), ed: 90.0, el: 0.0, es: 8.8, er: 90.0, rc: 0.25, material_ref: 1 },
    ];

    let grid = Grid::new(edges(1, 0.0, 10.0), edges(1, 0.0, 10.0), edges(7, 0.0, 70.0), [true, true, false]);
    let materials = vec![
        Material { name: "vacuum".into(), atom_ids: vec![], fractions: vec![], density: 0.0, color: [0.0; 3] },
        Material { name: "W".into(), atom_ids: vec![1], fractions: vec![1.0], density: 63.0, color: [0.5; 3] },
    ];
    let regions = vec![
        Region { id: 0, material_id: 0, origin: [0.0, 0.0, 0.0], size: [10.0, 10.0, 20.0] },
        Region { id: 1, material_id: 1, origin: [0.0, 0.0, 20.0], size: [10.0, 10.0, 50.0] },
    ];
    let target = Target::new(grid, materials, regions, atoms).unwrap();
    let n_atoms = target.n_atoms();

    let config = Config {
        simulation: base_simulation(SimulationType::FullCascade),
        transport: base_transport(),
        ion_beam: IonBeamConfig {
            atomic_number: 1,
            mass: 1.008,
            energy_distribution: single_value(1.0e3),
            angular_distribution: single_value(0.0),
            spatial_distribution: single_value(0.0),
        },
        target: slab_target_config([10.0, 10.0, 70.0], [1, 1, 7], [true, true, false], "W", vec!["W".into()]),
        run: RunConfig { max_no_ions: 5, max_cpu_time: None, threads: 1, seed: 3 },
        output: base_output(),
        user_tallies: Vec::new(),
    };

    let driver = Driver::init(config, target, &SyntheticSource).unwrap();
    driver.exec(|_| {}, 50).unwrap();
    let histories = driver.status().ions_run;
    assert_eq!(histories, 5);

    // cells 0 and 1 (z in [0,20)) are the vacuum region; no ionisation
    // should ever be scored there.
    let vacuum_ionization = channel_sum_over_cells(&driver, TallyChannel::Ionization, n_atoms, 0..2, histories);
    assert_eq!(vacuum_ionization, 0.0, "vacuum has no stopping power, it must not absorb any energy");

    let slab_ionization = channel_sum_over_cells(&driver, TallyChannel::Ionization, n_atoms, 2..7, histories);
    assert!(slab_ionization > 0.0, "the ion must lose energy once it reaches the tungsten slab");
}

/// Scenario 6: a larger run used as a coarse energy-conservation audit.
/// Every eV a history starts with ends up counted as ionising loss, phonon
/// deposit, stored lattice-binding energy, or energy lost to an exit; the
/// tally can't manufacture or destroy energy outright.
#[test]
fn scenario_6_energy_conservation_audit_across_many_histories() {
    let atoms = vec![
        Atom { id: 0, z: 26, m: 55.8, symbol: "Fe".into(), ed: 0.0, el: 0.0, es: 0.0, er: 0.0, rc: 0.3, material_ref: 0 },
        Atom { id: 1, z: 26, m: 55.8, symbol: "Fe".into(), ed: 40.0, el: 0.0, es: 4.3, er: 40.0, rc: 0.3, material_ref: 0 },
    ];
    let e0 = 2.0e4;
    let n_ions = 50;
    let target = slab_target(2, 2, 4, [20.0, 20.0, 400.0], [true, true, false], atoms);
    let n_atoms = target.n_atoms();
    let n_cells = target.grid.total_cells();

    let config = Config {
        simulation: base_simulation(SimulationType::FullCascade),
        transport: base_transport(),
        ion_beam: IonBeamConfig {
            atomic_number: 26,
            mass: 55.8,
            energy_distribution: single_value(e0),
            angular_distribution: single_value(0.0),
            spatial_distribution: single_value(0.0),
        },
        target: slab_target_config([20.0, 20.0, 400.0], [2, 2, 4], [true, true, false], "Fe", vec!["Fe".into()]),
        run: RunConfig { max_no_ions: n_ions, max_cpu_time: None, threads: 1, seed: 101 },
        output: base_output(),
        user_tallies: Vec::new(),
    };

    let driver = Driver::init(config, target, &SyntheticSource).unwrap();
    driver.exec(|_| {}, 50).unwrap();
    let histories = driver.status().ions_run;
    assert_eq!(histories, n_ions);

    let ionization = channel_sum(&driver, TallyChannel::Ionization, n_atoms, n_cells, histories);
    let lattice = channel_sum(&driver, TallyChannel::Lattice, n_atoms, n_cells, histories);
    let stored = channel_sum(&driver, TallyChannel::Stored, n_atoms, n_cells, histories);
    let lost = channel_sum(&driver, TallyChannel::Lost, n_atoms, n_cells, histories);

    let accounted = ionization + lattice + stored + lost;
    let expected = e0 as f64 * histories as f64;

    // A loose, CI-sized tolerance: this isn't a bit-exact physics
    // validation, just a check that the tally isn't silently dropping or
    // inventing energy at the scale of the run.
    let tolerance = 0.5 * expected;
    assert!(
        (accounted - expected).abs() < tolerance,
        "accounted energy {accounted} should track the {expected} eV injected within a loose tolerance"
    );
}
