//! Main autonomous executable entry point.
//!
//! # Architecture
//!
//! The executable runs one autonomous routine against a simulated drivetrain:
//!
//!     - Initialise the session, logging and parameters
//!     - Load the routine's trajectories and build the routine:
//!         - Reset odometry to the start of the first trajectory
//!         - Follow each trajectory once the previous one is done
//!         - Log each configured event marker as it is passed
//!     - Main loop:
//!         - Command scheduler tick (routine poll, trajectory following)
//!         - Simulated drivetrain processing
//!     - Exit once the routine finishes or the cycle limit is reached
//!
//! # Modules
//!
//! Cyclic modules (e.g. `sim_drive`) provide a public struct implementing the
//! `util::module::State` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, trace, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use auto_lib::{
    alert::{AlertLevel, Alerts},
    auto::{AutoFactory, AutoIo, AutoTrajectory},
    clock::ManualClock,
    command::{CommandScheduler, InstantCommand},
    flip::{Alliance, AllianceContext},
    follow_ctrl::{self, FollowCtrl},
    geometry::{ChassisSpeeds, Pose},
    params::{AutoExecParams, AutoParams},
    sample::{DifferentialSample, SwerveSample, TrajectorySample},
    sim_drive::{self, SimDrive},
    store::{self, AnyTrajectory, DirStore},
    traj_log::SessionTrajectoryLogger,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Command line options
#[derive(Debug, StructOpt)]
#[structopt(name = "auto_exec", about = "Run an autonomous routine against a simulated drivetrain")]
struct Opt {
    /// Alliance to play for, one of "red", "blue" or "unknown". Overrides `exec.toml`.
    #[structopt(short, long)]
    alliance: Option<AllianceArg>,

    /// Stop after this many cycles even if the routine hasn't finished
    #[structopt(short, long)]
    cycles: Option<u64>,

    /// Run cycles in real time rather than as fast as possible
    #[structopt(short, long)]
    realtime: bool,
}

/// Parameters loaded at startup, shared by every sample kind.
struct ExecSetup {
    exec: AutoExecParams,
    auto: AutoParams,
    sim_drive: sim_drive::Params,
    follow_ctrl: follow_ctrl::Params,
    alliance: AllianceContext,
    store: DirStore,
}

/// Result of running the routine, archived to the session.
#[derive(Debug, serde::Serialize)]
struct RunSummary {
    routine: String,
    finished_at: String,
    num_cycles: u64,
    num_overruns: u64,
    finished: bool,
    killed: bool,
    final_pose: Pose,
    num_warnings: usize,
    num_errors: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq)]
enum AllianceArg {
    Red,
    Blue,
    Unknown,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("auto_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Autonomous Trajectory Executable\n");
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let exec: AutoExecParams =
        util::params::load("exec.toml").wrap_err("Could not load exec params")?;
    let auto: AutoParams = util::params::load("auto.toml").wrap_err("Could not load auto params")?;
    let sim_drive: sim_drive::Params =
        util::params::load("sim_drive.toml").wrap_err("Could not load SimDrive params")?;
    let follow_ctrl: follow_ctrl::Params =
        util::params::load("follow_ctrl.toml").wrap_err("Could not load FollowCtrl params")?;

    info!("Exec parameters loaded");

    let alliance = match opt.alliance {
        Some(a) => a,
        None => exec
            .default_alliance
            .parse()
            .wrap_err("Invalid default alliance in exec params")?,
    }
    .alliance();
    info!("Alliance: {:?}", alliance);

    let alliance = auto
        .alliance_context(Rc::new(move || alliance))
        .wrap_err("Invalid alliance flipper params")?;

    let trajectory_dir = host::get_auto_sw_root()
        .wrap_err("The software root (AUTO_SW_ROOT) is not set")?
        .join(&auto.trajectory_dir);
    info!("Loading trajectories from {:?}", trajectory_dir);

    let setup = ExecSetup {
        exec,
        auto,
        sim_drive,
        follow_ctrl,
        alliance,
        store: DirStore::new(trajectory_dir),
    };

    // ---- DETECT SAMPLE KIND ----

    let first = setup
        .exec
        .trajectories
        .first()
        .ok_or_else(|| eyre!("No trajectories are configured in exec params"))?;

    let summary = match store::load_any(&setup.store, first)
        .wrap_err_with(|| format!("Failed to load the first trajectory \"{}\"", first))?
    {
        AnyTrajectory::Swerve(_) => run::<SwerveSample>(&setup, &opt),
        AnyTrajectory::Differential(_) => run::<DifferentialSample>(&setup, &opt),
    }?;

    info!("{:#?}", summary);
    session::save("summary.json", summary);

    // ---- SHUTDOWN ----

    info!("End of execution");
    session.exit();

    Ok(())
}

/// Build the routine for trajectories with samples of kind `S` and run it to completion.
fn run<S: TrajectorySample>(setup: &ExecSetup, opt: &Opt) -> Result<RunSummary, Report> {
    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let clock = Rc::new(ManualClock::new());

    let sim = Rc::new(RefCell::new(SimDrive::default()));
    sim.borrow_mut()
        .init(setup.sim_drive.clone())
        .wrap_err("Failed to initialise SimDrive")?;
    info!("SimDrive init complete");

    let mut follow = FollowCtrl::new(setup.follow_ctrl.clone(), clock.clone());
    info!("FollowCtrl init complete");

    info!("Module initialisation complete\n");

    // ---- BUILD ROUTINE ----

    let demand = Rc::new(Cell::new(ChassisSpeeds::zero()));

    let io = {
        let (pose_sim, reset_sim, d) = (sim.clone(), sim.clone(), demand.clone());

        AutoIo::new(
            move || pose_sim.borrow().pose(),
            move |pose: &Pose| reset_sim.borrow_mut().reset(pose),
            move |pose: &Pose, sample: &S| follow.calculate(pose, sample),
            move |speeds: &ChassisSpeeds| d.set(*speeds),
        )
        .with_logger(SessionTrajectoryLogger::new(setup.alliance.clone()))
    };

    let scheduler = CommandScheduler::new();
    let alerts = Alerts::new();
    let factory = AutoFactory::new(
        io,
        setup.alliance.clone(),
        &setup.auto,
        Box::new(setup.store.clone()),
        scheduler.clone(),
        clock.clone(),
        alerts.clone(),
    );

    for event in &setup.exec.logged_events {
        let name = event.clone();
        factory.bind(event, move || {
            let name = name.clone();
            InstantCommand::new(format!("log {}", name), move || {
                info!("Passed event \"{}\"", name)
            })
            .boxed()
        });
    }

    let routine = factory.new_routine(&setup.exec.routine_name);
    let trajectories: Vec<AutoTrajectory<S>> = setup
        .exec
        .trajectories
        .iter()
        .map(|name| factory.trajectory(&routine, name))
        .collect();

    let (first, last) = match (trajectories.first(), trajectories.last()) {
        (Some(f), Some(l)) => (f.clone(), l.clone()),
        _ => return Err(eyre!("The routine has no trajectories")),
    };

    routine.active().on_true({
        let scheduler = scheduler.clone();
        move || {
            scheduler.schedule(first.reset_odometry());
            scheduler.schedule(first.cmd());
        }
    });

    for pair in trajectories.windows(2) {
        let scheduler = scheduler.clone();
        let next = pair[1].clone();
        pair[0]
            .done()
            .on_true(move || scheduler.schedule(next.cmd()));
    }

    let finished = Rc::new(Cell::new(false));
    last.done().on_true({
        let finished = finished.clone();
        move || {
            info!("Routine complete");
            finished.set(true)
        }
    });

    scheduler.schedule(routine.cmd_until(&last.done()));

    info!(
        "Routine \"{}\" built with {} trajectories ({:.2} s)",
        routine.name(),
        trajectories.len(),
        trajectories.iter().map(|t| t.total_time_s()).sum::<f64>()
    );

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let cycle_period_s = setup.exec.cycle_period_s;
    let mut num_cycles = 0u64;
    let mut num_overruns = 0u64;

    while scheduler.num_running() > 0 {
        if let Some(max) = opt.cycles {
            if num_cycles >= max {
                warn!("Cycle limit of {} reached before the routine finished", max);
                break;
            }
        }

        let cycle_start_instant = Instant::now();

        // ---- AUTONOMY PROCESSING ----

        clock.advance(cycle_period_s);
        scheduler.run();

        // ---- DRIVETRAIN PROCESSING ----

        let input = sim_drive::InputData {
            demand: demand.get(),
            dt_s: cycle_period_s,
        };
        match sim.borrow_mut().proc(&input) {
            Ok((o, r)) => trace!("SimDrive output: {:?}, report: {:?}", o, r),
            Err(e) => warn!("Error during SimDrive processing: {}", e),
        }

        num_cycles += 1;

        // ---- CYCLE MANAGEMENT ----

        if opt.realtime {
            let cycle_dur = Instant::now() - cycle_start_instant;

            match Duration::from_secs_f64(cycle_period_s).checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => {
                    warn!(
                        "Cycle overran by {:.06} s",
                        cycle_dur.as_secs_f64() - cycle_period_s
                    );
                    num_overruns += 1;
                }
            }
        }
    }

    let final_pose = sim.borrow().pose();
    info!("Final pose: {:?}", final_pose);

    for alert in alerts.all() {
        info!("Alert raised during the routine: {:?}", alert);
    }

    Ok(RunSummary {
        routine: routine.name().to_string(),
        finished_at: Utc::now().to_rfc3339(),
        num_cycles,
        num_overruns,
        finished: finished.get(),
        killed: routine.is_killed(),
        final_pose,
        num_warnings: alerts.count(AlertLevel::Warning),
        num_errors: alerts.count(AlertLevel::Error),
    })
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AllianceArg {
    fn alliance(self) -> Option<Alliance> {
        match self {
            AllianceArg::Red => Some(Alliance::Red),
            AllianceArg::Blue => Some(Alliance::Blue),
            AllianceArg::Unknown => None,
        }
    }
}

impl FromStr for AllianceArg {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "red" => Ok(AllianceArg::Red),
            "blue" => Ok(AllianceArg::Blue),
            "unknown" => Ok(AllianceArg::Unknown),
            _ => Err(eyre!(
                "Expected an alliance of \"red\", \"blue\" or \"unknown\", found \"{}\"",
                s
            )),
        }
    }
}
