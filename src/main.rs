use std::{
    path::PathBuf,
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use golrs_dist::{
    dist::{Client, Coordinator, CoordinatorStepper, NodeService, PartitionAgent, Server},
    events,
    io::load_grid,
    Keyboard, LocalStepper, Params, PgmDir, Sim, SimHandle, View,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    /// compute every generation on this node.
    Local,
    /// hand partitions out and synchronise the agents.
    Coordinator,
    /// compute one partition for a coordinator.
    Agent,
    /// forward key presses to a running node.
    Keys,
}

/// Game of life, on one node or split between partition agents.
#[derive(Debug, Parser)]
#[command(name = "golrs-dist", version)]
struct Cli {
    /// worker threads per node.
    #[arg(short, long, default_value_t = Params::default().threads)]
    threads: usize,

    #[arg(short, long, default_value_t = Params::default().width)]
    width: i32,

    #[arg(long, default_value_t = Params::default().height)]
    height: i32,

    /// generations to compute.
    #[arg(long, default_value_t = Params::default().turns)]
    turns: u64,

    #[arg(long, value_enum, default_value_t = Role::Local)]
    role: Role,

    /// partitions handed out by the coordinator.
    #[arg(short = 's', long, default_value_t = Params::default().partitions)]
    partitions: usize,

    /// address the coordinator listens on, or agents and keys connect to.
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    #[arg(short, long, default_value_t = 7890)]
    port: u16,

    /// directory holding the initial `<width>x<height>.pgm` images.
    #[arg(long, default_value = "images")]
    images: PathBuf,

    /// directory receiving the snapshots.
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// local role: accept key presses from the network.
    #[arg(long)]
    listen: bool,
}

impl Cli {
    fn params(&self) -> Params {
        Params {
            turns: self.turns,
            threads: self.threads,
            width: self.width,
            height: self.height,
            partitions: self.partitions,
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    fn io(&self) -> PgmDir {
        PgmDir::new(&self.images, &self.out)
    }
}

/// time the coordinator keeps answering after its last turn, so that polling
/// agents observe the exit flag instead of a closed connection.
const EXIT_LINGER: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.width <= 0 || cli.height <= 0 {
        bail!("the board must be at least 1x1, got {}x{}", cli.width, cli.height);
    }
    match cli.role {
        Role::Local => run_local(&cli),
        Role::Coordinator => run_coordinator(&cli),
        Role::Agent => run_agent(&cli),
        Role::Keys => run_keys(&cli),
    }
}

fn run_local(cli: &Cli) -> Result<()> {
    let params = cli.params();
    let mut io = cli.io();
    let grid = load_grid(&mut io, &params)
        .with_context(|| format!("loading the initial board {}", params.input_name()))?;

    let (events, stream) = events::channel();
    let view = View::spawn(stream);
    let sim = Sim::spawn(params, LocalStepper::new(grid, params.threads), io, events);
    if cli.listen {
        let service = NodeService::new().with_keys(sim.handle());
        Server::bind(cli.addr(), service)
            .with_context(|| format!("listening on {}", cli.addr()))?
            .spawn();
    }

    let keyboard = keyboard(sim.handle());
    sim.join().context("simulation failed")?;
    drop(keyboard);
    let summary = view.join();
    info!(turns = summary.turns, alive = ?summary.alive, "done");
    Ok(())
}

fn run_coordinator(cli: &Cli) -> Result<()> {
    let params = cli.params();
    let mut io = cli.io();
    let grid = load_grid(&mut io, &params)
        .with_context(|| format!("loading the initial board {}", params.input_name()))?;

    let (events, stream) = events::channel();
    let view = View::spawn(stream);
    let coordinator = Arc::new(Coordinator::with_events(params, grid, events.clone()));
    let stepper = CoordinatorStepper::new(coordinator.clone());
    let sim = Sim::spawn(params, stepper, io, events);

    let service = NodeService::new()
        .with_coordinator(coordinator.clone())
        .with_keys(sim.handle());
    Server::bind(cli.addr(), service)
        .with_context(|| format!("listening on {}", cli.addr()))?
        .spawn();
    info!(partitions = ?coordinator.partitions(), "waiting for agents");

    let keyboard = keyboard(sim.handle());
    sim.join().context("simulation failed")?;
    drop(keyboard);
    let summary = view.join();
    info!(turns = summary.turns, alive = ?summary.alive, "done");
    thread::sleep(EXIT_LINGER);
    Ok(())
}

fn run_agent(cli: &Cli) -> Result<()> {
    let client = Client::connect(cli.addr())
        .with_context(|| format!("connecting to the coordinator at {}", cli.addr()))?;
    let agent = PartitionAgent::connect(client).context("claiming a partition")?;
    let params = *agent.params();
    let grid = load_grid(&mut cli.io(), &params)
        .with_context(|| format!("loading the initial board {}", params.input_name()))?;

    let (events, stream) = events::channel();
    let view = View::spawn(stream);
    let computed = agent.run(grid, events).context("partition agent failed")?;
    view.join();
    info!(computed, "done");
    Ok(())
}

fn run_keys(cli: &Cli) -> Result<()> {
    let mut client = Client::connect(cli.addr())
        .with_context(|| format!("connecting to {}", cli.addr()))?;
    let (sender, receiver) = mpsc::channel();
    let Some(_keyboard) = Keyboard::spawn(move |key| sender.send(key).is_ok()) else {
        bail!("the keys role needs a terminal on stdin");
    };
    for key in receiver {
        if let Err(error) = client.key_press(key) {
            error!(%error, ?key, "key press refused");
            break;
        }
        if key == 'q' {
            break;
        }
    }
    Ok(())
}

fn keyboard(handle: SimHandle) -> Option<Keyboard> {
    Keyboard::spawn(move |key| handle.key_press(key))
}
