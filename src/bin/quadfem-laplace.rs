//! Solves the Laplace equation with a manufactured solution on a sequence of refined meshes and
//! reports errors, convergence rates and timings.
use clap::{Parser, ValueEnum};
use eyre::WrapErr;
use quadfem::assembly::{AssemblyStrategy, Elimination};
use quadfem::config::SimulationConfig;
use quadfem::simulation::LaplaceSimulation;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Variant {
    /// Kelly estimator, fixed-fraction marking, hanging-node constraints.
    Adaptive,
    /// Uniform refinement, boundary values eliminated after assembly.
    Global,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliElimination {
    Scatter,
    PostProcess,
}

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file. Command-line options override its values.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Program variant used when no configuration file is given.
    #[arg(long, value_enum, default_value_t = Variant::Adaptive)]
    variant: Variant,

    /// Number of refinement cycles.
    #[arg(long)]
    cycles: Option<usize>,

    /// Directory for VTK output.
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Do not write VTK files.
    #[arg(long)]
    no_vtk: bool,

    /// Assemble in parallel, with the given number of elements per chunk.
    #[arg(long, value_name = "CHUNK_SIZE", conflicts_with = "serial")]
    parallel: Option<usize>,

    /// Assemble serially.
    #[arg(long)]
    serial: bool,

    /// How constraints are eliminated from the linear system.
    #[arg(long, value_enum)]
    elimination: Option<CliElimination>,

    /// Number of rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Also write the convergence table as JSON to this file.
    #[arg(long, value_name = "FILE")]
    json_table: Option<PathBuf>,
}

impl Args {
    fn simulation_config(&self) -> eyre::Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => match self.variant {
                Variant::Adaptive => SimulationConfig::default(),
                Variant::Global => SimulationConfig::global_refinement_variant(),
            },
        };
        if let Some(cycles) = self.cycles {
            config.cycles = cycles;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if self.no_vtk {
            config.output.write_vtk = false;
        }
        if let Some(chunk_size) = self.parallel {
            config.assembly.strategy = AssemblyStrategy::Parallel { chunk_size };
        }
        if self.serial {
            config.assembly.strategy = AssemblyStrategy::Serial;
        }
        if let Some(elimination) = self.elimination {
            config.assembly.elimination = match elimination {
                CliElimination::Scatter => Elimination::DuringScatter,
                CliElimination::PostProcess => Elimination::PostProcess,
            };
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> eyre::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .wrap_err("Failed to set up thread pool")?;
    }

    let config = args.simulation_config()?;
    let mut simulation = LaplaceSimulation::new(config)?;
    let report = simulation.run()?;

    println!("{}", report.table);
    println!("{}", report.timing);

    if let Some(path) = &args.json_table {
        let file = File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report.table)
            .wrap_err_with(|| format!("Failed to write convergence table to {}", path.display()))?;
    }
    Ok(())
}
