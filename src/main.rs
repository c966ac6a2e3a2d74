use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use plotlib::{
    page::Page,
    repr::Plot,
    style::{PointMarker, PointStyle},
    view::ContinuousView,
};
use prettytable::{Cell, Row, Table};
use tracing_subscriber::EnvFilter;

use dpmdp::gridworld;
use dpmdp::river_swim::{self, Current};
use dpmdp::{
    action_values, estimate_state_value, policy_iteration, value_iteration, ActionId, Mdp,
    Solution, SolverConfig,
};

#[derive(Parser)]
#[command(name = "dpmdp")]
#[command(version, about = "Policy iteration and value iteration on finite MDPs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    env: EnvCommand,

    /// Solver to run
    #[arg(long, value_enum, default_value_t = Algorithm::Both, global = true)]
    algorithm: Algorithm,

    /// Stop once a sweep changes no value by more than this
    #[arg(long, default_value_t = 1e-3, global = true)]
    tolerance: f64,

    /// Maximum sweeps of a single evaluation or value iteration run
    #[arg(long, default_value_t = 100_000, global = true)]
    max_sweeps: usize,

    /// Maximum evaluate/improve rounds of policy iteration
    #[arg(long, default_value_t = 1_000, global = true)]
    max_policy_iterations: usize,

    /// Rollouts per state used to check the solved values by sampling (0 disables)
    #[arg(long, default_value_t = 0, global = true)]
    rollouts: usize,

    /// Step limit of a single rollout
    #[arg(long, default_value_t = 1_000, global = true)]
    max_steps: usize,

    /// Seed of the rollout random generator
    #[arg(long, default_value_t = 1234, global = true)]
    seed: u64,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Algorithm {
    PolicyIteration,
    ValueIteration,
    Both,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Six river segments with a current pushing the swimmer downstream
    RiverSwim {
        #[arg(long, value_enum, default_value_t = Current::Weak)]
        current: Current,

        #[arg(long, default_value_t = 0.5)]
        gamma: f64,
    },

    /// Grid with exits in the top-left and bottom-right corners
    Grid {
        #[arg(long, default_value_t = 4)]
        rows: usize,

        #[arg(long, default_value_t = 4)]
        cols: usize,

        #[arg(long, default_value_t = 0.9)]
        gamma: f64,
    },
}

impl EnvCommand {
    fn build(&self) -> Result<Mdp> {
        match *self {
            EnvCommand::RiverSwim { current, gamma } => river_swim::new_river_swim_env(current, gamma)
                .with_context(|| format!("failed to build RiverSwim ({:?} current)", current)),
            EnvCommand::Grid { rows, cols, gamma } => gridworld::new_grid_env(rows, cols, gamma)
                .with_context(|| format!("failed to build {}x{} grid", rows, cols)),
        }
    }

    fn action_symbol(&self, action: ActionId) -> &'static str {
        match self {
            EnvCommand::RiverSwim { .. } => river_swim::action_symbol(action),
            EnvCommand::Grid { .. } => gridworld::action_symbol(action),
        }
    }

    fn print_values(&self, values: &[f64]) -> Result<()> {
        match *self {
            EnvCommand::RiverSwim { .. } => {
                river_swim::print_river_state_values(values);
                println!("{}", value_plot(values)?);
            }
            EnvCommand::Grid { rows, cols, .. } => {
                gridworld::print_grid_state_values(values, rows, cols)
            }
        }
        Ok(())
    }

    fn print_policy(&self, mdp: &Mdp, policy: &[ActionId]) {
        match *self {
            EnvCommand::RiverSwim { .. } => river_swim::print_river_policy(policy),
            EnvCommand::Grid { rows, cols, .. } => {
                gridworld::print_grid_policy(mdp, policy, rows, cols)
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn value_plot(values: &[f64]) -> Result<String> {
    let points = values
        .iter()
        .enumerate()
        .map(|(state, value)| (state as f64, *value))
        .collect();
    let plot = Plot::new(points).point_style(PointStyle::new().marker(PointMarker::Circle));
    let view = ContinuousView::new()
        .add(plot)
        .x_range(0.0, values.len().saturating_sub(1).max(1) as f64)
        .x_label("State")
        .y_label("Value");
    Page::single(&view)
        .dimensions(60, 20)
        .to_text()
        .map_err(|e| anyhow!("failed to render value plot: {}", e))
}

fn print_header(title: &str) {
    println!("\n{}\n{}\n{}", "-".repeat(30), title, "-".repeat(30));
}

fn print_action_values(env: &EnvCommand, mdp: &Mdp, values: &[f64]) {
    let q = action_values(mdp, values);
    let mut table = Table::new();
    let mut header = vec![Cell::new("state")];
    header.extend((0..mdp.num_actions()).map(|a| Cell::new(env.action_symbol(a))));
    table.add_row(Row::new(header));

    for (state, row) in q.row_iter().enumerate() {
        let mut cells = vec![Cell::new(&state.to_string())];
        cells.extend(row.iter().map(|v| Cell::new(&format!("{:.4}", v))));
        table.add_row(Row::new(cells));
    }
    table.printstd();
}

fn print_rollouts(cli: &Cli, mdp: &Mdp, solution: &Solution) -> Result<()> {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("state"),
        Cell::new("value"),
        Cell::new("rollout mean"),
    ]));
    for state in 0..mdp.num_states() {
        let estimate = estimate_state_value(
            mdp,
            &solution.policy,
            state,
            cli.rollouts,
            cli.max_steps,
            cli.seed,
        )
        .context("rollout failed")?;
        table.add_row(Row::new(vec![
            Cell::new(&state.to_string()),
            Cell::new(&format!("{:.4}", solution.values[state])),
            Cell::new(&format!("{:.4}", estimate)),
        ]));
    }
    table.printstd();
    Ok(())
}

fn report(cli: &Cli, mdp: &Mdp, solution: &Solution) -> Result<()> {
    if solution.is_converged() {
        println!(
            "Converged after {} iterations ({} sweeps)",
            solution.iterations, solution.sweeps
        );
    } else {
        println!(
            "WARNING: not converged after {} iterations ({} sweeps): {}",
            solution.iterations, solution.sweeps, solution.convergence
        );
    }

    println!("Values:");
    cli.env.print_values(&solution.values)?;
    println!("Policy:");
    cli.env.print_policy(mdp, &solution.policy);
    println!("Action values:");
    print_action_values(&cli.env, mdp, &solution.values);

    if cli.rollouts > 0 {
        println!("Rollouts ({} per state, seed {}):", cli.rollouts, cli.seed);
        print_rollouts(cli, mdp, solution)?;
    }
    Ok(())
}

fn compare(mdp: &Mdp, pi: &Solution, vi: &Solution) {
    print_header("Policy Iteration vs Value Iteration");

    let max_difference = pi
        .values
        .iter()
        .zip(&vi.values)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    println!("Largest value difference: {:e}", max_difference);

    let differing: Vec<usize> = (0..mdp.num_states())
        .filter(|&s| pi.policy[s] != vi.policy[s])
        .collect();
    if differing.is_empty() {
        println!("Policies are identical");
    } else {
        // Both policies are greedy; they can only differ where actions tie.
        println!("Policies differ in states {:?}", differing);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SolverConfig::default()
        .with_tolerance(cli.tolerance)
        .with_max_sweeps(cli.max_sweeps)
        .with_max_policy_iterations(cli.max_policy_iterations);
    config.validate().context("invalid solver configuration")?;

    let mdp = cli.env.build()?;

    let mut pi_solution = None;
    if matches!(cli.algorithm, Algorithm::PolicyIteration | Algorithm::Both) {
        print_header("Policy Iteration");
        let solution = policy_iteration(&mdp, &config).context("policy iteration failed")?;
        report(&cli, &mdp, &solution)?;
        pi_solution = Some(solution);
    }

    let mut vi_solution = None;
    if matches!(cli.algorithm, Algorithm::ValueIteration | Algorithm::Both) {
        print_header("Value Iteration");
        let solution = value_iteration(&mdp, &config).context("value iteration failed")?;
        report(&cli, &mdp, &solution)?;
        vi_solution = Some(solution);
    }

    if let (Some(pi), Some(vi)) = (&pi_solution, &vi_solution) {
        compare(&mdp, pi, vi);
    }

    Ok(())
}
