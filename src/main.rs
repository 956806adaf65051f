use std::{fs, io, thread};

use anyhow::Context;
use pbsat_core::{prepro, Outcome, PbSolver};
use rustsat::solvers::SolveStats;
use rustsat_cadical::CaDiCaL;

mod cli;
use cli::Cli;

/// The SAT solver used
type Oracle = CaDiCaL<'static, 'static>;

fn main() -> anyhow::Result<()> {
    let cli = Cli::init();

    match sub_main(&cli) {
        Ok(_) => (),
        Err(err) => {
            cli.error(&format!("{err}"))?;
            cli.error(&format!("{}", err.backtrace()))?;
        }
    };

    Ok(())
}

fn sub_main(cli: &Cli) -> anyhow::Result<()> {
    cli.print_header()?;
    cli.print_solver_config()?;

    cli.info(&format!("solving instance {:?}", cli.inst_path))?;

    let parsed = prepro::parse(&cli.inst_path, cli.file_format, cli.opb_options)?;
    cli.info(&format!(
        "parsed {} variables and {} constraints",
        parsed.n_vars(),
        parsed.n_constrs()
    ))?;

    let mut solver = setup_solver(cli)?;
    if !parsed.load(&mut solver)? {
        cli.info("instance is unsatisfiable after loading")?;
    }

    let outcome = solver.solve(cli.mode, cli.limits)?;
    if let Outcome::Terminated(term) = outcome {
        cli.log_termination(&term)?;
    }
    cli.print_result(outcome, &solver)?;

    if let Some(path) = &cli.dimacs_out {
        let mut writer = io::BufWriter::new(
            fs::File::create(path).with_context(|| format!("failed to create {path:?}"))?,
        );
        solver.write_dimacs(&mut writer)?;
        cli.info(&format!("wrote clauses to {path:?}"))?;
    }

    cli.print_stats(solver.stats())?;
    cli.print_oracle_stats(solver.bridge().oracle().stats())?;

    Ok(())
}

fn setup_solver(cli: &Cli) -> anyhow::Result<PbSolver<Oracle>> {
    let mut oracle = Oracle::default();
    oracle
        .set_configuration(cli.cadical_config.into())
        .context("failed to set cadical config")?;
    let mut solver = PbSolver::with_oracle(oracle, cli.options)?;

    // === Set up CLI interaction ===
    // Set up signal handling
    let mut interrupter = solver.interrupter();
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGXCPU,
        signal_hook::consts::SIGABRT,
    ])?;
    // Thread for catching incoming signals
    thread::spawn(move || {
        for _ in signals.forever() {
            interrupter.interrupt();
        }
    });

    solver.attach_logger(cli.new_cli_logger());

    Ok(solver)
}
