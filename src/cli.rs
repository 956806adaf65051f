//! # Command Line Interface for the Solver Binary

use std::{
    fmt,
    io::{Error as IOError, Write},
    path::PathBuf,
    time::Duration,
};

use clap::{crate_name, crate_version, Args, Parser, ValueEnum};
use cpu_time::ProcessTime;
use pbsat_core::{
    prepro::FileFormat, Limits, Mode, Options, Outcome, PbEncoding, PbSolver, Stats, Termination,
    Weight, WriteSolverLog, INF,
};
use rustsat::{
    instances::fio,
    solvers::{SolverResult, SolverStats},
};
use termcolor::{Buffer, BufferWriter, Color, ColorSpec, WriteColor};

macro_rules! none_if_zero {
    ($val:expr) => {
        if $val == 0 {
            None
        } else {
            Some($val)
        }
    };
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// What to search for
    #[arg(long, default_value_t = Mode::default())]
    mode: Mode,
    #[command(flatten)]
    solver: SolverArgs,
    #[command(flatten)]
    limits: LimitArgs,
    #[command(flatten)]
    file: FileArgs,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct SolverArgs {
    /// Let the SAT oracle eliminate variables that are not needed for the model
    #[arg(long, default_value_t = Bool::from(Options::default().preprocessing))]
    preprocessing: Bool,
    /// Detect constraints with cheaper than weighted encodings
    #[arg(long, default_value_t = Bool::from(Options::default().find_intervals))]
    find_intervals: Bool,
    /// Split constraints that are almost clauses into a clause and a residual constraint
    #[arg(long, default_value_t = Bool::from(Options::default().rewrite_almost_clauses))]
    rewrite_almost_clauses: Bool,
    /// Use solution-guided search, aka phasing literals according to found solutions
    #[arg(long, default_value_t = Bool::from(Options::default().solution_guided_search))]
    solution_guided_search: Bool,
    /// The encoding to use for weighted constraints and the objective
    #[arg(long, default_value_t = Options::default().pb_encoding)]
    pb_encoding: PbEncoding,
    /// The maximum number of distinct weights for which the generalized totalizer is used
    #[arg(long, default_value_t = Options::default().max_weight_levels)]
    max_weight_levels: usize,
    /// The CaDiCaL profile to use
    #[arg(long, default_value_t = CadicalConfig::Default)]
    cadical_config: CadicalConfig,
}

impl From<&SolverArgs> for Options {
    fn from(args: &SolverArgs) -> Self {
        Options {
            preprocessing: args.preprocessing.into(),
            find_intervals: args.find_intervals.into(),
            rewrite_almost_clauses: args.rewrite_almost_clauses.into(),
            max_weight_levels: args.max_weight_levels,
            pb_encoding: args.pb_encoding,
            solution_guided_search: args.solution_guided_search.into(),
        }
    }
}

#[derive(Args)]
struct LimitArgs {
    /// Limit the number of solutions to enumerate (0 is no limit)
    #[arg(long, default_value_t = 0)]
    sol_limit: usize,
    /// Limit the number of SAT oracle calls (0 is no limit)
    #[arg(long, default_value_t = 0)]
    oracle_call_limit: usize,
}

impl From<&LimitArgs> for Limits {
    fn from(args: &LimitArgs) -> Self {
        Limits {
            sols: none_if_zero!(args.sol_limit),
            oracle_calls: none_if_zero!(args.oracle_call_limit),
        }
    }
}

#[derive(Args)]
struct FileArgs {
    /// The file format of the input file. With infer, the file format is
    /// inferred from the file extension.
    #[arg(long, value_enum, default_value_t = FileFormat::Infer)]
    file_format: FileFormat,
    /// The index in the OPB file to treat as the lowest variable
    #[arg(long, default_value_t = 1)]
    first_var_idx: u32,
    /// Write all clauses passed to the SAT oracle to this path as DIMACS CNF
    #[arg(long)]
    dimacs_out: Option<PathBuf>,
    /// The path to the instance file to load. Compressed files with an
    /// extension like `.bz2` or `.gz` can be read.
    inst_path: PathBuf,
}

#[derive(Args)]
struct LogArgs {
    #[command(flatten)]
    color: concolor_clap::Color,
    /// Print the solver configuration
    #[arg(long)]
    print_solver_config: bool,
    /// Print every enumerated model, not only the last one
    #[arg(long)]
    print_solutions: bool,
    /// Don't print statistics
    #[arg(long)]
    no_print_stats: bool,
    /// Verbosity of the solver output
    #[arg(short, long, default_value_t = 0)]
    verbosity: u8,
    /// Log found solutions as they are discovered
    #[arg(long)]
    log_solutions: bool,
    /// Log tightened objective bounds
    #[arg(long)]
    log_bounds: bool,
    /// Log SAT oracle calls
    #[arg(long)]
    log_oracle_calls: bool,
    /// Log the result of preprocessing
    #[arg(long)]
    log_preprocessing: bool,
    /// Log routine starts and ends till a given depth
    #[arg(long, default_value_t = 0)]
    log_routines: usize,
}

impl From<&LogArgs> for LoggerConfig {
    fn from(args: &LogArgs) -> Self {
        LoggerConfig {
            log_solutions: args.log_solutions || args.verbosity >= 1,
            log_bounds: args.log_bounds || args.verbosity >= 1,
            log_preprocessing: args.log_preprocessing || args.verbosity >= 1,
            log_messages: args.verbosity >= 2,
            log_oracle_calls: args.log_oracle_calls || args.verbosity >= 3,
            log_routines: std::cmp::max(args.log_routines, args.verbosity as usize * 2),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Bool {
    /// Turn on feature
    True,
    /// Turn off feature
    False,
}

impl From<Bool> for bool {
    fn from(val: Bool) -> Self {
        val == Bool::True
    }
}

impl fmt::Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool::True => write!(f, "true"),
            Bool::False => write!(f, "false"),
        }
    }
}

impl From<bool> for Bool {
    fn from(val: bool) -> Self {
        if val {
            Bool::True
        } else {
            Bool::False
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CadicalConfig {
    /// Set default advanced internal options
    Default,
    /// Disable all internal preprocessing options
    Plain,
    /// Set internal options to target satisfiable instances
    Sat,
    /// Set internal options to target unsatisfiable instances
    Unsat,
}

impl fmt::Display for CadicalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CadicalConfig::Default => write!(f, "default"),
            CadicalConfig::Plain => write!(f, "plain"),
            CadicalConfig::Sat => write!(f, "sat"),
            CadicalConfig::Unsat => write!(f, "unsat"),
        }
    }
}

impl From<CadicalConfig> for rustsat_cadical::Config {
    fn from(cfg: CadicalConfig) -> Self {
        match cfg {
            CadicalConfig::Default => rustsat_cadical::Config::Default,
            CadicalConfig::Plain => rustsat_cadical::Config::Plain,
            CadicalConfig::Sat => rustsat_cadical::Config::Sat,
            CadicalConfig::Unsat => rustsat_cadical::Config::Unsat,
        }
    }
}

pub struct Cli {
    pub mode: Mode,
    pub options: Options,
    pub limits: Limits,
    pub file_format: FileFormat,
    pub opb_options: fio::opb::Options,
    pub inst_path: PathBuf,
    pub dimacs_out: Option<PathBuf>,
    pub cadical_config: CadicalConfig,
    stdout: BufferWriter,
    stderr: BufferWriter,
    print_solver_config: bool,
    print_solutions: bool,
    print_stats: bool,
    color: concolor_clap::Color,
    logger_config: LoggerConfig,
}

fn color_choice(color: concolor_clap::Color, stream: atty::Stream) -> termcolor::ColorChoice {
    match color.color {
        concolor_clap::ColorChoice::Always => termcolor::ColorChoice::Always,
        concolor_clap::ColorChoice::Never => termcolor::ColorChoice::Never,
        concolor_clap::ColorChoice::Auto => {
            if atty::is(stream) {
                termcolor::ColorChoice::Auto
            } else {
                termcolor::ColorChoice::Never
            }
        }
    }
}

impl Cli {
    pub fn init() -> Self {
        let args = CliArgs::parse();
        Cli {
            mode: args.mode,
            options: (&args.solver).into(),
            limits: (&args.limits).into(),
            file_format: args.file.file_format,
            opb_options: fio::opb::Options {
                first_var_idx: args.file.first_var_idx,
                ..Default::default()
            },
            inst_path: args.file.inst_path,
            dimacs_out: args.file.dimacs_out,
            cadical_config: args.solver.cadical_config,
            stdout: BufferWriter::stdout(color_choice(args.log.color, atty::Stream::Stdout)),
            stderr: BufferWriter::stderr(color_choice(args.log.color, atty::Stream::Stderr)),
            print_solver_config: args.log.print_solver_config,
            print_solutions: args.log.print_solutions,
            print_stats: !args.log.no_print_stats,
            color: args.log.color,
            logger_config: (&args.log).into(),
        }
    }

    pub fn new_cli_logger(&self) -> CliLogger {
        CliLogger {
            stdout: BufferWriter::stdout(color_choice(self.color, atty::Stream::Stdout)),
            config: self.logger_config.clone(),
            routine_stack: vec![],
        }
    }

    pub fn warning(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Yellow)))?;
        write!(buffer, "warning")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stderr.print(&buffer)?;
        Ok(())
    }

    pub fn error(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Red)))?;
        write!(buffer, "error")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stderr.print(&buffer)?;
        Ok(())
    }

    pub fn info(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
        write!(buffer, "c info")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn log_termination(&self, term: &Termination) -> Result<(), IOError> {
        self.warning(&format!("{}", term))
    }

    pub fn print_header(&self) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        write!(buffer, "c ")?;
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Green)))?;
        write!(buffer, "{}", crate_name!())?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, " ({})", crate_version!())?;
        buffer.reset()?;
        write!(buffer, "c mode: ")?;
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(buffer, "{}", self.mode)?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, "c ==============================")?;
        buffer.reset()?;
        writeln!(buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_solver_config(&self) -> Result<(), IOError> {
        if self.print_solver_config {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            Self::print_title(&mut buffer, "Solver Config")?;
            Self::print_parameter(&mut buffer, "preprocessing", self.options.preprocessing)?;
            Self::print_parameter(&mut buffer, "find-intervals", self.options.find_intervals)?;
            Self::print_parameter(
                &mut buffer,
                "rewrite-almost-clauses",
                self.options.rewrite_almost_clauses,
            )?;
            Self::print_parameter(
                &mut buffer,
                "solution-guided-search",
                self.options.solution_guided_search,
            )?;
            Self::print_parameter(&mut buffer, "pb-encoding", self.options.pb_encoding)?;
            Self::print_parameter(
                &mut buffer,
                "max-weight-levels",
                self.options.max_weight_levels,
            )?;
            Self::print_parameter(&mut buffer, "cadical-config", self.cadical_config)?;
            Self::print_parameter(&mut buffer, "sol-limit", OptVal::new(self.limits.sols))?;
            Self::print_parameter(
                &mut buffer,
                "oracle-call-limit",
                OptVal::new(self.limits.oracle_calls),
            )?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    /// Prints the status line and the model lines. The objective lines are printed by the
    /// logger as solutions are found.
    pub fn print_result<O>(&self, outcome: Outcome, solver: &PbSolver<O>) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        let status = match outcome {
            Outcome::Unsat => "UNSATISFIABLE",
            Outcome::Optimum => "OPTIMUM FOUND",
            Outcome::Sat => "SATISFIABLE",
            Outcome::Terminated(_) if solver.best_model().is_some() => "SATISFIABLE",
            Outcome::Terminated(_) => "UNKNOWN",
        };
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, "s {}", status)?;
        buffer.reset()?;
        if self.print_solutions {
            for model in solver.all_models() {
                Self::print_model(&mut buffer, solver, model)?;
            }
        }
        if let Some(model) = solver.best_model() {
            if !self.print_solutions || solver.all_models().is_empty() {
                Self::print_model(&mut buffer, solver, model)?;
            }
        }
        if !solver.all_models().is_empty() {
            writeln!(buffer, "c n-solutions: {}", solver.all_models().len())?;
        }
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_stats(&self, stats: Stats) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            Self::print_title(&mut buffer, "Solver Stats")?;
            Self::print_parameter(&mut buffer, "n-oracle-calls", stats.n_oracle_calls)?;
            Self::print_parameter(&mut buffer, "n-solutions", stats.n_solutions)?;
            Self::print_parameter(&mut buffer, "n-orig-constrs", stats.n_orig_constrs)?;
            Self::print_parameter(&mut buffer, "n-stored-constrs", stats.n_stored_constrs)?;
            Self::print_parameter(&mut buffer, "n-fixed-lits", stats.n_fixed_lits)?;
            Self::print_parameter(
                &mut buffer,
                "n-almost-clause-splits",
                stats.n_almost_clause_splits,
            )?;
            Self::print_parameter(&mut buffer, "n-flagged-intervals", stats.n_flagged_intervals)?;
            Self::print_parameter(&mut buffer, "n-clauses", stats.n_clauses)?;
            Self::print_parameter(
                &mut buffer,
                "cpu-time",
                DurPrinter::new(ProcessTime::now().as_duration()),
            )?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    pub fn print_oracle_stats(&self, stats: SolverStats) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            Self::print_title(&mut buffer, "Oracle Stats")?;
            Self::print_parameter(&mut buffer, "n-sat-solves", stats.n_sat)?;
            Self::print_parameter(&mut buffer, "n-unsat-solves", stats.n_unsat)?;
            Self::print_parameter(&mut buffer, "n-clauses", stats.n_clauses)?;
            Self::print_parameter(&mut buffer, "max-var", OptVal::new(stats.max_var))?;
            Self::print_parameter(&mut buffer, "avg-clause-len", stats.avg_clause_len)?;
            Self::print_parameter(
                &mut buffer,
                "cpu-solve-time",
                DurPrinter::new(stats.cpu_solve_time),
            )?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn print_model<O>(
        buffer: &mut Buffer,
        solver: &PbSolver<O>,
        model: &[bool],
    ) -> Result<(), IOError> {
        write!(buffer, "v")?;
        for (var, &val) in solver.pb_vars().zip(model) {
            let sign = if val { "" } else { "-" };
            match solver.var_name(var) {
                Some(name) => write!(buffer, " {}{}", sign, name)?,
                None => write!(buffer, " {}x{}", sign, var.idx() + 1)?,
            }
        }
        writeln!(buffer)?;
        Ok(())
    }

    fn print_title(buffer: &mut Buffer, title: &str) -> Result<(), IOError> {
        write!(buffer, "c ")?;
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
        write!(buffer, "{}", title)?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, ": ")?;
        buffer.reset()?;
        Ok(())
    }

    fn print_parameter<V: fmt::Display>(
        buffer: &mut Buffer,
        name: &str,
        val: V,
    ) -> Result<(), IOError> {
        write!(buffer, "c ")?;
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(buffer, "{}", name)?;
        buffer.reset()?;
        writeln!(buffer, ": {}", val)?;
        Ok(())
    }

    fn start_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, "c >>>>>")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }

    fn end_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, "c <<<<<")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }
}

#[derive(Clone)]
struct LoggerConfig {
    log_solutions: bool,
    log_bounds: bool,
    log_preprocessing: bool,
    log_messages: bool,
    log_oracle_calls: bool,
    log_routines: usize,
}

/// The `o` line announcing the objective value of a new solution
fn objective_line(value: Option<Weight>) -> Option<String> {
    match value {
        Some(value) if value != INF => Some(format!("o {value}")),
        _ => None,
    }
}

pub struct CliLogger {
    stdout: BufferWriter,
    config: LoggerConfig,
    routine_stack: Vec<(&'static str, ProcessTime)>,
}

impl CliLogger {
    fn log_line(&self, color: Color, what: &str, msg: fmt::Arguments) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        write!(buffer, "c ")?;
        buffer.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(buffer, "{}", what)?;
        buffer.reset()?;
        writeln!(buffer, ": {}", msg)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }
}

impl WriteSolverLog for CliLogger {
    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        if self.config.log_oracle_calls {
            self.log_line(
                Color::Magenta,
                "oracle call",
                format_args!(
                    "result: {}; cpu-time: {}",
                    result,
                    DurPrinter::new(ProcessTime::now().as_duration())
                ),
            )?;
        }
        Ok(())
    }

    fn log_solution(&mut self, value: Option<Weight>) -> anyhow::Result<()> {
        if let Some(line) = objective_line(value) {
            let mut buffer = self.stdout.buffer();
            writeln!(buffer, "{line}")?;
            self.stdout.print(&buffer)?;
        }
        if self.config.log_solutions {
            self.log_line(
                Color::Magenta,
                "solution",
                format_args!(
                    "value: {}; cpu-time: {}",
                    OptVal::new(value),
                    DurPrinter::new(ProcessTime::now().as_duration())
                ),
            )?;
        }
        Ok(())
    }

    fn log_bound(&mut self, bound: Weight) -> anyhow::Result<()> {
        if self.config.log_bounds {
            self.log_line(
                Color::Cyan,
                "objective bound",
                format_args!(
                    "value <= {}; cpu-time: {}",
                    bound,
                    DurPrinter::new(ProcessTime::now().as_duration())
                ),
            )?;
        }
        Ok(())
    }

    fn log_preprocessing(
        &mut self,
        n_fixed: usize,
        n_split: usize,
        n_flagged: usize,
    ) -> anyhow::Result<()> {
        if self.config.log_preprocessing {
            self.log_line(
                Color::Cyan,
                "preprocessing",
                format_args!(
                    "fixed: {}; almost-clause splits: {}; flagged: {}",
                    n_fixed, n_split, n_flagged
                ),
            )?;
        }
        Ok(())
    }

    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        self.routine_stack.push((desc, ProcessTime::now()));

        if self.config.log_routines >= self.routine_stack.len() {
            self.log_line(Color::Green, ">>> routine start", format_args!("{}", desc))?;
        }
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        let Some((desc, start)) = self.routine_stack.pop() else {
            return Ok(());
        };

        if self.config.log_routines > self.routine_stack.len() {
            let duration = ProcessTime::now().duration_since(start);
            self.log_line(
                Color::Red,
                "<<< routine end",
                format_args!("{}; duration: {}", desc, DurPrinter::new(duration)),
            )?;
        }
        Ok(())
    }

    fn log_end_solve(&mut self) -> anyhow::Result<()> {
        while !self.routine_stack.is_empty() {
            self.log_routine_end()?;
        }
        Ok(())
    }

    fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        if self.config.log_messages {
            self.log_line(Color::Blue, "message", format_args!("{}", msg))?;
        }
        Ok(())
    }
}

struct OptVal<T> {
    val: Option<T>,
}

impl<T> OptVal<T> {
    fn new(val: Option<T>) -> Self {
        OptVal { val }
    }
}

impl<T: fmt::Display> fmt::Display for OptVal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.val {
            Some(t) => fmt::Display::fmt(&t, f),
            None => write!(f, "none"),
        }
    }
}

struct DurPrinter {
    dur: Duration,
}

impl DurPrinter {
    fn new(dur: Duration) -> Self {
        Self { dur }
    }
}

impl fmt::Display for DurPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dur)
    }
}

#[test]
fn verify_cli_args() {
    use clap::CommandFactory;
    CliArgs::command().debug_assert()
}

#[test]
fn objective_lines() {
    assert_eq!(objective_line(Some(7)).as_deref(), Some("o 7"));
    assert_eq!(objective_line(Some(-1)).as_deref(), Some("o -1"));
    assert_eq!(objective_line(Some(INF)), None);
    assert_eq!(objective_line(None), None);
}
