use libtest_mimic::{Arguments, Failed};
use pbsat_core::{prepro, Limits, Mode, Options, Outcome, PbEncoding, PbSolver};
use rustsat::instances::fio;

use setup::{Expected, TestSetup};

fn main() {
    let args = Arguments::from_args();
    let mut tests = vec![];

    let vars = [
        ("", Options::default()),
        (
            "no-rewrite",
            Options {
                find_intervals: false,
                rewrite_almost_clauses: false,
                ..Options::default()
            },
        ),
        (
            "gte",
            Options {
                pb_encoding: PbEncoding::Gte,
                ..Options::default()
            },
        ),
        (
            "dpw",
            Options {
                pb_encoding: PbEncoding::Dpw,
                ..Options::default()
            },
        ),
        (
            "prepro",
            Options {
                preprocessing: true,
                ..Options::default()
            },
        ),
        (
            "sol-guided",
            Options {
                solution_guided_search: true,
                ..Options::default()
            },
        ),
    ];

    for (id, opts) in vars {
        tests.extend(TestSetup::new("minimize", id, run_minimize, opts).collect_tests());
        tests.extend(
            TestSetup::new("all-solutions", id, run_all_solutions, opts)
                .filter(|exp| exp.n_sols.is_none())
                .collect_tests(),
        );
    }

    libtest_mimic::run(&args, tests).exit();
}

fn load(path: &std::path::Path, opts: Options) -> Result<PbSolver, Failed> {
    let parsed = prepro::parse(
        path,
        prepro::FileFormat::Infer,
        fio::opb::Options::default(),
    )?;
    let mut solver = PbSolver::new(opts)?;
    parsed.load(&mut solver)?;
    Ok(solver)
}

fn run_minimize(path: &std::path::Path, opts: Options, exp: Expected) -> Result<(), Failed> {
    let mut solver = load(path, opts)?;
    let outcome = solver.solve(Mode::Minimize, Limits::none())?;
    match (outcome, exp) {
        (Outcome::Unsat, Expected { unsat: true, .. }) => Ok(()),
        (Outcome::Optimum, Expected { optimum: Some(opt), .. }) => {
            if solver.best_goalvalue() != opt {
                return Err(format!(
                    "expected optimum {opt}, found {}",
                    solver.best_goalvalue()
                )
                .into());
            }
            Ok(())
        }
        (Outcome::Sat, Expected {
            optimum: None,
            unsat: false,
            ..
        }) => Ok(()),
        (Outcome::Terminated(t), _) => Err(format!("solving terminated early: {t}").into()),
        (outcome, exp) => Err(format!("unexpected outcome {outcome:?} for {exp:?}").into()),
    }
}

fn run_all_solutions(path: &std::path::Path, opts: Options, exp: Expected) -> Result<(), Failed> {
    let mut solver = load(path, opts)?;
    let outcome = solver.solve(Mode::AllSolutions, Limits::none())?;
    if let Outcome::Terminated(t) = outcome {
        return Err(format!("solving terminated early: {t}").into());
    }
    let n_sols = solver.all_models().len();
    if Some(n_sols) != exp.n_sols {
        return Err(format!("expected {:?} solutions, found {n_sols}", exp.n_sols).into());
    }
    Ok(())
}

mod setup {
    use std::{
        ffi::OsStr,
        fs::File,
        io::{BufRead, BufReader},
        path::Path,
    };

    use libtest_mimic::{Failed, Trial};
    use pbsat_core::{Options, Weight};

    pub struct TestSetup<'a, F> {
        run_fn: F,
        opts: Options,
        mode: &'a str,
        variant: &'a str,
        filter: Box<dyn Fn(Expected) -> bool>,
    }

    /// The expected results declared in the header of an instance
    #[derive(Debug, Copy, Clone, Default)]
    pub struct Expected {
        pub optimum: Option<Weight>,
        pub unsat: bool,
        pub n_sols: Option<usize>,
        pub ignore: bool,
    }

    impl Expected {
        fn read(path: &Path) -> Expected {
            let mut exp = Expected::default();
            for line in
                BufReader::new(File::open(path).expect("failed to open instance file")).lines()
            {
                let line = line.expect("failed to read test config");
                let Some(line) = line.strip_prefix('*') else {
                    break;
                };
                let line = line.trim();
                if line == "ignore-test" {
                    exp.ignore = true;
                } else if line == "unsat" {
                    exp.unsat = true;
                } else if let Some(val) = line.strip_prefix("optimum:") {
                    exp.optimum = Some(val.trim().parse().expect("invalid optimum"));
                } else if let Some(val) = line.strip_prefix("n-sols:") {
                    exp.n_sols = Some(val.trim().parse().expect("invalid solution count"));
                }
            }
            exp
        }
    }

    impl<'a, F> TestSetup<'a, F>
    where
        F: Fn(&Path, Options, Expected) -> Result<(), Failed> + Clone + Send + 'static,
    {
        pub fn new(mode: &'a str, variant: &'a str, run_fn: F, opts: Options) -> Self {
            Self {
                run_fn,
                opts,
                mode,
                variant,
                filter: Box::new(|_| false),
            }
        }

        /// Skips instances for which the filter returns `true`
        pub fn filter(mut self, filter: impl Fn(Expected) -> bool + 'static) -> Self {
            self.filter = Box::new(filter);
            self
        }

        fn kind(&self) -> String {
            format!(
                "{}{}{}",
                self.mode,
                if self.variant.is_empty() { "" } else { ":" },
                self.variant
            )
        }

        pub fn collect_tests(self) -> Vec<Trial> {
            let manifest_dir = env!("CARGO_MANIFEST_DIR");
            let mut tests = vec![];
            for entry in std::fs::read_dir(format!("{manifest_dir}/data/"))
                .expect("failed to find test instances")
            {
                let entry = entry.unwrap();
                let file_type = entry.file_type().unwrap();
                let path = entry.path();
                if !file_type.is_file() {
                    eprintln!("skipping `{path:?}`");
                    continue;
                }
                match path.extension() {
                    Some(ext) if ext == OsStr::new("opb") => {
                        let name = path.file_stem().unwrap().to_str().unwrap().to_string();
                        let exp = Expected::read(&path);
                        if (*self.filter)(exp) {
                            continue;
                        }
                        let run_fn = self.run_fn.clone();
                        let opts = self.opts;
                        tests.push(
                            Trial::test(name, move || run_fn(&path, opts, exp))
                                .with_kind(self.kind())
                                .with_ignored_flag(exp.ignore),
                        );
                    }
                    _ => eprintln!("skipping file `{path:?}`"),
                }
            }
            tests
        }
    }
}
