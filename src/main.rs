use flipgraph::campaign::{run_campaign, CampaignConfig, SaveRule};
use flipgraph::runfile::{self, ResultHeader, RunFile};
use flipgraph::scheme;
use flipgraph::solver::Solver;
use flipgraph::symmetry::Symm;
use flipgraph::validate;
use std::path::PathBuf;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("solve") => solve_main(&args[2..]),
        Some("campaign") => campaign_main(&args[2..]),
        Some("verify") => verify_main(&args[2..]),
        Some("--help" | "-h" | "help") => usage_and_exit(0),
        _ => usage_and_exit(2),
    }
}

/// Drives one engine run over a run file, rewriting it in place.
fn solve_main(args: &[String]) {
    let Some(path) = args.first() else {
        usage_and_exit(2)
    };
    if args.len() > 1 {
        usage_and_exit(2);
    }

    let run = RunFile::read(path).unwrap_or_else(|e| {
        eprintln!("{path}: {e}");
        std::process::exit(1);
    });
    let header = run.header.clone();
    let mut params = header.solve_params();
    params.checkpoint = Some(PathBuf::from(path));

    let mut solver = Solver::new(run.masks, header.symm, params);
    let outcome = solver.run();

    let masks = if outcome.minmuls < outcome.achieved {
        solver.state().best()
    } else {
        solver.state().masks()
    };
    let result = ResultHeader {
        nomuls: header.nomuls,
        flips: outcome.flips,
        rcode: outcome.rcode.code(),
        target: header.target,
        flimit: header.flimit,
        plimit: header.plimit,
        termination: header.termination,
        rseed: header.rseed,
        symm: header.symm,
        maxplus: header.maxplus,
        achieved: outcome.achieved,
        minmuls: outcome.minmuls,
        plus: outcome.plus,
    };
    if let Err(e) = runfile::write_result(path, &result, masks) {
        eprintln!("{path}: {e}");
        std::process::exit(1);
    }
    println!(
        "{} - Flips: {} Achieved: {} Best: {}",
        outcome.rcode, outcome.flips, outcome.achieved, outcome.minmuls
    );
}

/// Constructs a start and launches a batch of runs.
fn campaign_main(args: &[String]) {
    let mut cfg = CampaignConfig {
        dim: 0,
        target: 0,
        runs: 1,
        flimit: 3_000_000,
        log: Some(PathBuf::from("runlog.txt")),
        ..CampaignConfig::default()
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dim" => {
                cfg.dim = parse_value(args.get(i + 1));
                i += 2;
            }
            "--target" => {
                cfg.target = parse_value(args.get(i + 1));
                i += 2;
            }
            "--symm" => {
                let g: i64 = parse_value(args.get(i + 1));
                cfg.symm = Symm::from_group(g).unwrap_or_else(|| usage_and_exit(2));
                i += 2;
            }
            "--diag-cube" => {
                let p = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                cfg.diagonal_cubes.push(p.clone());
                i += 2;
            }
            "--full-cube" => {
                let p = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                cfg.full_cubes.push(p.clone());
                i += 2;
            }
            "--runs" => {
                cfg.runs = parse_value(args.get(i + 1));
                i += 2;
            }
            "--flip-limit" => {
                cfg.flimit = parse_value(args.get(i + 1));
                i += 2;
            }
            "--termination" => {
                let strategy = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                match strategy.as_str() {
                    "LIMIT" => {
                        cfg.termination = 0;
                        i += 2;
                    }
                    "EARLY" => {
                        cfg.termination = 1;
                        i += 2;
                    }
                    "RESET" => {
                        cfg.termination = 2;
                        i += 2;
                    }
                    "SPLIT" => {
                        cfg.termination = parse_value(args.get(i + 2));
                        cfg.split = parse_value(args.get(i + 3));
                        i += 4;
                    }
                    _ => usage_and_exit(2),
                }
            }
            "--plus-after" => {
                cfg.plus_after = parse_value(args.get(i + 1));
                i += 2;
            }
            "--plus-random" => {
                cfg.plus_random = true;
                i += 1;
            }
            "--plus-limit" => {
                cfg.plus_limit = parse_value(args.get(i + 1));
                i += 2;
            }
            "--max-volume" => {
                cfg.maxsize = parse_value(args.get(i + 1));
                i += 2;
            }
            "--max-length" => {
                let l: i64 = parse_value(args.get(i + 1));
                cfg.maxsize = -l;
                i += 2;
            }
            "--save" => {
                let rule = args.get(i + 1).unwrap_or_else(|| usage_and_exit(2));
                cfg.save = if rule == "all" {
                    SaveRule::Improvements
                } else {
                    SaveRule::AtMost(rule.parse().unwrap_or_else(|_| usage_and_exit(2)))
                };
                i += 2;
            }
            "--seed" => {
                cfg.seed = Some(parse_value(args.get(i + 1)));
                i += 2;
            }
            "--jobs" | "--workers" => {
                cfg.jobs = parse_value(args.get(i + 1));
                i += 2;
            }
            "--results" => {
                cfg.results_dir = PathBuf::from(args.get(i + 1).unwrap_or_else(|| usage_and_exit(2)));
                i += 2;
            }
            "--log" => {
                cfg.log = Some(PathBuf::from(args.get(i + 1).unwrap_or_else(|| usage_and_exit(2))));
                i += 2;
            }
            "--no-log" => {
                cfg.log = None;
                i += 1;
            }
            "--resume" => {
                cfg.resume = Some(PathBuf::from(args.get(i + 1).unwrap_or_else(|| usage_and_exit(2))));
                i += 2;
            }
            "--quiet" => {
                cfg.quiet = true;
                i += 1;
            }
            _ => usage_and_exit(2),
        }
    }
    if cfg.dim == 0 || cfg.target == 0 {
        eprintln!("campaign requires --dim and --target");
        usage_and_exit(2);
    }

    match run_campaign(&cfg) {
        Ok(summary) => {
            if summary.best_rank() > Some(cfg.target) {
                std::process::exit(3);
            }
        }
        Err(e) => {
            eprintln!("campaign failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Checks a saved scheme against the multiplication tensor.
fn verify_main(args: &[String]) {
    let mut path = None;
    let mut dim = 0usize;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dim" => {
                dim = parse_value(args.get(i + 1));
                i += 2;
            }
            other if path.is_none() && !other.starts_with("--") => {
                path = Some(other.to_string());
                i += 1;
            }
            _ => usage_and_exit(2),
        }
    }
    let (Some(path), true) = (path, dim > 0) else {
        usage_and_exit(2)
    };

    let terms = scheme::read_scheme(&path, dim).unwrap_or_else(|e| {
        eprintln!("{path}: {e}");
        std::process::exit(1);
    });
    match validate::verify_terms(dim, &terms) {
        Ok(()) => println!("Valid scheme: {} multiplications for {dim}x{dim}.", terms.len()),
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(1);
        }
    }
}

fn parse_value<T: std::str::FromStr>(arg: Option<&String>) -> T {
    arg.unwrap_or_else(|| usage_and_exit(2))
        .parse()
        .unwrap_or_else(|_| usage_and_exit(2))
}

fn usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage:\n  flipgraph solve <runfile>\n  flipgraph campaign --dim N --target T [options]\n  flipgraph verify <scheme-file> --dim N\n\nCampaign options:\n  --symm 3|6                Orbit structure (default: 3)\n  --diag-cube PATTERN       Diagonal seed cube (repeatable, e.g. 11)\n  --full-cube PATTERN       Full seed cube (repeatable, e.g. 1001)\n  --runs N                  Independent runs (default: 1)\n  --flip-limit N            Flip budget per run (default: 3000000)\n  --termination STRATEGY    LIMIT | EARLY | RESET | SPLIT <rank> <pct>\n  --plus-after N            Flips between plus transitions (0 = never)\n  --plus-random             Randomize plus spacing around --plus-after\n  --plus-limit N            Overall rank budget for plus transitions\n  --max-volume V            Reject flips above term volume V\n  --max-length L            Reject flips above component weight L\n  --save N|all              Archive schemes of rank <= N, or improvements\n  --seed S                  Base seed for reproducible campaigns\n  --jobs N                  Worker threads (default: all cores)\n  --results DIR             Archive directory (default: results)\n  --log FILE | --no-log     Run log (default: runlog.txt)\n  --resume FILE             Start from a saved scheme\n  --quiet                   Suppress progress output\n"
    );
    std::process::exit(code)
}
