use std::env;
use std::fs;
use std::process;

use anyhow::Context;

use ration_engine::{AssessmentRequest, Mode, RationEngine};

fn load_request(path: &str) -> anyhow::Result<AssessmentRequest> {
    let input_data =
        fs::read_to_string(path).with_context(|| format!("reading input file {path}"))?;
    let raw: serde_json::Value =
        serde_json::from_str(&input_data).context("parsing request JSON")?;

    // Requests without an explicit mode fall back to evaluation when the
    // feed rows already carry amounts.
    let has_quantities = raw
        .get("feeds")
        .and_then(|f| f.as_array())
        .map(|rows| {
            rows.iter()
                .any(|row| row.get("quantity_as_fed").map_or(false, |q| !q.is_null()))
        })
        .unwrap_or(false);
    let mode_given = raw.get("mode").is_some();

    let mut request: AssessmentRequest =
        serde_json::from_value(raw).context("building assessment request")?;
    if !mode_given && has_quantities {
        request.mode = Mode::Evaluate;
    }
    Ok(request)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <request_json_file>", args[0]);
        process::exit(1);
    }

    let request = match load_request(&args[1]) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error loading request: {:#}", e);
            process::exit(1);
        }
    };

    let engine = RationEngine::new(request.config.clone());

    let result = match engine.run(&request) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error running assessment: {}", e);
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing results: {}", e);
            process::exit(1);
        }
    }
}
