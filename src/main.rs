//! nn-dispatch CLI entry point.
//!
//! ## CLI Subcommands
//!
//! - `nn-dispatch-cli` or `nn-dispatch-cli selftest` - Run a reference network through the worker (default)
//! - `nn-dispatch-cli config show` - Print effective configuration as JSON
//! - `nn-dispatch-cli config validate` - Check configuration (exit 0/2)

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use nn_dispatch::config::{self, ConfigError, DriverConfig};
use nn_dispatch::execution::MeasureTiming;
use nn_dispatch::memory::{MemoryPool, MemoryRegion};
use nn_dispatch::model::{DataLocation, Model, OperandType, Request, RequestArgument, TensorInfo};
use nn_dispatch::runtime::{ReferenceNetwork, ReferenceRuntime};
use nn_dispatch::telemetry::init_logging;
use nn_dispatch::Driver;

const LHS: [f32; 4] = [1.0, 2.0, 3.0, 4.0];
const RHS: [f32; 4] = [10.0, 20.0, 30.0, 40.0];

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("selftest");

    match command {
        "selftest" | "" => match load_config(&args) {
            Ok(config) => run_selftest(config),
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                ExitCode::from(2u8)
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => run_config_show(&args),
                "validate" => run_config_validate(&args),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("nn-dispatch {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!(
        "nn-dispatch v{}

USAGE:
    nn-dispatch-cli [COMMAND] [OPTIONS]

COMMANDS:
    selftest     Execute a reference network through the worker (default)
    config       Show or validate configuration (show, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    --config FILE  Load configuration from a TOML file instead of the environment

ENVIRONMENT:
    NN_DISPATCH_WORKER_THREAD_NAME  Worker thread name
    NN_DISPATCH_WORKER_STACK_SIZE   Worker stack size in bytes (0 = default)
    NN_DISPATCH_DUMP_DIR            Dump request tensors into this directory
    NN_DISPATCH_PROFILING           Enable runtime profiling (true/false)
    NN_DISPATCH_LOG_LEVEL           Log filter (e.g. nn_dispatch=debug)
    NN_DISPATCH_LOG_FORMAT          json or pretty

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        env!("CARGO_PKG_VERSION")
    );
}

/// Value following `flag` on the command line, if any.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn load_config(args: &[String]) -> Result<DriverConfig, ConfigError> {
    match flag_value(args, "--config") {
        Some(path) => config::load_file(Path::new(path)),
        None => Ok(config::load()),
    }
}

fn run_config_show(args: &[String]) -> ExitCode {
    let cfg = match load_config(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2u8);
        }
    };
    match serde_json::to_string_pretty(&cfg.effective_config()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns 0 if valid, 2 if any problem is found.
fn run_config_validate(args: &[String]) -> ExitCode {
    let cfg = match load_config(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(2u8);
        }
    };
    let mut problems = 0;

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&cfg.log.level) {
        eprintln!("ERROR: log level {:?} is not a valid filter: {}", cfg.log.level, e);
        problems += 1;
    }
    if let Some(dir) = &cfg.dump_dir {
        if !dir.is_dir() {
            eprintln!("WARNING: dump dir {} does not exist; dumps will fail", dir.display());
            problems += 1;
        }
    }

    if problems == 0 {
        println!("Configuration is valid.");
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2u8)
    }
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn run_selftest(config: DriverConfig) -> ExitCode {
    if let Err(e) = init_logging(&config.log) {
        eprintln!("Logging disabled: {}", e);
    }

    let runtime = Arc::new(ReferenceRuntime::new());
    let network = runtime.load_network(ReferenceNetwork::AddFloat32);
    let driver = match Driver::new(runtime.clone(), config) {
        Ok(driver) => driver,
        Err(e) => {
            eprintln!("Failed to start worker: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let info = TensorInfo::new(vec![4], OperandType::Float32);
    let model = driver.prepare_model(network, Model::new(vec![info.clone(), info.clone()], vec![info]));

    if !model.execute_with_dummy_inputs() {
        eprintln!("Dummy-input execution failed");
        driver.shutdown();
        return ExitCode::FAILURE;
    }

    let pool = MemoryPool::shared(48);
    pool.write(0, &f32_bytes(&LHS));
    pool.write(16, &f32_bytes(&RHS));
    let request = Request {
        inputs: vec![
            RequestArgument::new(DataLocation::new(0, 0, 16)),
            RequestArgument::new(DataLocation::new(0, 16, 16)),
        ],
        outputs: vec![RequestArgument::new(DataLocation::new(0, 32, 16))],
        pools: vec![MemoryRegion::Shared(pool.clone())],
    };

    let result = model.execute_sync(&request, MeasureTiming::Yes);
    let output: Vec<f32> = pool
        .read(32, 16)
        .unwrap_or_default()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let report = serde_json::json!({
        "status": result.status,
        "output": output,
        "output_shapes": result.output_shapes,
        "time_on_device_us": result.timing.time_on_device.map(|d| d.as_micros() as u64),
        "time_in_driver_us": result.timing.time_in_driver.map(|d| d.as_micros() as u64),
        "processed": driver.worker().processed(),
    });
    println!("{}", report);

    drop(model);
    driver.shutdown();

    let expected: Vec<f32> = LHS.iter().zip(RHS.iter()).map(|(a, b)| a + b).collect();
    if result.status.is_success() && output == expected {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
