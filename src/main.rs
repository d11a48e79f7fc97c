use log::{debug, error, info};
use std::env;
use std::fs::File;
use std::io::{self, prelude::*};
use std::process;
use std::rc::Rc;

use zvm::config::{Config, DisplayMode};
use zvm::display_headless::HeadlessDisplay;
use zvm::display_terminal::TerminalDisplay;
use zvm::display_trait::ZMachineDisplay;
use zvm::error::VmError;
use zvm::input::{FlushBeforeRead, StdinInput, ZMachineInput};
use zvm::interpreter::Interpreter;
use zvm::memory::Memory;
use zvm::vm::VM;
use zvm::zrand::ZRand;

fn usage(program: &str) {
    println!("zvm - Z-Machine interpreter for story files");
    println!();
    println!(
        "Usage: {} <story_file> [--config FILE] [--seed N] [--limit N]",
        program
    );
    println!();
    println!("  --config FILE  read settings from a TOML file");
    println!("  --seed N       predictable random numbers from seed N");
    println!("  --limit N      stop after N instructions");
    println!();
    println!("Set RUST_LOG=debug (or trace) for execution logging.");
}

/// Value following a flag, parsed as a number
fn numeric_arg(args: &[String], i: usize, flag: &str) -> Result<u64, String> {
    let value = args
        .get(i + 1)
        .ok_or_else(|| format!("{} needs a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, value))
}

/// Parse the command line into a story path and the effective configuration
fn parse_args(args: &[String]) -> Result<(String, Config), String> {
    let story = args[1].clone();
    let mut config_path = None;
    let mut seed = None;
    let mut limit = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = args.get(i + 1).ok_or("--config needs a file")?;
                config_path = Some(path.clone());
            }
            "--seed" => seed = Some(numeric_arg(args, i, "--seed")?),
            "--limit" => limit = Some(numeric_arg(args, i, "--limit")?),
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 2;
    }

    let mut config = match config_path {
        Some(path) => Config::load(&path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    // Command line flags win over the file
    if seed.is_some() {
        config.random_seed = seed;
    }
    if limit.is_some() {
        config.max_instructions = limit;
    }
    Ok((story, config))
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return;
    }

    let (story_path, config) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("Error: {}", message);
            process::exit(2);
        }
    };
    debug!("Configuration: {:?}", config);

    let mut story = Vec::new();
    if let Err(e) = File::open(&story_path).and_then(|mut f| f.read_to_end(&mut story)) {
        eprintln!("Error: Cannot read story file '{}': {}", story_path, e);
        process::exit(1);
    }

    match run(story, &config) {
        Ok(()) => debug!("Story ended normally"),
        Err(e) if matches!(e.root_cause(), VmError::InputClosed) => {
            info!("Input closed, stopping")
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("\nError during execution: {}", e);
            process::exit(1);
        }
    }
}

fn run(story: Vec<u8>, config: &Config) -> Result<(), VmError> {
    let memory = Memory::load(story)?;
    let vm = VM::new(memory)?;
    info!("Story header:\n{}", vm.header());

    // Headless output is printed whenever the story waits for input, and
    // whatever is left once it stops
    let mut transcript = None;
    let display: Box<dyn ZMachineDisplay> = match config.display {
        DisplayMode::Terminal => Box::new(TerminalDisplay::new((
            config.screen_width,
            config.screen_height,
        ))),
        DisplayMode::Headless => {
            let display = HeadlessDisplay::with_size(config.screen_width, config.screen_height);
            transcript = Some(display.transcript());
            Box::new(display)
        }
    };
    let rng = match config.random_seed {
        Some(seed) => ZRand::new_predictable(seed),
        None => ZRand::new_uniform(),
    };

    let input: Box<dyn ZMachineInput> = match &transcript {
        Some(pending) => Box::new(FlushBeforeRead::new(
            Box::new(StdinInput::new()),
            Rc::clone(pending),
            io::stdout(),
        )),
        None => Box::new(StdinInput::new()),
    };

    let mut interpreter = Interpreter::new(vm, display, input, Box::new(rng))?;
    let result = interpreter.run_with_limit(config.max_instructions);
    info!("{} instructions executed", interpreter.instruction_count());
    if let Some(transcript) = transcript {
        print!("{}", transcript.borrow());
    }
    result
}
