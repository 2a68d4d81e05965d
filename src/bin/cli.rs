use cdata::{
    control::{CMD_APPEND, CMD_INSPECT, CMD_RESET},
    defaults, BackingType, CancelReporting, CdataError, Device, DeviceConfig, RearmPolicy, Result,
};
use clap::{App, Arg, SubCommand};
use std::{sync::Arc, thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("cdata-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Bounded drain buffer exerciser")
        .arg(
            Arg::with_name("capacity")
                .short("c")
                .long("capacity")
                .value_name("BYTES")
                .help("Bytes of storage per session")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("delay")
                .short("d")
                .long("delay")
                .value_name("MS")
                .help("Drain delay in milliseconds")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("accumulate")
                .long("accumulate")
                .help("Every arm adds an independent drain firing")
                .global(true),
        )
        .arg(
            Arg::with_name("short_write")
                .long("short-write")
                .help("Report interrupted writes as short writes")
                .global(true),
        )
        .arg(
            Arg::with_name("anonymous")
                .long("anonymous")
                .help("Back each session with an anonymous memory map")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("write")
                .about("Write chunks through one session")
                .arg(
                    Arg::with_name("chunk")
                        .long("chunk")
                        .value_name("TEXT")
                        .help("Chunk to write, in order")
                        .required(true)
                        .multiple(true)
                        .number_of_values(1)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Concurrent writers, one session each")
                .arg(
                    Arg::with_name("writers")
                        .short("w")
                        .long("writers")
                        .value_name("N")
                        .help("Number of writer threads")
                        .default_value("2")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("ioctl")
                .about("Run side-channel commands against a fresh session")
                .arg(
                    Arg::with_name("prefill")
                        .long("prefill")
                        .value_name("TEXT")
                        .help("Bytes written before the commands run")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("command")
                        .long("command")
                        .value_name("CODE[:PAYLOAD]")
                        .help("Command code (0 reset, 1 inspect, 2 append)")
                        .required(true)
                        .multiple(true)
                        .number_of_values(1)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show version and default configuration"),
        )
        .get_matches();

    let config = build_config(&matches)?;

    match matches.subcommand() {
        ("write", Some(write_matches)) => handle_write(config, write_matches),
        ("demo", Some(demo_matches)) => handle_demo(config, demo_matches),
        ("ioctl", Some(ioctl_matches)) => handle_ioctl(config, ioctl_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| CdataError::invalid_parameter(name, format!("Invalid value '{}'", value))),
        None => Ok(None),
    }
}

fn build_config(matches: &clap::ArgMatches) -> Result<DeviceConfig> {
    let mut config = DeviceConfig::default();

    if let Some(capacity) = parse_arg(matches, "capacity")? {
        config = config.with_capacity(capacity);
    }
    if let Some(delay) = parse_arg::<u64>(matches, "delay")? {
        config = config.with_drain_delay(Duration::from_millis(delay));
    }
    if matches.is_present("accumulate") {
        config = config.with_rearm_policy(RearmPolicy::Accumulate);
    }
    if matches.is_present("short_write") {
        config = config.with_cancel_reporting(CancelReporting::ShortWrite);
    }
    if matches.is_present("anonymous") {
        config = config.with_backing(BackingType::Anonymous);
    }

    config.validate()?;
    Ok(config)
}

fn handle_write(config: DeviceConfig, matches: &clap::ArgMatches) -> Result<()> {
    let device = Device::new(config)?;
    let session = device.open()?;

    println!(
        "Session {} on '{}': {} byte(s), {:?} backing, {:?} rearm, drain after {:?}",
        session.id(),
        device.name(),
        session.capacity(),
        session.backing(),
        session.rearm_policy(),
        device.config().drain_delay
    );

    for chunk in matches.values_of("chunk").into_iter().flatten() {
        let admitted = session.write(chunk.as_bytes())?;
        println!("wrote {:?}: {} byte(s), idx = {}", chunk, admitted, session.idx());
    }

    let stats = session.stats();
    let waiters = session.waiter_stats();
    let snapshot = session.close();
    println!("\nFinal buffer: {}", snapshot);
    println!("Stats: {}", stats.summary());
    println!("Waits: {}, wakes: {}", waiters.wait_count, waiters.wake_count);
    Ok(())
}

fn handle_demo(config: DeviceConfig, matches: &clap::ArgMatches) -> Result<()> {
    let writers: usize = parse_arg(matches, "writers")?.unwrap_or(2);
    let device = Arc::new(Device::new(config)?);

    println!("Running {} writer(s) against '{}'", writers, device.name());

    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let device = Arc::clone(&device);
            thread::spawn(move || -> Result<String> {
                let session = device.open()?;
                session.write(b"he")?;
                session.write(b"llo")?;
                let snapshot = session.close();
                Ok(format!("writer {}: {}", i, snapshot))
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(Ok(line)) => println!("  {}", line),
            Ok(Err(e)) => println!("  writer failed: {}", e),
            Err(_) => println!("  writer panicked"),
        }
    }

    println!("\nSessions opened: {}", device.sessions_opened());
    Ok(())
}

fn handle_ioctl(config: DeviceConfig, matches: &clap::ArgMatches) -> Result<()> {
    let device = Device::new(config)?;
    let session = device.open()?;
    let side = session.side_channel();

    if let Some(prefill) = matches.value_of("prefill") {
        side.append(prefill.as_bytes())?;
    }

    for command in matches.values_of("command").into_iter().flatten() {
        let (code, payload) = match command.split_once(':') {
            Some((code, payload)) => (code, payload),
            None => (command, ""),
        };
        let code: u32 = code
            .parse()
            .map_err(|_| CdataError::invalid_parameter("command", format!("Invalid code '{}'", code)))?;

        match side.ioctl(code, payload.as_bytes()) {
            Ok(reply) => println!("{} -> {:?}", command, reply),
            Err(e) => println!("{} -> error: {}", command, e),
        }
    }

    println!("\nFinal buffer: {}", session.close());
    Ok(())
}

fn show_info() -> Result<()> {
    println!("cdata bounded drain buffer");
    println!("Version: {}", cdata::VERSION);

    println!("\nDefaults:");
    println!("  Device name: {}", defaults::DEVICE_NAME);
    println!("  Capacity: {} bytes", defaults::BUF_SIZE);
    println!("  Drain delay: {:?}", defaults::DRAIN_DELAY);

    println!("\nSide-channel commands:");
    println!("  {} reset", CMD_RESET);
    println!("  {} inspect", CMD_INSPECT);
    println!("  {} append", CMD_APPEND);

    Ok(())
}
