use std::{env, thread, time::Duration};

use dps_psu::{
    config::SessionConfig,
    psu::DpsPsu,
    register::{BaudRate, ProtectionKind},
    serial::SerialTransport,
    transport::Transport,
};
use inquire::Select;
use tracing_subscriber::EnvFilter;

// Configuration constants - adjust these for your setup
const BAUD_RATE: BaudRate = BaudRate::_115200;
const OUTPUT_VOLTAGE_V: f32 = 5.5;
const CURRENT_LIMIT_A: f32 = 0.1;
const OVER_POWER_W: f32 = 10.0;
const STABILIZATION_DELAY_MS: u64 = 3000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let transport = SerialTransport::new(BAUD_RATE);

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let ports = transport
            .enumerate()
            .expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports
            .iter()
            .map(|p| match &p.description {
                Some(description) => format!("{} ({description})", p.name),
                None => p.name.clone(),
            })
            .collect();

        let choice = Select::new("Select a serial port:", port_names)
            .raw_prompt()
            .expect("Failed to select port");
        ports[choice.index].name.clone()
    });

    println!("Using port: {}", port_name);

    let config = SessionConfig::builder().with_baud_rate(BAUD_RATE).build();
    let mut psu = DpsPsu::new(transport, config);
    psu.connect(&port_name).expect("Failed to connect");

    let identity = psu.identity();
    println!(
        "Connected to {} (hardware {}, firmware {})",
        identity.model_name, identity.hardware_version, identity.firmware_version
    );

    psu.subscribe(|state| {
        println!(
            "{:>6.3}V {:>6.3}A {:>7.3}W  {:?} {}",
            state.output_voltage,
            state.output_current,
            state.output_power,
            state.mode,
            state.protection_fault.mnemonic()
        );
        Ok(())
    });

    psu.set_protection_limit(ProtectionKind::OverPower, OVER_POWER_W)
        .unwrap();
    psu.set_voltage(OUTPUT_VOLTAGE_V).unwrap();
    println!("Set output voltage to {}V", OUTPUT_VOLTAGE_V);
    psu.set_current(CURRENT_LIMIT_A).unwrap();
    println!("Set current limit to {}A", CURRENT_LIMIT_A);

    psu.set_output_enabled(true).unwrap();
    println!("Output enabled");

    // Watch a few polls go by
    thread::sleep(Duration::from_millis(STABILIZATION_DELAY_MS));

    psu.set_output_enabled(false).unwrap();
    println!("Output disabled");

    println!("\n--- Final state ---");
    println!("{:#?}", psu.snapshot());

    psu.disconnect();
}
