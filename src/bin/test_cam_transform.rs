// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::time::Duration;

use clap::Parser;
use naotf::check::{run, CheckConfig};
use naotf::motion::types::{Chain, Space};
use naotf::motion::{RemoteMotionProxy, DEFAULT_MOTION_PORT};
use naotf::tf::listener::DEFAULT_TF_PORT;
use naotf::tf::{BaseFootprintPublisher, FootprintFrames, TransformListener};
use naotf::TfCheckResult;
use tracing::Level;

/// Checks that the top camera transform computed by the motion service matches the one
/// published in the frame tree.
///
/// Prints both transforms and the norm of their difference.
#[derive(Parser, Debug)]
#[clap(author, version, name = "test_cam_transform")]
struct CommandLineArguments {
    /// IP-Address or hostname of the robot
    #[clap(long, default_value = "ra.local")]
    pub robot_ip: String,

    /// Port of the motion bridge
    #[clap(long, default_value_t = DEFAULT_MOTION_PORT)]
    pub port: u16,

    /// Local UDP port on which transforms are received
    #[clap(long, default_value_t = DEFAULT_TF_PORT)]
    pub tf_port: u16,

    /// Space of the kinematic transform: torso, world or robot
    #[clap(long, default_value = "torso", value_parser)]
    pub space: Space,

    /// Kinematic chain to check
    #[clap(long, default_value = "CameraTop", value_parser)]
    pub chain: Chain,

    /// Target frame of the lookup, the frame of the space if not given
    #[clap(long)]
    pub frame_a: Option<String>,

    /// Source frame of the lookup, the frame of the chain if not given
    #[clap(long)]
    pub frame_b: Option<String>,

    /// Seconds to wait for the transform
    #[clap(long, default_value = "1.0", value_parser = parse_timeout)]
    pub timeout: Duration,

    /// Derive base_footprint from the soles while listening
    #[clap(long, action)]
    pub base_footprint: bool,

    /// More log output, may be repeated
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_timeout(seconds: &str) -> Result<Duration, String> {
    let seconds: f64 = seconds.parse().map_err(|e| format!("{}", e))?;
    if !seconds.is_finite() || seconds < 0. {
        return Err(format!("{} is not a valid timeout", seconds));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> TfCheckResult<()> {
    let args = CommandLineArguments::parse();
    init_logging(args.verbose);

    let (space, chain) = (args.space, args.chain);
    let config = CheckConfig {
        space,
        chain,
        frame_a: args
            .frame_a
            .unwrap_or_else(|| space.tf_frame().to_string()),
        frame_b: args.frame_b.unwrap_or_else(|| chain.tf_frame()),
        timeout: args.timeout,
        ..CheckConfig::default()
    };

    let mut listener = TransformListener::new("0.0.0.0", Some(args.tf_port), None)?;
    if args.base_footprint {
        listener =
            listener.with_base_footprint(BaseFootprintPublisher::new(FootprintFrames::default()));
    }

    let mut proxy = match RemoteMotionProxy::new(&args.robot_ip, Some(args.port), None) {
        Ok(proxy) => proxy,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!(
                "Error connecting to the motion service at {}:{}. Please make sure that the motion bridge is running on the robot.",
                args.robot_ip, args.port
            );
            std::process::exit(1);
        }
    };
    println!("motionproxy ready");

    let stdout = std::io::stdout();
    let code = run(&mut proxy, &mut listener, &config, &mut stdout.lock())?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
