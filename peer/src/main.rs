use std::time::Duration;

use argh::FromArgs;
use log::{error, info};
use pceps_core::peer::{Driver, PeerState};
use pceps_core::transport::{UdpTransport, MPC_PORT};
use pceps_core::wire::Version;

/// Run a PCEPS/PCEAS peer.
#[derive(FromArgs, Debug)]
struct Options {
    /// this party's identifier (must not be 0)
    #[argh(option)]
    pid: u64,

    /// act as the round-opening Master
    #[argh(switch)]
    master: bool,

    /// protocol version to run: "pceps" or "pceas"
    #[argh(option, default = "\"pceps\".to_string()")]
    version: String,

    /// UDP port to bind (default: the protocol's standard port)
    #[argh(option, default = "MPC_PORT")]
    bind_port: u16,

    /// seconds between Master round-opening attempts
    #[argh(option, default = "30")]
    round_interval: u64,
}

fn parse_version(s: &str) -> Version {
    match s.to_ascii_lowercase().as_str() {
        "pceas" => Version::Pceas,
        _ => Version::Pceps,
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let options: Options = argh::from_env();

    if options.pid == 0 {
        error!("party id 0 is reserved and cannot be used");
        return;
    }

    let version = parse_version(&options.version);
    let state = PeerState::new(options.pid, options.master, version);
    let transport = match UdpTransport::bind(options.bind_port).await {
        Ok(t) => t,
        Err(e) => {
            error!("failed to bind UDP socket on port {}: {e}", options.bind_port);
            return;
        }
    };
    let mut driver = Driver::new(state, transport);

    info!("party {} starting ({})", options.pid, if options.master { "master" } else { "participant" });
    if let Err(e) = driver.announce().await {
        error!("failed to announce: {e}");
        return;
    }

    let round_interval = Duration::from_secs(options.round_interval);
    loop {
        if options.master {
            if let Err(e) = driver.open_round().await {
                error!("failed to open round: {e}");
            }
        }
        if let Err(e) = driver.drive_until(round_interval).await {
            error!("driver loop error: {e}");
        }
        driver.state.clean();
    }
}

