use anyhow::{anyhow, bail, Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use nice_bridge::agent::parse_stun_server;
use nice_bridge::signalling::SignallingClient;
use nice_bridge::{native, Agent, AgentConfig, BridgeConfig, Compatibility, EventLoop};
use std::{env, thread, time::Duration};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";
const GATHER_TIMEOUT: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(30);
const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const COMPONENT: u32 = 1;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let symbols = native::init(&BridgeConfig::from_env())?;
    if !symbols.missing_core().is_empty() {
        warn!(missing = ?symbols.missing_core(), "native ICE library incomplete; agents will be inert");
    }

    match args[1].as_str() {
        "inspect" => run_inspect()?,
        "local" => run_local()?,
        "signal" => {
            if args.len() < 3 {
                eprintln!("Error: Missing peer fingerprint");
                eprintln!();
                eprintln!("Usage: {} signal <peer_fingerprint>", args[0]);
                std::process::exit(1);
            }
            run_signal(&args[2])?
        }
        _ => {
            eprintln!("Error: Invalid mode '{}'", args[1]);
            eprintln!();
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_usage(program_name: &str) {
    eprintln!("nice-bridge - libnice ICE agent bindings demo");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  {} inspect                 # Gather and list local candidates", program_name);
    eprintln!("  {} local                   # Connect two in-process agents", program_name);
    eprintln!("  {} signal <peer>           # Connect to a peer via a relay", program_name);
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    STUN_SERVER         STUN server (default {})", DEFAULT_STUN_SERVER);
    eprintln!("    SIGNALLING_URL      WebSocket relay, wss:// or ws:// (signal mode)");
    eprintln!("    LOCAL_FINGERPRINT   Your identity on the relay (default: random)");
    eprintln!("    NICE_LIBRARY_PATH   Explicit path to the libnice shared library");
    eprintln!("    RUST_LOG            Log filter, e.g. nice_bridge=debug");
}

fn agent_config(controlling: bool) -> Result<AgentConfig> {
    let stun = env::var("STUN_SERVER").unwrap_or_else(|_| DEFAULT_STUN_SERVER.to_string());
    let stun_server = parse_stun_server(&stun)
        .ok_or_else(|| anyhow!("Invalid STUN server address '{}'. Expected format: host:port", stun))?;
    Ok(AgentConfig {
        compatibility: Compatibility::Rfc5245,
        controlling,
        stun_server: Some(stun_server),
        disable_extra_features: true,
    })
}

/// Create, configure, wire up and gather. Returns the stream id.
fn prepare(agent: &Agent, config: &AgentConfig) -> Result<u32> {
    if !agent.is_functional() {
        bail!("agent is not functional; is libnice installed?");
    }
    agent.configure(config);
    if !agent.connect_signals() {
        warn!("not every signal connected");
    }

    let stream_id = agent.add_stream(1);
    if stream_id == 0 {
        bail!("failed to add stream");
    }

    // Receivers before gathering so no early packet is lost
    agent.attach_receiver(stream_id, COMPONENT);

    if !agent.gather_candidates(stream_id) {
        bail!("failed to start candidate gathering");
    }
    agent
        .events()
        .wait_gathering_done(GATHER_TIMEOUT)
        .context("Candidate gathering did not finish")?;
    info!(agent = agent.events().label(), stream_id, "gathering complete");
    Ok(stream_id)
}

fn run_inspect() -> Result<()> {
    let event_loop = EventLoop::new();
    event_loop.start();

    let mut agent = Agent::new(Some(&event_loop), Compatibility::Rfc5245);
    let stream_id = prepare(&agent, &agent_config(true)?)?;

    let stream = agent.stream(stream_id);
    println!("Local candidates (stream {}):", stream_id);
    for candidate in stream.local_candidates(COMPONENT) {
        println!("  {}", candidate);
    }
    for announced in agent.events().drain_new_candidates() {
        println!("  announced foundation {}", announced.foundation);
    }
    println!("Component state: {}", stream.component_state(COMPONENT));
    println!();
    println!("Local description:");
    println!("{}", agent.generate_local_description());

    agent.close();
    event_loop.close();
    Ok(())
}

/// One side of the in-process demo
fn local_peer(
    controlling: bool,
    outgoing: Sender<String>,
    incoming: Receiver<String>,
) -> Result<()> {
    let event_loop = EventLoop::new();
    event_loop.start();

    let mut agent = Agent::new(Some(&event_loop), Compatibility::Rfc5245);
    let label = agent.events().label().to_string();
    let stream_id = prepare(&agent, &agent_config(controlling)?)?;

    outgoing
        .send(agent.generate_local_description())
        .context("Peer thread went away")?;
    let remote = incoming
        .recv_timeout(READY_TIMEOUT)
        .context("No description from peer")?;

    if agent.parse_remote_description(&remote) < 0 {
        bail!("{}: remote description rejected", label);
    }

    agent
        .events()
        .wait_ready(READY_TIMEOUT)
        .with_context(|| format!("{}: connection not ready", label))?;
    println!("{}: READY", label);

    if controlling {
        let message = format!("Hello from {}", label);
        let sent = agent.send(stream_id, COMPONENT, message.as_bytes());
        println!("{}: sent {} bytes", label, sent);
    } else {
        let data = agent
            .events()
            .recv_data(RECV_TIMEOUT)
            .with_context(|| format!("{}: nothing received", label))?;
        println!("{}: received '{}'", label, String::from_utf8_lossy(&data.payload));
    }

    // Let the last packet leave before tearing down
    thread::sleep(Duration::from_millis(500));
    agent.close();
    event_loop.close();
    Ok(())
}

fn run_local() -> Result<()> {
    let (left_tx, right_rx) = channel::bounded(1);
    let (right_tx, left_rx) = channel::bounded(1);

    let left = thread::Builder::new()
        .name("agent-left".into())
        .spawn(move || local_peer(true, left_tx, left_rx))?;
    let right = thread::Builder::new()
        .name("agent-right".into())
        .spawn(move || local_peer(false, right_tx, right_rx))?;

    let left = left.join().map_err(|_| anyhow!("left agent thread panicked"))?;
    let right = right.join().map_err(|_| anyhow!("right agent thread panicked"))?;
    left.and(right)?;

    println!("Local exchange complete");
    Ok(())
}

fn run_signal(peer_fingerprint: &str) -> Result<()> {
    let signalling_url = env::var("SIGNALLING_URL")
        .context("SIGNALLING_URL environment variable not set. Example: wss://your-server.com:8443")?;

    let local_fingerprint = env::var("LOCAL_FINGERPRINT").unwrap_or_else(|_| {
        let random_id = format!("peer_{}", rand::random::<u32>());
        println!("LOCAL_FINGERPRINT not set, using random ID: {}", random_id);
        random_id
    });

    if local_fingerprint == peer_fingerprint {
        bail!("LOCAL_FINGERPRINT cannot be the same as the target peer");
    }

    // The lower fingerprint takes the controlling role
    let controlling = local_fingerprint.as_str() < peer_fingerprint;

    let event_loop = EventLoop::new();
    event_loop.start();
    let mut agent = Agent::new(Some(&event_loop), Compatibility::Rfc5245);
    let stream_id = prepare(&agent, &agent_config(controlling)?)?;
    let description = agent.generate_local_description();

    let runtime = tokio::runtime::Runtime::new()?;
    let remote = runtime.block_on(async {
        if signalling_url.starts_with("ws://") {
            let client = SignallingClient::connect_plain(&signalling_url).await?;
            relay(client, &local_fingerprint, peer_fingerprint, &description).await
        } else {
            let client = SignallingClient::connect(&signalling_url).await?;
            relay(client, &local_fingerprint, peer_fingerprint, &description).await
        }
    })?;

    if agent.parse_remote_description(&remote) < 0 {
        bail!("remote description rejected");
    }
    agent
        .events()
        .wait_ready(READY_TIMEOUT)
        .context("Connection not ready")?;
    println!("Connected to {}", peer_fingerprint);

    let message = format!("Hello from {}", local_fingerprint);
    agent.send(stream_id, COMPONENT, message.as_bytes());
    match agent.events().recv_data(RECV_TIMEOUT) {
        Ok(data) => println!("{}: {}", peer_fingerprint, String::from_utf8_lossy(&data.payload)),
        Err(e) => println!("No message from {} ({})", peer_fingerprint, e),
    }

    agent.close();
    event_loop.close();
    Ok(())
}

async fn relay<S>(
    mut client: SignallingClient<S>,
    local_fingerprint: &str,
    peer_fingerprint: &str,
    description: &str,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    client.register(local_fingerprint).await?;
    let peer = client.exchange_description(peer_fingerprint, description).await?;
    let _ = client.close().await;
    Ok(peer.description)
}
