/*! Outernet carousel receiver.

Listens on a multicast UDP socket (or replays a captured line-framed log
with `-k`), strips the Ethernet envelope, reassembles L4 datagrams out of
L3 fragments (repairing packet loss with Reed-Solomon FEC when needed),
validates each datagram's CRC, and routes it to the file service or time
service by type. Reconstructed files are written under `-o/--output`.

```no_run
$ mkdir out
$ outernet-rx -o out -p 8280
[…]
$ outernet-rx -o out -k captured.kiss
[…]
```
*/
use std::cell::RefCell;
use std::net::IpAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;

use outernet_rx::carrier::{replay_kiss_log, MulticastCarrier};
use outernet_rx::defrag::Defragmenter;
use outernet_rx::ethernet::EthernetStripper;
use outernet_rx::file_service::FileService;
use outernet_rx::ldp::LdpPacket;
use outernet_rx::op::OpPacket;
use outernet_rx::router::Router;
use outernet_rx::time_service::TimeService;

const TIME_SERVICE_LDP_TYPE: u8 = 0x81;

#[derive(clap::Parser, Debug)]
#[command(version, about)]
struct Opt {
    #[arg(long = "output", short, default_value = ".", help = "Directory to write reconstructed files to")]
    output: PathBuf,

    #[arg(long = "kiss", short, help = "Read a line-framed log file instead of the network", conflicts_with_all = ["port", "host"])]
    kiss: Option<PathBuf>,

    #[arg(long = "port", short, help = "UDP port to listen on", conflicts_with = "kiss")]
    port: Option<u16>,

    #[arg(long = "host", default_value = "::", help = "Bind host", conflicts_with = "kiss")]
    host: IpAddr,

    #[arg(short = 'v', action = clap::ArgAction::Count, help = "Increase logging verbosity")]
    verbose: u8,
}

/// Runs one raw frame through Ethernet-stripping, L3 parsing, L3
/// defragmentation, L4 parsing, and routing.
fn process_frame(
    frame: &[u8],
    eth: &mut EthernetStripper,
    defrag: &mut Defragmenter,
    router: &Router,
) {
    let Some(l3) = eth.strip(frame) else { return };
    let packet = match OpPacket::parse(l3) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("dropping OP fragment: {e}");
            return;
        }
    };
    let Some(datagram) = defrag.push(&packet) else {
        return;
    };
    match LdpPacket::parse(&datagram) {
        Ok(ldp) => router.route(&ldp),
        Err(e) => log::debug!("dropping LDP datagram: {e}"),
    }
}

fn run(opt: Opt) -> Result<()> {
    let mut eth = EthernetStripper::new();
    let mut defrag = Defragmenter::new();
    let mut router = Router::new();

    let file_service = Rc::new(RefCell::new(FileService::new(opt.output.clone())));
    FileService::register(&file_service, &mut router);
    let time_service = Rc::new(RefCell::new(TimeService::new()));
    router.register(TIME_SERVICE_LDP_TYPE, time_service);

    if let Some(path) = &opt.kiss {
        let frames = replay_kiss_log(path)
            .with_context(|| format!("reading line-framed log {}", path.display()))?;
        log::info!("replaying {} frames from {}", frames.len(), path.display());
        for frame in &frames {
            process_frame(frame, &mut eth, &mut defrag, &router);
        }
        return Ok(());
    }

    let port = opt.port.unwrap_or(8280);
    let carrier = MulticastCarrier::bind(opt.host, port)
        .with_context(|| format!("binding multicast carrier to {}:{port}", opt.host))?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            eprintln!("Received Ctrl+C!");
            running.store(false, Ordering::SeqCst);
        })
        .context("setting Ctrl-C handler")?;
    }

    let mut buf = vec![0u8; 65536];
    while running.load(Ordering::SeqCst) {
        match carrier.recv_frame(&mut buf) {
            Ok(Some(n)) => process_frame(&buf[..n], &mut eth, &mut defrag, &router),
            Ok(None) => {} // read timed out, loop back to check `running`
            Err(e) => log::warn!("receive error: {e}"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(e) => {
            // clap exits with code 2 on a usage error; the specification
            // calls for 1, reserving 0 for `--help`/`--version` and normal
            // interrupt.
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            e.print().ok();
            std::process::exit(code);
        }
    };
    stderrlog::new()
        .module(module_path!())
        .module("outernet_rx")
        .quiet(false)
        .verbosity(opt.verbose as usize + 1) // default to "warn"
        .timestamp(stderrlog::Timestamp::Second)
        .init()?;
    run(opt)
}
