use std::fmt::Write;
use std::process;

use clap::{Parser, Subcommand};
use log::{debug, error};

use ofp_monitor::flow_monitor::{append_flow_monitor_request, decode_flow_monitor_cancel,
                                decode_flow_monitor_pause, encode_flow_monitor_cancel,
                                encode_flow_monitor_pause, format_flow_monitor_request,
                                parse_flow_monitor_request, FlowMonitorRequestCursor,
                                MonitorPause};
use ofp_monitor::flow_removed::{decode_flow_removed, format_flow_removed};
use ofp_monitor::flow_update::{format_flow_update, FlowUpdateCursor};
use ofp_monitor::group_meter::{GroupMod, MeterMod};
use ofp_monitor::ofp_errors::OfpError;
use ofp_monitor::ofp_header::OfpHeader;
use ofp_monitor::ofp_message::{OfpMessage, OfpRaw, RawMessage};
use ofp_monitor::ofp_port::PortMap;
use ofp_monitor::ofp_print::TableMap;
use ofp_monitor::ofp_protocol::Protocol;
use ofp_monitor::request_forward::{decode_request_forward, format_request_forward};

/// Encode and decode OpenFlow flow monitoring messages
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Protocol to encode for
    #[clap(short, long, default_value = "of14")]
    protocol: Protocol,

    /// Transaction id of encoded messages
    #[clap(short, long, default_value = "0")]
    xid: u32,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more flow monitor requests into a single message
    Request {
        /// Requests such as "table=0,tcp,!initial"
        #[clap(required = true)]
        requests: Vec<String>,
    },

    /// Cancel the flow monitor with the given id
    Cancel { id: u32 },

    /// Notify that flow monitoring paused
    Pause,

    /// Notify that flow monitoring resumed
    Resume,

    /// Decode a hex-encoded message
    Decode { hex: String },
}

fn from_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    hex::decode(digits).map_err(|e| format!("bad hex dump: {}", e))
}

fn decode(msg: &[u8]) -> Result<String, OfpError> {
    let ports = PortMap::new();
    let tables = TableMap::new();
    let raw = RawMessage::decode(msg)?;
    let mut s = format!("{} (xid={:#x}):", raw.raw.name(), raw.xid);
    match raw.raw {
        OfpRaw::Ofpt10FlowRemoved | OfpRaw::Ofpt11FlowRemoved | OfpRaw::Ofpt15FlowRemoved |
        OfpRaw::NxtFlowRemoved => {
            let fr = decode_flow_removed(msg)?;
            format_flow_removed(&mut s, &fr, &ports, &tables);
        }
        OfpRaw::NxstFlowMonitorRequest |
        OfpRaw::Onfst13FlowMonitorRequest |
        OfpRaw::Ofpst14FlowMonitorRequest => {
            for rq in FlowMonitorRequestCursor::new(msg)? {
                format_flow_monitor_request(&mut s, &rq?, &ports, &tables);
            }
        }
        OfpRaw::NxstFlowMonitorReply |
        OfpRaw::Onfst13FlowMonitorReply |
        OfpRaw::Ofpst14FlowMonitorReply => {
            let mut cursor = FlowUpdateCursor::new(msg)?;
            let mut ofpacts = vec![];
            while let Some(update) = cursor.next_update(&mut ofpacts)? {
                format_flow_update(&mut s, &update, raw.version, &ports, &tables);
            }
        }
        OfpRaw::NxtFlowMonitorCancel | OfpRaw::Onft13FlowMonitorCancel => {
            let _ = write!(s, " id={}", decode_flow_monitor_cancel(msg)?);
        }
        OfpRaw::NxtFlowMonitorPaused |
        OfpRaw::NxtFlowMonitorResumed |
        OfpRaw::Onft13FlowMonitorPaused |
        OfpRaw::Onft13FlowMonitorResumed => {
            let _ = write!(s, " {:?}", decode_flow_monitor_pause(msg)?);
        }
        OfpRaw::NxtRequestForward | OfpRaw::Onft13RequestForward |
        OfpRaw::Ofpt14RequestForward => {
            let rf = decode_request_forward(msg)?;
            format_request_forward(&mut s, raw.version, &rf, &ports);
        }
        OfpRaw::Ofpt11GroupMod => GroupMod::parse(msg)?.format(&mut s, raw.version, &ports),
        OfpRaw::Ofpt13MeterMod => MeterMod::parse(msg)?.format(&mut s),
    }
    Ok(s)
}

fn run(cli: Cli) -> Result<(), String> {
    let protocol = cli.protocol;
    let mut msg = match cli.command {
        Commands::Request { requests } => {
            let mut msg = vec![];
            for text in &requests {
                let rq = parse_flow_monitor_request(text, &PortMap::new(), &TableMap::new())
                    .map_err(|e| e.to_string())?;
                debug!("parsed {:?}", rq);
                append_flow_monitor_request(&rq, &mut msg, protocol);
            }
            msg
        }
        Commands::Cancel { id } => encode_flow_monitor_cancel(id, protocol),
        Commands::Pause => encode_flow_monitor_pause(MonitorPause::Paused, protocol),
        Commands::Resume => encode_flow_monitor_pause(MonitorPause::Resumed, protocol),
        Commands::Decode { hex } => {
            let msg = from_hex(&hex)?;
            println!("{}", decode(&msg).map_err(|e| e.to_string())?);
            return Ok(());
        }
    };
    OfpHeader::set_xid(&mut msg, cli.xid);
    println!("{}", hex::encode(&msg));
    println!("{}", decode(&msg).map_err(|e| e.to_string())?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}
