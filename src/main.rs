mod image_file;
mod logger;
mod parse_args;

use logger::Logger;
use matrix_image::{push_image, PushConfig};
use matrix_protocol::serial::{available_ports, describe_port};
use matrix_protocol::{
    Connection, Exchange, Packet, PacketKind, ProtocolError, SendOptions, SerialTransport,
    SocketAddr, SocketTransport, Transport, WebSocketTransport,
};
use parse_args::{parse_args, Command, Target};

use std::path::Path;
use std::time::Duration;

const COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            std::process::exit(1);
        }
    };

    // Set up logger
    let logger = match &args.log_file {
        Some(path) => match Logger::file(path, args.verbosity) {
            Ok(l) => {
                eprintln!("Logging to: {}", path);
                l
            }
            Err(e) => {
                eprintln!("Failed to open log file '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => Logger::stderr(args.verbosity),
    };
    if let Err(e) = logger.install() {
        eprintln!("Failed to install logger: {}", e);
    }

    if args.command == Command::ListPorts {
        list_ports();
        return;
    }

    let Some(target) = &args.target else {
        eprintln!("No display given: use --serial, --tcp, --socket or --ws");
        std::process::exit(1);
    };

    let transport = match open_transport(target) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to connect to display: {}", e);
            std::process::exit(1);
        }
    };
    let conn = Connection::new();
    if let Err(e) = conn.open(transport) {
        eprintln!("Failed to open connection: {}", e);
        std::process::exit(1);
    }

    let ok = run_command(&conn, &args.command, args.timeout);
    let _ = conn.close();
    log::Log::flush(log::logger());
    if !ok {
        std::process::exit(1);
    }
}

fn list_ports() {
    match available_ports() {
        Ok(ports) if ports.is_empty() => eprintln!("No serial ports found"),
        Ok(ports) => {
            for port in &ports {
                println!("{}", describe_port(port));
            }
        }
        Err(e) => {
            eprintln!("Failed to list serial ports: {}", e);
            std::process::exit(1);
        }
    }
}

fn open_transport(target: &Target) -> Result<Box<dyn Transport>, ProtocolError> {
    Ok(match target {
        Target::Serial { path, baud_rate } => Box::new(SerialTransport::open(path, *baud_rate)?),
        Target::Tcp(addr) => Box::new(SocketTransport::connect(&SocketAddr::tcp(addr.clone()))?),
        #[cfg(unix)]
        Target::Socket(path) => Box::new(SocketTransport::connect(&SocketAddr::unix(path))?),
        #[cfg(not(unix))]
        Target::Socket(_) => {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "Unix sockets not supported on this platform, use --tcp",
            )))
        }
        Target::WebSocket(url) => Box::new(WebSocketTransport::connect(url)?),
    })
}

/// Run one command; false if it failed
fn run_command(conn: &Connection, command: &Command, timeout: Option<Duration>) -> bool {
    let await_ret = SendOptions::expect(PacketKind::Ret, timeout.unwrap_or(COMMAND_TIMEOUT));
    let any_reply = SendOptions::any_reply(timeout.unwrap_or(COMMAND_TIMEOUT));

    let packet = match command {
        Command::Fill(color) => Packet::FillScreen(*color),
        Command::Clear => Packet::ClearScreen,
        Command::Pixel { pos, color } => Packet::DrawPixel {
            pos: *pos,
            color: *color,
        },
        Command::Char {
            pos,
            code,
            fg,
            bg,
            size,
        } => Packet::DrawChar {
            pos: *pos,
            code: *code,
            bg: *bg,
            fg: *fg,
            size: *size,
        },
        Command::Debug(value) => return report(conn.send(&Packet::DebugValue(*value), any_reply)),
        Command::Heap { after, bytes } => {
            let packet = if *after {
                Packet::heap_after(*bytes)
            } else {
                Packet::heap_before(*bytes)
            };
            return report(conn.send(&packet, any_reply));
        }
        Command::Image {
            path,
            palette_size,
            start,
            progress_marker,
        } => {
            let mut config = PushConfig::new(0);
            config.palette_size = *palette_size;
            config.start = *start;
            config.progress_marker = *progress_marker;
            if let Some(t) = timeout {
                config.reply_timeout = t;
            }
            return send_image(conn, Path::new(path), config);
        }
        Command::ListPorts => return true,
    };

    report(conn.send(&packet, await_ret))
}

fn report(result: Result<Exchange, ProtocolError>) -> bool {
    let exchange = match result {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Send failed: {}", e);
            return false;
        }
    };

    for packet in &exchange.packets {
        println!("{}", packet);
    }
    if let Some(e) = &exchange.error {
        eprintln!("Read failed: {}", e);
        return false;
    }
    if exchange.timed_out() {
        eprintln!("No reply from display");
        return false;
    }
    if exchange.end_of_stream && exchange.packets.is_empty() {
        eprintln!("Display closed the connection");
        return false;
    }
    exchange.exit_code().map_or(true, |code| code == 0)
}

fn send_image(conn: &Connection, path: &Path, mut config: PushConfig) -> bool {
    let image = match image_file::load_png(path) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Failed to load '{}': {}", path.display(), e);
            return false;
        }
    };
    config.dimension = image.dimension;

    eprintln!(
        "Pushing {0}x{0} image from {1}",
        image.dimension,
        path.display()
    );

    match push_image(conn, &image.pixels, &config) {
        Ok(report) => {
            eprintln!(
                "Done: {} packets, {} replies, {} timeouts, {} colors",
                report.packets_sent,
                report.replies,
                report.timeouts,
                report.palette.len()
            );
            report.timeouts == 0
        }
        Err(e) => {
            eprintln!("Push failed: {}", e);
            false
        }
    }
}
