use matrix_protocol::{Color, Position, DEFAULT_BAUD_RATE};
use std::time::Duration;

const HELP: &str = "\
Matrix Link - Drive a pixel matrix display

Sends drawing commands to a display over serial, TCP, a Unix socket or a
WebSocket bridge, and pushes palette-reduced PNG images to it.

USAGE:
  matrix-link [OPTIONS] <COMMAND>

COMMANDS:
  fill <color>                   Fill the screen
  clear                          Clear the screen
  pixel <x> <y> <color>          Draw one pixel
  char <x> <y> <char>            Draw a character (--fg, --bg, --size)
  image <file.png>               Quantize and push a square PNG
                                 (--palette, --at, --no-progress)
  debug <value>                  Send a debug value
  heap <before|after> <bytes>    Send a heap report
  --list-ports                   List serial ports and exit

OPTIONS:
  -h, --help            Prints help information
  --serial <path>       Serial port of the display
  --baud <rate>         Serial baud rate (default: 115200)
  --tcp <host:port>     Connect via TCP
  --socket <path>       Connect via Unix socket
  --ws <url>            Connect via WebSocket bridge (ws://host:port/)
  --timeout <ms>        Reply timeout (default: 1000, images: 3000)
  --fg <color>          Character color (default: white)
  --bg <color>          Character background (default: black)
  --size <n>            Character size (default: 1)
  --palette <n>         Image palette size (default: 16)
  --at <x,y>            Where to draw the image (default: 0,0)
  --no-progress         Do not draw progress pixels while pushing
  -v, --verbose         Show connection events and push progress
  -vv, --trace          Show every packet
  -vvv, --trace-bytes   Show raw bytes on the wire (very verbose)
  --log <file>          Write log output to file instead of stderr

Colors are red, green, blue, white, black or #rrggbb.
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    #[default]
    Quiet = 0,
    /// Connection events, push progress
    Verbose = 1,
    /// Every packet sent and received
    Trace = 2,
    /// Raw bytes on the wire
    TraceBytes = 3,
}

/// Where the display is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Serial { path: String, baud_rate: u32 },
    Tcp(String),
    Socket(String),
    WebSocket(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fill(Color),
    Clear,
    Pixel {
        pos: Position,
        color: Color,
    },
    Char {
        pos: Position,
        code: u8,
        fg: Color,
        bg: Color,
        size: u8,
    },
    Image {
        path: String,
        palette_size: usize,
        start: Position,
        progress_marker: bool,
    },
    Debug(u8),
    Heap {
        after: bool,
        bytes: u32,
    },
    ListPorts,
}

#[derive(Debug)]
pub struct AppArgs {
    pub target: Option<Target>,
    pub command: Command,
    pub timeout: Option<Duration>,
    pub verbosity: Verbosity,
    pub log_file: Option<String>,
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    let args = parse_from(&mut pargs)?;

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}

fn parse_from(pargs: &mut pico_args::Arguments) -> Result<AppArgs, pico_args::Error> {
    // Count -v flags for verbosity level
    let verbosity = if pargs.contains("--trace-bytes") || pargs.contains("-vvv") {
        Verbosity::TraceBytes
    } else if pargs.contains("--trace") || pargs.contains("-vv") {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };

    let serial: Option<String> = pargs.opt_value_from_str("--serial")?;
    let baud_rate: u32 = pargs
        .opt_value_from_str("--baud")?
        .unwrap_or(DEFAULT_BAUD_RATE);
    let tcp: Option<String> = pargs.opt_value_from_str("--tcp")?;
    let socket: Option<String> = pargs.opt_value_from_str("--socket")?;
    let ws: Option<String> = pargs.opt_value_from_str("--ws")?;

    let target = match (serial, tcp, socket, ws) {
        (Some(path), None, None, None) => Some(Target::Serial { path, baud_rate }),
        (None, Some(addr), None, None) => Some(Target::Tcp(addr)),
        (None, None, Some(path), None) => Some(Target::Socket(path)),
        (None, None, None, Some(url)) => Some(Target::WebSocket(url)),
        (None, None, None, None) => None,
        _ => {
            return Err(pico_args::Error::ArgumentParsingFailed {
                cause: "choose one of --serial, --tcp, --socket, --ws".to_string(),
            })
        }
    };

    let timeout = pargs
        .opt_value_from_str::<_, u64>("--timeout")?
        .map(Duration::from_millis);
    let log_file = pargs.opt_value_from_str("--log")?;

    let fg = pargs
        .opt_value_from_fn("--fg", parse_color)?
        .unwrap_or(Color::WHITE);
    let bg = pargs
        .opt_value_from_fn("--bg", parse_color)?
        .unwrap_or(Color::BLACK);
    let size: u8 = pargs.opt_value_from_str("--size")?.unwrap_or(1);
    let palette_size: usize = pargs
        .opt_value_from_str("--palette")?
        .unwrap_or(matrix_image::push::DEFAULT_PALETTE_SIZE);
    let start = pargs
        .opt_value_from_fn("--at", parse_position)?
        .unwrap_or_default();
    let progress_marker = !pargs.contains("--no-progress");
    let list_ports = pargs.contains("--list-ports");

    let command = if list_ports {
        Command::ListPorts
    } else {
        match pargs.subcommand()?.as_deref() {
            Some("fill") => Command::Fill(pargs.free_from_fn(parse_color)?),
            Some("clear") => Command::Clear,
            Some("pixel") => Command::Pixel {
                pos: Position::new(pargs.free_from_str()?, pargs.free_from_str()?),
                color: pargs.free_from_fn(parse_color)?,
            },
            Some("char") => Command::Char {
                pos: Position::new(pargs.free_from_str()?, pargs.free_from_str()?),
                code: pargs.free_from_fn(parse_char_code)?,
                fg,
                bg,
                size,
            },
            Some("image") => Command::Image {
                path: pargs.free_from_str()?,
                palette_size,
                start,
                progress_marker,
            },
            Some("debug") => Command::Debug(pargs.free_from_str()?),
            Some("heap") => Command::Heap {
                after: pargs.free_from_fn(parse_heap_phase)?,
                bytes: pargs.free_from_str()?,
            },
            Some(other) => {
                return Err(pico_args::Error::ArgumentParsingFailed {
                    cause: format!("unknown command '{}'", other),
                })
            }
            None => {
                return Err(pico_args::Error::ArgumentParsingFailed {
                    cause: "no command given, see --help".to_string(),
                })
            }
        }
    };

    Ok(AppArgs {
        target,
        command,
        timeout,
        verbosity,
        log_file,
    })
}

pub fn parse_color(s: &str) -> Result<Color, String> {
    match s.to_ascii_lowercase().as_str() {
        "red" => return Ok(Color::RED),
        "green" => return Ok(Color::GREEN),
        "blue" => return Ok(Color::BLUE),
        "white" => return Ok(Color::WHITE),
        "black" => return Ok(Color::BLACK),
        _ => {}
    }

    let hex = s
        .strip_prefix('#')
        .filter(|h| h.len() == 6 && h.is_ascii())
        .ok_or_else(|| format!("expected a color name or #rrggbb, got '{}'", s))?;
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("bad color '{}': {}", s, e))
    };
    Ok(Color::new(channel(0)?, channel(2)?, channel(4)?))
}

fn parse_position(s: &str) -> Result<Position, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got '{}'", s))?;
    let coord = |v: &str| {
        v.trim()
            .parse::<u8>()
            .map_err(|e| format!("bad coordinate '{}': {}", v, e))
    };
    Ok(Position::new(coord(x)?, coord(y)?))
}

/// A single ASCII character, or its code as a number
fn parse_char_code(s: &str) -> Result<u8, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => s
            .parse::<u8>()
            .map_err(|_| format!("expected one ASCII character or a code, got '{}'", s)),
    }
}

fn parse_heap_phase(s: &str) -> Result<bool, String> {
    match s {
        "before" => Ok(false),
        "after" => Ok(true),
        _ => Err(format!("expected 'before' or 'after', got '{}'", s)),
    }
}
