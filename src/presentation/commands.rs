use std::fmt;
use std::str::FromStr;

pub const USAGE: &str = "\
Commands:
  scan              scan for nearby devices
  stop              stop scanning
  devices           list discovered devices
  select <n>        select device number n
  connect           connect to the selected device
  disconnect        disconnect from the device
  led on|off        switch the LED
  blink on|off      switch blink mode
  data on|off       start or stop receiving telemetry
  status            show the current state
  help              show this help
  quit              exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    Stop,
    Devices,
    Select(usize),
    Connect,
    Disconnect,
    Led(bool),
    Blink(bool),
    Data(bool),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (type 'help' for a list of commands)", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

fn parse_switch(arg: Option<&str>, command: &str) -> Result<bool, ParseCommandError> {
    match arg.map(str::to_lowercase).as_deref() {
        Some("on") | Some("1") | Some("true") => Ok(true),
        Some("off") | Some("0") | Some("false") => Ok(false),
        _ => Err(ParseCommandError(format!("usage: {} on|off", command))),
    }
}

impl FromStr for ConsoleCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Err(ParseCommandError("empty command".to_string()));
        };
        let arg = parts.next();

        let command = command.to_lowercase();
        match command.as_str() {
            "scan" => Ok(Self::Scan),
            "stop" => Ok(Self::Stop),
            "devices" | "ls" => Ok(Self::Devices),
            "select" => arg
                .and_then(|n| n.parse().ok())
                .map(Self::Select)
                .ok_or_else(|| ParseCommandError("usage: select <n>".to_string())),
            "connect" => Ok(Self::Connect),
            "disconnect" => Ok(Self::Disconnect),
            "led" => parse_switch(arg, "led").map(Self::Led),
            "blink" => parse_switch(arg, "blink").map(Self::Blink),
            "data" => parse_switch(arg, "data").map(Self::Data),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseCommandError(format!("unknown command '{}'", other))),
        }
    }
}
