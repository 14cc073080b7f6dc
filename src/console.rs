//! Line-oriented console that stands in for touch input and toasts when
//! running on a desktop.

use crate::capture::GrantToken;
use crate::overlay::PanelTab;
use crate::service::{ControlEvent, Notifier, PermissionRequester, ServiceHandle};
use crate::settings::{SettingsUpdate, KEY_SLOTS};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Handle x position in touch coordinates (right screen edge).
const EDGE_X: f32 = 1080.0;

const HELP: &str = "\
Commands:
  tap | swipe | drag <start_x> <end_x>   gesture on the edge handle
  close | outside                        collapse the panel
  tab <home|chat|settings>               switch panel tab
  capture | save | send                  capture, save, send to assistant
  chat <text>                            follow-up question
  pick <n>                               send quick action n as a follow-up
  key <1-3> <value> | model <name> | use <1-3>
  grant | deny                           answer the permission prompt
  revoke                                 stop sharing from the system side
  health | help | quit";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Turn one input line into a control event. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ControlEvent>, ParseError> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let event = match command.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "tap" => ControlEvent::HandleGesture {
            start_x: EDGE_X,
            end_x: EDGE_X - 5.0,
        },
        "swipe" => ControlEvent::HandleGesture {
            start_x: EDGE_X,
            end_x: EDGE_X - 120.0,
        },
        "drag" => {
            let mut coords = rest.split_whitespace().map(str::parse::<f32>);
            match (coords.next(), coords.next(), coords.next()) {
                (Some(Ok(start_x)), Some(Ok(end_x)), None) => {
                    ControlEvent::HandleGesture { start_x, end_x }
                }
                _ => return Err(ParseError::Usage("drag <start_x> <end_x>")),
            }
        }
        "close" => ControlEvent::PanelClosed,
        "outside" => ControlEvent::OutsideTap,
        "tab" => ControlEvent::SwitchTab(
            rest.parse::<PanelTab>()
                .map_err(|_| ParseError::Usage("tab <home|chat|settings>"))?,
        ),
        "capture" => ControlEvent::CaptureRequested,
        "save" => ControlEvent::SaveRequested,
        "send" => ControlEvent::SendRequested,
        "chat" if !rest.is_empty() => ControlEvent::ChatMessage(rest.to_string()),
        "chat" => return Err(ParseError::Usage("chat <text>")),
        "pick" => match rest.parse::<usize>() {
            Ok(n) if n >= 1 => ControlEvent::QuickAction(n - 1),
            _ => return Err(ParseError::Usage("pick <n>")),
        },
        "key" => {
            let (slot, value) = rest
                .split_once(char::is_whitespace)
                .map(|(slot, value)| (slot, value.trim()))
                .unwrap_or((rest, ""));
            let slot = parse_slot(slot).ok_or(ParseError::Usage("key <1-3> <value>"))?;
            let mut update = SettingsUpdate::default();
            update.api_keys[slot as usize - 1] = Some(value.to_string());
            ControlEvent::UpdateSettings(update)
        }
        "model" if !rest.is_empty() => ControlEvent::UpdateSettings(SettingsUpdate {
            model_name: rest.to_string(),
            ..Default::default()
        }),
        "model" => return Err(ParseError::Usage("model <name>")),
        "use" => ControlEvent::UpdateSettings(SettingsUpdate {
            active_key_index: Some(parse_slot(rest).ok_or(ParseError::Usage("use <1-3>"))?),
            ..Default::default()
        }),
        "grant" => ControlEvent::PermissionResult(GrantToken::new(-1, Some(b"console".to_vec()))),
        "deny" => ControlEvent::PermissionResult(GrantToken::cancelled()),
        "revoke" => ControlEvent::StopProjection,
        "health" => ControlEvent::HealthCheck,
        "quit" | "exit" => ControlEvent::Shutdown,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(event))
}

fn parse_slot(raw: &str) -> Option<u8> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|slot| (1..=KEY_SLOTS).contains(slot))
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run_console(handle: ServiceHandle) -> std::io::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().eq_ignore_ascii_case("help") {
            println!("{HELP}");
            continue;
        }
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(event)) => {
                let quit = matches!(event, ControlEvent::Shutdown);
                if !handle.send(event) || quit {
                    return Ok(());
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    handle.send(ControlEvent::Shutdown);
    Ok(())
}

/// Prints notifications and the chat transcript to stdout.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) {
        println!("» {message}");
    }

    fn chat_line(&self, line: &str) {
        println!("{line}\n");
    }

    fn quick_actions(&self, options: &[String]) {
        for (i, option) in options.iter().enumerate() {
            println!("  [{}] {}", i + 1, option);
        }
        if !options.is_empty() {
            println!("  (pick <n> to ask)");
        }
    }
}

/// The console user answers the permission prompt with `grant` or `deny`.
pub struct ConsolePermissionPrompt;

impl PermissionRequester for ConsolePermissionPrompt {
    fn request(&self, _events: ServiceHandle) {
        println!("» Allow screen capture? Type 'grant' or 'deny'.");
    }
}
