//! Line-oriented command console driving a [`Session`].
//!
//! Each input line is one command, e.g. `stroke 10 10 40 12`, `class 2` or
//! `key ctrl+z`. Coordinates are image pixels.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CanvasError, StoreError};
use crate::history::SnapshotStore;
use crate::keybindings::{Action, KeyBindings, ParseShortcutError, Shortcut};
use crate::layer::LayerRole;
use crate::session::Session;
use crate::store::DatasetStore;
use crate::stroke::Point;

/// One console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Next,
    Prev,
    Undo,
    Redo,
    /// Only `clear yes` touches the label
    Clear { confirmed: bool },
    Class(u8),
    Eraser,
    /// `None` toggles
    Assist(Option<bool>),
    Segment,
    Size(u32),
    Opacity(LayerRole, u8),
    Stroke(Vec<Point>),
    Points(Vec<(u32, u32)>),
    Key(Shortcut),
    Accept,
    Composite(PathBuf),
    Save,
    Status,
    Help,
    Quit,
}

/// Error parsing a console line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' expects {expected}")]
    Arguments {
        command: &'static str,
        expected: &'static str,
    },
    #[error(transparent)]
    Shortcut(#[from] ParseShortcutError),
}

fn args_error(command: &'static str, expected: &'static str) -> ParseCommandError {
    ParseCommandError::Arguments { command, expected }
}

fn parse_numbers<T: FromStr>(args: &[&str]) -> Option<Vec<T>> {
    args.iter().map(|arg| arg.parse().ok()).collect()
}

fn parse_single<T: FromStr>(
    args: &[&str],
    command: &'static str,
    expected: &'static str,
) -> Result<T, ParseCommandError> {
    match args {
        [arg] => arg.parse().map_err(|_| args_error(command, expected)),
        _ => Err(args_error(command, expected)),
    }
}

fn parse_layer(name: &str) -> Option<LayerRole> {
    match name.to_ascii_lowercase().as_str() {
        "label" => Some(LayerRole::Label),
        "assist" | "sam" => Some(LayerRole::ModelAssist),
        "roi" => Some(LayerRole::RegionOfInterest),
        "image" => Some(LayerRole::Image),
        _ => None,
    }
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(ParseCommandError::Empty);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "next" | "n" => Command::Next,
            "prev" | "p" => Command::Prev,
            "undo" | "u" => Command::Undo,
            "redo" | "r" => Command::Redo,
            "clear" => match args {
                [] => Command::Clear { confirmed: false },
                [answer] if answer.eq_ignore_ascii_case("yes") => Command::Clear { confirmed: true },
                _ => return Err(args_error("clear", "'yes' or nothing")),
            },
            "eraser" => Command::Eraser,
            "segment" => Command::Segment,
            "accept" => Command::Accept,
            "save" => Command::Save,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            "class" => Command::Class(parse_single(args, "class", "a class id")?),
            "size" => Command::Size(parse_single(args, "size", "a diameter in pixels")?),
            "assist" => match args {
                [] => Command::Assist(None),
                ["on"] => Command::Assist(Some(true)),
                ["off"] => Command::Assist(Some(false)),
                _ => return Err(args_error("assist", "'on', 'off' or nothing")),
            },
            "opacity" => {
                let expected = "a layer (label, assist, roi) and a percentage";
                let [layer, percent] = args else {
                    return Err(args_error("opacity", expected));
                };
                let role = parse_layer(layer).ok_or_else(|| args_error("opacity", expected))?;
                let percent = percent.parse().map_err(|_| args_error("opacity", expected))?;
                Command::Opacity(role, percent)
            }
            "stroke" => {
                let expected = "pairs of x y coordinates";
                let values: Vec<f32> = parse_numbers(args)
                    .filter(|v: &Vec<f32>| !v.is_empty() && v.len() % 2 == 0)
                    .ok_or_else(|| args_error("stroke", expected))?;
                Command::Stroke(values.chunks(2).map(|p| Point::new(p[0], p[1])).collect())
            }
            "points" => {
                let expected = "pairs of x y pixel coordinates";
                let values: Vec<u32> = parse_numbers(args)
                    .filter(|v: &Vec<u32>| !v.is_empty() && v.len() % 2 == 0)
                    .ok_or_else(|| args_error("points", expected))?;
                Command::Points(values.chunks(2).map(|p| (p[0], p[1])).collect())
            }
            "key" => {
                let [shortcut] = args else {
                    return Err(args_error("key", "a shortcut such as ctrl+z"));
                };
                Command::Key(shortcut.parse()?)
            }
            "composite" => {
                let [path] = args else {
                    return Err(args_error("composite", "an output path"));
                };
                Command::Composite(PathBuf::from(path))
            }
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub const HELP: &str = "\
commands:
  next | prev                 switch sample (wraps around)
  undo | redo                 step through the label history
  clear [yes]                 clear the label (asks first)
  class <id>                  paint with a class
  eraser                      erase mode
  assist [on|off]             toggle assisted segmentation
  points x y [x y ..]         stamp assist points
  segment                     run the segmentation model
  size <px>                   brush diameter
  opacity <layer> <percent>   layer opacity (label, assist, roi)
  stroke x y [x y ..]         draw one stroke
  key <shortcut>              press a key binding, e.g. ctrl+z
  accept                      copy the sample into the accepted corpus
  composite <path>            write the composited view
  save                        persist the label
  status                      show the current sample
  quit                        persist and exit";

const CLEAR_PROMPT: &str = "this clears the whole label; repeat as 'clear yes' to confirm";

/// Run one command against the session, returning a status line.
pub fn execute<S, H>(
    session: &mut Session<S, H>,
    bindings: &KeyBindings,
    command: Command,
) -> Result<(Flow, String), CanvasError>
where
    S: DatasetStore,
    H: SnapshotStore,
{
    let message = match command {
        Command::Next => switched(session, 1)?,
        Command::Prev => switched(session, -1)?,
        Command::Undo => changed(session.undo()?, "undone", "nothing to undo"),
        Command::Redo => changed(session.redo()?, "redone", "nothing to redo"),
        Command::Clear { confirmed: false } => CLEAR_PROMPT.to_string(),
        Command::Clear { confirmed: true } => {
            session.clear_label()?;
            "label cleared".to_string()
        }
        Command::Class(id) => changed(session.select_class(id), "class selected", "unknown class"),
        Command::Eraser => {
            session.activate_eraser();
            "eraser".to_string()
        }
        Command::Assist(enabled) => {
            let enabled = enabled.unwrap_or(!session.assist_enabled());
            session.set_assist(enabled);
            format!("assist {}", if enabled { "on" } else { "off" })
        }
        Command::Segment => {
            let output = session.run_segmentation()?;
            format!("segmentation written to {}", output.display())
        }
        Command::Size(size) => {
            session.set_brush_size(size);
            format!("brush size {} px", session.brush_size())
        }
        Command::Opacity(role, percent) => {
            session.set_opacity(role, percent)?;
            format!("{role} opacity {percent}%")
        }
        Command::Stroke(points) => changed(session.stroke(&points)?, "stroke drawn", "no stroke"),
        Command::Points(points) => changed(
            session.stamp_points(&points)?,
            "points stamped",
            "assist is off",
        ),
        Command::Key(shortcut) => match bindings.action_for(shortcut) {
            Some(Action::ClearLabel) => CLEAR_PROMPT.to_string(),
            Some(action) => changed(session.apply(action)?, "ok", "no change"),
            None => format!("{shortcut} is not bound"),
        },
        Command::Accept => {
            let accepted = session.accept()?;
            format!("accepted as {}", accepted.hash)
        }
        Command::Composite(path) => {
            session
                .composite()?
                .save(&path)
                .map_err(StoreError::from)?;
            format!("composite written to {}", path.display())
        }
        Command::Save => {
            if session.persist()? {
                "saved".to_string()
            } else if session.state().label_on_hold {
                "not saved: the stored label was rejected at load and is kept until edited"
                    .to_string()
            } else {
                "no sample loaded".to_string()
            }
        }
        Command::Status => status(session),
        Command::Help => HELP.to_string(),
        Command::Quit => {
            session.close()?;
            return Ok((Flow::Quit, "bye".to_string()));
        }
    };
    Ok((Flow::Continue, message))
}

fn changed(applied: bool, yes: &str, no: &str) -> String {
    (if applied { yes } else { no }).to_string()
}

fn switched<S: DatasetStore, H: SnapshotStore>(
    session: &mut Session<S, H>,
    step: isize,
) -> Result<String, CanvasError> {
    session.switch_by(step)?;
    for rejected in &session.last_report().rejected {
        log::warn!("{}", rejected);
    }
    Ok(status(session))
}

/// Summary of the current sample and brush.
pub fn status<S: DatasetStore, H: SnapshotStore>(session: &Session<S, H>) -> String {
    let sample = session
        .current_image()
        .map_or_else(|| "<none>".to_string(), |path| path.display().to_string());
    let cursor = session
        .history_state()
        .cursor
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    format!(
        "{} | brush {:?} {} px | assist {} | history {}",
        sample,
        session.brush_mode(),
        session.brush_size(),
        session.assist_enabled(),
        cursor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrushConfig, LayerConfig};
    use crate::constants::CLASSES_FILE;
    use crate::history::{MemorySnapshotStore, UndoHistory};
    use crate::keybindings::Key;
    use crate::store::FsDatasetStore;
    use tempfile::TempDir;

    /// Session on a single 4x4 sample with one dab of class 1.
    fn painted() -> (TempDir, Session<FsDatasetStore, MemorySnapshotStore>) {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CLASSES_FILE),
            r##"{"classes": [{"id": 1, "name": "leaf", "color": "#00c800"}]}"##,
        )
        .unwrap();
        let store = FsDatasetStore::new(dir.path(), "work", "accepted");
        std::fs::create_dir_all(store.image_dir()).unwrap();
        image::RgbImage::new(4, 4)
            .save(store.image_dir().join("a.png"))
            .unwrap();
        let mut session = Session::new(
            store,
            UndoHistory::new(MemorySnapshotStore::new()),
            &BrushConfig::default(),
            &LayerConfig::default(),
        )
        .unwrap();
        session.load_latest().unwrap();
        assert!(session.stroke(&[Point::new(1.0, 1.0)]).unwrap());
        (dir, session)
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("next".parse(), Ok(Command::Next));
        assert_eq!("  Undo ".parse(), Ok(Command::Undo));
        assert_eq!("class 2".parse(), Ok(Command::Class(2)));
        assert_eq!("assist".parse(), Ok(Command::Assist(None)));
        assert_eq!("assist off".parse(), Ok(Command::Assist(Some(false))));
        assert_eq!(
            "opacity roi 35".parse(),
            Ok(Command::Opacity(LayerRole::RegionOfInterest, 35))
        );
        assert_eq!(
            "key ctrl+z".parse(),
            Ok(Command::Key(Shortcut::ctrl(Key::Z)))
        );
    }

    #[test]
    fn test_parse_clear() {
        assert_eq!("clear".parse(), Ok(Command::Clear { confirmed: false }));
        assert_eq!("clear YES".parse(), Ok(Command::Clear { confirmed: true }));
        assert!(matches!(
            "clear now".parse::<Command>(),
            Err(ParseCommandError::Arguments { command: "clear", .. })
        ));
    }

    #[test]
    fn test_clear_asks_before_clearing() {
        let (_dir, mut session) = painted();
        let bindings = KeyBindings::default();

        let (flow, message) =
            execute(&mut session, &bindings, Command::Clear { confirmed: false }).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(message, CLEAR_PROMPT);
        let (_, message) =
            execute(&mut session, &bindings, Command::Key(Shortcut::plain(Key::C))).unwrap();
        assert_eq!(message, CLEAR_PROMPT);
        assert!(!session.canvas().unwrap().label().is_blank());
        assert_eq!(session.history_state().cursor, Some(1));

        let (_, message) =
            execute(&mut session, &bindings, Command::Clear { confirmed: true }).unwrap();
        assert_eq!(message, "label cleared");
        assert!(session.canvas().unwrap().label().is_blank());
        assert_eq!(session.history_state().cursor, Some(2));
    }

    #[test]
    fn test_parse_stroke() {
        assert_eq!(
            "stroke 1 2 3.5 4".parse(),
            Ok(Command::Stroke(vec![Point::new(1.0, 2.0), Point::new(3.5, 4.0)]))
        );
        assert!("stroke 1 2 3".parse::<Command>().is_err());
        assert!("stroke".parse::<Command>().is_err());
        assert!("stroke a b".parse::<Command>().is_err());
        assert_eq!(
            "points 4 5".parse(),
            Ok(Command::Points(vec![(4, 5)]))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>(), Err(ParseCommandError::Empty));
        assert_eq!(
            "paint".parse::<Command>(),
            Err(ParseCommandError::Unknown("paint".to_string()))
        );
        assert!(matches!(
            "class 300".parse::<Command>(),
            Err(ParseCommandError::Arguments { command: "class", .. })
        ));
        assert!(matches!(
            "key hyper+q".parse::<Command>(),
            Err(ParseCommandError::Shortcut(_))
        ));
    }
}
