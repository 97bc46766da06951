//! Line-oriented input for the terminal driver.

use lectio_core::passage::SectionKind;
use lectio_core::session::SessionCommand;

#[derive(Debug, Clone)]
pub enum Input {
    Command(SessionCommand),
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
  n            next chunk
  p            previous chunk
  c            open the checkpoint on this chunk
  r [text]     answer the checkpoint (text is saved as a note)
  f            finish the section
  l            start/stop listening
  space        pause/resume narration
  t            retry narration after a blocked start
  s            show the current state
  today <chapter|psalm>
  open <chapter|psalm> <reference> [@translation]
  h            this help
  q            quit";

pub fn parse_input(line: &str) -> Input {
    if line == " " {
        return Input::Command(SessionCommand::PauseResume);
    }
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "n" | "next" => SessionCommand::GoNext,
        "p" | "prev" | "previous" => SessionCommand::GoPrevious,
        "c" | "checkpoint" => SessionCommand::ReachCheckpoint,
        "r" | "resolve" => SessionCommand::ResolveCheckpoint {
            response: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "f" | "finish" => SessionCommand::CompleteSection,
        "l" | "listen" => SessionCommand::ToggleListening,
        "pause" | "resume" => SessionCommand::PauseResume,
        "t" | "tap" => SessionCommand::RetryPlayback,
        "s" | "status" => SessionCommand::GetSnapshot,
        "today" => match rest.parse::<SectionKind>() {
            Ok(section) => SessionCommand::LoadToday { section },
            Err(err) => return Input::Unknown(err),
        },
        "open" => return parse_open(rest),
        "h" | "help" | "?" => return Input::Help,
        "q" | "quit" | "exit" => return Input::Quit,
        _ => return Input::Unknown(line.to_string()),
    };
    Input::Command(command)
}

fn parse_open(rest: &str) -> Input {
    let Some((section, reference)) = rest.split_once(char::is_whitespace) else {
        return Input::Unknown("usage: open <chapter|psalm> <reference>".to_string());
    };
    let section = match section.parse::<SectionKind>() {
        Ok(section) => section,
        Err(err) => return Input::Unknown(err),
    };
    let (reference, translation) = match reference.rsplit_once('@') {
        Some((reference, translation)) if !translation.trim().is_empty() => {
            (reference.trim(), Some(translation.trim().to_string()))
        }
        _ => (reference.trim(), None),
    };
    if reference.is_empty() {
        return Input::Unknown("missing reference".to_string());
    }
    Input::Command(SessionCommand::LoadPassage {
        section,
        reference: reference.to_string(),
        translation,
    })
}
