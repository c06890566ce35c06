use std::fmt::Display;
use std::io::{self, BufRead, StdinLock, Stdout, Write};

use crate::error::{BridgeError, BridgeResult};

/// Line-oriented operator dialogue over any reader/writer pair.
pub struct Console<I, O> {
    input: I,
    output: O,
}

pub type StdConsole = Console<StdinLock<'static>, Stdout>;

pub fn stdio() -> StdConsole {
    Console::new(io::stdin().lock(), io::stdout())
}

impl<I: BufRead, O: Write> Console<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> O {
        self.output
    }

    pub fn output(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn say(&mut self, line: impl Display) -> BridgeResult<()> {
        writeln!(self.output, "{line}")?;
        self.output.flush()?;
        Ok(())
    }

    /// `None` once input is exhausted.
    pub fn read_line(&mut self) -> BridgeResult<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Empty answers and closed input both take the default.
    pub fn ask(&mut self, question: &str, default: &str) -> BridgeResult<String> {
        if default.is_empty() {
            write!(self.output, "{question}: ")?;
        } else {
            write!(self.output, "{question} [{default}]: ")?;
        }
        self.output.flush()?;
        match self.read_line()? {
            Some(answer) if !answer.is_empty() => Ok(answer),
            _ => Ok(default.to_string()),
        }
    }

    /// Uses `preset` (usually from the environment) without prompting.
    pub fn ask_or(
        &mut self,
        preset: Option<&str>,
        question: &str,
        default: &str,
    ) -> BridgeResult<String> {
        match preset {
            Some(value) => {
                self.say(format!("{question}: {value} (from environment)"))?;
                Ok(value.to_string())
            }
            None => self.ask(question, default),
        }
    }

    /// Re-asks until a non-empty answer arrives.
    pub fn ask_required(&mut self, question: &str) -> BridgeResult<String> {
        loop {
            write!(self.output, "{question}: ")?;
            self.output.flush()?;
            match self.read_line()? {
                Some(answer) if !answer.is_empty() => return Ok(answer),
                Some(_) => self.say("A value is required.")?,
                None => return Err(BridgeError::InputClosed(question.to_string())),
            }
        }
    }

    pub fn confirm(&mut self, question: &str, default_yes: bool) -> BridgeResult<bool> {
        let hint = if default_yes { "Y/n" } else { "y/N" };
        write!(self.output, "{question} [{hint}]: ")?;
        self.output.flush()?;
        let answer = self.read_line()?.unwrap_or_default().to_ascii_lowercase();
        Ok(match answer.as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default_yes,
        })
    }
}
