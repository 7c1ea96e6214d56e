//! User input.
//!
//! Menus only talk to the [`Prompt`] trait so they can be driven by scripted
//! answers in tests.

use anyhow::Result;
use dialoguer::{Confirm, Input};
use thiserror::Error;

/// Input stream ended (EOF, or the terminal went away).
#[derive(Debug, Error)]
#[error("input closed")]
pub struct InputClosed;

/// Source of answers for the interactive menus.
pub trait Prompt {
    /// Free text. An empty answer yields `default` when one is given.
    fn input(&mut self, label: &str, default: Option<&str>) -> Result<String>;

    /// One of `letters`, case-insensitive. Asks again until it gets one.
    fn choice(&mut self, label: &str, letters: &[char]) -> Result<char>;

    fn confirm(&mut self, label: &str, default: bool) -> Result<bool>;

    /// Wait for Enter.
    fn pause(&mut self) -> Result<()>;
}

/// Normalize a menu answer to its uppercase letter, if it names one of `letters`.
pub fn match_letter(answer: &str, letters: &[char]) -> Option<char> {
    let mut chars = answer.trim().chars();
    let first = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() {
        return None;
    }
    letters
        .iter()
        .map(|c| c.to_ascii_uppercase())
        .find(|c| *c == first)
}

/// Terminal prompt backed by `dialoguer`.
#[derive(Default)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Prompt for ConsolePrompt {
    fn input(&mut self, label: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(label).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        let answer = input.interact_text().map_err(|_| InputClosed)?;
        Ok(answer.trim().to_string())
    }

    fn choice(&mut self, label: &str, letters: &[char]) -> Result<char> {
        loop {
            let answer = self.input(label, None)?;
            if let Some(letter) = match_letter(&answer, letters) {
                return Ok(letter);
            }
            crate::ui::warning("无效的选项，请重新输入");
        }
    }

    fn confirm(&mut self, label: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(label)
            .default(default)
            .interact()
            .map_err(|_| InputClosed.into())
    }

    fn pause(&mut self) -> Result<()> {
        Input::<String>::new()
            .with_prompt("按回车键继续")
            .allow_empty(true)
            .interact_text()
            .map(|_| ())
            .map_err(|_| InputClosed.into())
    }
}


#[cfg(test)]
mod tests {
    use super::scripted::ScriptedPrompt;
    use super::*;

    #[test]
    fn test_match_letter() {
        assert_eq!(match_letter("a", &['A', 'B']), Some('A'));
        assert_eq!(match_letter(" B ", &['A', 'B']), Some('B'));
        assert_eq!(match_letter("c", &['A', 'B']), None);
        assert_eq!(match_letter("ab", &['A', 'B']), None);
        assert_eq!(match_letter("", &['A']), None);
    }

    #[test]
    fn test_scripted_choice_skips_invalid_answers() {
        let mut prompt = ScriptedPrompt::new(["x", "zz", "q"]);
        assert_eq!(prompt.choice("选项", &['A', 'Q']).unwrap(), 'Q');
        assert_eq!(prompt.asked.len(), 3);
    }

    #[test]
    fn test_scripted_input_default_and_exhaustion() {
        let mut prompt = ScriptedPrompt::new(["", "value"]);
        assert_eq!(prompt.input("a", Some("fallback")).unwrap(), "fallback");
        assert_eq!(prompt.input("b", Some("fallback")).unwrap(), "value");

        let err = prompt.input("c", None).unwrap_err();
        assert!(err.is::<InputClosed>());
    }

    #[test]
    fn test_scripted_confirm() {
        let mut prompt = ScriptedPrompt::new(["y", "n", ""]);
        assert!(prompt.confirm("?", false).unwrap());
        assert!(!prompt.confirm("?", true).unwrap());
        assert!(prompt.confirm("?", true).unwrap());
    }
}
