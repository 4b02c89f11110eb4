//! Keyboard-interactive responder
//!
//! Servers that disable plain password auth often still accept the same
//! secret over keyboard-interactive. Every prompt in every round gets the
//! same answer.

use ssh2::{KeyboardInteractivePrompt, Prompt};
use tracing::debug;

pub struct SecretResponder<'a> {
    secret: &'a str,
    rounds: usize,
}

impl<'a> SecretResponder<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { secret, rounds: 0 }
    }

    /// Number of prompt rounds answered so far
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

impl KeyboardInteractivePrompt for SecretResponder<'_> {
    fn prompt<'b>(&mut self, _username: &str, _instructions: &str, prompts: &[Prompt<'b>]) -> Vec<String> {
        self.rounds += 1;
        debug!(
            "Answering keyboard-interactive round {} with {} prompt(s)",
            self.rounds,
            prompts.len()
        );
        prompts.iter().map(|_| self.secret.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn prompt(text: &str) -> Prompt<'_> {
        Prompt {
            text: Cow::Borrowed(text),
            echo: false,
        }
    }

    #[test]
    fn test_answers_every_prompt_identically() {
        let mut responder = SecretResponder::new("s3cret");
        let prompts = [prompt("Password: "), prompt("Verification code: ")];
        let answers = responder.prompt("alice", "", &prompts);
        assert_eq!(answers, vec!["s3cret".to_string(), "s3cret".to_string()]);
    }

    #[test]
    fn test_empty_round_and_repeated_rounds() {
        let mut responder = SecretResponder::new("pw");
        assert!(responder.prompt("alice", "welcome", &[]).is_empty());
        let answers = responder.prompt("alice", "", &[prompt("Password: ")]);
        assert_eq!(answers, vec!["pw".to_string()]);
        assert_eq!(responder.rounds(), 2);
    }
}
