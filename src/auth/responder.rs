//! Credential responders
//!
//! A responder answers the challenges raised during login. The terminal
//! responder prompts on stdin, the scripted one replays queued answers.

use crate::auth::{AuthChallenge, AuthResponse};
use crate::error::{Error, Result};
use crate::transport::SignupProfile;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use tracing::info;

/// Supplies answers to authentication challenges
#[async_trait]
pub trait CredentialResponder: Send + Sync {
    /// Answer one challenge. Blocks the login flow until it returns.
    async fn respond(&self, challenge: &AuthChallenge) -> Result<AuthResponse>;
}

/// Interactive responder reading from the terminal
#[derive(Debug, Default, Clone)]
pub struct TerminalResponder;

impl TerminalResponder {
    pub fn new() -> Self {
        TerminalResponder
    }
}

#[async_trait]
impl CredentialResponder for TerminalResponder {
    async fn respond(&self, challenge: &AuthChallenge) -> Result<AuthResponse> {
        let challenge = challenge.clone();
        tokio::task::spawn_blocking(move || prompt(&challenge))
            .await
            .map_err(|e| Error::Input(format!("prompt task failed: {}", e)))?
    }
}

fn prompt(challenge: &AuthChallenge) -> Result<AuthResponse> {
    match challenge {
        AuthChallenge::PhoneConfirmation { phone } => {
            // The phone comes from configuration, so there is nothing to ask
            info!("Signing in as {}", phone);
            Ok(AuthResponse::PhoneConfirmed(true))
        }
        AuthChallenge::CodeRequired { delivery } => {
            let code = read_line(&format!(
                "Enter the authentication code sent via {}: ",
                delivery
            ))?;
            Ok(AuthResponse::Code(code))
        }
        AuthChallenge::PasswordRequired { hint } => {
            let label = match hint {
                Some(hint) if !hint.is_empty() => format!("Enter your 2FA password (hint: {}): ", hint),
                _ => "Enter your 2FA password: ".to_string(),
            };
            let password = rpassword::prompt_password(label)
                .map_err(|e| Error::Input(format!("failed to read password: {}", e)))?;
            Ok(AuthResponse::Password(password.trim().to_string()))
        }
        AuthChallenge::TermsAcceptance { terms } => {
            println!("Terms of Service:");
            println!("{}", terms.text);
            let answer = read_line("Do you accept the Terms of Service? (y/n): ")?;
            Ok(AuthResponse::Terms(is_affirmative(&answer)))
        }
        AuthChallenge::SignupRequired => {
            let first_name = read_line("Enter your first name: ")?;
            let last_name = read_line("Enter your last name (optional): ")?;
            Ok(AuthResponse::Signup(SignupProfile {
                first_name,
                last_name,
            }))
        }
    }
}

fn read_line(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout()
        .flush()
        .map_err(|e| Error::Input(format!("failed to write prompt: {}", e)))?;

    let mut line = String::new();
    let read = std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| Error::Input(format!("failed to read input: {}", e)))?;
    if read == 0 {
        return Err(Error::Input("input closed".to_string()));
    }

    Ok(line.trim().to_string())
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Replays a fixed list of answers in order
///
/// Used by tests and unattended runs. Running out of answers is an input error.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    answers: Mutex<VecDeque<AuthResponse>>,
    asked: Mutex<Vec<AuthChallenge>>,
}

impl ScriptedResponder {
    pub fn new<I: IntoIterator<Item = AuthResponse>>(answers: I) -> Self {
        ScriptedResponder {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Challenges received so far
    pub fn asked(&self) -> Vec<AuthChallenge> {
        self.asked.lock().clone()
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.lock().len()
    }
}

#[async_trait]
impl CredentialResponder for ScriptedResponder {
    async fn respond(&self, challenge: &AuthChallenge) -> Result<AuthResponse> {
        self.asked.lock().push(challenge.clone());
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Input(format!("no scripted answer for {}", challenge)))
    }
}

/// Answers from values known up front, e.g. taken from the environment
///
/// Challenges without a configured value fail with an input error.
#[derive(Debug, Clone, Default)]
pub struct StaticResponder {
    pub code: Option<String>,
    pub password: Option<String>,
    pub accept_terms: bool,
    pub profile: Option<SignupProfile>,
}

#[async_trait]
impl CredentialResponder for StaticResponder {
    async fn respond(&self, challenge: &AuthChallenge) -> Result<AuthResponse> {
        let missing = || Error::Input(format!("no value configured for {}", challenge));
        match challenge {
            AuthChallenge::PhoneConfirmation { .. } => Ok(AuthResponse::PhoneConfirmed(true)),
            AuthChallenge::CodeRequired { .. } => {
                self.code.clone().map(AuthResponse::Code).ok_or_else(missing)
            }
            AuthChallenge::PasswordRequired { .. } => {
                self.password.clone().map(AuthResponse::Password).ok_or_else(missing)
            }
            AuthChallenge::TermsAcceptance { .. } => Ok(AuthResponse::Terms(self.accept_terms)),
            AuthChallenge::SignupRequired => {
                self.profile.clone().map(AuthResponse::Signup).ok_or_else(missing)
            }
        }
    }
}
