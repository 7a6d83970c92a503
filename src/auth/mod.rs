//! Interactive authentication
//!
//! Establishes an authorized session. A restored session short-circuits
//! the whole flow; otherwise the login runs as a linear state machine:
//! phone → code → (password) → (terms, signup), with every user-facing
//! step delegated to a [`CredentialResponder`].

mod responder;

pub use responder::{CredentialResponder, ScriptedResponder, StaticResponder, TerminalResponder};

use crate::error::{Error, Result};
use crate::session::{PhoneIdentity, SessionStore};
use crate::transport::{SignInOutcome, SignupProfile, TermsOfService, Transport};
use std::fmt;
use tracing::{debug, info};

/// Question raised by the remote during login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    PhoneConfirmation { phone: String },
    CodeRequired { delivery: String },
    PasswordRequired { hint: Option<String> },
    TermsAcceptance { terms: TermsOfService },
    SignupRequired,
}

impl fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthChallenge::PhoneConfirmation { .. } => "phone confirmation",
            AuthChallenge::CodeRequired { .. } => "login code",
            AuthChallenge::PasswordRequired { .. } => "2FA password",
            AuthChallenge::TermsAcceptance { .. } => "terms of service",
            AuthChallenge::SignupRequired => "signup profile",
        };
        f.write_str(name)
    }
}

/// A responder's answer to one challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    PhoneConfirmed(bool),
    Code(String),
    Password(String),
    Terms(bool),
    Signup(SignupProfile),
}

/// How the session became authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The stored session was already valid
    Restored,
    /// A login flow ran and the new session was saved
    SignedIn,
}

/// Drives the login state machine against a transport
pub struct Authenticator<'a, T: ?Sized, S: ?Sized, R: ?Sized> {
    transport: &'a T,
    store: &'a S,
    responder: &'a R,
}

impl<'a, T, S, R> Authenticator<'a, T, S, R>
where
    T: Transport + ?Sized,
    S: SessionStore + ?Sized,
    R: CredentialResponder + ?Sized,
{
    pub fn new(transport: &'a T, store: &'a S, responder: &'a R) -> Self {
        Authenticator {
            transport,
            store,
            responder,
        }
    }

    /// Make sure the transport holds an authorized session
    pub async fn authenticate(&self, phone: &str, identity: &PhoneIdentity) -> Result<AuthOutcome> {
        let status = self.transport.auth_status().await.map_err(Error::AuthFailed)?;
        if status.authorized {
            debug!("Session for {} already authorized", identity);
            return Ok(AuthOutcome::Restored);
        }

        info!("Starting authentication flow...");
        self.sign_in(phone).await?;

        let session = self.transport.export_session().await.map_err(Error::AuthFailed)?;
        self.store.save(identity, &session)?;

        info!("Successfully authenticated!");
        Ok(AuthOutcome::SignedIn)
    }

    async fn sign_in(&self, phone: &str) -> Result<()> {
        let confirmed = self
            .ask(AuthChallenge::PhoneConfirmation {
                phone: phone.to_string(),
            })
            .await?;
        match confirmed {
            AuthResponse::PhoneConfirmed(true) => {}
            AuthResponse::PhoneConfirmed(false) => {
                return Err(Error::Input("phone number was not confirmed".to_string()));
            }
            other => return Err(unexpected("phone confirmation", &other)),
        }

        let sent = self.transport.send_code(phone).await.map_err(Error::AuthFailed)?;
        debug!("Login code sent via {}", sent.delivery);

        let code = match self
            .ask(AuthChallenge::CodeRequired {
                delivery: sent.delivery,
            })
            .await?
        {
            AuthResponse::Code(code) => code,
            other => return Err(unexpected("login code", &other)),
        };

        match self.transport.submit_code(&code).await.map_err(Error::AuthFailed)? {
            SignInOutcome::Authorized => Ok(()),
            SignInOutcome::PasswordRequired { hint } => self.check_password(hint).await,
            SignInOutcome::SignUpRequired { terms } => self.sign_up(terms).await,
        }
    }

    async fn check_password(&self, hint: Option<String>) -> Result<()> {
        let password = match self.ask(AuthChallenge::PasswordRequired { hint }).await? {
            AuthResponse::Password(password) => password,
            other => return Err(unexpected("2FA password", &other)),
        };

        self.transport
            .submit_password(&password)
            .await
            .map_err(Error::AuthFailed)
    }

    async fn sign_up(&self, terms: Option<TermsOfService>) -> Result<()> {
        if let Some(terms) = terms {
            let id = terms.id.clone();
            match self.ask(AuthChallenge::TermsAcceptance { terms }).await? {
                AuthResponse::Terms(true) => {}
                AuthResponse::Terms(false) => return Err(Error::TermsRejected),
                other => return Err(unexpected("terms of service", &other)),
            }
            self.transport.accept_terms(&id).await.map_err(Error::AuthFailed)?;
        }

        let profile = match self.ask(AuthChallenge::SignupRequired).await? {
            AuthResponse::Signup(profile) => profile,
            other => return Err(unexpected("signup profile", &other)),
        };
        if profile.first_name.trim().is_empty() {
            return Err(Error::Input("first name is required to sign up".to_string()));
        }

        info!("Registering new account");
        self.transport.sign_up(&profile).await.map_err(Error::AuthFailed)
    }

    async fn ask(&self, challenge: AuthChallenge) -> Result<AuthResponse> {
        debug!("Auth challenge: {}", challenge);
        self.responder.respond(&challenge).await
    }
}

fn unexpected(expected: &str, got: &AuthResponse) -> Error {
    Error::Input(format!("expected {}, responder answered {:?}", expected, got))
}
