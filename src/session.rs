//! Channel session: application selection and session validity.
//!
//! [`ChannelSession`] is the logic core of the channel. It builds the SELECT command,
//! interprets its answer and tracks whether payload traffic is allowed. It does no
//! I/O, so the sync and async drivers share it.

use alloc::vec::Vec;

use log::{info, warn};

use crate::apdu::CommandApdu;
use crate::config::ChannelConfig;
use crate::error::ChannelSetupError;
use crate::status::{ResponseApdu, StatusWord};

/// State of the channel session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// The application has not been selected yet.
    #[default]
    Unselected,
    /// The application is selected; payload traffic is allowed.
    Selected {
        /// Data returned by the application in its SELECT answer, if any.
        application_data: Option<Vec<u8>>,
    },
    /// A fatal error or a disconnect ended the session; select again.
    Invalidated,
}

/// The logic core of one commissioning channel.
#[derive(Debug)]
pub struct ChannelSession {
    config: ChannelConfig,
    state: SessionState,
}

impl ChannelSession {
    /// Creates a session. `config` is expected to be validated.
    pub fn new(config: ChannelConfig) -> Self {
        Self { config, state: SessionState::Unselected }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_selected(&self) -> bool {
        matches!(self.state, SessionState::Selected { .. })
    }

    /// Generates the SELECT command for the configured application.
    pub fn select_command(&self) -> CommandApdu<'_> {
        // The identifier length is checked by `ChannelConfig::validate`.
        CommandApdu::select(&self.config.application_id)
    }

    /// Processes the SELECT answer and updates the session state.
    ///
    /// Returns the application data carried before the status word, if any.
    pub fn handle_select_response<E>(
        &mut self,
        response: &[u8],
    ) -> Result<Option<Vec<u8>>, ChannelSetupError<E>> {
        let apdu = match ResponseApdu::parse(response) {
            Ok(apdu) => apdu,
            Err(_) => {
                self.state = SessionState::Invalidated;
                warn!("malformed SELECT response ({} bytes)", response.len());
                return Err(ChannelSetupError::MalformedResponse { len: response.len() });
            }
        };

        match apdu.status {
            StatusWord::Success => {
                let application_data = (!apdu.body.is_empty()).then(|| apdu.body.to_vec());
                info!(
                    "application selected ({} bytes of application data)",
                    application_data.as_ref().map_or(0, Vec::len)
                );
                self.state = SessionState::Selected { application_data: application_data.clone() };
                Ok(application_data)
            }
            status => {
                self.state = SessionState::Invalidated;
                warn!("application selection rejected with {}", status);
                Err(ChannelSetupError::Rejected(status))
            }
        }
    }

    /// Ends the session after a fatal error or a disconnect.
    pub fn invalidate(&mut self) {
        if self.state != SessionState::Invalidated {
            warn!("channel session invalidated");
        }
        self.state = SessionState::Invalidated;
    }
}
