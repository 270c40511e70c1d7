//! In-memory [`Link`] for exercising the protocol without hardware.
//!
//! `MockLink` records every framed write and answers reads from a queue of
//! scripted responses, falling back to a default response once the queue is
//! empty. Clones share state, so a test can keep a handle while the client
//! owns the link, or hand clones of one link to two controllers to simulate
//! a shared bus.
//!
//! # Example
//!
//! ```rust
//! use roboteq_base::motor::{Channel, ControllerClient, MockLink};
//!
//! let link = MockLink::new("COM3");
//! link.set_default_response(b"+\r");
//!
//! let mut controller = ControllerClient::with_link(link.clone());
//! assert!(controller.set_speed(Channel::ONE, 10));
//! assert_eq!(link.written(), vec!["!G 1 10\r"]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::link::{Link, LinkError, Result, TERMINATOR};

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    fail_open: bool,
    written: Vec<String>,
    responses: VecDeque<Vec<u8>>,
    default_response: Option<Vec<u8>>,
    open_count: usize,
    close_count: usize,
}

/// Scriptable link double; see the module docs
#[derive(Debug, Clone)]
pub struct MockLink {
    port: String,
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Create an already-open link
    pub fn new(port: &str) -> Self {
        let state = MockState {
            open: true,
            ..MockState::default()
        };
        Self {
            port: port.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer the next unanswered read with `response`
    pub fn queue_response(&self, response: &[u8]) {
        self.state().responses.push_back(response.to_vec());
    }

    /// Queue several responses in order
    pub fn queue_responses(&self, responses: &[&[u8]]) {
        let mut state = self.state();
        state
            .responses
            .extend(responses.iter().map(|r| r.to_vec()));
    }

    /// Response used whenever the queue is empty
    pub fn set_default_response(&self, response: &[u8]) {
        self.state().default_response = Some(response.to_vec());
    }

    /// Make every subsequent `open` fail
    pub fn fail_opens(&self) {
        self.state().fail_open = true;
    }

    /// Every framed command written so far, terminator included
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }
}

impl Link for MockLink {
    fn port(&self) -> &str {
        &self.port
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn open(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.fail_open {
            return Err(LinkError::PortUnavailable {
                port: self.port.clone(),
                source: serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "mock port unavailable",
                ),
            });
        }
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(LinkError::Closed {
                port: self.port.clone(),
            });
        }
        let mut frame = command.to_string();
        frame.push(TERMINATOR as char);
        state.written.push(frame);
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.state();
        if !state.open {
            return Err(LinkError::Closed {
                port: self.port.clone(),
            });
        }
        match state.responses.pop_front() {
            Some(response) => Ok(response),
            None => state
                .default_response
                .clone()
                .ok_or_else(|| LinkError::ReadTimeout {
                    port: self.port.clone(),
                }),
        }
    }

    fn close(&mut self) {
        let mut state = self.state();
        if state.open {
            state.open = false;
            state.close_count += 1;
        }
    }
}
