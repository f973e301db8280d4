use masking_signals::SignalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number attached to an outgoing audio request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues strictly increasing tickets. Only a response carrying the most
/// recently issued ticket may be applied; everything older is stale.
#[derive(Debug, Default, Clone)]
pub struct RequestSequencer {
    issued: u64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    pub fn latest(&self) -> Option<Ticket> {
        (self.issued > 0).then_some(Ticket(self.issued))
    }

    pub fn is_latest(&self, ticket: Ticket) -> bool {
        self.issued > 0 && ticket.0 == self.issued
    }
}

/// What happened to a response handed back to a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Applied,
    /// A newer request was issued after this one; the response was dropped.
    Stale,
    Failed(SignalError),
}

impl PreviewOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}
