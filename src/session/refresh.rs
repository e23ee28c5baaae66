/// Where an authenticated request stands in the renewal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Authenticated,
    RefreshingToken,
    Anonymous,
}

/// Bounded token-renewal state machine for one authenticated request.
///
/// `Authenticated → RefreshingToken → Authenticated | Anonymous`.
/// A request may be renewed at most once: a rejection after a successful
/// refresh goes straight to `Anonymous`, so a backend that keeps rejecting
/// fresh tokens cannot cause a refresh loop.
#[derive(Debug, Clone)]
pub struct RefreshCycle {
    phase: RefreshPhase,
    refreshes: u8,
}

impl RefreshCycle {
    pub const MAX_REFRESHES: u8 = 1;

    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RefreshPhase::Authenticated,
            refreshes: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    #[must_use]
    pub fn refreshes(&self) -> u8 {
        self.refreshes
    }

    /// The access token was rejected.
    pub fn token_rejected(&mut self) -> RefreshPhase {
        self.phase = match self.phase {
            RefreshPhase::Authenticated if self.refreshes < Self::MAX_REFRESHES => {
                RefreshPhase::RefreshingToken
            }
            _ => RefreshPhase::Anonymous,
        };
        self.phase
    }

    /// The refresh exchange produced a new pair; the request may be retried.
    pub fn refresh_succeeded(&mut self) -> RefreshPhase {
        if self.phase == RefreshPhase::RefreshingToken {
            self.refreshes += 1;
            self.phase = RefreshPhase::Authenticated;
        }
        self.phase
    }

    /// The backend refused the refresh token.
    pub fn refresh_rejected(&mut self) -> RefreshPhase {
        self.phase = RefreshPhase::Anonymous;
        self.phase
    }

    /// The refresh exchange never reached the backend. The session is left
    /// as it was but this cycle may not refresh again.
    pub fn refresh_interrupted(&mut self) -> RefreshPhase {
        if self.phase == RefreshPhase::RefreshingToken {
            self.refreshes = Self::MAX_REFRESHES;
            self.phase = RefreshPhase::Authenticated;
        }
        self.phase
    }
}

impl Default for RefreshCycle {
    fn default() -> Self {
        Self::new()
    }
}
